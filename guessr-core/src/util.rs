use std::{fs, io, path::Path, time::Duration};

use time::OffsetDateTime;

pub const NET_CONNECT_TIMEOUT: Duration = Duration::from_millis(8 * 1000);

pub const NET_IO_TIMEOUT: Duration = Duration::from_millis(16 * 1000);

/// Agent configuration shared by the catalog web API and the OAuth userinfo
/// lookups.  Status codes are not turned into errors, callers inspect them.
pub fn default_ureq_agent_builder(
    proxy_url: Option<&str>,
) -> ureq::config::ConfigBuilder<ureq::typestate::AgentScope> {
    let mut agent = ureq::Agent::config_builder()
        .http_status_as_error(false)
        .timeout_global(Some(Duration::from_secs(10)))
        .timeout_connect(Some(NET_CONNECT_TIMEOUT))
        .timeout_recv_response(Some(NET_IO_TIMEOUT))
        .timeout_send_request(Some(NET_IO_TIMEOUT));

    if let Some(proxy_url) = proxy_url {
        let proxy = ureq::Proxy::new(proxy_url).ok();
        agent = agent.proxy(proxy);
    }

    agent
}

pub fn default_ureq_agent(proxy_url: Option<&str>) -> ureq::Agent {
    default_ureq_agent_builder(proxy_url).build().into()
}

pub fn mkdir_if_not_exists(path: &Path) -> io::Result<()> {
    fs::create_dir_all(path).or_else(|err| {
        if err.kind() == io::ErrorKind::AlreadyExists {
            Ok(())
        } else {
            Err(err)
        }
    })
}

/// Milliseconds since the Unix epoch, the timestamp format of stored documents.
pub fn unix_millis(at: OffsetDateTime) -> i64 {
    (at.unix_timestamp_nanos() / 1_000_000) as i64
}

/// Monotonic request counter.  Wraps around instead of overflowing.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Sequence(u64);

impl Sequence {
    pub fn new(value: u64) -> Self {
        Sequence(value)
    }

    /// Returns the current value and moves the counter forward.
    pub fn advance(&mut self) -> u64 {
        let current = self.0;
        self.0 = self.0.wrapping_add(1);
        current
    }
}
