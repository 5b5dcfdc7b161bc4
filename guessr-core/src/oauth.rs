use std::{
    io::{BufRead, BufReader, Write},
    net::{IpAddr, Ipv4Addr, SocketAddr, TcpListener, TcpStream},
    sync::mpsc,
    thread,
    time::Duration,
};

use oauth2::{
    basic::BasicClient, reqwest::http_client, AuthUrl, AuthorizationCode, ClientId, ClientSecret,
    CsrfToken, PkceCodeChallenge, PkceCodeVerifier, RedirectUrl, Scope, TokenResponse, TokenUrl,
};
use rand::{seq::IndexedRandom, Rng};
use serde::Deserialize;
use time::OffsetDateTime;
use ureq::Agent;
use url::Url;

use crate::{
    auth::{Permission, User},
    catalog::Catalog,
    config::OAuthConfig,
    error::Error,
    util::unix_millis,
};

pub const CALLBACK_PATH: &str = "/login";

const ADJECTIVES: &[&str] = &[
    "Groovy", "Mellow", "Funky", "Dreamy", "Electric", "Velvet", "Lucky", "Sonic", "Cosmic",
    "Golden", "Neon", "Silent",
];

const NOUNS: &[&str] = &[
    "Bassline", "Chorus", "Drummer", "Falsetto", "Melody", "Riff", "Tempo", "Vinyl", "Encore",
    "Remix", "Ballad", "Anthem",
];

/// Query parameters delivered to the redirect URI.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallbackParams {
    pub code: String,
    pub state: String,
}

/// One-shot HTTP listener receiving the authorization redirect.
pub struct CallbackListener {
    listener: TcpListener,
}

impl CallbackListener {
    pub fn bind(address: SocketAddr) -> Result<Self, Error> {
        let listener = TcpListener::bind(address)?;
        log::info!("callback listener bound to {:?}", address);
        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, Error> {
        Ok(self.listener.local_addr()?)
    }

    /// Waits for a single redirect and answers it with a small page.
    pub fn wait(self, timeout: Duration) -> Result<CallbackParams, Error> {
        let (tx, rx) = mpsc::channel();
        let listener = self.listener;
        thread::spawn(move || {
            let result = match listener.accept() {
                Ok((mut stream, _)) => read_callback(&mut stream),
                Err(err) => Err(Error::IoError(err)),
            };
            let _ = tx.send(result);
        });
        rx.recv_timeout(timeout)?
    }
}

fn read_callback(stream: &mut TcpStream) -> Result<CallbackParams, Error> {
    let mut request_line = String::new();
    BufReader::new(&mut *stream).read_line(&mut request_line)?;

    let code = extract_parameter(&request_line, "code");
    let state = extract_parameter(&request_line, "state");
    match (code, state) {
        (Some(code), Some(state)) => {
            send_response(stream, "Signed in to Spoti-Guessr. You can close this window now.");
            log::info!("received authorization code");
            Ok(CallbackParams { code, state })
        }
        _ => {
            let reason = extract_parameter(&request_line, "error")
                .unwrap_or_else(|| "missing code".to_string());
            send_response(stream, "Sign in failed. You can close this window now.");
            Err(Error::OAuthError(format!("authorization failed: {reason}")))
        }
    }
}

fn extract_parameter(request_line: &str, name: &str) -> Option<String> {
    let path = request_line.split_whitespace().nth(1)?;
    let url = Url::parse(&format!("http://localhost{path}")).ok()?;
    url.query_pairs()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}

fn send_response(stream: &mut TcpStream, message: &str) {
    let body = format!(
        "<html><body style=\"background-color:#121212;color:#ffffff;\
         font-family:sans-serif;display:flex;justify-content:center;\
         align-items:center;height:100vh;margin:0\"><div>{message}</div></body></html>"
    );
    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/html; charset=utf-8\r\n\
         Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    let _ = stream.write_all(response.as_bytes());
}

/// A pending authorization: the URL to visit and what is needed to finish it.
pub struct Authorization {
    pub url: Url,
    pub state: CsrfToken,
    pub verifier: PkceCodeVerifier,
}

/// Authorization-code flow with PKCE against the configured provider.
pub struct OAuthLogin {
    client: BasicClient,
    scopes: Vec<Scope>,
    redirect_address: SocketAddr,
}

impl OAuthLogin {
    pub fn new(config: &OAuthConfig, client_secret: Option<String>) -> Result<Self, Error> {
        if config.client_id.is_empty() {
            return Err(Error::ConfigError("oauth client id is not set".to_string()));
        }
        let redirect_address =
            SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), config.redirect_port);
        let redirect_uri = format!("http://{redirect_address}{CALLBACK_PATH}");

        let client = BasicClient::new(
            ClientId::new(config.client_id.clone()),
            client_secret.map(ClientSecret::new),
            AuthUrl::new(config.auth_url.clone())?,
            Some(TokenUrl::new(config.token_url.clone())?),
        )
        .set_redirect_uri(RedirectUrl::new(redirect_uri)?);

        Ok(Self {
            client,
            scopes: config.scopes.iter().cloned().map(Scope::new).collect(),
            redirect_address,
        })
    }

    pub fn redirect_address(&self) -> SocketAddr {
        self.redirect_address
    }

    pub fn authorize(&self) -> Authorization {
        let (challenge, verifier) = PkceCodeChallenge::new_random_sha256();
        let (url, state) = self
            .client
            .authorize_url(CsrfToken::new_random)
            .add_scopes(self.scopes.iter().cloned())
            .set_pkce_challenge(challenge)
            .url();
        Authorization {
            url,
            state,
            verifier,
        }
    }

    /// Checks the returned state and trades the code for an access token.
    pub fn exchange(
        &self,
        params: CallbackParams,
        state: &CsrfToken,
        verifier: PkceCodeVerifier,
    ) -> Result<String, Error> {
        if params.state != *state.secret() {
            return Err(Error::OAuthError("state mismatch in callback".to_string()));
        }
        let response = self
            .client
            .exchange_code(AuthorizationCode::new(params.code))
            .set_pkce_verifier(verifier)
            .request(http_client)
            .map_err(|err| Error::OAuthError(format!("failed to exchange code: {err}")))?;
        Ok(response.access_token().secret().to_string())
    }
}

/// Identity reported by the provider's userinfo endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Identity {
    pub sub: String,
    #[serde(default)]
    pub email: String,
}

pub fn fetch_identity(agent: &Agent, userinfo_url: &str, token: &str) -> Result<Identity, Error> {
    let mut response = agent
        .get(userinfo_url)
        .header("Authorization", &format!("Bearer {token}"))
        .call()?;
    if !response.status().is_success() {
        return Err(Error::OAuthError(format!(
            "failed to fetch user info: {}",
            response.status()
        )));
    }
    Ok(response.body_mut().read_json()?)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignIn {
    Returning,
    New,
}

/// Logs an identity in, signing it up with a random nickname first if the
/// catalog has never seen it.
pub fn sign_in(
    catalog: &dyn Catalog,
    identity: Identity,
    rng: &mut impl Rng,
    now: OffsetDateTime,
) -> Result<(User, SignIn), Error> {
    if let Some(user) = catalog.user(&identity.sub)? {
        log::info!("welcome back, {}", user.nickname);
        return Ok((user, SignIn::Returning));
    }
    let user = User {
        uid: identity.sub,
        email: identity.email,
        nickname: random_nickname(rng),
        created_at: unix_millis(now),
        permission: Permission::ReadOnly,
    };
    catalog.put_user(&user)?;
    log::info!("signed up {} as {}", user.uid, user.nickname);
    Ok((user, SignIn::New))
}

pub fn random_nickname(rng: &mut impl Rng) -> String {
    let adjective = ADJECTIVES.choose(rng).copied().unwrap_or("Mystery");
    let noun = NOUNS.choose(rng).copied().unwrap_or("Listener");
    format!("{adjective}{noun}{}", rng.random_range(10..100))
}

pub fn launch_browser(url: &Url) -> Result<(), Error> {
    log::info!("opening browser for sign in");
    open::that(url.as_str())?;
    Ok(())
}
