use std::io;

use crate::item::GameItem;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PreviewStatus {
    Muted,
    Unavailable,
    Started,
}

/// Hands a preview URL to something that can play it.
pub trait Opener: Send {
    fn open(&self, url: &str) -> io::Result<()>;
}

/// Opens previews with the system's default handler.
pub struct SystemOpener;

impl Opener for SystemOpener {
    fn open(&self, url: &str) -> io::Result<()> {
        open::that(url)
    }
}

pub struct Preview {
    muted: bool,
    opener: Box<dyn Opener>,
}

impl Preview {
    pub fn new(muted: bool) -> Self {
        Self::with_opener(muted, Box::new(SystemOpener))
    }

    pub fn with_opener(muted: bool, opener: Box<dyn Opener>) -> Self {
        Self { muted, opener }
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
    }

    pub fn play(&self, item: &GameItem) -> PreviewStatus {
        if self.muted {
            return PreviewStatus::Muted;
        }
        let Some(url) = item.preview_url() else {
            log::info!("no preview for {}", item.name());
            return PreviewStatus::Unavailable;
        };
        match self.opener.open(url) {
            Ok(()) => {
                log::debug!("playing preview: {}", url);
                PreviewStatus::Started
            }
            Err(err) => {
                log::warn!("failed to play preview {}: {}", url, err);
                PreviewStatus::Unavailable
            }
        }
    }
}
