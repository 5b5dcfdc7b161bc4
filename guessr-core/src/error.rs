use std::{error, fmt, io, sync::mpsc};

use crate::{
    game::Status,
    item::{Genre, ItemKind},
};

#[derive(Debug)]
pub enum Error {
    NoItems { kind: ItemKind, genre: Genre },
    NotEnoughItems { kind: ItemKind, genre: Genre },
    InvalidTransition { from: Status, action: &'static str },
    InvalidInput(String),
    InvalidState(String),
    AuthFailed(String),
    OAuthError(String),
    ConfigError(String),
    WebApiError(String),
    LoaderDisconnected,
    JsonError(Box<dyn error::Error + Send>),
    IoError(io::Error),
}

impl Error {
    /// Errors the player can recover from by asking for another matchup.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NoItems { .. }
                | Self::NotEnoughItems { .. }
                | Self::WebApiError(_)
                | Self::JsonError(_)
                | Self::IoError(_)
        )
    }
}

impl error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoItems { kind, genre } => {
                write!(f, "No {kind} found for genre '{genre}'")
            }
            Self::NotEnoughItems { kind, genre } => {
                write!(f, "Not enough distinct {kind} for genre '{genre}'")
            }
            Self::InvalidTransition { from, action } => {
                write!(f, "Cannot {action} a game that is {from}")
            }
            Self::InvalidInput(msg) => write!(f, "Invalid input: {msg}"),
            Self::InvalidState(msg) => write!(f, "Invalid state: {msg}"),
            Self::AuthFailed(msg) => write!(f, "Authentication failed: {msg}"),
            Self::OAuthError(msg) => write!(f, "OAuth error: {msg}"),
            Self::ConfigError(msg) => write!(f, "Configuration error: {msg}"),
            Self::WebApiError(msg) => f.write_str(msg),
            Self::LoaderDisconnected => write!(f, "Matchup loader disconnected"),
            Self::JsonError(err) => err.fmt(f),
            Self::IoError(err) => err.fmt(f),
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::IoError(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Error {
        Error::JsonError(Box::new(err))
    }
}

impl From<ureq::Error> for Error {
    fn from(err: ureq::Error) -> Error {
        Error::WebApiError(err.to_string())
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Error {
        Error::ConfigError(err.to_string())
    }
}

impl From<time::error::Format> for Error {
    fn from(err: time::error::Format) -> Error {
        Error::InvalidState(err.to_string())
    }
}

impl From<mpsc::RecvTimeoutError> for Error {
    fn from(err: mpsc::RecvTimeoutError) -> Error {
        Error::OAuthError(format!("no callback received: {err}"))
    }
}
