use std::{
    env::{self, VarError},
    fs::File,
    io::{self, BufReader},
    path::{Path, PathBuf},
};

use platform_dirs::AppDirs;
use serde::{Deserialize, Serialize};

use crate::{
    catalog::Sampling,
    error::Error,
    util::mkdir_if_not_exists,
    webapi::{ClientCredentials, API_BASE, TOKEN_URL},
};

const APP_NAME: &str = "Spoti-Guessr";
const CONFIG_FILENAME: &str = "config.json";
const SESSION_FILENAME: &str = "session";
const CATALOG_DIRNAME: &str = "catalog";

const PROXY_ENV_VAR: &str = "HTTPS_PROXY";
const JWT_SECRET_ENV_VAR: &str = "GUESSR_JWT_SECRET";
const CATALOG_CLIENT_ID_ENV_VAR: &str = "SPOTIFY_CLIENT_ID";
const CATALOG_CLIENT_SECRET_ENV_VAR: &str = "SPOTIFY_CLIENT_SECRET";
const OAUTH_CLIENT_SECRET_ENV_VAR: &str = "GUESSR_OAUTH_CLIENT_SECRET";

const DEFAULT_JWT_SECRET: &str = "your-secret-key";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuthConfig {
    pub auth_url: String,
    pub token_url: String,
    pub userinfo_url: String,
    pub client_id: String,
    pub redirect_port: u16,
    pub scopes: Vec<String>,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            auth_url: "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
            token_url: "https://oauth2.googleapis.com/token".to_string(),
            userinfo_url: "https://openidconnect.googleapis.com/v1/userinfo".to_string(),
            client_id: String::new(),
            redirect_port: 8888,
            scopes: vec!["openid".to_string(), "email".to_string()],
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogApiConfig {
    pub api_base: String,
    pub token_url: String,
    /// Overridden by `SPOTIFY_CLIENT_ID`.
    pub client_id: Option<String>,
}

impl Default for CatalogApiConfig {
    fn default() -> Self {
        Self {
            api_base: API_BASE.to_string(),
            token_url: TOKEN_URL.to_string(),
            client_id: None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub data_dir: Option<PathBuf>,
    pub sampling: Sampling,
    /// Marks session cookies `Secure`.
    pub production: bool,
    pub muted: bool,
    pub oauth: OAuthConfig,
    pub catalog_api: CatalogApiConfig,
}

impl Config {
    fn app_dirs() -> Option<AppDirs> {
        const USE_XDG_ON_MACOS: bool = false;

        AppDirs::new(Some(APP_NAME), USE_XDG_ON_MACOS)
    }

    pub fn config_dir() -> Option<PathBuf> {
        Self::app_dirs().map(|dirs| dirs.config_dir)
    }

    fn config_path() -> Result<PathBuf, Error> {
        Self::config_dir()
            .map(|dir| dir.join(CONFIG_FILENAME))
            .ok_or_else(|| Error::ConfigError("no config directory".to_string()))
    }

    /// `None` when no config was saved yet.
    pub fn load() -> Result<Option<Config>, Error> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Option<Config>, Error> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        log::info!("loading config: {:?}", path);
        serde_json::from_reader(BufReader::new(file))
            .map(Some)
            .map_err(|err| Error::ConfigError(format!("failed to read {path:?}: {err}")))
    }

    pub fn save(&self) -> Result<(), Error> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), Error> {
        if let Some(dir) = path.parent() {
            mkdir_if_not_exists(dir)?;
        }
        let file = File::create(path)?;
        serde_json::to_writer_pretty(file, self)?;
        log::info!("saved config: {:?}", path);
        Ok(())
    }

    pub fn data_dir(&self) -> Result<PathBuf, Error> {
        self.data_dir
            .clone()
            .or_else(|| Self::app_dirs().map(|dirs| dirs.data_dir))
            .ok_or_else(|| Error::ConfigError("no data directory".to_string()))
    }

    pub fn catalog_dir(&self) -> Result<PathBuf, Error> {
        Ok(self.data_dir()?.join(CATALOG_DIRNAME))
    }

    /// File holding the session cookie of the signed-in user.
    pub fn session_path(&self) -> Result<PathBuf, Error> {
        Ok(self.data_dir()?.join(SESSION_FILENAME))
    }

    pub fn jwt_secret() -> String {
        env_var(JWT_SECRET_ENV_VAR).unwrap_or_else(|| {
            log::warn!(
                "{} is not set, signing sessions with the default secret",
                JWT_SECRET_ENV_VAR
            );
            DEFAULT_JWT_SECRET.to_string()
        })
    }

    pub fn catalog_credentials(&self) -> Result<ClientCredentials, Error> {
        let client_id = env_var(CATALOG_CLIENT_ID_ENV_VAR)
            .or_else(|| self.catalog_api.client_id.clone())
            .ok_or_else(|| {
                Error::ConfigError(format!("{CATALOG_CLIENT_ID_ENV_VAR} is not set"))
            })?;
        let client_secret = env_var(CATALOG_CLIENT_SECRET_ENV_VAR).ok_or_else(|| {
            Error::ConfigError(format!("{CATALOG_CLIENT_SECRET_ENV_VAR} is not set"))
        })?;
        Ok(ClientCredentials {
            client_id,
            client_secret,
        })
    }

    pub fn oauth_client_secret() -> Option<String> {
        env_var(OAUTH_CLIENT_SECRET_ENV_VAR)
    }

    pub fn proxy() -> Option<String> {
        env_var(PROXY_ENV_VAR)
    }
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).map_or_else(
        |err| match err {
            VarError::NotPresent => None,
            VarError::NotUnicode(_) => {
                log::error!("{} is not valid unicode", name);
                None
            }
        },
        |value| (!value.is_empty()).then_some(value),
    )
}
