#[cfg(unix)]
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::{
    fmt,
    fs::{self, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
};

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use time::{macros::format_description, Duration, OffsetDateTime, UtcOffset};

use crate::{error::Error, util::mkdir_if_not_exists};

type HmacSha256 = Hmac<Sha256>;

pub const COOKIE_NAME: &str = "auth_token";

/// Where a rejected request is sent.
pub const HOME_PATH: &str = "/";

pub const TOKEN_TTL: Duration = Duration::days(7);

const ALGORITHM: &str = "HS256";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Permission {
    #[serde(rename = "ADMIN")]
    Admin,
    #[default]
    #[serde(rename = "read-only")]
    ReadOnly,
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Admin => f.write_str("ADMIN"),
            Self::ReadOnly => f.write_str("read-only"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub uid: String,
    pub email: String,
    pub nickname: String,
    /// Milliseconds since the Unix epoch.
    pub created_at: i64,
    pub permission: Permission,
}

/// Payload of a session token.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub uid: String,
    pub email: String,
    pub permission: Permission,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    pub fn is_admin(&self) -> bool {
        self.permission == Permission::Admin
    }
}

#[derive(Serialize, Deserialize)]
struct Header {
    alg: String,
    typ: String,
}

/// Outcome of the admin route check.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Gate {
    Allow(Claims),
    Redirect(&'static str),
}

/// Issues and verifies HS256 signed session tokens.
pub struct TokenSigner {
    secret: Vec<u8>,
}

impl TokenSigner {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
        }
    }

    pub fn issue(&self, user: &User, now: OffsetDateTime) -> Result<String, Error> {
        let claims = Claims {
            uid: user.uid.clone(),
            email: user.email.clone(),
            permission: user.permission,
            iat: now.unix_timestamp(),
            exp: (now + TOKEN_TTL).unix_timestamp(),
        };
        let header = Header {
            alg: ALGORITHM.to_string(),
            typ: "JWT".to_string(),
        };
        let signing_input = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header)?),
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims)?),
        );
        let signature = URL_SAFE_NO_PAD.encode(self.mac(&signing_input)?.finalize().into_bytes());
        Ok(format!("{signing_input}.{signature}"))
    }

    pub fn verify(&self, token: &str, now: OffsetDateTime) -> Result<Claims, Error> {
        let mut parts = token.split('.');
        let (Some(header), Some(payload), Some(signature), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(Error::AuthFailed("malformed token".to_string()));
        };

        let signature = decode_segment(signature)?;
        self.mac(&format!("{header}.{payload}"))?
            .verify_slice(&signature)
            .map_err(|_| Error::AuthFailed("bad signature".to_string()))?;

        let header: Header = serde_json::from_slice(&decode_segment(header)?)
            .map_err(|err| Error::AuthFailed(err.to_string()))?;
        if header.alg != ALGORITHM {
            return Err(Error::AuthFailed(format!(
                "unsupported algorithm {}",
                header.alg
            )));
        }

        let claims: Claims = serde_json::from_slice(&decode_segment(payload)?)
            .map_err(|err| Error::AuthFailed(err.to_string()))?;
        if now.unix_timestamp() >= claims.exp {
            return Err(Error::AuthFailed("token expired".to_string()));
        }
        Ok(claims)
    }

    /// Lets a request through only with a valid, unexpired ADMIN token.
    /// Every rejection redirects home, the reason is only logged.
    pub fn admin_gate(&self, cookie_header: Option<&str>, now: OffsetDateTime) -> Gate {
        let Some(token) = cookie_header.and_then(|header| cookie_value(header, COOKIE_NAME)) else {
            log::info!("no auth token found");
            return Gate::Redirect(HOME_PATH);
        };
        match self.verify(token, now) {
            Ok(claims) if claims.is_admin() => Gate::Allow(claims),
            Ok(claims) => {
                log::info!("user permission: {}", claims.permission);
                Gate::Redirect(HOME_PATH)
            }
            Err(err) => {
                log::warn!("auth error: {}", err);
                Gate::Redirect(HOME_PATH)
            }
        }
    }

    fn mac(&self, input: &str) -> Result<HmacSha256, Error> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|err| Error::AuthFailed(err.to_string()))?;
        mac.update(input.as_bytes());
        Ok(mac)
    }
}

fn decode_segment(segment: &str) -> Result<Vec<u8>, Error> {
    URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|err| Error::AuthFailed(err.to_string()))
}

fn http_date(at: OffsetDateTime) -> Result<String, Error> {
    let format = format_description!(
        "[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT"
    );
    Ok(at.to_offset(UtcOffset::UTC).format(&format)?)
}

/// `Set-Cookie` value carrying a session token.
pub fn session_cookie(token: &str, expires: OffsetDateTime, secure: bool) -> Result<String, Error> {
    let mut cookie = format!(
        "{COOKIE_NAME}={token}; Path=/; HttpOnly; SameSite=Lax; Expires={}",
        http_date(expires)?
    );
    if secure {
        cookie.push_str("; Secure");
    }
    Ok(cookie)
}

/// `Set-Cookie` value that removes the session cookie.
pub fn logout_cookie() -> String {
    format!(
        "{COOKIE_NAME}=; Path=/; HttpOnly; SameSite=Lax; Expires=Thu, 01 Jan 1970 00:00:00 GMT; Max-Age=0"
    )
}

/// Looks up `name` in a `Cookie` header (`a=1; b=2`).
pub fn cookie_value<'a>(header: &'a str, name: &str) -> Option<&'a str> {
    header
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
        .filter(|value| !value.is_empty())
}

/// File-backed cookie store for the terminal front-end.  Holds the last
/// `Set-Cookie` value issued at login.
pub struct CookieJar {
    path: PathBuf,
}

impl CookieJar {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn store(&self, set_cookie: &str) -> Result<(), Error> {
        if let Some(dir) = self.path.parent() {
            mkdir_if_not_exists(dir)?;
        }
        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        options.mode(0o600);
        let mut file = options.open(&self.path)?;
        // `mode` only applies to new files.
        #[cfg(unix)]
        file.set_permissions(fs::Permissions::from_mode(0o600))?;
        file.write_all(set_cookie.as_bytes())?;
        Ok(())
    }

    /// `Cookie` header to send along, without the attributes.
    pub fn cookie_header(&self) -> Option<String> {
        let stored = fs::read_to_string(&self.path).ok()?;
        stored
            .split(';')
            .next()
            .map(|pair| pair.trim().to_string())
            .filter(|pair| !pair.is_empty())
    }

    pub fn clear(&self) -> Result<(), Error> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}
