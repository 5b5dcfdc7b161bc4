use std::time::{Duration, Instant};

use itertools::Itertools;
use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Deserialize};
use ureq::Agent;

use crate::{error::Error, util::default_ureq_agent};

pub const API_BASE: &str = "https://api.spotify.com/v1";
pub const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";

// Refresh the token a bit before it actually expires.
const EXPIRATION_TIME_THRESHOLD: Duration = Duration::from_secs(60);

#[derive(Clone, Debug, Deserialize)]
pub struct Image {
    pub url: String,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ExternalUrls {
    pub spotify: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Followers {
    pub total: u64,
}

#[derive(Clone, Debug, Deserialize)]
pub struct SimpleArtist {
    pub id: String,
    pub name: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ApiArtist {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub genres: Vec<String>,
    pub popularity: u32,
    pub followers: Followers,
    #[serde(default)]
    pub images: Vec<Image>,
    #[serde(default)]
    pub external_urls: ExternalUrls,
}

#[derive(Clone, Debug, Deserialize)]
pub struct SimpleTrack {
    pub preview_url: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ApiAlbum {
    pub id: String,
    pub name: String,
    pub album_type: String,
    pub artists: Vec<SimpleArtist>,
    #[serde(default)]
    pub images: Vec<Image>,
    pub release_date: Option<String>,
    pub popularity: u32,
    #[serde(default)]
    pub external_urls: ExternalUrls,
    pub tracks: Page<SimpleTrack>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct SimpleAlbum {
    pub name: String,
    #[serde(default)]
    pub images: Vec<Image>,
    pub release_date: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ApiTrack {
    pub id: String,
    pub name: String,
    pub explicit: bool,
    pub popularity: u32,
    pub preview_url: Option<String>,
    pub artists: Vec<SimpleArtist>,
    pub album: SimpleAlbum,
    #[serde(default)]
    pub external_urls: ExternalUrls,
}

/// Batch lookups against the music catalog.
pub trait CatalogSource {
    fn artists(&self, ids: &[String]) -> Result<Vec<ApiArtist>, Error>;
    fn albums(&self, ids: &[String]) -> Result<Vec<ApiAlbum>, Error>;
    fn tracks(&self, ids: &[String]) -> Result<Vec<ApiTrack>, Error>;
    fn artist_top_tracks(&self, id: &str) -> Result<Vec<ApiTrack>, Error>;
}

#[derive(Clone, Debug)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Clone)]
struct AccessToken {
    token: String,
    expires: Instant,
}

impl AccessToken {
    fn expired() -> Self {
        Self {
            token: String::new(),
            expires: Instant::now(),
        }
    }

    fn is_expired(&self) -> bool {
        self.expires.saturating_duration_since(Instant::now()) < EXPIRATION_TIME_THRESHOLD
    }
}

/// Client-credentials token, requested on first use and whenever it is
/// about to expire.
pub struct TokenProvider {
    credentials: ClientCredentials,
    token_url: String,
    token: Mutex<AccessToken>,
}

impl TokenProvider {
    pub fn new(credentials: ClientCredentials, token_url: String) -> Self {
        Self {
            credentials,
            token_url,
            token: Mutex::new(AccessToken::expired()),
        }
    }

    pub fn get(&self, agent: &Agent) -> Result<String, Error> {
        let mut token = self.token.lock();
        if token.is_expired() {
            log::info!("access token expired, requesting");
            *token = self.request(agent)?;
        }
        Ok(token.token.clone())
    }

    fn request(&self, agent: &Agent) -> Result<AccessToken, Error> {
        #[derive(Deserialize)]
        struct TokenResponse {
            access_token: String,
            expires_in: u64,
        }

        let mut response = agent.post(&self.token_url).send_form([
            ("grant_type", "client_credentials"),
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
        ])?;
        if !response.status().is_success() {
            return Err(Error::WebApiError(format!(
                "failed to get catalog token: {}",
                response.status()
            )));
        }
        let token: TokenResponse = response.body_mut().read_json()?;
        Ok(AccessToken {
            token: token.access_token,
            expires: Instant::now() + Duration::from_secs(token.expires_in),
        })
    }
}

/// Client of the music catalog web API.
pub struct WebApi {
    agent: Agent,
    api_base: String,
    token_provider: TokenProvider,
}

impl WebApi {
    pub fn new(
        credentials: ClientCredentials,
        api_base: &str,
        token_url: &str,
        proxy_url: Option<&str>,
    ) -> Self {
        Self {
            agent: default_ureq_agent(proxy_url),
            api_base: api_base.trim_end_matches('/').to_string(),
            token_provider: TokenProvider::new(credentials, token_url.to_string()),
        }
    }

    /// Send a GET request and return the deserialized JSON body.
    fn load<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T, Error> {
        let token = self.token_provider.get(&self.agent)?;
        let mut request = self
            .agent
            .get(format!("{}/{}", self.api_base, path))
            .header("Authorization", &format!("Bearer {token}"));
        for (key, value) in query {
            request = request.query(*key, *value);
        }
        let mut response = request.call()?;
        if !response.status().is_success() {
            return Err(Error::WebApiError(format!(
                "failed to fetch {path}: {}",
                response.status()
            )));
        }
        response
            .body_mut()
            .read_json()
            .map_err(|err| Error::WebApiError(err.to_string()))
    }

    fn load_several<T: DeserializeOwned>(
        &self,
        path: &str,
        field: &str,
        ids: &[String],
    ) -> Result<Vec<T>, Error> {
        let ids = ids.iter().join(",");
        let mut body: serde_json::Map<String, serde_json::Value> =
            self.load(path, &[("ids", ids.as_str())])?;
        let list = body
            .remove(field)
            .ok_or_else(|| Error::WebApiError(format!("missing '{field}' in response")))?;
        // Unknown ids come back as nulls.
        let list: Vec<Option<T>> = serde_json::from_value(list)?;
        Ok(list.into_iter().flatten().collect())
    }
}

impl CatalogSource for WebApi {
    fn artists(&self, ids: &[String]) -> Result<Vec<ApiArtist>, Error> {
        self.load_several("artists", "artists", ids)
    }

    fn albums(&self, ids: &[String]) -> Result<Vec<ApiAlbum>, Error> {
        self.load_several("albums", "albums", ids)
    }

    fn tracks(&self, ids: &[String]) -> Result<Vec<ApiTrack>, Error> {
        self.load_several("tracks", "tracks", ids)
    }

    fn artist_top_tracks(&self, id: &str) -> Result<Vec<ApiTrack>, Error> {
        #[derive(Deserialize)]
        struct TopTracks {
            tracks: Vec<ApiTrack>,
        }

        let top: TopTracks = self.load(&format!("artists/{id}/top-tracks"), &[])?;
        Ok(top.tracks)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn album_payload_deserializes() {
        let album: ApiAlbum = serde_json::from_value(json!({
            "id": "alb1",
            "name": "Record",
            "album_type": "album",
            "artists": [{ "id": "ar1", "name": "Band" }],
            "images": [{ "url": "https://i.scdn.co/image/1", "width": 640 }],
            "release_date": "2020-01-01",
            "popularity": 61,
            "external_urls": { "spotify": "https://open.spotify.com/album/alb1" },
            "tracks": { "items": [{ "preview_url": null }, { "preview_url": "https://p/2" }] }
        }))
        .unwrap();
        assert_eq!(album.popularity, 61);
        assert_eq!(album.tracks.items[1].preview_url.as_deref(), Some("https://p/2"));
    }

    #[test]
    fn artist_payload_without_optional_fields() {
        let artist: ApiArtist = serde_json::from_value(json!({
            "id": "ar1",
            "name": "Band",
            "popularity": 12,
            "followers": { "href": null, "total": 345 }
        }))
        .unwrap();
        assert_eq!(artist.followers.total, 345);
        assert!(artist.genres.is_empty());
        assert!(artist.external_urls.spotify.is_none());
    }

    #[test]
    fn fresh_token_placeholder_is_expired() {
        assert!(AccessToken::expired().is_expired());
        let token = AccessToken {
            token: "t".into(),
            expires: Instant::now() + Duration::from_secs(3600),
        };
        assert!(!token.is_expired());
    }
}
