use std::fmt;

use url::Url;

use crate::item::ItemKind;

const BASE62_DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";
const BASE62_LEN: usize = 22;

const WEB_HOST: &str = "open.spotify.com";

/// Catalog identifier of an artist, album or track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ItemId {
    pub id: u128,
    pub kind: ItemKind,
}

impl ItemId {
    pub const fn new(id: u128, kind: ItemKind) -> Self {
        Self { id, kind }
    }

    pub fn from_base62(id: &str, kind: ItemKind) -> Option<Self> {
        if id.len() != BASE62_LEN {
            return None;
        }
        let mut n = 0_u128;
        for c in id.as_bytes() {
            let d = BASE62_DIGITS.iter().position(|e| e == c)? as u128;
            n = n.checked_mul(62)?.checked_add(d)?;
        }
        Some(Self::new(n, kind))
    }

    /// Parses `spotify:<type>:<id>`.
    pub fn from_uri(uri: &str) -> Option<Self> {
        let mut parts = uri.trim().split(':');
        if parts.next()? != "spotify" {
            return None;
        }
        let kind = parts.next()?.parse().ok()?;
        let id = parts.next()?;
        if parts.next().is_some() {
            return None;
        }
        Self::from_base62(id, kind)
    }

    /// Parses web links such as `https://open.spotify.com/intl-de/album/<id>?si=...`.
    pub fn from_url(url: &str) -> Option<Self> {
        let url = Url::parse(url.trim()).ok()?;
        if url.host_str()? != WEB_HOST {
            return None;
        }
        let mut segments = url.path_segments()?.filter(|s| !s.is_empty());
        let mut kind = segments.next()?;
        if kind.starts_with("intl-") {
            kind = segments.next()?;
        }
        let kind = kind.parse().ok()?;
        Self::from_base62(segments.next()?, kind)
    }

    /// Accepts either a web link or a URI.
    pub fn parse(link: &str) -> Option<Self> {
        Self::from_url(link).or_else(|| Self::from_uri(link))
    }

    pub fn to_base62(&self) -> String {
        encode_base62(self.id)
    }

    pub fn to_uri(&self) -> String {
        format!("spotify:{}:{}", self.kind.type_name(), self.to_base62())
    }

    pub fn to_url(&self) -> String {
        format!(
            "https://{}/{}/{}",
            WEB_HOST,
            self.kind.type_name(),
            self.to_base62()
        )
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_uri())
    }
}

/// Fixed-width base62 rendering of a 128-bit value.
pub fn encode_base62(mut n: u128) -> String {
    let mut data = [0_u8; BASE62_LEN];
    for i in 0..BASE62_LEN {
        data[BASE62_LEN - 1 - i] = BASE62_DIGITS[(n % 62) as usize];
        n /= 62;
    }
    data.iter().map(|&b| b as char).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const ID: &str = "4Z8W4fKeB5YxbusRsdQVPb";

    #[test]
    fn base62_round_trip() {
        let id = ItemId::from_base62(ID, ItemKind::Artist).unwrap();
        assert_eq!(id.to_base62(), ID);
    }

    #[test]
    fn rejects_wrong_length_and_digits() {
        assert!(ItemId::from_base62("abc", ItemKind::Track).is_none());
        assert!(ItemId::from_base62("4Z8W4fKeB5YxbusRsdQVP!", ItemKind::Track).is_none());
    }

    #[test]
    fn parses_web_links() {
        let id = ItemId::parse(&format!("https://open.spotify.com/album/{ID}?si=abc")).unwrap();
        assert_eq!(id.kind, ItemKind::Album);
        assert_eq!(id.to_base62(), ID);

        let id = ItemId::parse(&format!("https://open.spotify.com/intl-ko/track/{ID}")).unwrap();
        assert_eq!(id.kind, ItemKind::Track);
    }

    #[test]
    fn parses_uris() {
        let id = ItemId::parse(&format!("spotify:artist:{ID}")).unwrap();
        assert_eq!(id.kind, ItemKind::Artist);
        assert_eq!(id.to_uri(), format!("spotify:artist:{ID}"));
    }

    #[test]
    fn rejects_foreign_links() {
        assert!(ItemId::parse(&format!("https://example.com/album/{ID}")).is_none());
        assert!(ItemId::parse(&format!("https://open.spotify.com/playlist/{ID}")).is_none());
        assert!(ItemId::parse("not a link").is_none());
    }

    #[test]
    fn encodes_zero_with_padding() {
        assert_eq!(encode_base62(0), "0".repeat(22));
    }
}
