use std::{fmt, str::FromStr};

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Category of a playable item.  Doubles as the game mode and names the
/// catalog collection the items are stored in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Artist,
    Album,
    Track,
}

impl ItemKind {
    pub const ALL: [ItemKind; 3] = [ItemKind::Artist, ItemKind::Album, ItemKind::Track];

    /// Collection name, also the mode name shown to the player.
    pub fn collection(self) -> &'static str {
        match self {
            Self::Artist => "artists",
            Self::Album => "albums",
            Self::Track => "tracks",
        }
    }

    /// Singular type name used by catalog links and URIs.
    pub fn type_name(self) -> &'static str {
        match self {
            Self::Artist => "artist",
            Self::Album => "album",
            Self::Track => "track",
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.collection())
    }
}

impl FromStr for ItemKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "artist" | "artists" => Ok(Self::Artist),
            "album" | "albums" => Ok(Self::Album),
            "track" | "tracks" => Ok(Self::Track),
            other => Err(Error::InvalidInput(format!("unknown mode '{other}'"))),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Genre {
    #[default]
    All,
    Pop,
    KPop,
    KPopGirlGroup,
    KPopBoyGroup,
    ClassicKPop,
    HipHop,
    KRap,
    Rock,
    ClassicRock,
    KIndie,
    Trot,
}

impl Genre {
    pub const ALL: [Genre; 12] = [
        Genre::All,
        Genre::Pop,
        Genre::KPop,
        Genre::KPopGirlGroup,
        Genre::KPopBoyGroup,
        Genre::ClassicKPop,
        Genre::HipHop,
        Genre::KRap,
        Genre::Rock,
        Genre::ClassicRock,
        Genre::KIndie,
        Genre::Trot,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Pop => "pop",
            Self::KPop => "k-pop",
            Self::KPopGirlGroup => "k-pop girl group",
            Self::KPopBoyGroup => "k-pop boy group",
            Self::ClassicKPop => "classic k-pop",
            Self::HipHop => "hip-hop",
            Self::KRap => "k-rap",
            Self::Rock => "rock",
            Self::ClassicRock => "classic rock",
            Self::KIndie => "k-indie",
            Self::Trot => "trot",
        }
    }

    /// `All` matches everything, other genres need an exact tag.
    pub fn matches(self, genres: &[String]) -> bool {
        match self {
            Self::All => true,
            genre => genres.iter().any(|g| g == genre.as_str()),
        }
    }
}

impl fmt::Display for Genre {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Genre {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|genre| genre.as_str() == wanted)
            .ok_or_else(|| Error::InvalidInput(format!("unknown genre '{wanted}'")))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtistLink {
    pub id: String,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Artist {
    pub id: String,
    pub name: String,
    pub image: Option<String>,
    pub preview_url: Option<String>,
    pub popularity: u32,
    #[serde(default)]
    pub genres: Vec<String>,
    pub link: Option<String>,
    pub followers: u64,
    pub updated_at: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Album {
    pub id: String,
    pub name: String,
    pub image: Option<String>,
    pub preview_url: Option<String>,
    pub popularity: u32,
    #[serde(default)]
    pub genres: Vec<String>,
    pub link: Option<String>,
    pub album_type: String,
    /// Up to the first three credited artists.
    pub artists: Vec<ArtistLink>,
    pub release_date: Option<String>,
    pub updated_at: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: String,
    pub name: String,
    pub image: Option<String>,
    pub preview_url: Option<String>,
    pub popularity: u32,
    #[serde(default)]
    pub genres: Vec<String>,
    pub link: Option<String>,
    pub artists: Vec<ArtistLink>,
    pub album_name: String,
    pub release_date: Option<String>,
    pub explicit: bool,
    pub updated_at: i64,
}

/// One playable entity of a matchup.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum GameItem {
    Artist(Artist),
    Album(Album),
    Track(Track),
}

impl GameItem {
    pub fn kind(&self) -> ItemKind {
        match self {
            Self::Artist(_) => ItemKind::Artist,
            Self::Album(_) => ItemKind::Album,
            Self::Track(_) => ItemKind::Track,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Artist(artist) => &artist.id,
            Self::Album(album) => &album.id,
            Self::Track(track) => &track.id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Artist(artist) => &artist.name,
            Self::Album(album) => &album.name,
            Self::Track(track) => &track.name,
        }
    }

    pub fn popularity(&self) -> u32 {
        match self {
            Self::Artist(artist) => artist.popularity,
            Self::Album(album) => album.popularity,
            Self::Track(track) => track.popularity,
        }
    }

    pub fn preview_url(&self) -> Option<&str> {
        let url = match self {
            Self::Artist(artist) => artist.preview_url.as_deref(),
            Self::Album(album) => album.preview_url.as_deref(),
            Self::Track(track) => track.preview_url.as_deref(),
        };
        url.filter(|url| !url.is_empty())
    }

    pub fn genres(&self) -> &[String] {
        match self {
            Self::Artist(artist) => &artist.genres,
            Self::Album(album) => &album.genres,
            Self::Track(track) => &track.genres,
        }
    }

    pub fn link(&self) -> Option<&str> {
        match self {
            Self::Artist(artist) => artist.link.as_deref(),
            Self::Album(album) => album.link.as_deref(),
            Self::Track(track) => track.link.as_deref(),
        }
    }

    /// Secondary line shown under the item name.
    pub fn subtitle(&self) -> String {
        match self {
            Self::Artist(artist) => format!("{} followers", artist.followers),
            Self::Album(album) => join_artists(&album.artists),
            Self::Track(track) => {
                format!("{} · {}", join_artists(&track.artists), track.album_name)
            }
        }
    }
}

fn join_artists(artists: &[ArtistLink]) -> String {
    if artists.is_empty() {
        "Unknown".to_string()
    } else {
        artists.iter().map(|artist| &artist.name).join(", ")
    }
}
