use std::{collections::HashMap, thread, time::Duration};

use itertools::Itertools;
use rand::{rngs::StdRng, SeedableRng};
use time::OffsetDateTime;

use crate::{
    catalog::{Catalog, Document},
    error::Error,
    item::{Album, Artist, ArtistLink, GameItem, ItemKind, Track},
    item_id::ItemId,
    util::unix_millis,
    webapi::{ApiAlbum, ApiArtist, ApiTrack, CatalogSource, Image, SimpleArtist},
};

/// Largest number of ids sent in one batch lookup.
pub const BATCH_SIZE: usize = 20;

/// Pause before each batch lookup, and before each top-tracks lookup.
pub const BATCH_DELAY: Duration = Duration::from_secs(2);

const MAX_CREDITED_ARTISTS: usize = 3;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub uploaded: usize,
    pub failed_batches: usize,
    pub skipped_links: Vec<String>,
}

/// Parses catalog links, keeping the order of first appearance per kind.
/// Unparseable links end up in the second list.
pub fn group_links<'a>(
    links: impl IntoIterator<Item = &'a str>,
) -> (Vec<(ItemKind, Vec<String>)>, Vec<String>) {
    let mut skipped = Vec::new();
    let mut order = Vec::new();
    let mut groups: HashMap<ItemKind, Vec<String>> = HashMap::new();

    for link in links.into_iter().map(str::trim).filter(|l| !l.is_empty()) {
        match ItemId::parse(link) {
            Some(id) => {
                let ids = groups.entry(id.kind).or_insert_with(|| {
                    order.push(id.kind);
                    Vec::new()
                });
                let id = id.to_base62();
                if !ids.contains(&id) {
                    ids.push(id);
                }
            }
            None => {
                log::warn!("skipping unrecognized link: {}", link);
                skipped.push(link.to_string());
            }
        }
    }

    let grouped = order
        .into_iter()
        .filter_map(|kind| groups.remove(&kind).map(|ids| (kind, ids)))
        .collect();
    (grouped, skipped)
}

/// Pulls items from the music catalog and stores them as documents.
pub struct Ingestor<'a> {
    source: &'a dyn CatalogSource,
    catalog: &'a dyn Catalog,
    delay: Duration,
    rng: StdRng,
}

impl<'a> Ingestor<'a> {
    pub fn new(source: &'a dyn CatalogSource, catalog: &'a dyn Catalog) -> Self {
        Self {
            source,
            catalog,
            delay: BATCH_DELAY,
            rng: StdRng::from_os_rng(),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    pub fn run<'l>(&mut self, links: impl IntoIterator<Item = &'l str>) -> IngestReport {
        let (groups, skipped_links) = group_links(links);
        let mut report = IngestReport {
            skipped_links,
            ..IngestReport::default()
        };

        for (kind, ids) in groups {
            log::info!("ingesting {} {}", ids.len(), kind);
            for chunk in ids.chunks(BATCH_SIZE) {
                let result = match kind {
                    ItemKind::Album => self.ingest_albums(chunk, &mut report),
                    ItemKind::Artist => self.ingest_artists(chunk, &mut report),
                    ItemKind::Track => self.ingest_tracks(chunk, &mut report),
                };
                if let Err(err) = result {
                    log::error!("failed to ingest {} batch: {}", kind.type_name(), err);
                    report.failed_batches += 1;
                }
            }
        }

        log::info!(
            "ingest finished: {} uploaded, {} failed, {} skipped",
            report.uploaded,
            report.failed_batches,
            report.skipped_links.len()
        );
        report
    }

    fn ingest_albums(&mut self, ids: &[String], report: &mut IngestReport) -> Result<(), Error> {
        self.pause();
        let albums = self.source.albums(ids)?;
        let genres = self.first_artist_genres(albums.iter().map(|album| &album.artists))?;
        let now = unix_millis(OffsetDateTime::now_utc());

        for album in albums {
            let genres = first_artist(&album.artists)
                .and_then(|artist| genres.get(&artist.id))
                .cloned()
                .unwrap_or_default();
            let name = album.name.clone();
            self.store(album_item(album, genres, now))?;
            log::info!("uploaded album: {}", name);
            report.uploaded += 1;
        }
        Ok(())
    }

    fn ingest_artists(&mut self, ids: &[String], report: &mut IngestReport) -> Result<(), Error> {
        let artists = self.source.artists(ids)?;

        for artist in artists {
            self.pause();
            let preview_url = match self.source.artist_top_tracks(&artist.id) {
                Ok(tracks) => tracks.into_iter().next().and_then(|track| track.preview_url),
                Err(err) => {
                    log::error!("failed to fetch top tracks of {}: {}", artist.name, err);
                    report.failed_batches += 1;
                    continue;
                }
            };
            let now = unix_millis(OffsetDateTime::now_utc());
            let name = artist.name.clone();
            self.store(artist_item(artist, preview_url, now))?;
            log::info!("uploaded artist: {}", name);
            report.uploaded += 1;
        }
        Ok(())
    }

    fn ingest_tracks(&mut self, ids: &[String], report: &mut IngestReport) -> Result<(), Error> {
        self.pause();
        let tracks = self.source.tracks(ids)?;
        let genres = self.first_artist_genres(tracks.iter().map(|track| &track.artists))?;
        let now = unix_millis(OffsetDateTime::now_utc());

        for track in tracks {
            let genres = first_artist(&track.artists)
                .and_then(|artist| genres.get(&artist.id))
                .cloned()
                .unwrap_or_default();
            let name = track.name.clone();
            self.store(track_item(track, genres, now))?;
            log::info!("uploaded track: {}", name);
            report.uploaded += 1;
        }
        Ok(())
    }

    /// Album and track genres are mostly empty, so items inherit the genres of
    /// their first credited artist.  One batched lookup per chunk.
    fn first_artist_genres<'b>(
        &self,
        credits: impl Iterator<Item = &'b Vec<SimpleArtist>>,
    ) -> Result<HashMap<String, Vec<String>>, Error> {
        let ids: Vec<String> = credits
            .filter_map(|artists| first_artist(artists))
            .map(|artist| artist.id.clone())
            .unique()
            .collect();
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        Ok(self
            .source
            .artists(&ids)?
            .into_iter()
            .map(|artist| (artist.id, artist.genres))
            .collect())
    }

    fn store(&mut self, item: GameItem) -> Result<(), Error> {
        let document = Document::new(item, &mut self.rng);
        self.catalog.put_item(document)
    }

    fn pause(&self) {
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
    }
}

fn first_artist(artists: &[SimpleArtist]) -> Option<&SimpleArtist> {
    artists.first()
}

fn first_image(images: &[Image]) -> Option<String> {
    images.first().map(|image| image.url.clone())
}

fn credited(artists: &[SimpleArtist]) -> Vec<ArtistLink> {
    artists
        .iter()
        .take(MAX_CREDITED_ARTISTS)
        .map(|artist| ArtistLink {
            id: artist.id.clone(),
            name: artist.name.clone(),
        })
        .collect()
}

pub fn artist_item(artist: ApiArtist, preview_url: Option<String>, now: i64) -> GameItem {
    GameItem::Artist(Artist {
        image: first_image(&artist.images),
        link: artist.external_urls.spotify,
        id: artist.id,
        name: artist.name,
        preview_url,
        popularity: artist.popularity,
        genres: artist.genres,
        followers: artist.followers.total,
        updated_at: now,
    })
}

/// The album preview is its second track, the first one is often an intro.
pub fn album_item(album: ApiAlbum, genres: Vec<String>, now: i64) -> GameItem {
    GameItem::Album(Album {
        image: first_image(&album.images),
        preview_url: album
            .tracks
            .items
            .get(1)
            .and_then(|track| track.preview_url.clone()),
        artists: credited(&album.artists),
        link: album.external_urls.spotify,
        id: album.id,
        name: album.name,
        popularity: album.popularity,
        genres,
        album_type: album.album_type,
        release_date: album.release_date,
        updated_at: now,
    })
}

pub fn track_item(track: ApiTrack, genres: Vec<String>, now: i64) -> GameItem {
    GameItem::Track(Track {
        image: first_image(&track.album.images),
        artists: credited(&track.artists),
        link: track.external_urls.spotify,
        id: track.id,
        name: track.name,
        preview_url: track.preview_url,
        popularity: track.popularity,
        genres,
        album_name: track.album.name,
        release_date: track.album.release_date,
        explicit: track.explicit,
        updated_at: now,
    })
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use serde_json::json;

    use super::*;
    use crate::{
        catalog::{FileCatalog, RANDOM_KEY_MAX},
        item::Genre,
    };

    const ALBUM_ID: &str = "1DFixLWuPkv3KT3TnV35m3";
    const ARTIST_ID: &str = "0TnOYISbd1XYRBk9myaseg";
    const TRACK_ID: &str = "11dFghVXANMlKmJXsNCbNl";

    fn api_artist(id: &str, genres: &[&str]) -> ApiArtist {
        serde_json::from_value(json!({
            "id": id,
            "name": format!("Artist {id}"),
            "genres": genres,
            "popularity": 70,
            "followers": { "total": 1000 },
            "images": [{ "url": "https://i/artist" }],
            "external_urls": { "spotify": format!("https://open.spotify.com/artist/{id}") }
        }))
        .unwrap()
    }

    fn api_track(id: &str, preview: Option<&str>) -> ApiTrack {
        serde_json::from_value(json!({
            "id": id,
            "name": format!("Track {id}"),
            "explicit": true,
            "popularity": 44,
            "preview_url": preview,
            "artists": [
                { "id": "lead", "name": "Lead" },
                { "id": "f1", "name": "F1" },
                { "id": "f2", "name": "F2" },
                { "id": "f3", "name": "F3" }
            ],
            "album": { "name": "Record", "images": [{ "url": "https://i/album" }], "release_date": "2021" }
        }))
        .unwrap()
    }

    fn api_album(id: &str) -> ApiAlbum {
        serde_json::from_value(json!({
            "id": id,
            "name": "Record",
            "album_type": "album",
            "artists": [{ "id": "lead", "name": "Lead" }],
            "images": [],
            "release_date": "2021-03-04",
            "popularity": 58,
            "tracks": { "items": [{ "preview_url": "https://p/1" }, { "preview_url": "https://p/2" }] }
        }))
        .unwrap()
    }

    #[derive(Default)]
    struct FakeSource {
        artist_calls: RefCell<Vec<Vec<String>>>,
        fail_tracks: bool,
        top_track_preview: Option<&'static str>,
    }

    impl CatalogSource for FakeSource {
        fn artists(&self, ids: &[String]) -> Result<Vec<ApiArtist>, Error> {
            self.artist_calls.borrow_mut().push(ids.to_vec());
            Ok(ids.iter().map(|id| api_artist(id, &["k-pop", "pop"])).collect())
        }

        fn albums(&self, ids: &[String]) -> Result<Vec<ApiAlbum>, Error> {
            Ok(ids.iter().map(|id| api_album(id)).collect())
        }

        fn tracks(&self, ids: &[String]) -> Result<Vec<ApiTrack>, Error> {
            if self.fail_tracks {
                return Err(Error::WebApiError("failed to fetch tracks: 500".into()));
            }
            Ok(ids.iter().map(|id| api_track(id, Some("https://p/t"))).collect())
        }

        fn artist_top_tracks(&self, _id: &str) -> Result<Vec<ApiTrack>, Error> {
            Ok(vec![
                api_track("top1", self.top_track_preview),
                api_track("top2", Some("https://p/top2")),
            ])
        }
    }

    #[test]
    fn groups_links_by_kind_in_order() {
        let links = [
            format!("https://open.spotify.com/track/{TRACK_ID}"),
            format!("spotify:album:{ALBUM_ID}"),
            "https://example.com/nope".to_string(),
            format!("https://open.spotify.com/track/{TRACK_ID}?si=dup"),
            String::new(),
        ];
        let (groups, skipped) = group_links(links.iter().map(String::as_str));
        assert_eq!(
            groups,
            vec![
                (ItemKind::Track, vec![TRACK_ID.to_string()]),
                (ItemKind::Album, vec![ALBUM_ID.to_string()]),
            ]
        );
        assert_eq!(skipped, vec!["https://example.com/nope".to_string()]);
    }

    #[test]
    fn track_conversion_keeps_three_artists() {
        let item = track_item(api_track("t", None), vec!["rock".into()], 5);
        let GameItem::Track(track) = item else {
            panic!("expected a track")
        };
        assert_eq!(track.artists.len(), 3);
        assert_eq!(track.album_name, "Record");
        assert_eq!(track.image.as_deref(), Some("https://i/album"));
        assert_eq!(track.genres, vec!["rock".to_string()]);
        assert!(track.explicit);
        assert_eq!(track.updated_at, 5);
    }

    #[test]
    fn album_preview_is_second_track() {
        let GameItem::Album(album) = album_item(api_album("a"), vec![], 0) else {
            panic!("expected an album")
        };
        assert_eq!(album.preview_url.as_deref(), Some("https://p/2"));
        assert_eq!(album.image, None);
    }

    #[test]
    fn ingests_all_kinds_into_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = FileCatalog::open(dir.path().to_path_buf()).unwrap();
        let source = FakeSource::default();
        let links = [
            format!("https://open.spotify.com/album/{ALBUM_ID}"),
            format!("https://open.spotify.com/artist/{ARTIST_ID}"),
            format!("https://open.spotify.com/track/{TRACK_ID}"),
        ];

        let report = Ingestor::new(&source, &catalog)
            .with_delay(Duration::ZERO)
            .with_rng(StdRng::seed_from_u64(1))
            .run(links.iter().map(String::as_str));
        assert_eq!(report.uploaded, 3);
        assert_eq!(report.failed_batches, 0);

        let album = catalog.item(ItemKind::Album, ALBUM_ID).unwrap().unwrap();
        assert_eq!(album.genres(), ["k-pop".to_string(), "pop".to_string()]);
        assert_eq!(catalog.count(ItemKind::Album, Genre::KPop).unwrap(), 1);

        let artist = catalog.item(ItemKind::Artist, ARTIST_ID).unwrap().unwrap();
        // Only the first top track counts, even without a preview.
        assert_eq!(artist.preview_url(), None);

        assert!(catalog.item(ItemKind::Track, TRACK_ID).unwrap().is_some());
    }

    #[test]
    fn artist_preview_is_first_top_track() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = FileCatalog::open(dir.path().to_path_buf()).unwrap();
        let source = FakeSource {
            top_track_preview: Some("https://p/top1"),
            ..FakeSource::default()
        };
        let link = format!("spotify:artist:{ARTIST_ID}");
        let report = Ingestor::new(&source, &catalog)
            .with_delay(Duration::ZERO)
            .run([link.as_str()]);
        assert_eq!(report.uploaded, 1);

        let artist = catalog.item(ItemKind::Artist, ARTIST_ID).unwrap().unwrap();
        assert_eq!(artist.preview_url(), Some("https://p/top1"));
    }

    #[test]
    fn chunks_of_twenty_and_one_genre_lookup_per_chunk() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = FileCatalog::open(dir.path().to_path_buf()).unwrap();
        let source = FakeSource::default();
        let mut rng = StdRng::seed_from_u64(2);
        let links: Vec<String> = (0..45)
            .map(|_| ItemId::new(rand::Rng::random(&mut rng), ItemKind::Album).to_url())
            .collect();

        let report = Ingestor::new(&source, &catalog)
            .with_delay(Duration::ZERO)
            .run(links.iter().map(String::as_str));
        assert_eq!(report.uploaded, 45);
        // Every album credits the same lead artist.
        assert_eq!(*source.artist_calls.borrow(), vec![vec!["lead".to_string()]; 3]);
    }

    #[test]
    fn failed_batch_is_counted_and_others_continue() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = FileCatalog::open(dir.path().to_path_buf()).unwrap();
        let source = FakeSource {
            fail_tracks: true,
            ..FakeSource::default()
        };
        let links = [
            format!("https://open.spotify.com/track/{TRACK_ID}"),
            format!("https://open.spotify.com/album/{ALBUM_ID}"),
        ];
        let report = Ingestor::new(&source, &catalog)
            .with_delay(Duration::ZERO)
            .run(links.iter().map(String::as_str));
        assert_eq!(report.failed_batches, 1);
        assert_eq!(report.uploaded, 1);
    }

    #[test]
    fn stored_documents_get_random_keys_in_range() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = FileCatalog::open(dir.path().to_path_buf()).unwrap();
        let source = FakeSource::default();
        let link = format!("https://open.spotify.com/track/{TRACK_ID}");
        Ingestor::new(&source, &catalog)
            .with_delay(Duration::ZERO)
            .run([link.as_str()]);

        let raw = std::fs::read_to_string(
            dir.path().join("tracks").join(format!("{TRACK_ID}.json")),
        )
        .unwrap();
        let document: Document = serde_json::from_str(&raw).unwrap();
        assert!(document.random_keys.iter().all(|&key| key <= RANDOM_KEY_MAX));
    }
}
