use std::{
    collections::HashMap,
    ffi::OsStr,
    fs::{self, File},
    io::{self, BufReader, Write},
    path::{Path, PathBuf},
};

use parking_lot::Mutex;
use rand::{seq::IndexedRandom, Rng, RngCore};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::{
    auth::User,
    error::Error,
    item::{GameItem, Genre, ItemKind},
    util::mkdir_if_not_exists,
};

/// Upper bound (inclusive) of the random keys stored with every document.
pub const RANDOM_KEY_MAX: u16 = 9999;

const USERS_COLLECTION: &str = "users";

/// How a random document is drawn from a collection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Sampling {
    /// Range query on one of three stored random keys.  Documents sitting
    /// behind a large gap between keys are drawn more often.
    #[default]
    RandomKey,
    /// Uniform draw over the whole filtered population.
    Uniform,
}

/// A catalog item as stored, with the keys used for random range queries.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub item: GameItem,
    pub random_keys: [u16; 3],
}

impl Document {
    pub fn new(item: GameItem, rng: &mut impl Rng) -> Self {
        let random_keys = [
            rng.random_range(0..=RANDOM_KEY_MAX),
            rng.random_range(0..=RANDOM_KEY_MAX),
            rng.random_range(0..=RANDOM_KEY_MAX),
        ];
        Self { item, random_keys }
    }

    pub fn id(&self) -> &str {
        self.item.id()
    }
}

/// Document store holding one collection per item kind plus the users.
pub trait Catalog: Send + Sync {
    /// Draws one item of `kind` tagged with `genre`.
    fn random_item(
        &self,
        kind: ItemKind,
        genre: Genre,
        sampling: Sampling,
        rng: &mut dyn RngCore,
    ) -> Result<GameItem, Error>;

    fn item(&self, kind: ItemKind, id: &str) -> Result<Option<GameItem>, Error>;

    fn count(&self, kind: ItemKind, genre: Genre) -> Result<usize, Error>;

    /// Inserts or replaces a document by id.
    fn put_item(&self, document: Document) -> Result<(), Error>;

    fn user(&self, uid: &str) -> Result<Option<User>, Error>;

    fn put_user(&self, user: &User) -> Result<(), Error>;

    /// Removes the user record.  Deleting an unknown user is not an error.
    fn delete_user(&self, uid: &str) -> Result<(), Error>;
}

/// Picks the document with the smallest key at or above `pivot`, falling back
/// to the largest key at or below it.  Ties are broken by id.
pub fn pick_by_random_key<'a>(
    documents: &[&'a Document],
    key: usize,
    pivot: u16,
) -> Option<&'a Document> {
    documents
        .iter()
        .copied()
        .filter(|doc| doc.random_keys[key] >= pivot)
        .min_by(|a, b| (a.random_keys[key], a.id()).cmp(&(b.random_keys[key], b.id())))
        .or_else(|| {
            documents
                .iter()
                .copied()
                .filter(|doc| doc.random_keys[key] <= pivot)
                .max_by(|a, b| (a.random_keys[key], a.id()).cmp(&(b.random_keys[key], b.id())))
        })
}

/// Draws one document from an already filtered population.
pub fn sample<'a>(
    documents: &[&'a Document],
    sampling: Sampling,
    rng: &mut dyn RngCore,
) -> Option<&'a Document> {
    match sampling {
        Sampling::RandomKey => {
            let key = rng.random_range(0..3);
            let pivot = rng.random_range(0..=RANDOM_KEY_MAX);
            pick_by_random_key(documents, key, pivot)
        }
        Sampling::Uniform => documents.choose(rng).copied(),
    }
}

/// Catalog kept on disk as one directory per collection and one JSON file per
/// document.  Item collections are read lazily and kept in memory.
pub struct FileCatalog {
    base: PathBuf,
    collections: Mutex<HashMap<ItemKind, Vec<Document>>>,
}

impl FileCatalog {
    pub fn open(base: PathBuf) -> Result<Self, Error> {
        // Create the catalog structure.
        mkdir_if_not_exists(&base)?;
        for kind in ItemKind::ALL {
            mkdir_if_not_exists(&base.join(kind.collection()))?;
        }
        mkdir_if_not_exists(&base.join(USERS_COLLECTION))?;

        log::info!("opened catalog at {:?}", base);
        Ok(Self {
            base,
            collections: Mutex::new(HashMap::new()),
        })
    }

    fn with_collection<T>(
        &self,
        kind: ItemKind,
        func: impl FnOnce(&mut Vec<Document>) -> T,
    ) -> Result<T, Error> {
        let mut collections = self.collections.lock();
        if !collections.contains_key(&kind) {
            let documents = self.load_collection(kind)?;
            log::debug!("loaded {} {}", documents.len(), kind);
            collections.insert(kind, documents);
        }
        let documents = collections.entry(kind).or_default();
        Ok(func(documents))
    }

    fn load_collection(&self, kind: ItemKind) -> Result<Vec<Document>, Error> {
        let dir = self.base.join(kind.collection());
        let mut documents = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension() != Some(OsStr::new("json")) {
                continue;
            }
            match read_json::<Document>(&path) {
                Ok(doc) if doc.item.kind() == kind => documents.push(doc),
                Ok(_) => log::warn!("skipping {:?}: stored in the wrong collection", path),
                Err(err) => log::warn!("skipping malformed document {:?}: {}", path, err),
            }
        }
        Ok(documents)
    }

    fn document_path(&self, collection: &str, id: &str) -> Result<PathBuf, Error> {
        let valid = !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if valid {
            Ok(self.base.join(collection).join(format!("{id}.json")))
        } else {
            Err(Error::InvalidInput(format!("invalid document id '{id}'")))
        }
    }
}

impl Catalog for FileCatalog {
    fn random_item(
        &self,
        kind: ItemKind,
        genre: Genre,
        sampling: Sampling,
        rng: &mut dyn RngCore,
    ) -> Result<GameItem, Error> {
        self.with_collection(kind, |documents| {
            let population: Vec<&Document> = documents
                .iter()
                .filter(|doc| genre.matches(doc.item.genres()))
                .collect();
            sample(&population, sampling, rng).map(|doc| doc.item.clone())
        })?
        .ok_or(Error::NoItems { kind, genre })
    }

    fn item(&self, kind: ItemKind, id: &str) -> Result<Option<GameItem>, Error> {
        self.with_collection(kind, |documents| {
            documents
                .iter()
                .find(|doc| doc.id() == id)
                .map(|doc| doc.item.clone())
        })
    }

    fn count(&self, kind: ItemKind, genre: Genre) -> Result<usize, Error> {
        self.with_collection(kind, |documents| {
            documents
                .iter()
                .filter(|doc| genre.matches(doc.item.genres()))
                .count()
        })
    }

    fn put_item(&self, document: Document) -> Result<(), Error> {
        let kind = document.item.kind();
        let path = self.document_path(kind.collection(), document.id())?;
        log::debug!("saving {} to catalog: {}", kind.type_name(), document.id());
        write_json(&path, &document)?;
        self.with_collection(kind, |documents| {
            match documents.iter_mut().find(|doc| doc.id() == document.id()) {
                Some(existing) => *existing = document,
                None => documents.push(document),
            }
        })
    }

    fn user(&self, uid: &str) -> Result<Option<User>, Error> {
        let path = self.document_path(USERS_COLLECTION, uid)?;
        match read_json(&path) {
            Ok(user) => Ok(Some(user)),
            Err(Error::IoError(err)) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn put_user(&self, user: &User) -> Result<(), Error> {
        let path = self.document_path(USERS_COLLECTION, &user.uid)?;
        log::debug!("saving user to catalog: {}", user.uid);
        write_json(&path, user)
    }

    fn delete_user(&self, uid: &str) -> Result<(), Error> {
        let path = self.document_path(USERS_COLLECTION, uid)?;
        match fs::remove_file(&path) {
            Ok(()) => {
                log::info!("deleted user from catalog: {}", uid);
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, Error> {
    let file = File::open(path)?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}

/// Writes through a temporary file so a crash never leaves half a document.
fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), Error> {
    let dir = path
        .parent()
        .ok_or_else(|| Error::InvalidState(format!("{path:?} has no parent")))?;
    let mut file = NamedTempFile::new_in(dir)?;
    serde_json::to_writer_pretty(&mut file, value)?;
    file.flush()?;
    file.persist(path).map_err(|err| err.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, SeedableRng};

    use super::*;
    use crate::{auth::Permission, item::tests::artist};

    fn doc(id: &str, keys: [u16; 3], genres: &[&str]) -> Document {
        Document {
            item: artist(id, 50, genres),
            random_keys: keys,
        }
    }

    #[test]
    fn random_key_picks_next_key_above_pivot() {
        let a = doc("a", [10, 0, 0], &[]);
        let b = doc("b", [500, 0, 0], &[]);
        let c = doc("c", [9000, 0, 0], &[]);
        let docs = vec![&a, &b, &c];
        assert_eq!(pick_by_random_key(&docs, 0, 11).unwrap().id(), "b");
        assert_eq!(pick_by_random_key(&docs, 0, 500).unwrap().id(), "b");
        assert_eq!(pick_by_random_key(&docs, 0, 0).unwrap().id(), "a");
    }

    #[test]
    fn random_key_falls_back_below_pivot() {
        let a = doc("a", [0, 10, 0], &[]);
        let b = doc("b", [0, 20, 0], &[]);
        let docs = vec![&a, &b];
        assert_eq!(pick_by_random_key(&docs, 1, 9999).unwrap().id(), "b");
    }

    #[test]
    fn random_key_breaks_ties_by_id() {
        let a = doc("a", [0, 0, 42], &[]);
        let b = doc("b", [0, 0, 42], &[]);
        let docs = vec![&b, &a];
        assert_eq!(pick_by_random_key(&docs, 2, 1).unwrap().id(), "a");
    }

    #[test]
    fn sample_of_empty_population_is_none() {
        let mut rng = StdRng::seed_from_u64(1);
        assert!(sample(&[], Sampling::RandomKey, &mut rng).is_none());
        assert!(sample(&[], Sampling::Uniform, &mut rng).is_none());
    }

    #[test]
    fn file_catalog_persists_and_filters_by_genre() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = FileCatalog::open(dir.path().to_path_buf()).unwrap();
        catalog.put_item(doc("pop1", [1, 2, 3], &["pop"])).unwrap();
        catalog.put_item(doc("rock1", [4, 5, 6], &["rock"])).unwrap();

        let reopened = FileCatalog::open(dir.path().to_path_buf()).unwrap();
        assert_eq!(reopened.count(ItemKind::Artist, Genre::All).unwrap(), 2);
        assert_eq!(reopened.count(ItemKind::Artist, Genre::Rock).unwrap(), 1);
        assert_eq!(reopened.count(ItemKind::Album, Genre::All).unwrap(), 0);

        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..20 {
            let item = reopened
                .random_item(ItemKind::Artist, Genre::Pop, Sampling::RandomKey, &mut rng)
                .unwrap();
            assert_eq!(item.id(), "pop1");
        }
    }

    #[test]
    fn put_item_replaces_existing_document() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = FileCatalog::open(dir.path().to_path_buf()).unwrap();
        catalog.put_item(doc("a", [1, 1, 1], &["pop"])).unwrap();
        catalog.put_item(doc("a", [2, 2, 2], &["rock"])).unwrap();
        assert_eq!(catalog.count(ItemKind::Artist, Genre::All).unwrap(), 1);
        assert_eq!(catalog.count(ItemKind::Artist, Genre::Rock).unwrap(), 1);
        assert!(catalog.item(ItemKind::Artist, "a").unwrap().is_some());
    }

    #[test]
    fn empty_population_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = FileCatalog::open(dir.path().to_path_buf()).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        let err = catalog
            .random_item(ItemKind::Track, Genre::Trot, Sampling::Uniform, &mut rng)
            .unwrap_err();
        assert!(matches!(err, Error::NoItems { .. }));
        assert!(err.is_retryable());
    }

    #[test]
    fn malformed_documents_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = FileCatalog::open(dir.path().to_path_buf()).unwrap();
        fs::write(dir.path().join("artists").join("bad.json"), b"{ nope").unwrap();
        catalog.put_item(doc("good", [1, 1, 1], &[])).unwrap();
        let reopened = FileCatalog::open(dir.path().to_path_buf()).unwrap();
        assert_eq!(reopened.count(ItemKind::Artist, Genre::All).unwrap(), 1);
    }

    #[test]
    fn users_round_trip_and_missing_user_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = FileCatalog::open(dir.path().to_path_buf()).unwrap();
        assert!(catalog.user("1234").unwrap().is_none());

        let user = User {
            uid: "1234".into(),
            email: "someone@example.com".into(),
            nickname: "Quiet Otter 12".into(),
            created_at: 1,
            permission: Permission::ReadOnly,
        };
        catalog.put_user(&user).unwrap();
        assert_eq!(catalog.user("1234").unwrap(), Some(user));
    }

    #[test]
    fn deleted_user_is_gone_and_repeat_delete_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = FileCatalog::open(dir.path().to_path_buf()).unwrap();
        let user = User {
            uid: "1234".into(),
            email: "someone@example.com".into(),
            nickname: "Quiet Otter 12".into(),
            created_at: 1,
            permission: Permission::ReadOnly,
        };
        catalog.put_user(&user).unwrap();

        catalog.delete_user("1234").unwrap();
        assert!(catalog.user("1234").unwrap().is_none());
        assert!(!dir.path().join(USERS_COLLECTION).join("1234.json").exists());
        catalog.delete_user("1234").unwrap();
        assert!(catalog.delete_user("../1234").is_err());
    }

    #[test]
    fn rejects_path_like_ids() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = FileCatalog::open(dir.path().to_path_buf()).unwrap();
        assert!(catalog.user("../escape").is_err());
    }
}
