//! World-scoped durable key-value storage

use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::persistence::{atomic_write, PersistenceError, PersistenceErrorContext, PersistenceResult};
use crate::world::WorldId;

/// File extension for stored blobs
const BLOB_EXTENSION: &str = "dat";

/// Durable storage keyed by world and key
pub trait DurableStore: Send + Sync {
    /// Stored blob, or `None` if nothing was ever saved under the key
    fn load(&self, world: &WorldId, key: &str) -> PersistenceResult<Option<Vec<u8>>>;

    /// Replace the blob under the key as a whole
    fn save(&self, world: &WorldId, key: &str, data: &[u8]) -> PersistenceResult<()>;

    /// Move an unreadable blob out of the way so the next save cannot
    /// overwrite it. Returns where it went, or `None` if there was no blob.
    fn set_aside(&self, world: &WorldId, key: &str) -> PersistenceResult<Option<String>>;
}

/// Suffix given to blobs that could not be read
const SET_ASIDE_SUFFIX: &str = "corrupt";

/// One file per world and key: `<root>/<namespace>/<path>/<key>.dat`
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Open a store rooted at `root`, creating the directory if needed
    pub fn new<P: AsRef<Path>>(root: P) -> PersistenceResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)
            .persistence_context(&format!("Failed to create {}", root.display()))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Location of the blob for a world and key
    pub fn path_for(&self, world: &WorldId, key: &str) -> PathBuf {
        let mut path = self.root.join(world.namespace());
        for segment in world.path().split('/') {
            path.push(segment);
        }
        path.join(format!("{}.{}", key, BLOB_EXTENSION))
    }
}

impl DurableStore for FileStore {
    fn load(&self, world: &WorldId, key: &str) -> PersistenceResult<Option<Vec<u8>>> {
        let path = self.path_for(world, key);
        match fs::read(&path) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(PersistenceError::IoError(std::io::Error::new(
                e.kind(),
                format!("Load failed for {}: {}", path.display(), e),
            ))),
        }
    }

    fn save(&self, world: &WorldId, key: &str, data: &[u8]) -> PersistenceResult<()> {
        let path = self.path_for(world, key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .persistence_context(&format!("Failed to create {}", parent.display()))?;
        }
        atomic_write(&path, data)
    }

    fn set_aside(&self, world: &WorldId, key: &str) -> PersistenceResult<Option<String>> {
        let path = self.path_for(world, key);
        let mut aside = path.clone().into_os_string();
        aside.push(".");
        aside.push(SET_ASIDE_SUFFIX);
        let aside = PathBuf::from(aside);

        match fs::rename(&path, &aside) {
            Ok(()) => Ok(Some(aside.display().to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(PersistenceError::IoError(std::io::Error::new(
                e.kind(),
                format!("Failed to move {} aside: {}", path.display(), e),
            ))),
        }
    }
}

/// In-process store, for hosts without a disk and for tests
#[derive(Debug, Default)]
pub struct MemoryStore {
    blobs: RwLock<FxHashMap<(WorldId, String), Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, world: &WorldId, key: &str) -> bool {
        self.blobs.read().contains_key(&(world.clone(), key.to_string()))
    }

    /// Put raw bytes under a key, bypassing the serializer
    pub fn insert_raw(&self, world: &WorldId, key: &str, data: Vec<u8>) {
        self.blobs.write().insert((world.clone(), key.to_string()), data);
    }

    pub fn len(&self) -> usize {
        self.blobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.read().is_empty()
    }
}

impl DurableStore for MemoryStore {
    fn load(&self, world: &WorldId, key: &str) -> PersistenceResult<Option<Vec<u8>>> {
        Ok(self.blobs.read().get(&(world.clone(), key.to_string())).cloned())
    }

    fn save(&self, world: &WorldId, key: &str, data: &[u8]) -> PersistenceResult<()> {
        self.blobs.write().insert((world.clone(), key.to_string()), data.to_vec());
        Ok(())
    }

    fn set_aside(&self, world: &WorldId, key: &str) -> PersistenceResult<Option<String>> {
        let mut blobs = self.blobs.write();
        let Some(data) = blobs.remove(&(world.clone(), key.to_string())) else {
            return Ok(None);
        };
        let aside = format!("{}.{}", key, SET_ASIDE_SUFFIX);
        blobs.insert((world.clone(), aside.clone()), data);
        Ok(Some(aside))
    }
}
