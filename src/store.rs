//! Flat-file artifact store with lazy "original" snapshots.
//!
//! # Layout
//!
//! ```text
//! <root>/
//!   <uuid>.gif            current version (mutable: flip, swap)
//!   <uuid>_original.gif   snapshot taken before the first swap (never overwritten)
//!   temp_<random>.gif     staged upload, removed on drop
//! ```
//!
//! # Thread safety
//!
//! Writes go through a temp file in `root` and an atomic rename, so readers never see
//! a half-written GIF. Flip/swap hold a per-artifact lock ([`ArtifactStore::with_lock`])
//! for their whole read-modify-write; different artifacts never contend.
//!
//! # Used by
//!
//! - `pipeline.rs` - persists new artifacts, reads/writes current and original
//! - `server/api.rs` - static retrieval root, URL building

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use log::{debug, info};
use tempfile::NamedTempFile;
use uuid::Uuid;

use crate::error::{PipelineError, Result};

/// URL prefix under which artifacts are served
pub const PROCESSED_URL_PREFIX: &str = "/processed";

const GIF_EXT: &str = ".gif";
const ORIGINAL_SUFFIX: &str = "_original";

/// Opaque artifact identifier (UUID v4)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArtifactId(Uuid);

impl ArtifactId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse `<uuid>.gif`; anything else (snapshots, paths, other names) is rejected
    pub fn from_file_name(name: &str) -> Option<Self> {
        let stem = name.strip_suffix(GIF_EXT)?;
        // Uuid::parse_str accepts several forms; only the hyphenated one we write is valid
        let id = Uuid::try_parse(stem).ok()?;
        (id.hyphenated().to_string() == stem).then_some(Self(id))
    }

    /// `<uuid>.gif`
    pub fn file_name(&self) -> String {
        format!("{}{}", self.0.hyphenated(), GIF_EXT)
    }

    /// `<uuid>_original.gif`
    pub fn original_file_name(&self) -> String {
        format!("{}{}{}", self.0.hyphenated(), ORIGINAL_SUFFIX, GIF_EXT)
    }
}

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

/// Artifact directory plus per-artifact locks
pub struct ArtifactStore {
    root: PathBuf,
    locks: Mutex<HashMap<ArtifactId, Arc<Mutex<()>>>>,
}

impl ArtifactStore {
    /// Open (creating if needed) a store rooted at `root`
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        info!("Artifact store at {}", root.display());
        Ok(Self { root, locks: Mutex::new(HashMap::new()) })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn current_path(&self, id: ArtifactId) -> PathBuf {
        self.root.join(id.file_name())
    }

    pub fn original_path(&self, id: ArtifactId) -> PathBuf {
        self.root.join(id.original_file_name())
    }

    /// Public URL of the current version
    pub fn url_for(&self, id: ArtifactId) -> String {
        format!("{}/{}", PROCESSED_URL_PREFIX, id.file_name())
    }

    /// Map a client-supplied filename to an existing artifact
    pub fn resolve(&self, filename: &str) -> Result<ArtifactId> {
        let not_found = || PipelineError::ArtifactNotFound(filename.to_string());
        let id = ArtifactId::from_file_name(filename).ok_or_else(not_found)?;
        if !self.current_path(id).is_file() {
            return Err(not_found());
        }
        Ok(id)
    }

    /// Persist bytes under a freshly generated id
    pub fn create(&self, bytes: &[u8]) -> Result<ArtifactId> {
        let id = ArtifactId::generate();
        self.write_atomic(&self.current_path(id), bytes)?;
        debug!("Stored artifact {} ({} bytes)", id, bytes.len());
        Ok(id)
    }

    pub fn read_current(&self, id: ArtifactId) -> Result<Vec<u8>> {
        Ok(fs::read(self.current_path(id))?)
    }

    pub fn read_original(&self, id: ArtifactId) -> Result<Vec<u8>> {
        Ok(fs::read(self.original_path(id))?)
    }

    /// Overwrite the current version in place
    pub fn write_current(&self, id: ArtifactId, bytes: &[u8]) -> Result<()> {
        self.write_atomic(&self.current_path(id), bytes)
    }

    /// Snapshot current -> original unless a snapshot already exists
    ///
    /// Returns true if the snapshot was created by this call.
    pub fn ensure_original(&self, id: ArtifactId) -> Result<bool> {
        let original = self.original_path(id);
        if original.exists() {
            return Ok(false);
        }
        let mut tmp = NamedTempFile::new_in(&self.root)?;
        tmp.write_all(&self.read_current(id)?)?;
        tmp.as_file().sync_all()?;
        match tmp.persist_noclobber(&original) {
            Ok(_) => {
                debug!("Created original snapshot {}", original.display());
                Ok(true)
            }
            // Someone else created it first; theirs wins
            Err(_) if original.exists() => Ok(false),
            Err(e) => Err(e.error.into()),
        }
    }

    /// Replace current with the original snapshot
    pub fn restore_original(&self, id: ArtifactId) -> Result<()> {
        let bytes = self.read_original(id)?;
        self.write_current(id, &bytes)
    }

    /// Write an upload to `temp_<random>.gif`; the file is removed when the handle drops
    pub fn stage_upload(&self, bytes: &[u8]) -> Result<NamedTempFile> {
        let mut staged = tempfile::Builder::new()
            .prefix("temp_")
            .suffix(GIF_EXT)
            .tempfile_in(&self.root)?;
        staged.write_all(bytes)?;
        staged.flush()?;
        debug!("Staged upload {} ({} bytes)", staged.path().display(), bytes.len());
        Ok(staged)
    }

    /// Run `op` while holding the lock for `id`
    ///
    /// The map entry is dropped again once no other caller holds or waits on it.
    pub fn with_lock<T>(&self, id: ArtifactId, op: impl FnOnce() -> Result<T>) -> Result<T> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            Arc::clone(locks.entry(id).or_default())
        };
        let result = {
            let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());
            op()
        };

        // Clones are only taken under the map lock, so the count cannot grow here
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        if Arc::strong_count(&lock) == 2 {
            locks.remove(&id);
        }
        result
    }

    /// Number of artifacts with a live lock entry
    pub fn active_locks(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn write_atomic(&self, dest: &Path, bytes: &[u8]) -> Result<()> {
        let mut tmp = NamedTempFile::new_in(&self.root)?;
        tmp.write_all(bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(dest).map_err(|e| e.error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, ArtifactStore) {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::open(dir.path().join("processed")).unwrap();
        (dir, store)
    }

    /// Test: Only `<uuid>.gif` names parse
    #[test]
    fn test_artifact_id_parsing() {
        let id = ArtifactId::generate();
        assert_eq!(ArtifactId::from_file_name(&id.file_name()), Some(id));

        assert_eq!(ArtifactId::from_file_name(&id.original_file_name()), None);
        assert_eq!(ArtifactId::from_file_name(&id.to_string()), None);
        assert_eq!(ArtifactId::from_file_name("../etc/passwd.gif"), None);
        assert_eq!(ArtifactId::from_file_name(&format!("../{}", id.file_name())), None);
        assert_eq!(ArtifactId::from_file_name(&format!("{}.gif", id.0.simple())), None);
        assert_eq!(ArtifactId::from_file_name("temp_abc.gif"), None);
    }

    /// Test: Create, read back, resolve by filename
    #[test]
    fn test_create_and_resolve() {
        let (_dir, store) = store();
        let id = store.create(b"GIF89a-data").unwrap();

        assert_eq!(store.read_current(id).unwrap(), b"GIF89a-data");
        assert_eq!(store.resolve(&id.file_name()).unwrap(), id);
        assert_eq!(store.url_for(id), format!("/processed/{}.gif", id));
    }

    /// Test: Unknown or malformed names are not found
    /// Validates: 404 mapping for absent artifacts
    #[test]
    fn test_resolve_missing() {
        let (_dir, store) = store();
        let ghost = ArtifactId::generate();
        let err = store.resolve(&ghost.file_name()).unwrap_err();
        assert_eq!(err.status_code(), 404);

        let id = store.create(b"x").unwrap();
        store.ensure_original(id).unwrap();
        // Snapshot exists on disk but is not addressable
        assert_eq!(store.resolve(&id.original_file_name()).unwrap_err().status_code(), 404);
    }

    /// Test: Snapshot is created once and never overwritten
    #[test]
    fn test_original_snapshot_immutable() {
        let (_dir, store) = store();
        let id = store.create(b"v1").unwrap();

        assert!(store.ensure_original(id).unwrap());
        store.write_current(id, b"v2").unwrap();
        assert!(!store.ensure_original(id).unwrap());

        assert_eq!(store.read_original(id).unwrap(), b"v1");
        assert_eq!(store.read_current(id).unwrap(), b"v2");

        store.restore_original(id).unwrap();
        assert_eq!(store.read_current(id).unwrap(), b"v1");
        assert!(store.original_path(id).exists());
    }

    /// Test: Staged upload disappears on drop
    /// Validates: Scoped cleanup of temporary buffers
    #[test]
    fn test_stage_upload_cleanup() {
        let (_dir, store) = store();
        let path = {
            let staged = store.stage_upload(b"bytes").unwrap();
            let path = staged.path().to_path_buf();
            assert!(path.exists());
            let name = path.file_name().unwrap().to_string_lossy().into_owned();
            assert!(name.starts_with("temp_") && name.ends_with(".gif"));
            assert_eq!(fs::read(&path).unwrap(), b"bytes");
            path
        };
        assert!(!path.exists());
    }

    /// Test: Lock serializes same-artifact operations
    #[test]
    fn test_with_lock_serializes() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let (_dir, store) = store();
        let store = Arc::new(store);
        let id = store.create(b"x").unwrap();
        let inside = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let store = Arc::clone(&store);
                let inside = Arc::clone(&inside);
                std::thread::spawn(move || {
                    store
                        .with_lock(id, || {
                            assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0);
                            std::thread::sleep(std::time::Duration::from_millis(5));
                            inside.fetch_sub(1, Ordering::SeqCst);
                            Ok(())
                        })
                        .unwrap();
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(store.active_locks(), 0);
    }

    /// Test: Lock entries do not accumulate per artifact
    #[test]
    fn test_lock_entries_released() {
        let (_dir, store) = store();
        for _ in 0..5 {
            let id = store.create(b"x").unwrap();
            store.with_lock(id, || Ok(())).unwrap();
            let err = store.with_lock(id, || Err::<(), _>(PipelineError::Transform("boom".into())));
            assert!(err.is_err());
        }
        assert_eq!(store.active_locks(), 0);

        // Held while the operation runs
        let id = store.create(b"y").unwrap();
        store.with_lock(id, || {
            assert_eq!(store.active_locks(), 1);
            Ok(())
        }).unwrap();
        assert_eq!(store.active_locks(), 0);
    }
}
