//! Durable state storage.
//!
//! The state document lives in an object store addressed by a
//! [`StateLocator`] (bucket + key). Every save replaces the whole document
//! and carries the [`ObjectVersion`] observed at load time, so two runs
//! racing on the same locator cannot silently overwrite each other.
//!
//! # Filesystem layout
//!
//! ```text
//! {root}/
//! └── <bucket>/
//!     ├── <key>           # state document (pretty JSON)
//!     ├── <key>.tmp       # in-flight write, renamed over <key>
//!     └── <key>.lock      # flock held while a write checks and swaps the object
//! ```

use crate::error::{StateError, StoreError};
use crate::types::ReconciliationState;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Bucket + key naming one durable state document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StateLocator {
    pub bucket: String,
    pub key: String,
}

impl StateLocator {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }
}

impl fmt::Display for StateLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.bucket, self.key)
    }
}

/// Opaque version token of a stored object (BLAKE3 digest of its bytes).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectVersion(String);

impl ObjectVersion {
    /// Compute the version of some object content.
    pub fn of(bytes: &[u8]) -> Self {
        Self(blake3::hash(bytes).to_hex().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form is enough to tell versions apart in messages
        f.write_str(&self.0[..self.0.len().min(12)])
    }
}

/// A durable object store.
///
/// Implementations must make `put` a whole-object replacement that checks
/// `expected` against the current version atomically with the write.
pub trait ObjectStore: Send + Sync {
    /// Fetch an object and its version, or `None` if it does not exist.
    fn get(&self, locator: &StateLocator) -> Result<Option<(Vec<u8>, ObjectVersion)>, StoreError>;

    /// Replace an object if its current version equals `expected`.
    ///
    /// `expected = None` means the object must not exist yet.
    fn put(
        &self,
        locator: &StateLocator,
        bytes: &[u8],
        expected: Option<&ObjectVersion>,
    ) -> Result<ObjectVersion, StoreError>;
}

impl<T: ObjectStore + ?Sized> ObjectStore for Arc<T> {
    fn get(&self, locator: &StateLocator) -> Result<Option<(Vec<u8>, ObjectVersion)>, StoreError> {
        (**self).get(locator)
    }

    fn put(
        &self,
        locator: &StateLocator,
        bytes: &[u8],
        expected: Option<&ObjectVersion>,
    ) -> Result<ObjectVersion, StoreError> {
        (**self).put(locator, bytes, expected)
    }
}

// ============================================================================
// Filesystem Backend
// ============================================================================

/// Object store backed by a local directory tree.
#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    /// Create a store rooted at `root` (created lazily on first write).
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Get the root directory of this store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get the file path of an object.
    pub fn object_path(&self, locator: &StateLocator) -> Result<PathBuf, StoreError> {
        check_segment(&locator.bucket)?;
        let key = Path::new(&locator.key);
        if locator.key.is_empty()
            || key
                .components()
                .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(StoreError::InvalidLocator(format!(
                "key must be a relative path without '..': {}",
                locator.key
            )));
        }
        Ok(self.root.join(&locator.bucket).join(key))
    }

    fn read_current(path: &Path) -> Result<Option<(Vec<u8>, ObjectVersion)>, StoreError> {
        match fs::read(path) {
            Ok(bytes) => {
                let version = ObjectVersion::of(&bytes);
                Ok(Some((bytes, version)))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::Io(e)),
        }
    }
}

fn check_segment(bucket: &str) -> Result<(), StoreError> {
    if bucket.is_empty() || bucket == "." || bucket == ".." || bucket.contains(['/', '\\']) {
        return Err(StoreError::InvalidLocator(format!(
            "bucket must be a single path segment: {bucket:?}"
        )));
    }
    Ok(())
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(suffix);
    path.with_file_name(name)
}

/// Who holds a lock file, written for diagnostics only
#[derive(Debug, Serialize, Deserialize)]
struct LockHolder {
    pid: u32,
    acquired_at: chrono::DateTime<chrono::Utc>,
}

/// Advisory exclusive lock on a sibling `.lock` file.
///
/// The OS releases the lock when the handle closes, including when the
/// holding process dies, so a leftover file never blocks later writers.
/// The file itself is left in place.
struct LockFile {
    _file: File,
}

impl LockFile {
    fn acquire(path: PathBuf) -> Result<Self, StoreError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        if let Err(e) = try_lock_exclusive(&file) {
            if e.kind() == io::ErrorKind::WouldBlock {
                if let Some(holder) = read_holder(&path) {
                    log::warn!(
                        "{} held by PID {} since {}",
                        path.display(),
                        holder.pid,
                        holder.acquired_at
                    );
                }
                return Err(StoreError::Locked { path });
            }
            return Err(StoreError::Io(e));
        }

        write_holder(&file);
        Ok(Self { _file: file })
    }
}

fn write_holder(file: &File) {
    let holder = LockHolder {
        pid: std::process::id(),
        acquired_at: chrono::Utc::now(),
    };
    let written = file
        .set_len(0)
        .and_then(|()| serde_json::to_writer(file, &holder).map_err(io::Error::other));
    if let Err(e) = written {
        log::debug!("Could not record lock holder: {e}");
    }
}

fn read_holder(path: &Path) -> Option<LockHolder> {
    let bytes = fs::read(path).ok()?;
    serde_json::from_slice(&bytes).ok()
}

#[cfg(unix)]
fn try_lock_exclusive(file: &File) -> io::Result<()> {
    use rustix::fs::{FlockOperation, flock};
    use std::os::unix::io::AsFd;

    flock(file.as_fd(), FlockOperation::NonBlockingLockExclusive)
        .map_err(|e| io::Error::from_raw_os_error(e.raw_os_error()))
}

#[cfg(not(unix))]
fn try_lock_exclusive(file: &File) -> io::Result<()> {
    match file.try_lock() {
        Ok(()) => Ok(()),
        Err(fs::TryLockError::WouldBlock) => Err(io::ErrorKind::WouldBlock.into()),
        Err(fs::TryLockError::Error(e)) => Err(e),
    }
}

impl ObjectStore for FsObjectStore {
    fn get(&self, locator: &StateLocator) -> Result<Option<(Vec<u8>, ObjectVersion)>, StoreError> {
        let path = self.object_path(locator)?;
        Self::read_current(&path)
    }

    fn put(
        &self,
        locator: &StateLocator,
        bytes: &[u8],
        expected: Option<&ObjectVersion>,
    ) -> Result<ObjectVersion, StoreError> {
        let path = self.object_path(locator)?;
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }

        let _lock = LockFile::acquire(sibling(&path, ".lock"))?;

        let actual = Self::read_current(&path)?.map(|(_, version)| version);
        if actual.as_ref() != expected {
            return Err(StoreError::Conflict {
                expected: expected.cloned(),
                actual,
            });
        }

        // Write to temp, then rename: the old object survives a failed write
        let temp_path = sibling(&path, ".tmp");
        fs::write(&temp_path, bytes)?;
        fs::rename(&temp_path, &path)?;

        Ok(ObjectVersion::of(bytes))
    }
}

// ============================================================================
// In-Memory Backend
// ============================================================================

/// Object store held in process memory.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: Mutex<HashMap<StateLocator, Vec<u8>>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw bytes of an object, if present.
    pub fn object(&self, locator: &StateLocator) -> Option<Vec<u8>> {
        self.objects
            .lock()
            .ok()
            .and_then(|objects| objects.get(locator).cloned())
    }
}

impl ObjectStore for MemoryObjectStore {
    fn get(&self, locator: &StateLocator) -> Result<Option<(Vec<u8>, ObjectVersion)>, StoreError> {
        let objects = self
            .objects
            .lock()
            .map_err(|_| StoreError::Other("object store mutex poisoned".into()))?;
        Ok(objects.get(locator).map(|bytes| {
            let version = ObjectVersion::of(bytes);
            (bytes.clone(), version)
        }))
    }

    fn put(
        &self,
        locator: &StateLocator,
        bytes: &[u8],
        expected: Option<&ObjectVersion>,
    ) -> Result<ObjectVersion, StoreError> {
        let mut objects = self
            .objects
            .lock()
            .map_err(|_| StoreError::Other("object store mutex poisoned".into()))?;

        let actual = objects.get(locator).map(|bytes| ObjectVersion::of(bytes));
        if actual.as_ref() != expected {
            return Err(StoreError::Conflict {
                expected: expected.cloned(),
                actual,
            });
        }

        objects.insert(locator.clone(), bytes.to_vec());
        Ok(ObjectVersion::of(bytes))
    }
}

// ============================================================================
// State Store
// ============================================================================

/// A state snapshot together with the version it was read at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedState {
    pub state: ReconciliationState,
    /// `None` when no document existed yet
    pub version: Option<ObjectVersion>,
}

/// Loads and saves [`ReconciliationState`] documents.
///
/// Knows nothing about diffing; it only serializes, validates and checks
/// versions.
pub struct StateStore {
    backend: Box<dyn ObjectStore>,
}

impl StateStore {
    /// Create a state store on top of an object store backend.
    pub fn new(backend: impl ObjectStore + 'static) -> Self {
        Self {
            backend: Box::new(backend),
        }
    }

    /// Load a snapshot.
    ///
    /// Returns an empty state if the document doesn't exist yet.
    pub fn load(&self, locator: &StateLocator) -> Result<LoadedState, StateError> {
        let Some((bytes, version)) =
            self.backend
                .get(locator)
                .map_err(|source| StateError::Read {
                    locator: locator.clone(),
                    source,
                })?
        else {
            log::info!("No state found at {locator}, starting fresh");
            return Ok(LoadedState {
                state: ReconciliationState::new(),
                version: None,
            });
        };

        let state: ReconciliationState =
            serde_json::from_slice(&bytes).map_err(|source| StateError::Parse {
                locator: locator.clone(),
                source,
            })?;

        state.validate().map_err(|reason| StateError::Invalid {
            locator: locator.clone(),
            reason,
        })?;

        log::debug!(
            "Loaded {} tracked resources from {locator} (version {version})",
            state.len()
        );
        Ok(LoadedState {
            state,
            version: Some(version),
        })
    }

    /// Replace the whole snapshot.
    ///
    /// `expected` must be the version returned by [`StateStore::load`].
    pub fn save(
        &self,
        locator: &StateLocator,
        state: &ReconciliationState,
        expected: Option<&ObjectVersion>,
    ) -> Result<ObjectVersion, StateError> {
        let bytes = serde_json::to_vec_pretty(state).map_err(StateError::Serialize)?;

        match self.backend.put(locator, &bytes, expected) {
            Ok(version) => {
                log::debug!("Saved {} tracked resources to {locator}", state.len());
                Ok(version)
            }
            Err(StoreError::Conflict { .. }) => Err(StateError::Conflict {
                locator: locator.clone(),
            }),
            Err(source) => Err(StateError::Write {
                locator: locator.clone(),
                source,
            }),
        }
    }
}

impl fmt::Debug for StateStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateStore").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ResourceKind, ResourceRecord, ResourceSpec};
    use tempfile::TempDir;

    fn locator() -> StateLocator {
        StateLocator::new("iac-state", "state.json")
    }

    fn sample_state() -> ReconciliationState {
        let mut state = ReconciliationState::new();
        let bucket = ResourceSpec::new(ResourceKind::StorageBucket, "bucket-a", "us-east-1");
        let web = ResourceSpec::new(ResourceKind::ComputeInstance, "web", "eu-west-1")
            .with_attribute("ami", "ami-123")
            .with_attribute("instance_type", "t3.micro");
        state.insert(ResourceRecord::from_spec(&bucket, "bucket-a"));
        state.insert(ResourceRecord::from_spec(&web, "i-0abc"));
        state
    }

    #[test]
    fn test_load_missing_returns_empty() {
        let temp = TempDir::new().unwrap();
        let store = StateStore::new(FsObjectStore::new(temp.path()));

        let loaded = store.load(&locator()).unwrap();
        assert!(loaded.state.is_empty());
        assert!(loaded.version.is_none());
    }

    #[test]
    fn test_save_then_load_round_trip() {
        let temp = TempDir::new().unwrap();
        let store = StateStore::new(FsObjectStore::new(temp.path()));
        let state = sample_state();

        let version = store.save(&locator(), &state, None).unwrap();
        let loaded = store.load(&locator()).unwrap();

        assert_eq!(loaded.state, state);
        assert_eq!(loaded.version, Some(version));
    }

    #[test]
    fn test_load_then_save_preserves_bytes() {
        let temp = TempDir::new().unwrap();
        let store = StateStore::new(FsObjectStore::new(temp.path()));
        let first = store.save(&locator(), &sample_state(), None).unwrap();

        let loaded = store.load(&locator()).unwrap();
        let second = store
            .save(&locator(), &loaded.state, loaded.version.as_ref())
            .unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn test_document_shape() {
        let backend = Arc::new(MemoryObjectStore::new());
        let store = StateStore::new(Arc::clone(&backend));
        store.save(&locator(), &sample_state(), None).unwrap();

        let bytes = backend.object(&locator()).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        let record = &value["resources"]["bucket-a"];
        assert_eq!(record["type"], "aws_s3_bucket");
        assert_eq!(record["name"], "bucket-a");
        assert_eq!(record["provider_id"], "bucket-a");
    }

    #[test]
    fn test_corrupt_document_is_load_error() {
        let temp = TempDir::new().unwrap();
        let fs_store = FsObjectStore::new(temp.path());
        let path = fs_store.object_path(&locator()).unwrap();
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "{ not json").unwrap();

        let err = StateStore::new(fs_store).load(&locator()).unwrap_err();
        assert!(matches!(err, StateError::Parse { .. }));
        assert!(err.is_load_error());
    }

    #[test]
    fn test_inconsistent_document_is_load_error() {
        let backend = Arc::new(MemoryObjectStore::new());
        let doc = br#"{"resources":{"a":{"type":"aws_s3_bucket","name":"b","provider_id":"b"}}}"#;
        backend.put(&locator(), doc, None).unwrap();

        let err = StateStore::new(backend).load(&locator()).unwrap_err();
        assert!(matches!(err, StateError::Invalid { .. }));
    }

    #[test]
    fn test_stale_version_conflicts() {
        let temp = TempDir::new().unwrap();
        let store = StateStore::new(FsObjectStore::new(temp.path()));
        store.save(&locator(), &sample_state(), None).unwrap();

        let first = store.load(&locator()).unwrap();
        let second = store.load(&locator()).unwrap();

        let mut changed = first.state.clone();
        changed.remove("web");
        store
            .save(&locator(), &changed, first.version.as_ref())
            .unwrap();

        let err = store
            .save(&locator(), &second.state, second.version.as_ref())
            .unwrap_err();
        assert!(err.is_conflict());

        // Winner's document is intact
        let loaded = store.load(&locator()).unwrap();
        assert_eq!(loaded.state, changed);
    }

    #[test]
    fn test_first_save_conflicts_if_document_appeared() {
        let backend = Arc::new(MemoryObjectStore::new());
        let store = StateStore::new(Arc::clone(&backend));
        store.save(&locator(), &sample_state(), None).unwrap();

        let err = store
            .save(&locator(), &ReconciliationState::new(), None)
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[test]
    fn test_held_lock_blocks_write() {
        let temp = TempDir::new().unwrap();
        let fs_store = FsObjectStore::new(temp.path());
        let path = fs_store.object_path(&locator()).unwrap();
        fs::create_dir_all(path.parent().unwrap()).unwrap();

        let held = LockFile::acquire(sibling(&path, ".lock")).unwrap();
        let err = fs_store.put(&locator(), b"{}", None).unwrap_err();
        assert!(matches!(err, StoreError::Locked { .. }));
        assert!(!path.exists());

        drop(held);
        assert!(fs_store.put(&locator(), b"{}", None).is_ok());
    }

    #[test]
    fn test_leftover_lock_file_does_not_block_write() {
        let temp = TempDir::new().unwrap();
        let fs_store = FsObjectStore::new(temp.path());
        let path = fs_store.object_path(&locator()).unwrap();
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        // Left behind by a writer that died without cleaning up
        fs::write(
            sibling(&path, ".lock"),
            r#"{"pid":999999,"acquired_at":"2020-01-01T00:00:00Z"}"#,
        )
        .unwrap();

        fs_store.put(&locator(), b"{}", None).unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"{}");

        let holder = read_holder(&sibling(&path, ".lock")).unwrap();
        assert_eq!(holder.pid, std::process::id());
    }

    #[test]
    fn test_lock_released_after_write() {
        let temp = TempDir::new().unwrap();
        let fs_store = FsObjectStore::new(temp.path());
        fs_store.put(&locator(), b"{}", None).unwrap();

        let path = fs_store.object_path(&locator()).unwrap();
        assert!(!sibling(&path, ".tmp").exists());
        assert!(LockFile::acquire(sibling(&path, ".lock")).is_ok());
    }

    #[test]
    fn test_rejects_escaping_locator() {
        let fs_store = FsObjectStore::new("/tmp/stratus-test");
        assert!(
            fs_store
                .object_path(&StateLocator::new("bucket", "../escape.json"))
                .is_err()
        );
        assert!(
            fs_store
                .object_path(&StateLocator::new("..", "state.json"))
                .is_err()
        );
        assert!(
            fs_store
                .object_path(&StateLocator::new("bucket", "env/prod/state.json"))
                .is_ok()
        );
    }
}
