//! # Sandbox
//!
//! A local stand-in for a cloud account. Storage buckets and compute
//! instances live under a directory tree, and instance state transitions
//! take time to complete, so the engine's bounded waits run for real.
//!
//! ## Layout
//!
//! ```text
//! {root}/
//! └── <region>/
//!     ├── buckets/
//!     │   └── <name>/bucket.json
//!     └── instances/
//!         └── <id>.json
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use reconcile::{ProviderRegistry, SystemClock, WaitConfig};
//! use sandbox::Sandbox;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let sandbox = Sandbox::new("/tmp/cloud", Arc::new(SystemClock), Duration::from_millis(1500));
//! let mut registry = ProviderRegistry::new();
//! sandbox::register_all(&mut registry, &sandbox, WaitConfig::default());
//! ```

pub mod bucket;
mod error;
pub mod instance;

pub use bucket::{BucketInfo, BucketProvider};
pub use error::{Error, Result};
pub use instance::{InstanceProvider, InstanceRecord, InstanceState};

use reconcile::{Clock, ProviderRegistry, WaitConfig};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Handle on an emulated cloud rooted at a directory
#[derive(Clone)]
pub struct Sandbox {
    root: PathBuf,
    clock: Arc<dyn Clock>,
    transition_delay: Duration,
}

impl Sandbox {
    /// Create a sandbox; the directory is created lazily
    ///
    /// `transition_delay` is how long an instance spends in `pending` or
    /// `stopping` before settling.
    pub fn new(root: impl Into<PathBuf>, clock: Arc<dyn Clock>, transition_delay: Duration) -> Self {
        Self {
            root: root.into(),
            clock,
            transition_delay,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub fn transition_delay(&self) -> Duration {
        self.transition_delay
    }

    fn region_dir(&self, region: &str) -> Result<PathBuf> {
        check_segment("region", region)?;
        Ok(self.root.join(region))
    }

    pub(crate) fn buckets_dir(&self, region: &str) -> Result<PathBuf> {
        Ok(self.region_dir(region)?.join("buckets"))
    }

    pub(crate) fn instances_dir(&self, region: &str) -> Result<PathBuf> {
        Ok(self.region_dir(region)?.join("instances"))
    }
}

impl fmt::Debug for Sandbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sandbox")
            .field("root", &self.root)
            .field("transition_delay", &self.transition_delay)
            .finish_non_exhaustive()
    }
}

/// Register bucket and instance providers backed by `sandbox`
pub fn register_all(registry: &mut ProviderRegistry, sandbox: &Sandbox, wait: WaitConfig) {
    registry.register(Box::new(BucketProvider::new(sandbox.clone())));
    registry.register(Box::new(InstanceProvider::new(sandbox.clone(), wait)));
}

/// Reject names that would escape their directory
pub(crate) fn check_segment(what: &'static str, value: &str) -> Result<()> {
    if value.is_empty() || value == "." || value == ".." || value.contains(['/', '\\']) {
        return Err(Error::InvalidName {
            what,
            value: value.to_string(),
        });
    }
    Ok(())
}

/// Read a JSON record, `None` if the file does not exist
pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|source| Error::Corrupt {
            path: path.to_path_buf(),
            source,
        })
}

/// Write a JSON record via temp file and rename
pub(crate) fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    let content = serde_json::to_vec_pretty(value).map_err(|source| Error::Corrupt {
        path: path.to_path_buf(),
        source,
    })?;
    let temp = path.with_extension("json.tmp");
    fs::write(&temp, content)?;
    fs::rename(&temp, path)?;
    Ok(())
}
