//! stratus configuration (`config.toml`)
//!
//! Every field has a default, so a missing file is a valid configuration.

use crate::paths;
use anyhow::{Context, Result};
use reconcile::{
    DEFAULT_REGION, DEFAULT_STATE_BUCKET, DEFAULT_STATE_KEY, FsObjectStore, ProviderRegistry,
    Reconciler, ReconcilerConfig, StateLocator, StateStore, SystemClock, UpdatePolicy, WaitConfig,
};
use sandbox::Sandbox;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Environment variable overriding `server.api_key`
pub const ENV_API_KEY: &str = "STRATUS_API_KEY";

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StratusConfig {
    /// Desired-state document, relative to the working directory
    pub desired: String,
    /// Region for records that do not carry one
    pub default_region: String,
    /// When tracked resources are updated in place
    pub policy: UpdatePolicy,
    pub state: StateSection,
    pub sandbox: SandboxSection,
    pub wait: WaitSection,
    pub server: ServerSection,
}

impl Default for StratusConfig {
    fn default() -> Self {
        Self {
            desired: "main.yaml".to_string(),
            default_region: DEFAULT_REGION.to_string(),
            policy: UpdatePolicy::default(),
            state: StateSection::default(),
            sandbox: SandboxSection::default(),
            wait: WaitSection::default(),
            server: ServerSection::default(),
        }
    }
}

/// Where the state document lives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StateSection {
    /// Object store root; defaults to `<state_dir>/objects`
    pub root: Option<String>,
    pub bucket: String,
    pub key: String,
}

impl Default for StateSection {
    fn default() -> Self {
        Self {
            root: None,
            bucket: DEFAULT_STATE_BUCKET.to_string(),
            key: DEFAULT_STATE_KEY.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxSection {
    /// Sandbox root; defaults to `<state_dir>/sandbox`
    pub root: Option<String>,
    /// How long instance state transitions take
    pub transition_delay_ms: u64,
}

impl Default for SandboxSection {
    fn default() -> Self {
        Self {
            root: None,
            transition_delay_ms: 1500,
        }
    }
}

/// Bounds of provider-side waits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaitSection {
    pub timeout_secs: u64,
    pub poll_interval_ms: u64,
}

impl Default for WaitSection {
    fn default() -> Self {
        Self {
            timeout_secs: 120,
            poll_interval_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub bind: String,
    /// Shared secret for `X-API-Key`; empty means unset
    pub api_key: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
            api_key: String::new(),
        }
    }
}

impl StratusConfig {
    /// Load from `path`, or from the default config file
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from(path),
            None => Self::load_from(&paths::config_file()?),
        }
    }

    /// Load from a specific file; a missing file yields the defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Could not read config file: {}", path.display()))?;

        toml::from_str(&content).context("Invalid TOML format in stratus config")
    }

    pub fn desired_path(&self) -> PathBuf {
        paths::expand(&self.desired)
    }

    pub fn state_root(&self) -> Result<PathBuf> {
        match &self.state.root {
            Some(root) => Ok(paths::expand(root)),
            None => paths::objects_dir(),
        }
    }

    pub fn sandbox_root(&self) -> Result<PathBuf> {
        match &self.sandbox.root {
            Some(root) => Ok(paths::expand(root)),
            None => paths::sandbox_dir(),
        }
    }

    pub fn locator(&self) -> StateLocator {
        StateLocator::new(&self.state.bucket, &self.state.key)
    }

    pub fn wait_config(&self) -> WaitConfig {
        WaitConfig::new(
            Duration::from_secs(self.wait.timeout_secs),
            Duration::from_millis(self.wait.poll_interval_ms),
        )
    }

    pub fn reconciler_config(&self) -> ReconcilerConfig {
        ReconcilerConfig {
            locator: self.locator(),
            default_region: self.default_region.clone(),
            policy: self.policy,
        }
    }

    /// API key from the environment, falling back to the config file
    pub fn api_key(&self) -> Option<String> {
        std::env::var(ENV_API_KEY)
            .ok()
            .filter(|key| !key.is_empty())
            .or_else(|| Some(self.server.api_key.clone()).filter(|key| !key.is_empty()))
    }

    /// Wire the filesystem state store and sandbox providers into a reconciler
    pub fn build_reconciler(&self) -> Result<Reconciler> {
        let state_root = self.state_root()?;
        let sandbox_root = self.sandbox_root()?;
        log::debug!(
            "State objects in {}, sandbox in {}",
            state_root.display(),
            sandbox_root.display()
        );

        let sandbox = Sandbox::new(
            sandbox_root,
            Arc::new(SystemClock),
            Duration::from_millis(self.sandbox.transition_delay_ms),
        );
        let mut registry = ProviderRegistry::new();
        sandbox::register_all(&mut registry, &sandbox, self.wait_config());

        Ok(Reconciler::new(
            registry,
            StateStore::new(FsObjectStore::new(state_root)),
            self.reconciler_config(),
        ))
    }
}
