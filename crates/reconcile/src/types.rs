//! Core types for reconciliation: desired specs, tracked records, run reports

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Kind of infrastructure resource.
///
/// Parsing a kind never fails: names that no built-in variant claims end up
/// in [`ResourceKind::Other`] and are rejected later, per resource, by the
/// provider registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ResourceKind {
    /// Object storage bucket (`aws_s3_bucket`)
    StorageBucket,
    /// Virtual machine (`aws_ec2_instance`)
    ComputeInstance,
    /// Any type name without a built-in variant
    Other(String),
}

impl ResourceKind {
    /// Wire name of the storage bucket kind.
    pub const STORAGE_BUCKET: &'static str = "aws_s3_bucket";
    /// Wire name of the compute instance kind.
    pub const COMPUTE_INSTANCE: &'static str = "aws_ec2_instance";

    /// Parse a kind from its wire name.
    pub fn parse(name: &str) -> Self {
        match name {
            Self::STORAGE_BUCKET => Self::StorageBucket,
            Self::COMPUTE_INSTANCE => Self::ComputeInstance,
            other => Self::Other(other.to_string()),
        }
    }

    /// Get the wire name of this kind.
    pub fn as_str(&self) -> &str {
        match self {
            Self::StorageBucket => Self::STORAGE_BUCKET,
            Self::ComputeInstance => Self::COMPUTE_INSTANCE,
            Self::Other(name) => name,
        }
    }

    /// Whether this kind has a built-in variant.
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Other(_))
    }
}

impl From<String> for ResourceKind {
    fn from(name: String) -> Self {
        Self::parse(&name)
    }
}

impl From<ResourceKind> for String {
    fn from(kind: ResourceKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Desired State
// ============================================================================

/// A resource the user wants to exist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSpec {
    /// Resource kind
    #[serde(rename = "type")]
    pub kind: ResourceKind,
    /// Logical name, unique within a run
    pub name: String,
    /// Provider region
    pub region: String,
    /// Kind-specific attributes (e.g. `ami`, `instance_type`)
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl ResourceSpec {
    /// Attribute key for the machine image of a compute instance.
    pub const IMAGE_ID: &'static str = "ami";
    /// Alternate attribute key for the machine image.
    pub const IMAGE_ID_ALT: &'static str = "image_id";
    /// Attribute key for the size class of a compute instance.
    pub const INSTANCE_TYPE: &'static str = "instance_type";

    /// Create a spec with no attributes.
    pub fn new(kind: ResourceKind, name: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            region: region.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// Add an attribute.
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Look up an attribute.
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// Machine image, accepting either `ami` or `image_id`.
    pub fn image_id(&self) -> Option<&str> {
        self.attribute(Self::IMAGE_ID)
            .or_else(|| self.attribute(Self::IMAGE_ID_ALT))
    }

    /// Instance size class.
    pub fn instance_type(&self) -> Option<&str> {
        self.attribute(Self::INSTANCE_TYPE)
    }
}

// ============================================================================
// Tracked State
// ============================================================================

/// A resource the engine has provisioned and not yet destroyed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRecord {
    /// Resource kind
    #[serde(rename = "type")]
    pub kind: ResourceKind,
    /// Logical name
    pub name: String,
    /// Identifier assigned by the provider (never empty)
    pub provider_id: String,
    /// Region the resource was last applied in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// Attributes last applied to the provider
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
}

impl ResourceRecord {
    /// Build the record for a spec the provider just created.
    pub fn from_spec(spec: &ResourceSpec, provider_id: impl Into<String>) -> Self {
        Self {
            kind: spec.kind.clone(),
            name: spec.name.clone(),
            provider_id: provider_id.into(),
            region: Some(spec.region.clone()),
            attributes: spec.attributes.clone(),
        }
    }

    /// Refresh last-applied values after a successful update.
    ///
    /// The provider identifier is left untouched.
    pub fn refresh_from(&mut self, spec: &ResourceSpec) {
        self.kind = spec.kind.clone();
        self.region = Some(spec.region.clone());
        self.attributes = spec.attributes.clone();
    }

    /// Region to address the resource in, falling back to `default`.
    pub fn region_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.region.as_deref().unwrap_or(default)
    }
}

/// Durable snapshot of every tracked resource, keyed by logical name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationState {
    #[serde(default)]
    pub resources: BTreeMap<String, ResourceRecord>,
}

impl ReconciliationState {
    /// Create an empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a record by name.
    pub fn get(&self, name: &str) -> Option<&ResourceRecord> {
        self.resources.get(name)
    }

    /// Look up a record by name for mutation.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut ResourceRecord> {
        self.resources.get_mut(name)
    }

    /// Whether a resource is tracked.
    pub fn contains(&self, name: &str) -> bool {
        self.resources.contains_key(name)
    }

    /// Track a record under its own name, returning any record it replaced.
    pub fn insert(&mut self, record: ResourceRecord) -> Option<ResourceRecord> {
        self.resources.insert(record.name.clone(), record)
    }

    /// Stop tracking a resource.
    pub fn remove(&mut self, name: &str) -> Option<ResourceRecord> {
        self.resources.remove(name)
    }

    /// Tracked names in lexical order.
    pub fn names(&self) -> Vec<String> {
        self.resources.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Check the structural invariants of a snapshot.
    ///
    /// Every key must equal its record's name and no provider identifier
    /// may be empty.
    pub fn validate(&self) -> Result<(), String> {
        for (key, record) in &self.resources {
            if key != &record.name {
                return Err(format!(
                    "entry '{key}' holds a record named '{}'",
                    record.name
                ));
            }
            if record.provider_id.trim().is_empty() {
                return Err(format!("entry '{key}' has an empty provider_id"));
            }
        }
        Ok(())
    }
}

// ============================================================================
// Run Results
// ============================================================================

/// What happened to a single resource during a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResourceOutcome {
    /// Provider created the resource
    Created { provider_id: String },
    /// Provider converged the resource in place
    Updated,
    /// Provider destroyed the resource
    Destroyed,
    /// Already tracked and not updatable in place
    NoChange,
    /// The operation failed; state is unchanged for this resource
    Failed { error: String },
    /// The operation was never started
    Skipped { reason: String },
}

impl ResourceOutcome {
    /// Check if the outcome represents success (no failure)
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed { .. })
    }

    /// Check if the outcome represents a change
    pub fn is_change(&self) -> bool {
        matches!(self, Self::Created { .. } | Self::Updated | Self::Destroyed)
    }
}

/// Which entry point produced a report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Deploy,
    Destroy,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Deploy => write!(f, "deploy"),
            Self::Destroy => write!(f, "destroy"),
        }
    }
}

/// Summary of one deploy or destroy run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub operation: Operation,
    /// Names created by this run
    pub deployed: Vec<String>,
    /// Names updated in place by this run
    pub updated: Vec<String>,
    /// Names destroyed by this run
    pub destroyed: Vec<String>,
    /// Names that were tracked and needed nothing
    pub unchanged: Vec<String>,
    /// Names that were never attempted
    pub skipped: Vec<String>,
    /// Per-resource failures, keyed by name
    pub errors: BTreeMap<String, String>,
    /// Whether the run stopped early on a cancellation request
    pub cancelled: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Report {
    /// Start a new report for an operation.
    pub fn new(operation: Operation) -> Self {
        Self {
            operation,
            deployed: Vec::new(),
            updated: Vec::new(),
            destroyed: Vec::new(),
            unchanged: Vec::new(),
            skipped: Vec::new(),
            errors: BTreeMap::new(),
            cancelled: false,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Add a resource outcome to the report
    pub fn record(&mut self, name: &str, outcome: &ResourceOutcome) {
        let name = name.to_string();
        match outcome {
            ResourceOutcome::Created { .. } => self.deployed.push(name),
            ResourceOutcome::Updated => self.updated.push(name),
            ResourceOutcome::Destroyed => self.destroyed.push(name),
            ResourceOutcome::NoChange => self.unchanged.push(name),
            ResourceOutcome::Failed { error } => {
                self.errors.insert(name, error.clone());
            }
            ResourceOutcome::Skipped { .. } => self.skipped.push(name),
        }
    }

    /// Stamp the completion time.
    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    /// Total number of actual changes made
    pub fn total_changes(&self) -> usize {
        self.deployed.len() + self.updated.len() + self.destroyed.len()
    }

    /// Check if every attempted resource succeeded
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}
