//! # Reconcile
//!
//! Core of a declarative infrastructure engine: compares the resources a
//! user wants with the resources previously provisioned, and drives
//! providers to converge one toward the other.
//!
//! ## Core Concepts
//!
//! - **ResourceSpec**: A desired resource (kind, name, region, attributes)
//! - **ReconciliationState**: Durable record of tracked resources, keyed by name
//! - **Provider**: Create/update/destroy capabilities for one resource kind
//! - **StateStore**: Whole-document load/save with an optimistic version check
//! - **Reconciler**: Deploy and destroy runs over the above
//!
//! ## Example
//!
//! ```ignore
//! use reconcile::{
//!     CancelToken, FsObjectStore, NoProgress, ProviderRegistry, Reconciler,
//!     ReconcilerConfig, ResourceKind, ResourceSpec, StateStore,
//! };
//!
//! let registry = ProviderRegistry::new().with(Box::new(MyBucketProvider::new()));
//! let store = StateStore::new(FsObjectStore::new("/var/lib/stratus/state"));
//! let reconciler = Reconciler::new(registry, store, ReconcilerConfig::default());
//!
//! let desired = vec![ResourceSpec::new(ResourceKind::StorageBucket, "bucket-a", "us-east-1")];
//! let outcome = reconciler.deploy(&desired, &CancelToken::new(), &mut NoProgress)?;
//!
//! println!("deployed: {:?}", outcome.report.deployed);
//! ```
//!
//! ## Failure Model
//!
//! A state load failure aborts the run before any provider is called.
//! Per-resource failures (including kinds with no provider) are recorded in
//! the [`Report`] and never stop the remaining resources. The state is saved
//! exactly once per run; if that save fails, the report is still returned
//! alongside the error in [`RunOutcome`].

pub mod context;
pub mod diff;
pub mod error;
pub mod planner;
pub mod provider;
pub mod reconciler;
pub mod store;
pub mod types;
pub mod wait;

// Re-export main types at crate root
pub use context::{CancelToken, NoProgress, ProgressCallback};
pub use diff::{AttributeChange, attribute_changes};
pub use error::{
    ProviderError, ReconcileError, ResourceError, StateError, StoreError, UnsupportedKindError,
};
pub use planner::{Plan, PlanEntry, PlanSummary, PlannedAction, UpdatePolicy, destroy_order, plan};
pub use provider::{BoxedProvider, Provider, ProviderRegistry};
pub use reconciler::{
    DEFAULT_REGION, DEFAULT_STATE_BUCKET, DEFAULT_STATE_KEY, Reconciler, ReconcilerConfig,
    RunOutcome,
};
pub use store::{
    FsObjectStore, LoadedState, MemoryObjectStore, ObjectStore, ObjectVersion, StateLocator,
    StateStore,
};
pub use types::{
    Operation, ReconciliationState, Report, ResourceKind, ResourceOutcome, ResourceRecord,
    ResourceSpec,
};
pub use wait::{Clock, ManualClock, SystemClock, WaitConfig, wait_until};
