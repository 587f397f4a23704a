//! Reconciler - drives providers to converge tracked state toward desired state

use crate::context::{CancelToken, ProgressCallback};
use crate::error::{ProviderError, ReconcileError, ResourceError, StateError};
use crate::planner::{self, Plan, PlannedAction, UpdatePolicy};
use crate::provider::ProviderRegistry;
use crate::store::{LoadedState, ObjectVersion, StateLocator, StateStore};
use crate::types::{
    Operation, ReconciliationState, Report, ResourceOutcome, ResourceRecord, ResourceSpec,
};

/// Default bucket holding the state document
pub const DEFAULT_STATE_BUCKET: &str = "stratus-remote-state";
/// Default key of the state document
pub const DEFAULT_STATE_KEY: &str = "state.json";
/// Default region for records that do not carry one
pub const DEFAULT_REGION: &str = "us-east-1";

/// Construction-time settings of a [`Reconciler`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcilerConfig {
    /// Where the state document lives
    pub locator: StateLocator,
    /// Region used to destroy records that predate region tracking
    pub default_region: String,
    /// When tracked resources are updated in place
    pub policy: UpdatePolicy,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            locator: StateLocator::new(DEFAULT_STATE_BUCKET, DEFAULT_STATE_KEY),
            default_region: DEFAULT_REGION.to_string(),
            policy: UpdatePolicy::default(),
        }
    }
}

/// Result of a deploy or destroy run that got past loading state
#[derive(Debug)]
pub struct RunOutcome {
    /// Working state at the end of the run
    pub state: ReconciliationState,
    pub report: Report,
    /// Version of the saved document, if the save succeeded
    pub version: Option<ObjectVersion>,
    /// Set when the final save failed; the report is still valid
    pub save_error: Option<StateError>,
}

impl RunOutcome {
    /// No resource failed and the state was saved
    pub fn is_success(&self) -> bool {
        self.report.is_success() && self.save_error.is_none()
    }
}

/// Reconciliation engine
///
/// Owns the provider registry and the state store. Each run loads the
/// state once, walks resources sequentially, and saves once at the end.
#[derive(Debug)]
pub struct Reconciler {
    registry: ProviderRegistry,
    store: StateStore,
    config: ReconcilerConfig,
}

impl Reconciler {
    pub fn new(registry: ProviderRegistry, store: StateStore, config: ReconcilerConfig) -> Self {
        Self {
            registry,
            store,
            config,
        }
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Load the tracked state and its version
    pub fn load_state(&self) -> Result<LoadedState, ReconcileError> {
        self.store
            .load(&self.config.locator)
            .map_err(ReconcileError::StateLoad)
    }

    /// Compute the plan for `desired` against the stored state
    ///
    /// No provider is called and nothing is written.
    pub fn plan<'a>(&self, desired: &'a [ResourceSpec]) -> Result<Plan<'a>, ReconcileError> {
        let loaded = self.load_state()?;
        Ok(planner::plan(
            desired,
            &loaded.state,
            &self.registry,
            self.config.policy,
        ))
    }

    /// Converge the stored state toward `desired` and save it once
    pub fn deploy<P: ProgressCallback>(
        &self,
        desired: &[ResourceSpec],
        cancel: &CancelToken,
        progress: &mut P,
    ) -> Result<RunOutcome, ReconcileError> {
        let loaded = self.load_state()?;
        Ok(self.deploy_loaded(loaded, desired, cancel, progress))
    }

    /// Deploy against a state the caller already loaded, then save it once
    ///
    /// The save is checked against `loaded.version`, so a state loaded
    /// too early surfaces as a conflict rather than a lost update.
    pub fn deploy_loaded<P: ProgressCallback>(
        &self,
        loaded: LoadedState,
        desired: &[ResourceSpec],
        cancel: &CancelToken,
        progress: &mut P,
    ) -> RunOutcome {
        let LoadedState { mut state, version } = loaded;
        log::info!(
            "Deploying {} resources against {} tracked",
            desired.len(),
            state.len()
        );

        let report = self.apply_deploy(desired, &mut state, cancel, progress);
        self.persist(state, version.as_ref(), report)
    }

    /// Deploy against an in-memory state without touching the store
    pub fn apply_deploy<P: ProgressCallback>(
        &self,
        desired: &[ResourceSpec],
        state: &mut ReconciliationState,
        cancel: &CancelToken,
        progress: &mut P,
    ) -> Report {
        let mut report = Report::new(Operation::Deploy);
        progress.on_run_start(desired.len());

        for spec in desired {
            if cancel.is_cancelled() {
                skip(&mut report, progress, &spec.name);
                continue;
            }

            let action = planner::plan_action(spec, state, &self.registry, self.config.policy);
            progress.on_resource_start(&spec.name, &describe(&action, spec));

            let outcome = match self.deploy_one(spec, action, state) {
                Ok(outcome) => outcome,
                Err(e) => {
                    log::error!("{} {}: {e}", spec.kind, spec.name);
                    ResourceOutcome::Failed {
                        error: e.to_string(),
                    }
                }
            };

            report.record(&spec.name, &outcome);
            progress.on_resource_complete(&spec.name, &outcome);
        }

        progress.on_run_complete();
        report.finish();
        report
    }

    fn deploy_one(
        &self,
        spec: &ResourceSpec,
        action: PlannedAction,
        state: &mut ReconciliationState,
    ) -> Result<ResourceOutcome, ResourceError> {
        let provider = self.registry.get(&spec.kind)?;

        match action {
            PlannedAction::Unsupported(e) => Err(e.into()),
            PlannedAction::Create => {
                let provider_id = provider.create(spec)?;
                if provider_id.trim().is_empty() {
                    return Err(ProviderError::api("provider returned an empty identifier").into());
                }
                log::info!("Created {} {} ({provider_id})", spec.kind, spec.name);
                state.insert(ResourceRecord::from_spec(spec, provider_id.clone()));
                Ok(ResourceOutcome::Created { provider_id })
            }
            PlannedAction::Update { changes } => {
                let Some(record) = state.get_mut(&spec.name) else {
                    return Err(ProviderError::Other(format!(
                        "update planned for {} but it is not tracked",
                        spec.name
                    ))
                    .into());
                };
                for change in &changes {
                    log::debug!("{}: {change}", spec.name);
                }
                provider.update(spec, &record.provider_id)?;
                record.refresh_from(spec);
                log::info!(
                    "Updated {} {} ({})",
                    spec.kind,
                    spec.name,
                    record.provider_id
                );
                Ok(ResourceOutcome::Updated)
            }
            PlannedAction::NoOp => {
                log::debug!("{} {} already tracked, nothing to do", spec.kind, spec.name);
                Ok(ResourceOutcome::NoChange)
            }
        }
    }

    /// Destroy every tracked resource and save the remainder once
    pub fn destroy<P: ProgressCallback>(
        &self,
        cancel: &CancelToken,
        progress: &mut P,
    ) -> Result<RunOutcome, ReconcileError> {
        let LoadedState { mut state, version } = self.load_state()?;
        log::info!("Destroying {} tracked resources", state.len());

        let report = self.apply_destroy(&mut state, cancel, progress);
        Ok(self.persist(state, version.as_ref(), report))
    }

    /// Destroy against an in-memory state without touching the store
    ///
    /// Records are visited in lexical name order.
    pub fn apply_destroy<P: ProgressCallback>(
        &self,
        state: &mut ReconciliationState,
        cancel: &CancelToken,
        progress: &mut P,
    ) -> Report {
        let mut report = Report::new(Operation::Destroy);
        let order = planner::destroy_order(state);
        progress.on_run_start(order.len());

        for name in order {
            if cancel.is_cancelled() {
                skip(&mut report, progress, &name);
                continue;
            }
            let Some(record) = state.get(&name).cloned() else {
                continue;
            };

            progress.on_resource_start(&name, &format!("destroy {}", record.kind));

            let outcome = match self.destroy_one(&record) {
                Ok(()) => {
                    log::info!(
                        "Destroyed {} {name} ({})",
                        record.kind,
                        record.provider_id
                    );
                    state.remove(&name);
                    ResourceOutcome::Destroyed
                }
                Err(e) => {
                    log::error!("{} {name}: {e}", record.kind);
                    ResourceOutcome::Failed {
                        error: e.to_string(),
                    }
                }
            };

            report.record(&name, &outcome);
            progress.on_resource_complete(&name, &outcome);
        }

        progress.on_run_complete();
        report.finish();
        report
    }

    fn destroy_one(&self, record: &ResourceRecord) -> Result<(), ResourceError> {
        let provider = self.registry.get(&record.kind)?;
        provider.destroy(
            &record.kind,
            &record.provider_id,
            record.region_or(&self.config.default_region),
        )?;
        Ok(())
    }

    /// Save the working state exactly once, keeping the report either way
    fn persist(
        &self,
        state: ReconciliationState,
        expected: Option<&ObjectVersion>,
        report: Report,
    ) -> RunOutcome {
        match self.store.save(&self.config.locator, &state, expected) {
            Ok(version) => RunOutcome {
                state,
                report,
                version: Some(version),
                save_error: None,
            },
            Err(e) => {
                log::error!(
                    "Run finished ({} changes) but state was not saved: {e}",
                    report.total_changes()
                );
                RunOutcome {
                    state,
                    report,
                    version: None,
                    save_error: Some(e),
                }
            }
        }
    }
}

fn skip<P: ProgressCallback>(report: &mut Report, progress: &mut P, name: &str) {
    if !report.cancelled {
        log::warn!("Run cancelled, not starting {name} or anything after it");
        report.cancelled = true;
    }
    let outcome = ResourceOutcome::Skipped {
        reason: "cancelled".to_string(),
    };
    report.record(name, &outcome);
    progress.on_resource_complete(name, &outcome);
}

fn describe(action: &PlannedAction, spec: &ResourceSpec) -> String {
    match action {
        PlannedAction::Create => format!("create {}", spec.kind),
        PlannedAction::Update { .. } => format!("update {}", spec.kind),
        PlannedAction::NoOp => format!("keep {}", spec.kind),
        PlannedAction::Unsupported(_) => format!("reject {}", spec.kind),
    }
}
