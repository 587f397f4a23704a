//! Planning - decides which operation each desired resource needs

use crate::diff::{AttributeChange, attribute_changes};
use crate::error::UnsupportedKindError;
use crate::provider::ProviderRegistry;
use crate::types::{ReconciliationState, ResourceSpec};
use serde::{Deserialize, Serialize};
use std::fmt;

/// When a tracked resource is converged in place
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdatePolicy {
    /// Update every tracked resource whose kind supports it, whether or not
    /// anything differs
    #[default]
    #[serde(rename = "presence")]
    OnPresence,
    /// Update only when the spec differs from the last-applied values
    #[serde(rename = "attributes")]
    OnAttributeChange,
}

impl fmt::Display for UpdatePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OnPresence => write!(f, "presence"),
            Self::OnAttributeChange => write!(f, "attributes"),
        }
    }
}

/// Operation planned for one desired resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlannedAction {
    /// Not tracked yet
    Create,
    /// Tracked and due for an in-place update
    Update { changes: Vec<AttributeChange> },
    /// Tracked and left alone
    NoOp,
    /// No provider handles this kind; nothing will be called
    Unsupported(UnsupportedKindError),
}

impl PlannedAction {
    /// Whether this action calls a provider
    pub fn is_change(&self) -> bool {
        matches!(self, Self::Create | Self::Update { .. })
    }
}

/// A desired resource and its planned action
#[derive(Debug, Clone)]
pub struct PlanEntry<'a> {
    pub spec: &'a ResourceSpec,
    pub action: PlannedAction,
}

/// Per-resource actions for a desired-state list, in input order
#[derive(Debug, Clone, Default)]
pub struct Plan<'a> {
    pub entries: Vec<PlanEntry<'a>>,
}

impl Plan<'_> {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Summary statistics for this plan
    pub fn summary(&self) -> PlanSummary {
        PlanSummary::from_entries(&self.entries)
    }
}

/// Decide the action for a single spec against the current state.
pub fn plan_action(
    spec: &ResourceSpec,
    state: &ReconciliationState,
    registry: &ProviderRegistry,
    policy: UpdatePolicy,
) -> PlannedAction {
    let provider = match registry.get(&spec.kind) {
        Ok(provider) => provider,
        Err(e) => return PlannedAction::Unsupported(e),
    };

    let Some(record) = state.get(&spec.name) else {
        return PlannedAction::Create;
    };

    if !provider.supports_update() {
        return PlannedAction::NoOp;
    }

    let changes = attribute_changes(spec, record);
    match policy {
        UpdatePolicy::OnPresence => PlannedAction::Update { changes },
        UpdatePolicy::OnAttributeChange if changes.is_empty() => PlannedAction::NoOp,
        UpdatePolicy::OnAttributeChange => PlannedAction::Update { changes },
    }
}

/// Plan every desired resource, in input order.
///
/// Pure: no provider is called and the state is not modified.
pub fn plan<'a>(
    desired: &'a [ResourceSpec],
    state: &ReconciliationState,
    registry: &ProviderRegistry,
    policy: UpdatePolicy,
) -> Plan<'a> {
    Plan {
        entries: desired
            .iter()
            .map(|spec| PlanEntry {
                spec,
                action: plan_action(spec, state, registry, policy),
            })
            .collect(),
    }
}

/// Order in which tracked resources are destroyed.
///
/// Names are sorted lexically so runs are reproducible; there is no
/// dependency ordering.
pub fn destroy_order(state: &ReconciliationState) -> Vec<String> {
    let mut names = state.names();
    names.sort();
    names
}

/// Plan summary statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanSummary {
    /// Number of resources to create
    pub creates: usize,
    /// Number of resources to update in place
    pub updates: usize,
    /// Number of tracked resources left alone
    pub no_ops: usize,
    /// Number of resources with no provider
    pub unsupported: usize,
}

impl PlanSummary {
    /// Create a summary from plan entries
    pub fn from_entries(entries: &[PlanEntry<'_>]) -> Self {
        let mut summary = Self::default();
        for entry in entries {
            match entry.action {
                PlannedAction::Create => summary.creates += 1,
                PlannedAction::Update { .. } => summary.updates += 1,
                PlannedAction::NoOp => summary.no_ops += 1,
                PlannedAction::Unsupported(_) => summary.unsupported += 1,
            }
        }
        summary
    }

    /// Total number of provider calls the plan would make
    pub fn total_changes(&self) -> usize {
        self.creates + self.updates
    }

    /// Check if there are any changes
    pub fn has_changes(&self) -> bool {
        self.total_changes() > 0
    }
}
