//! Emulated compute instances
//!
//! Launching, stopping and starting an instance move it into a transitional
//! state (`pending`, `stopping`) that settles once the sandbox clock passes
//! the recorded `transition_at`. Callers observe the settled state through
//! [`Sandbox::describe_instance`], the same way they would poll a real API.

use crate::error::{Error, Result};
use crate::{Sandbox, check_segment, read_json, write_json};
use chrono::{DateTime, Utc};
use reconcile::wait::{WaitConfig, wait_until};
use reconcile::{Provider, ProviderError, ResourceKind, ResourceSpec};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io;
use std::path::PathBuf;

/// Lifecycle state of an instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InstanceState {
    Pending,
    Running,
    Stopping,
    Stopped,
    Terminated,
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Terminated => "terminated",
        };
        f.write_str(s)
    }
}

/// Stored instance record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceRecord {
    pub id: String,
    pub name: String,
    pub region: String,
    pub image_id: String,
    pub instance_type: String,
    pub state: InstanceState,
    /// State reached once `transition_at` passes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_state: Option<InstanceState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transition_at: Option<DateTime<Utc>>,
    pub launched_at: DateTime<Utc>,
}

impl InstanceRecord {
    /// Complete a pending transition if its time has come
    fn settle(&mut self, now: DateTime<Utc>) {
        if let (Some(target), Some(at)) = (self.target_state, self.transition_at)
            && now >= at
        {
            self.state = target;
            self.target_state = None;
            self.transition_at = None;
        }
    }

    fn begin(&mut self, state: InstanceState, target: InstanceState, at: DateTime<Utc>) {
        self.state = state;
        self.target_state = Some(target);
        self.transition_at = Some(at);
    }
}

/// Derive an id shaped like `i-0123456789abcdef0`
fn instance_id(region: &str, name: &str, now: DateTime<Utc>) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(region.as_bytes());
    hasher.update(name.as_bytes());
    hasher.update(&now.timestamp_nanos_opt().unwrap_or_default().to_le_bytes());
    let hex = hasher.finalize().to_hex();
    format!("i-{}", &hex[..17])
}

impl Sandbox {
    fn instance_path(&self, region: &str, id: &str) -> Result<PathBuf> {
        check_segment("instance id", id)?;
        Ok(self.instances_dir(region)?.join(format!("{id}.json")))
    }

    fn transition_deadline(&self) -> DateTime<Utc> {
        let delay = chrono::Duration::from_std(self.transition_delay())
            .unwrap_or(chrono::Duration::zero());
        self.clock().now() + delay
    }

    /// Load an instance with any due transition applied
    fn load_instance(&self, region: &str, id: &str) -> Result<(PathBuf, InstanceRecord)> {
        let path = self.instance_path(region, id)?;
        let mut record: InstanceRecord =
            read_json(&path)?.ok_or_else(|| Error::InstanceNotFound {
                id: id.to_string(),
                region: region.to_string(),
            })?;
        record.settle(self.clock().now());
        Ok((path, record))
    }

    /// Launch an instance; it starts out `pending`
    pub fn run_instance(
        &self,
        region: &str,
        name: &str,
        image_id: &str,
        instance_type: &str,
    ) -> Result<InstanceRecord> {
        let now = self.clock().now();
        let mut record = InstanceRecord {
            id: instance_id(region, name, now),
            name: name.to_string(),
            region: region.to_string(),
            image_id: image_id.to_string(),
            instance_type: instance_type.to_string(),
            state: InstanceState::Pending,
            target_state: None,
            transition_at: None,
            launched_at: now,
        };
        record.begin(
            InstanceState::Pending,
            InstanceState::Running,
            self.transition_deadline(),
        );
        record.settle(now);

        write_json(&self.instance_path(region, &record.id)?, &record)?;
        Ok(record)
    }

    /// Current view of an instance
    pub fn describe_instance(&self, region: &str, id: &str) -> Result<InstanceRecord> {
        self.load_instance(region, id).map(|(_, record)| record)
    }

    /// Ask a running instance to stop; stopping a stopped instance is a no-op
    pub fn stop_instance(&self, region: &str, id: &str) -> Result<InstanceRecord> {
        let (path, mut record) = self.load_instance(region, id)?;
        match record.state {
            InstanceState::Running => {
                record.begin(
                    InstanceState::Stopping,
                    InstanceState::Stopped,
                    self.transition_deadline(),
                );
                record.settle(self.clock().now());
                write_json(&path, &record)?;
            }
            InstanceState::Stopping | InstanceState::Stopped => {}
            state => {
                return Err(Error::IncorrectState {
                    id: id.to_string(),
                    action: "stop",
                    state,
                });
            }
        }
        Ok(record)
    }

    /// Change the size class; the instance must be stopped
    pub fn modify_instance_type(
        &self,
        region: &str,
        id: &str,
        instance_type: &str,
    ) -> Result<InstanceRecord> {
        let (path, mut record) = self.load_instance(region, id)?;
        if record.state != InstanceState::Stopped {
            return Err(Error::IncorrectState {
                id: id.to_string(),
                action: "modify",
                state: record.state,
            });
        }
        record.instance_type = instance_type.to_string();
        write_json(&path, &record)?;
        Ok(record)
    }

    /// Start a stopped instance; starting a running one is a no-op
    pub fn start_instance(&self, region: &str, id: &str) -> Result<InstanceRecord> {
        let (path, mut record) = self.load_instance(region, id)?;
        match record.state {
            InstanceState::Stopped => {
                record.begin(
                    InstanceState::Pending,
                    InstanceState::Running,
                    self.transition_deadline(),
                );
                record.settle(self.clock().now());
                write_json(&path, &record)?;
            }
            InstanceState::Pending | InstanceState::Running => {}
            state => {
                return Err(Error::IncorrectState {
                    id: id.to_string(),
                    action: "start",
                    state,
                });
            }
        }
        Ok(record)
    }

    /// Terminate an instance and drop its record
    pub fn terminate_instance(&self, region: &str, id: &str) -> Result<InstanceRecord> {
        let (path, mut record) = self.load_instance(region, id)?;
        record.state = InstanceState::Terminated;
        record.target_state = None;
        record.transition_at = None;
        match fs::remove_file(&path) {
            Ok(()) => Ok(record),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(Error::InstanceNotFound {
                id: id.to_string(),
                region: region.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }
}

/// Provider for `aws_ec2_instance`
///
/// Updates follow the stop, resize, start sequence, waiting (bounded by
/// [`WaitConfig`]) for the instance to reach `stopped` before resizing.
#[derive(Debug, Clone)]
pub struct InstanceProvider {
    sandbox: Sandbox,
    wait: WaitConfig,
}

impl InstanceProvider {
    pub fn new(sandbox: Sandbox, wait: WaitConfig) -> Self {
        Self { sandbox, wait }
    }

    fn wait_for(
        &self,
        region: &str,
        id: &str,
        target: InstanceState,
    ) -> std::result::Result<(), ProviderError> {
        let operation = format!("instance {id} to be {target}");
        wait_until(&self.wait, self.sandbox.clock(), &operation, || {
            let record = self.sandbox.describe_instance(region, id)?;
            Ok(record.state == target)
        })
    }
}

fn launch_parameter<'a>(
    value: Option<&'a str>,
    name: &'static str,
) -> std::result::Result<&'a str, ProviderError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| Error::MissingParameter(name).into())
}

impl Provider for InstanceProvider {
    fn kind(&self) -> ResourceKind {
        ResourceKind::ComputeInstance
    }

    fn supports_update(&self) -> bool {
        true
    }

    fn create(&self, spec: &ResourceSpec) -> std::result::Result<String, ProviderError> {
        let image_id = launch_parameter(spec.image_id(), ResourceSpec::IMAGE_ID)?;
        let instance_type = launch_parameter(spec.instance_type(), ResourceSpec::INSTANCE_TYPE)?;

        log::info!(
            "Provisioning instance '{}' ({instance_type}) in {}",
            spec.name,
            spec.region
        );
        let record = self
            .sandbox
            .run_instance(&spec.region, &spec.name, image_id, instance_type)?;
        Ok(record.id)
    }

    fn update(&self, spec: &ResourceSpec, provider_id: &str) -> std::result::Result<(), ProviderError> {
        let instance_type = launch_parameter(spec.instance_type(), ResourceSpec::INSTANCE_TYPE)?;
        let region = spec.region.as_str();

        log::info!("Stopping instance {provider_id} to apply {instance_type}");
        self.sandbox.stop_instance(region, provider_id)?;
        self.wait_for(region, provider_id, InstanceState::Stopped)?;

        self.sandbox
            .modify_instance_type(region, provider_id, instance_type)?;

        log::info!("Restarting instance {provider_id}");
        self.sandbox.start_instance(region, provider_id)?;
        Ok(())
    }

    fn destroy(
        &self,
        _kind: &ResourceKind,
        provider_id: &str,
        region: &str,
    ) -> std::result::Result<(), ProviderError> {
        log::info!("Terminating instance {provider_id} in {region}");
        self.sandbox.terminate_instance(region, provider_id)?;
        Ok(())
    }
}
