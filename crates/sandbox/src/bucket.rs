//! Emulated storage buckets

use crate::error::{Error, Result};
use crate::{Sandbox, check_segment, read_json, write_json};
use chrono::{DateTime, Utc};
use reconcile::{Provider, ProviderError, ResourceKind, ResourceSpec};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

const METADATA_FILE: &str = "bucket.json";

/// Metadata stored alongside each bucket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketInfo {
    pub name: String,
    pub region: String,
    pub created_at: DateTime<Utc>,
}

impl Sandbox {
    fn bucket_dir(&self, region: &str, name: &str) -> Result<PathBuf> {
        check_segment("bucket name", name)?;
        Ok(self.buckets_dir(region)?.join(name))
    }

    /// Create a bucket; fails if it already exists in the region
    pub fn create_bucket(&self, region: &str, name: &str) -> Result<BucketInfo> {
        let dir = self.bucket_dir(region, name)?;
        if dir.exists() {
            return Err(Error::BucketExists {
                name: name.to_string(),
                region: region.to_string(),
            });
        }

        let info = BucketInfo {
            name: name.to_string(),
            region: region.to_string(),
            created_at: self.clock().now(),
        };
        write_json(&dir.join(METADATA_FILE), &info)?;
        Ok(info)
    }

    /// Look up a bucket
    pub fn bucket(&self, region: &str, name: &str) -> Result<Option<BucketInfo>> {
        read_json(&self.bucket_dir(region, name)?.join(METADATA_FILE))
    }

    /// Delete a bucket and everything in it
    pub fn delete_bucket(&self, region: &str, name: &str) -> Result<()> {
        let dir = self.bucket_dir(region, name)?;
        if !dir.is_dir() {
            return Err(Error::BucketNotFound {
                name: name.to_string(),
                region: region.to_string(),
            });
        }
        fs::remove_dir_all(&dir)?;
        Ok(())
    }
}

/// Provider for `aws_s3_bucket`
///
/// The bucket name doubles as its provider id. Buckets have nothing to
/// converge in place.
#[derive(Debug, Clone)]
pub struct BucketProvider {
    sandbox: Sandbox,
}

impl BucketProvider {
    pub fn new(sandbox: Sandbox) -> Self {
        Self { sandbox }
    }
}

impl Provider for BucketProvider {
    fn kind(&self) -> ResourceKind {
        ResourceKind::StorageBucket
    }

    fn create(&self, spec: &ResourceSpec) -> std::result::Result<String, ProviderError> {
        log::info!("Provisioning bucket '{}' in {}", spec.name, spec.region);
        let info = self.sandbox.create_bucket(&spec.region, &spec.name)?;
        Ok(info.name)
    }

    fn destroy(
        &self,
        _kind: &ResourceKind,
        provider_id: &str,
        region: &str,
    ) -> std::result::Result<(), ProviderError> {
        log::info!("Destroying bucket '{provider_id}' in {region}");
        self.sandbox.delete_bucket(region, provider_id)?;
        Ok(())
    }
}
