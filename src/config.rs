//! Run configuration
//!
//! Everything a run needs, collected from CLI flags and validated before any
//! store traffic.

use crate::error::{StarchError, StarchResult};
use crate::models::{StoreLimits, MIB};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for one archive run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// CSV manifest enumerating the source objects
    pub src_manifest: Option<PathBuf>,
    /// Whether the manifest's first row is a header to skip
    #[serde(default)]
    pub skip_manifest_header: bool,
    /// Source bucket, when listing by prefix
    pub src_bucket: Option<String>,
    /// Source key prefix, when listing by prefix
    pub src_prefix: Option<String>,
    /// Destination bucket
    pub dst_bucket: String,
    /// Destination key prefix; scratch objects live under it too
    #[serde(default)]
    pub dst_prefix: String,
    /// Final archive key, relative to the prefix
    pub dst_key: String,
    /// Store region
    pub region: Option<String>,
    /// Accumulated size at which the grouper closes a batch
    #[serde(default = "default_batch_target_mib")]
    pub batch_target_mib: u64,
    /// Parallel group assemblies / header pairings
    #[serde(default = "default_group_concurrency")]
    pub group_concurrency: usize,
    /// Parallel part uploads and copies per multipart upload
    #[serde(default = "default_part_concurrency")]
    pub part_concurrency: usize,
}

fn default_batch_target_mib() -> u64 {
    10
}

fn default_group_concurrency() -> usize {
    crate::engine::context::DEFAULT_GROUP_CONCURRENCY
}

fn default_part_concurrency() -> usize {
    crate::engine::context::DEFAULT_PART_CONCURRENCY
}

impl RunConfig {
    /// Exactly one way of naming the sources, and a real destination
    pub fn validate(&self) -> StarchResult<()> {
        let by_manifest = self.src_manifest.is_some();
        let by_prefix = self.src_bucket.is_some() && self.src_prefix.is_some();
        match (by_manifest, by_prefix) {
            (true, true) => Err(StarchError::input(
                "provide either a source manifest or a source bucket/prefix, not both",
            )),
            (false, false) => Err(StarchError::input(
                "provide a source manifest, or a source bucket and prefix",
            )),
            _ => Ok(()),
        }?;
        if self.src_bucket.is_some() != self.src_prefix.is_some() {
            return Err(StarchError::input(
                "source bucket and prefix must be provided together",
            ));
        }
        if self.dst_bucket.is_empty() {
            return Err(StarchError::input("destination bucket must not be empty"));
        }
        if self.dst_key.is_empty() {
            return Err(StarchError::input("destination key must not be empty"));
        }
        if self.batch_target_mib == 0 {
            return Err(StarchError::input("batch target must be at least 1 MiB"));
        }
        Ok(())
    }

    /// Store limits with this run's batch target applied
    pub fn limits(&self) -> StoreLimits {
        StoreLimits {
            batch_target: self.batch_target_mib * MIB,
            ..StoreLimits::default()
        }
    }
}
