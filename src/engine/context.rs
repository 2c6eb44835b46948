//! Run-scoped state threaded through the engine
//!
//! One `RunContext` is built at orchestrator start and passed down
//! explicitly; there is no ambient store client or global pad buffer.

use crate::error::{StarchError, StarchResult};
use crate::models::{ObjectRef, StoreLimits};
use crate::store::ObjectStore;
use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;

use super::redistribute::{DefaultPartPolicy, PartPolicy};

/// Fan-out bound for group assembly and large-file header pairing
pub const DEFAULT_GROUP_CONCURRENCY: usize = 25;
/// Fan-out bound for part uploads and copies within one multipart upload
pub const DEFAULT_PART_CONCURRENCY: usize = 100;

pub struct RunContext {
    pub store: Arc<dyn ObjectStore>,
    pub limits: StoreLimits,
    pub dst_bucket: String,
    pub dst_prefix: String,
    pub dst_key: String,
    /// Shared zero buffer of exactly the minimum part size; cloned cheaply
    /// wherever pad bytes are needed
    pub zero_pad: Bytes,
    pub cancel: CancellationToken,
    pub part_policy: Arc<dyn PartPolicy>,
    pub group_concurrency: usize,
    pub part_concurrency: usize,
    pad_object: OnceCell<ObjectRef>,
}

impl RunContext {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        limits: StoreLimits,
        dst_bucket: &str,
        dst_prefix: &str,
        dst_key: &str,
    ) -> Self {
        Self {
            store,
            limits,
            dst_bucket: dst_bucket.to_string(),
            dst_prefix: dst_prefix.trim_matches('/').to_string(),
            dst_key: dst_key.to_string(),
            zero_pad: Bytes::from(vec![0u8; limits.min_part_size as usize]),
            cancel: CancellationToken::new(),
            part_policy: Arc::new(DefaultPartPolicy::default()),
            group_concurrency: DEFAULT_GROUP_CONCURRENCY,
            part_concurrency: DEFAULT_PART_CONCURRENCY,
            pad_object: OnceCell::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_part_policy(mut self, policy: Arc<dyn PartPolicy>) -> Self {
        self.part_policy = policy;
        self
    }

    pub fn with_concurrency(mut self, groups: usize, parts: usize) -> Self {
        self.group_concurrency = groups.max(1);
        self.part_concurrency = parts.max(1);
        self
    }

    /// A destination-bucket key under the run's prefix
    pub fn scoped_key(&self, rest: &str) -> String {
        if self.dst_prefix.is_empty() {
            rest.to_string()
        } else {
            format!("{}/{}", self.dst_prefix, rest)
        }
    }

    pub fn parts_prefix(&self) -> String {
        self.scoped_key("parts/")
    }

    pub fn headers_prefix(&self) -> String {
        self.scoped_key("headers/")
    }

    pub fn temp_key(&self) -> String {
        self.scoped_key(&format!("{}.temp", self.dst_key))
    }

    pub fn final_key(&self) -> String {
        self.scoped_key(&self.dst_key)
    }

    fn pad_key(&self) -> String {
        self.scoped_key("parts/zero.pad")
    }

    /// The singleton pad object, materialised on first use and shared by
    /// every concatenation in the run
    pub async fn ensure_pad_object(&self) -> StarchResult<ObjectRef> {
        self.pad_object
            .get_or_try_init(|| async {
                self.store
                    .put_object(&self.dst_bucket, &self.pad_key(), self.zero_pad.clone())
                    .await
            })
            .await
            .cloned()
    }

    pub fn check_cancelled(&self) -> StarchResult<()> {
        if self.cancel.is_cancelled() {
            Err(StarchError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn ctx(prefix: &str) -> RunContext {
        RunContext::new(
            Arc::new(MemoryStore::new(StoreLimits::default())),
            StoreLimits::default(),
            "dst",
            prefix,
            "archive.tar",
        )
    }

    #[test]
    fn keys_are_scoped_under_the_prefix() {
        let ctx = ctx("backups/2024");
        assert_eq!(ctx.final_key(), "backups/2024/archive.tar");
        assert_eq!(ctx.temp_key(), "backups/2024/archive.tar.temp");
        assert_eq!(ctx.parts_prefix(), "backups/2024/parts/");
        assert_eq!(ctx.headers_prefix(), "backups/2024/headers/");
    }

    #[test]
    fn empty_prefix_keys_have_no_leading_slash() {
        let ctx = ctx("");
        assert_eq!(ctx.final_key(), "archive.tar");
        assert_eq!(ctx.parts_prefix(), "parts/");
    }

    #[tokio::test]
    async fn pad_object_is_materialised_once() {
        let ctx = ctx("out");
        let first = ctx.ensure_pad_object().await.unwrap();
        let again = ctx.ensure_pad_object().await.unwrap();
        assert_eq!(first, again);
        assert_eq!(first.size, ctx.limits.min_part_size);
        assert_eq!(first.key, "out/parts/zero.pad");
    }
}
