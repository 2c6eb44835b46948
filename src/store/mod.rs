//! Object store abstraction
//!
//! The engine talks to the store through the `ObjectStore` trait so the
//! assembly pipeline can run against the real S3 client or the in-memory
//! implementation used by the test suite.

pub mod memory;
pub mod s3;

use crate::error::StarchResult;
use crate::models::{CompletedPartInfo, ObjectRef};
use async_trait::async_trait;
use bytes::Bytes;

pub use memory::MemoryStore;
pub use s3::S3Store;

/// The store operations the archive engine relies on.
///
/// Every method maps to a single store call; retries are the client's
/// concern, not the engine's.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Upload a whole object in one request
    async fn put_object(&self, bucket: &str, key: &str, body: Bytes) -> StarchResult<ObjectRef>;

    /// Size and etag of an existing object
    async fn head_object(&self, bucket: &str, key: &str) -> StarchResult<ObjectRef>;

    /// Open a multipart upload, returning its upload id
    async fn create_multipart_upload(&self, bucket: &str, key: &str) -> StarchResult<String>;

    /// Upload one literal part
    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: i32,
        body: Bytes,
    ) -> StarchResult<CompletedPartInfo>;

    /// Server-side copy of an inclusive byte range of an existing object
    /// into one part
    #[allow(clippy::too_many_arguments)]
    async fn upload_part_copy(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: i32,
        src_bucket: &str,
        src_key: &str,
        range_start: u64,
        range_end: u64,
    ) -> StarchResult<CompletedPartInfo>;

    /// Commit the upload from its completed parts, returning the object etag
    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: Vec<CompletedPartInfo>,
    ) -> StarchResult<String>;

    /// Discard an upload and any parts it accumulated
    async fn abort_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> StarchResult<()>;

    /// All objects under a key prefix, in lexicographic key order
    async fn list_objects(&self, bucket: &str, prefix: &str) -> StarchResult<Vec<ObjectRef>>;

    /// Delete a batch of keys
    async fn delete_objects(&self, bucket: &str, keys: &[String]) -> StarchResult<()>;
}
