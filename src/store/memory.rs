//! In-memory store implementation
//!
//! Backs the test suite: same trait as the S3 client, no network. Beyond
//! storing bytes it enforces the store's multipart rules at completion time
//! (minimum part size, part-count ceiling, copy ranges inside the source),
//! so engine tests exercise the same rejections the real store would
//! produce.

use crate::error::{StarchError, StarchResult};
use crate::models::{CompletedPartInfo, ObjectRef, StoreLimits};
use crate::store::ObjectStore;
use async_trait::async_trait;
use bytes::Bytes;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;

pub struct MemoryStore {
    limits: StoreLimits,
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    objects: BTreeMap<(String, String), Bytes>,
    uploads: HashMap<String, Upload>,
    next_upload_id: u64,
    created_uploads: usize,
    completed_part_sizes: Vec<Vec<u64>>,
    completes_seen: usize,
    cancel_hook: Option<(CancellationToken, usize)>,
}

struct Upload {
    bucket: String,
    key: String,
    parts: BTreeMap<i32, Bytes>,
}

fn etag_of(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

impl MemoryStore {
    pub fn new(limits: StoreLimits) -> Self {
        Self {
            limits,
            inner: Mutex::new(Inner::default()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Seed a source object without going through the trait
    pub fn insert_object(&self, bucket: &str, key: &str, bytes: Bytes) -> ObjectRef {
        let etag = etag_of(&bytes);
        let size = bytes.len() as u64;
        self.lock()
            .objects
            .insert((bucket.to_string(), key.to_string()), bytes);
        ObjectRef {
            bucket: bucket.to_string(),
            key: key.to_string(),
            etag,
            size,
        }
    }

    /// Bytes of a committed object, if present
    pub fn object(&self, bucket: &str, key: &str) -> Option<Bytes> {
        self.lock()
            .objects
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    pub fn object_count(&self) -> usize {
        self.lock().objects.len()
    }

    /// Multipart uploads opened so far, committed or not
    pub fn created_upload_count(&self) -> usize {
        self.lock().created_uploads
    }

    /// Multipart uploads still open (neither completed nor aborted)
    pub fn open_upload_count(&self) -> usize {
        self.lock().uploads.len()
    }

    /// Part sizes of every completed upload, in completion order; lets tests
    /// assert the part-size law over everything the engine committed
    pub fn completed_part_sizes(&self) -> Vec<Vec<u64>> {
        self.lock().completed_part_sizes.clone()
    }

    /// Fire `token` once `after_completes` multipart uploads have committed.
    /// Used to cancel a run at a deterministic point mid-flight.
    pub fn cancel_after_completes(&self, token: CancellationToken, after_completes: usize) {
        self.lock().cancel_hook = Some((token, after_completes));
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn put_object(&self, bucket: &str, key: &str, body: Bytes) -> StarchResult<ObjectRef> {
        Ok(self.insert_object(bucket, key, body))
    }

    async fn head_object(&self, bucket: &str, key: &str) -> StarchResult<ObjectRef> {
        let inner = self.lock();
        let bytes = inner
            .objects
            .get(&(bucket.to_string(), key.to_string()))
            .ok_or_else(|| StarchError::store(format!("NoSuchKey: {}/{}", bucket, key)))?;
        Ok(ObjectRef {
            bucket: bucket.to_string(),
            key: key.to_string(),
            etag: etag_of(bytes),
            size: bytes.len() as u64,
        })
    }

    async fn create_multipart_upload(&self, bucket: &str, key: &str) -> StarchResult<String> {
        let mut inner = self.lock();
        inner.next_upload_id += 1;
        inner.created_uploads += 1;
        let id = format!("upload-{}", inner.next_upload_id);
        inner.uploads.insert(
            id.clone(),
            Upload {
                bucket: bucket.to_string(),
                key: key.to_string(),
                parts: BTreeMap::new(),
            },
        );
        Ok(id)
    }

    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: i32,
        body: Bytes,
    ) -> StarchResult<CompletedPartInfo> {
        let mut inner = self.lock();
        let etag = etag_of(&body);
        let upload = inner
            .uploads
            .get_mut(upload_id)
            .filter(|u| u.bucket == bucket && u.key == key)
            .ok_or_else(|| StarchError::store(format!("NoSuchUpload: {}", upload_id)))?;
        upload.parts.insert(part_number, body);
        Ok(CompletedPartInfo { part_number, etag })
    }

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
    ) -> StarchResult<CompletedPartInfo> {
        let mut inner = self.lock();
        let src = inner
            .objects
            .get(&(src_bucket.to_string(), src_key.to_string()))
            .ok_or_else(|| StarchError::store(format!("NoSuchKey: {}/{}", src_bucket, src_key)))?;
        if range_end < range_start || range_end >= src.len() as u64 {
            return Err(StarchError::store(format!(
                "InvalidRange: bytes={}-{} of {}/{} ({} bytes)",
                range_start,
                range_end,
                src_bucket,
                src_key,
                src.len()
            )));
        }
        let body = src.slice(range_start as usize..=range_end as usize);
        let etag = etag_of(&body);
        let upload = inner
            .uploads
            .get_mut(upload_id)
            .filter(|u| u.bucket == bucket && u.key == key)
            .ok_or_else(|| StarchError::store(format!("NoSuchUpload: {}", upload_id)))?;
        upload.parts.insert(part_number, body);
        Ok(CompletedPartInfo { part_number, etag })
    }

    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: Vec<CompletedPartInfo>,
    ) -> StarchResult<String> {
        let mut inner = self.lock();
        let upload = inner
            .uploads
            .remove(upload_id)
            .ok_or_else(|| StarchError::store(format!("NoSuchUpload: {}", upload_id)))?;
        if upload.bucket != bucket || upload.key != key {
            return Err(StarchError::store("upload does not match destination"));
        }
        if parts.len() > self.limits.max_parts {
            return Err(StarchError::store(format!(
                "TooManyParts: {} > {}",
                parts.len(),
                self.limits.max_parts
            )));
        }

        let mut sizes = Vec::with_capacity(parts.len());
        let mut body = Vec::new();
        for (idx, part) in parts.iter().enumerate() {
            let bytes = upload
                .parts
                .get(&part.part_number)
                .ok_or_else(|| StarchError::store(format!("InvalidPart: {}", part.part_number)))?;
            if etag_of(bytes) != part.etag {
                return Err(StarchError::store(format!(
                    "InvalidPart: etag mismatch on part {}",
                    part.part_number
                )));
            }
            let not_last = idx + 1 < parts.len();
            if not_last && (bytes.len() as u64) < self.limits.min_part_size {
                return Err(StarchError::store(format!(
                    "EntityTooSmall: part {} is {} bytes",
                    part.part_number,
                    bytes.len()
                )));
            }
            sizes.push(bytes.len() as u64);
            body.extend_from_slice(bytes);
        }

        let body = Bytes::from(body);
        let etag = etag_of(&body);
        inner
            .objects
            .insert((bucket.to_string(), key.to_string()), body);
        inner.completed_part_sizes.push(sizes);
        inner.completes_seen += 1;
        if let Some((token, after)) = &inner.cancel_hook {
            if inner.completes_seen >= *after {
                token.cancel();
            }
        }
        Ok(etag)
    }

    async fn abort_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> StarchResult<()> {
        let mut inner = self.lock();
        match inner.uploads.remove(upload_id) {
            Some(upload) if upload.bucket == bucket && upload.key == key => Ok(()),
            // aborting an unknown upload is a no-op, matching the store
            _ => Ok(()),
        }
    }

    async fn list_objects(&self, bucket: &str, prefix: &str) -> StarchResult<Vec<ObjectRef>> {
        let inner = self.lock();
        Ok(inner
            .objects
            .iter()
            .filter(|((b, k), _)| b == bucket && k.starts_with(prefix))
            .map(|((b, k), bytes)| ObjectRef {
                bucket: b.clone(),
                key: k.clone(),
                etag: etag_of(bytes),
                size: bytes.len() as u64,
            })
            .collect())
    }

    async fn delete_objects(&self, bucket: &str, keys: &[String]) -> StarchResult<()> {
        let mut inner = self.lock();
        for key in keys {
            inner.objects.remove(&(bucket.to_string(), key.clone()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> StoreLimits {
        StoreLimits {
            min_part_size: 8,
            max_parts: 4,
            batch_target: 16,
        }
    }

    #[tokio::test]
    async fn multipart_concatenates_in_part_order() {
        let store = MemoryStore::new(limits());
        let id = store.create_multipart_upload("b", "k").await.unwrap();
        // uploaded out of order; completion order is what counts
        let p2 = store
            .upload_part("b", "k", &id, 2, Bytes::from_static(b"tail"))
            .await
            .unwrap();
        let p1 = store
            .upload_part("b", "k", &id, 1, Bytes::from_static(b"12345678"))
            .await
            .unwrap();
        store
            .complete_multipart_upload("b", "k", &id, vec![p1, p2])
            .await
            .unwrap();
        assert_eq!(store.object("b", "k").unwrap(), Bytes::from_static(b"12345678tail"));
        assert_eq!(store.open_upload_count(), 0);
        assert_eq!(store.completed_part_sizes(), vec![vec![8, 4]]);
    }

    #[tokio::test]
    async fn undersized_non_final_part_is_rejected() {
        let store = MemoryStore::new(limits());
        let id = store.create_multipart_upload("b", "k").await.unwrap();
        let p1 = store
            .upload_part("b", "k", &id, 1, Bytes::from_static(b"tiny"))
            .await
            .unwrap();
        let p2 = store
            .upload_part("b", "k", &id, 2, Bytes::from_static(b"12345678"))
            .await
            .unwrap();
        let err = store
            .complete_multipart_upload("b", "k", &id, vec![p1, p2])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("EntityTooSmall"));
    }

    #[tokio::test]
    async fn copy_range_is_inclusive_and_bounded() {
        let store = MemoryStore::new(limits());
        store.insert_object("src", "obj", Bytes::from_static(b"0123456789"));
        let id = store.create_multipart_upload("b", "k").await.unwrap();
        let part = store
            .upload_part_copy("b", "k", &id, 1, "src", "obj", 2, 9)
            .await
            .unwrap();
        store
            .complete_multipart_upload("b", "k", &id, vec![part])
            .await
            .unwrap();
        assert_eq!(store.object("b", "k").unwrap(), Bytes::from_static(b"23456789"));

        let id = store.create_multipart_upload("b", "k2").await.unwrap();
        let err = store
            .upload_part_copy("b", "k2", &id, 1, "src", "obj", 0, 10)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("InvalidRange"));
    }

    #[tokio::test]
    async fn abort_closes_the_upload() {
        let store = MemoryStore::new(limits());
        let id = store.create_multipart_upload("b", "k").await.unwrap();
        assert_eq!(store.open_upload_count(), 1);
        store.abort_multipart_upload("b", "k", &id).await.unwrap();
        assert_eq!(store.open_upload_count(), 0);
        assert!(store.object("b", "k").is_none());
    }
}
