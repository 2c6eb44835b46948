//! S3-backed store client
//!
//! Thin mapping from the `ObjectStore` trait onto `aws-sdk-s3`. Retries and
//! timeouts come from the SDK's own retry policy; every failure here is
//! surfaced as a fatal store error for the enclosing upload.

use crate::error::{StarchError, StarchResult};
use crate::models::{CompletedPartInfo, ObjectRef};
use crate::store::ObjectStore;
use async_trait::async_trait;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart, Delete, ObjectIdentifier};
use bytes::Bytes;
use log::debug;

pub struct S3Store {
    client: aws_sdk_s3::Client,
}

impl S3Store {
    pub fn new(client: aws_sdk_s3::Client) -> Self {
        Self { client }
    }
}

fn sdk_err<E>(op: &str, err: E) -> StarchError
where
    E: std::error::Error + Send + Sync + 'static,
{
    StarchError::Store(format!("{}: {}", op, DisplayErrorContext(&err)))
}

fn copy_source(bucket: &str, key: &str) -> String {
    format!("{}/{}", bucket, key)
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn put_object(&self, bucket: &str, key: &str, body: Bytes) -> StarchResult<ObjectRef> {
        let size = body.len() as u64;
        let out = self
            .client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| sdk_err("put_object", e))?;
        Ok(ObjectRef {
            bucket: bucket.to_string(),
            key: key.to_string(),
            etag: out.e_tag().unwrap_or_default().to_string(),
            size,
        })
    }

    async fn head_object(&self, bucket: &str, key: &str) -> StarchResult<ObjectRef> {
        let out = self
            .client
            .head_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| sdk_err("head_object", e))?;
        let size = out
            .content_length()
            .and_then(|len| u64::try_from(len).ok())
            .unwrap_or(0);
        Ok(ObjectRef {
            bucket: bucket.to_string(),
            key: key.to_string(),
            etag: out.e_tag().unwrap_or_default().to_string(),
            size,
        })
    }

    async fn create_multipart_upload(&self, bucket: &str, key: &str) -> StarchResult<String> {
        let out = self
            .client
            .create_multipart_upload()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| sdk_err("create_multipart_upload", e))?;
        out.upload_id()
            .map(str::to_string)
            .ok_or_else(|| StarchError::store("create_multipart_upload returned no upload id"))
    }

    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: i32,
        body: Bytes,
    ) -> StarchResult<CompletedPartInfo> {
        debug!(
            "upload_part {}/{} part {} ({} bytes)",
            bucket,
            key,
            part_number,
            body.len()
        );
        let out = self
            .client
            .upload_part()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(part_number)
            .content_length(body.len() as i64)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| sdk_err("upload_part", e))?;
        Ok(CompletedPartInfo {
            part_number,
            etag: out.e_tag().unwrap_or_default().to_string(),
        })
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
        debug!(
            "upload_part_copy {}/{} part {} <- {}/{} bytes={}-{}",
            bucket, key, part_number, src_bucket, src_key, range_start, range_end
        );
        let out = self
            .client
            .upload_part_copy()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(part_number)
            .copy_source(copy_source(src_bucket, src_key))
            .copy_source_range(format!("bytes={}-{}", range_start, range_end))
            .send()
            .await
            .map_err(|e| sdk_err("upload_part_copy", e))?;
        let etag = out
            .copy_part_result()
            .and_then(|r| r.e_tag())
            .unwrap_or_default()
            .to_string();
        Ok(CompletedPartInfo { part_number, etag })
    }

    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: Vec<CompletedPartInfo>,
    ) -> StarchResult<String> {
        let completed: Vec<CompletedPart> = parts
            .iter()
            .map(|p| {
                CompletedPart::builder()
                    .part_number(p.part_number)
                    .e_tag(&p.etag)
                    .build()
            })
            .collect();
        let out = self
            .client
            .complete_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(completed))
                    .build(),
            )
            .send()
            .await
            .map_err(|e| sdk_err("complete_multipart_upload", e))?;
        Ok(out.e_tag().unwrap_or_default().to_string())
    }

    async fn abort_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> StarchResult<()> {
        self.client
            .abort_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await
            .map_err(|e| sdk_err("abort_multipart_upload", e))?;
        Ok(())
    }

    async fn list_objects(&self, bucket: &str, prefix: &str) -> StarchResult<Vec<ObjectRef>> {
        let mut objects = Vec::new();
        let mut continuation: Option<String> = None;
        loop {
            let out = self
                .client
                .list_objects_v2()
                .bucket(bucket)
                .prefix(prefix)
                .set_continuation_token(continuation.clone())
                .send()
                .await
                .map_err(|e| sdk_err("list_objects", e))?;
            for obj in out.contents() {
                let Some(key) = obj.key() else { continue };
                objects.push(ObjectRef {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                    etag: obj.e_tag().unwrap_or_default().to_string(),
                    size: obj
                        .size()
                        .and_then(|len| u64::try_from(len).ok())
                        .unwrap_or(0),
                });
            }
            continuation = out.next_continuation_token().map(str::to_string);
            if continuation.is_none() {
                break;
            }
        }
        objects.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(objects)
    }

    async fn delete_objects(&self, bucket: &str, keys: &[String]) -> StarchResult<()> {
        // DeleteObjects caps each request at 1000 keys
        for chunk in keys.chunks(1000) {
            let ids: Vec<ObjectIdentifier> = chunk
                .iter()
                .map(|key| {
                    ObjectIdentifier::builder()
                        .key(key)
                        .build()
                        .map_err(|e| sdk_err("delete_objects", e))
                })
                .collect::<StarchResult<_>>()?;
            let delete = Delete::builder()
                .set_objects(Some(ids))
                .quiet(true)
                .build()
                .map_err(|e| sdk_err("delete_objects", e))?;
            self.client
                .delete_objects()
                .bucket(bucket)
                .delete(delete)
                .send()
                .await
                .map_err(|e| sdk_err("delete_objects", e))?;
        }
        Ok(())
    }
}
