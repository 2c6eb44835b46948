//! Parallel multipart assembly
//!
//! One call builds one destination object through one multipart upload:
//! part numbers follow piece order, parts are dispatched in parallel under a
//! counting semaphore, and the upload is always either completed or aborted
//! before returning.

use crate::error::{StarchError, StarchResult};
use crate::models::{CompletedPartInfo, ObjectRef, Piece};
use crate::store::ObjectStore;
use futures::future::join_all;
use log::{debug, warn};
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};
use tokio_util::sync::CancellationToken;

use super::context::RunContext;

/// Assemble `pieces` into `dst_bucket/dst_key`.
///
/// `trim_prefix` shifts the copy range of a remote-whole piece at index 0,
/// which is how the final recursive merge drops the leading pad without a
/// separate rewrite. Sizing preconditions (every part but the last at or
/// above the minimum) are the caller's responsibility; violations come back
/// as store errors.
pub async fn assemble(
    ctx: &RunContext,
    pieces: &[Piece],
    dst_bucket: &str,
    dst_key: &str,
    trim_prefix: u64,
) -> StarchResult<ObjectRef> {
    ctx.check_cancelled()?;
    debug!(
        "assembling {} piece(s) into {}/{} (trim {})",
        pieces.len(),
        dst_bucket,
        dst_key,
        trim_prefix
    );

    let store = Arc::clone(&ctx.store);
    let upload_id = store.create_multipart_upload(dst_bucket, dst_key).await?;

    let semaphore = Arc::new(Semaphore::new(ctx.part_concurrency));
    let completed: Arc<Mutex<Vec<CompletedPartInfo>>> =
        Arc::new(Mutex::new(Vec::with_capacity(pieces.len())));

    let mut tasks = Vec::with_capacity(pieces.len());
    for (idx, piece) in pieces.iter().enumerate() {
        let part_number = (idx + 1) as i32;
        let piece = piece.clone();
        let trim = if idx == 0 { trim_prefix } else { 0 };
        let store = Arc::clone(&store);
        let semaphore = Arc::clone(&semaphore);
        let completed = Arc::clone(&completed);
        let cancel = ctx.cancel.clone();
        let bucket = dst_bucket.to_string();
        let key = dst_key.to_string();
        let upload_id = upload_id.clone();

        tasks.push(tokio::spawn(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .map_err(|e| StarchError::Task(e.to_string()))?;
            let part = dispatch_part(
                store.as_ref(),
                &cancel,
                &piece,
                &bucket,
                &key,
                &upload_id,
                part_number,
                trim,
            )
            .await?;
            completed.lock().await.push(part);
            Ok::<(), StarchError>(())
        }));
    }

    // Wait for every in-flight part before deciding the upload's fate
    let mut failure: Option<StarchError> = None;
    for result in join_all(tasks).await {
        let outcome = result.unwrap_or_else(|e| Err(StarchError::Task(e.to_string())));
        if let Err(err) = outcome {
            failure.get_or_insert(err);
        }
    }

    if let Some(err) = failure {
        if let Err(abort_err) = store
            .abort_multipart_upload(dst_bucket, dst_key, &upload_id)
            .await
        {
            warn!("abort of {}/{} failed: {}", dst_bucket, dst_key, abort_err);
        }
        return Err(err);
    }

    let mut parts = {
        let mut guard = completed.lock().await;
        std::mem::take(&mut *guard)
    };
    parts.sort_by_key(|p| p.part_number);

    let etag = store
        .complete_multipart_upload(dst_bucket, dst_key, &upload_id, parts)
        .await?;

    let size = pieces.iter().map(Piece::len).sum::<u64>() - trim_prefix;
    Ok(ObjectRef {
        bucket: dst_bucket.to_string(),
        key: dst_key.to_string(),
        etag,
        size,
    })
}

#[allow(clippy::too_many_arguments)]
async fn dispatch_part(
    store: &dyn ObjectStore,
    cancel: &CancellationToken,
    piece: &Piece,
    bucket: &str,
    key: &str,
    upload_id: &str,
    part_number: i32,
    trim: u64,
) -> StarchResult<CompletedPartInfo> {
    if cancel.is_cancelled() {
        return Err(StarchError::Cancelled);
    }
    match piece {
        Piece::Literal { bytes } => {
            store
                .upload_part(bucket, key, upload_id, part_number, bytes.clone())
                .await
        }
        Piece::RemoteRange {
            bucket: src_bucket,
            key: src_key,
            start,
            end,
        } => {
            store
                .upload_part_copy(
                    bucket, key, upload_id, part_number, src_bucket, src_key, *start, *end,
                )
                .await
        }
        Piece::RemoteWhole {
            bucket: src_bucket,
            key: src_key,
            size,
        } => {
            store
                .upload_part_copy(
                    bucket,
                    key,
                    upload_id,
                    part_number,
                    src_bucket,
                    src_key,
                    trim,
                    size - 1,
                )
                .await
        }
    }
}
