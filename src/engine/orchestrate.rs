//! Run orchestration
//!
//! Chooses the small-file or large-file path, drives planning, grouping,
//! assembly and the final rewrite, and sweeps the scratch prefixes once the
//! final object has landed. Failures leave scratch in place for diagnosis.

use crate::error::{StarchError, StarchResult};
use crate::manifest;
use crate::models::{Entry, ObjectRef, Piece, Plan};
use bytes::Bytes;
use chrono::Utc;
use futures::future::join_all;
use log::{info, warn};
use std::sync::Arc;
use tokio::sync::Semaphore;

use super::concat::{concat_pieces, ConcatOutput};
use super::context::RunContext;
use super::redistribute::redistribute;
use super::{assemble::assemble, group, plan};

/// What an assembly path produced
enum Assembled {
    /// Pad-prefixed object that still needs the trimming rewrite
    Oversized(ObjectRef),
    /// The final object, already trimmed in the last recursive merge
    Final(ObjectRef),
}

/// Build the archive for `entries` and return the final object.
pub async fn run(ctx: Arc<RunContext>, entries: Vec<Entry>) -> StarchResult<ObjectRef> {
    if entries.is_empty() {
        return Err(StarchError::input("no source objects to archive"));
    }
    let total: u64 = entries.iter().map(|e| e.size).sum();
    if total < ctx.limits.min_part_size {
        return Err(StarchError::input(format!(
            "total source size {} is below the {}-byte minimum the store can hold as a multipart object",
            total, ctx.limits.min_part_size
        )));
    }

    let payload = Bytes::from(manifest::render(&entries));
    let manifest_entry = manifest::manifest_entry(
        &ctx.dst_bucket,
        &ctx.dst_key,
        payload.len() as u64,
        Utc::now(),
    );
    let plan = plan::layout(ctx.zero_pad.clone(), &manifest_entry, payload, &entries);
    plan::verify(&plan, &ctx.limits)?;

    let small_path = entries.iter().any(|e| e.size < ctx.limits.min_part_size);
    info!(
        "archiving {} entries ({} bytes) via the {} path",
        entries.len(),
        total,
        if small_path { "small-file" } else { "large-file" }
    );

    let assembled = if small_path {
        small_file_path(&ctx, &plan).await?
    } else {
        large_file_path(&ctx, &plan).await?
    };

    let final_obj = match assembled {
        Assembled::Oversized(oversized) => {
            ctx.check_cancelled()?;
            redistribute(&ctx, &oversized, &ctx.final_key(), plan.trim_prefix).await?
        }
        Assembled::Final(obj) => obj,
    };

    cleanup(&ctx).await?;
    info!(
        "archive complete: {}/{} ({} bytes)",
        final_obj.bucket, final_obj.key, final_obj.size
    );
    Ok(final_obj)
}

/// Small-file path: group the plan, concatenate each group in parallel,
/// then merge the group intermediates.
async fn small_file_path(ctx: &Arc<RunContext>, plan: &Plan) -> StarchResult<Assembled> {
    let pieces = plan::coalesce(&plan.pieces);
    let groups = group::group_pieces(&pieces, &ctx.limits);
    info!("assembling {} group(s)", groups.len());

    let semaphore = Arc::new(Semaphore::new(ctx.group_concurrency));
    let mut tasks = Vec::with_capacity(groups.len());
    for group in &groups {
        let slice: Vec<Piece> = pieces[group.start..group.end].to_vec();
        let key = ctx.scoped_key(&format!(
            "parts/iteration.batch.{}-{}",
            group.start, group.end
        ));
        let ctx = Arc::clone(ctx);
        let semaphore = Arc::clone(&semaphore);
        tasks.push(tokio::spawn(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .map_err(|e| StarchError::Task(e.to_string()))?;
            concat_pieces(&ctx, &slice, &key).await
        }));
    }

    let mut outputs: Vec<ConcatOutput> = Vec::with_capacity(groups.len());
    let mut failure: Option<StarchError> = None;
    for result in join_all(tasks).await {
        match result.unwrap_or_else(|e| Err(StarchError::Task(e.to_string()))) {
            Ok(output) => outputs.push(output),
            Err(err) => {
                failure.get_or_insert(err);
            }
        }
    }
    if let Some(err) = failure {
        return Err(err);
    }

    // One group means the intermediate already is pad + archive
    if outputs.len() == 1 {
        return Ok(Assembled::Oversized(outputs[0].obj.clone()));
    }

    // Groups guarantee this never fires, but an undersized penultimate
    // intermediate would poison the flat merge, so fall back to folding
    let penultimate_undersized =
        groups[groups.len() - 2].size < ctx.limits.min_part_size;
    if penultimate_undersized {
        return fold_intermediates(ctx, &outputs).await;
    }

    let mut merge_pieces = Vec::with_capacity(outputs.len());
    for (idx, output) in outputs.iter().enumerate() {
        merge_pieces.push(intermediate_piece(output, idx == 0));
    }
    let oversized = assemble(ctx, &merge_pieces, &ctx.dst_bucket, &ctx.temp_key(), 0).await?;
    Ok(Assembled::Oversized(oversized))
}

/// The merge-side view of a group intermediate: the first keeps its leading
/// pad (the plan pad the rewrite trims later); the rest shed the pad they
/// borrowed from the shared pad object.
fn intermediate_piece(output: &ConcatOutput, first: bool) -> Piece {
    if first || output.pad_len == 0 {
        Piece::whole_of_object(&output.obj)
    } else {
        Piece::range_of_object(&output.obj, output.pad_len, output.obj.size - 1)
    }
}

/// Recursive merge over the group intermediates themselves; the final step
/// writes the destination key directly, dropping the leading pad through the
/// assembler's trim.
async fn fold_intermediates(
    ctx: &Arc<RunContext>,
    outputs: &[ConcatOutput],
) -> StarchResult<Assembled> {
    let mut acc = outputs[0].obj.clone();
    for (idx, output) in outputs.iter().enumerate().skip(1) {
        let last = idx + 1 == outputs.len();
        let pieces = [
            Piece::whole_of_object(&acc),
            intermediate_piece(output, false),
        ];
        let (key, trim) = if last {
            (ctx.final_key(), ctx.limits.min_part_size)
        } else {
            (ctx.scoped_key(&format!("parts/merge.{}", idx)), 0)
        };
        acc = assemble(ctx, &pieces, &ctx.dst_bucket, &key, trim).await?;
    }
    Ok(Assembled::Final(acc))
}

/// Large-file path: every entry clears the minimum part size, so each
/// `(payload, next header)` pair is one flat two-part upload and the plan's
/// leading literals become a single prelude object.
async fn large_file_path(ctx: &Arc<RunContext>, plan: &Plan) -> StarchResult<Assembled> {
    let pieces = plan::coalesce(&plan.pieces);

    let Some(Piece::Literal { bytes: prelude }) = pieces.first() else {
        return Err(StarchError::invariant(
            "large-file plan does not start with a literal prelude".to_string(),
        ));
    };
    let rest = &pieces[1..];
    if rest.len() % 2 != 0 {
        return Err(StarchError::invariant(
            "large-file plan does not alternate payloads and headers".to_string(),
        ));
    }

    ctx.check_cancelled()?;
    let prelude_key = ctx.scoped_key(&format!("headers/{}.0.hdr", ctx.dst_key));
    let prelude_obj = ctx
        .store
        .put_object(&ctx.dst_bucket, &prelude_key, prelude.clone())
        .await?;

    let pair_count = rest.len() / 2;
    info!("assembling {} payload/header pair(s)", pair_count);
    let semaphore = Arc::new(Semaphore::new(ctx.group_concurrency));
    let mut tasks = Vec::with_capacity(pair_count);
    for (i, pair) in rest.chunks_exact(2).enumerate() {
        let pair: Vec<Piece> = pair.to_vec();
        let key = ctx.scoped_key(&format!("parts/{}.part-{}.hdr", i, i + 1));
        let ctx = Arc::clone(ctx);
        let semaphore = Arc::clone(&semaphore);
        tasks.push(tokio::spawn(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .map_err(|e| StarchError::Task(e.to_string()))?;
            assemble(&ctx, &pair, &ctx.dst_bucket, &key, 0).await
        }));
    }

    let mut pair_objs: Vec<ObjectRef> = Vec::with_capacity(pair_count);
    let mut failure: Option<StarchError> = None;
    for result in join_all(tasks).await {
        match result.unwrap_or_else(|e| Err(StarchError::Task(e.to_string()))) {
            Ok(obj) => pair_objs.push(obj),
            Err(err) => {
                failure.get_or_insert(err);
            }
        }
    }
    if let Some(err) = failure {
        return Err(err);
    }

    let mut merge_pieces = Vec::with_capacity(1 + pair_objs.len());
    merge_pieces.push(Piece::whole_of_object(&prelude_obj));
    for obj in &pair_objs {
        merge_pieces.push(Piece::whole_of_object(obj));
    }
    let oversized = assemble(ctx, &merge_pieces, &ctx.dst_bucket, &ctx.temp_key(), 0).await?;
    Ok(Assembled::Oversized(oversized))
}

/// Delete the oversized temporary and everything under the scratch prefixes
async fn cleanup(ctx: &RunContext) -> StarchResult<()> {
    let mut keys = vec![ctx.temp_key()];
    for prefix in [ctx.parts_prefix(), ctx.headers_prefix()] {
        let scratch = ctx.store.list_objects(&ctx.dst_bucket, &prefix).await?;
        keys.extend(scratch.into_iter().map(|obj| obj.key));
    }
    info!("cleaning {} scratch object(s)", keys.len());
    if let Err(err) = ctx.store.delete_objects(&ctx.dst_bucket, &keys).await {
        warn!("scratch cleanup failed: {}", err);
        return Err(err);
    }
    Ok(())
}
