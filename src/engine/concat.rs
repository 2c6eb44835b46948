//! Recursive concatenation
//!
//! Builds one object out of pieces that may individually sit below the
//! minimum part size, where a flat multipart upload would be rejected.
//! Each step is a two-part upload: the accumulator so far as part one
//! (at or above the minimum by induction) and the next piece as the final
//! part, which the store accepts at any size.

use crate::error::StarchResult;
use crate::models::{ObjectRef, Piece};

use super::assemble::assemble;
use super::context::RunContext;

/// A concatenated intermediate plus the length of the pad prefix it had to
/// borrow from the shared pad object (zero when the first piece could seed
/// the accumulator by itself).
#[derive(Debug, Clone)]
pub struct ConcatOutput {
    pub obj: ObjectRef,
    pub pad_len: u64,
}

/// Concatenate `pieces` into `final_key`.
///
/// Steps within one call are serial, each depending on the previous
/// accumulator; distinct calls are independent and run in parallel from the
/// orchestrator. Step objects take a `.s{n}` suffix under the same scratch
/// prefix as `final_key`, so the run's cleanup sweep collects them.
pub async fn concat_pieces(
    ctx: &RunContext,
    pieces: &[Piece],
    final_key: &str,
) -> StarchResult<ConcatOutput> {
    if pieces.is_empty() {
        return Err(crate::error::StarchError::invariant(
            "cannot concatenate an empty piece list".to_string(),
        ));
    }

    // Lone literal: a plain upload, no multipart machinery
    if pieces.len() == 1 {
        if let Piece::Literal { bytes } = &pieces[0] {
            let obj = ctx
                .store
                .put_object(&ctx.dst_bucket, final_key, bytes.clone())
                .await?;
            return Ok(ConcatOutput { obj, pad_len: 0 });
        }
    }

    // Seed the accumulator: from the first piece alone when it clears the
    // minimum, otherwise from the shared pad object
    let (mut seed, rest, pad_len) = if pieces[0].len() >= ctx.limits.min_part_size {
        (vec![pieces[0].clone()], &pieces[1..], 0)
    } else {
        let pad = ctx.ensure_pad_object().await?;
        (
            vec![Piece::whole_of_object(&pad)],
            pieces,
            pad.size,
        )
    };

    let steps = rest.len().max(1);
    let step_key = |step: usize| -> String {
        if step + 1 == steps {
            final_key.to_string()
        } else {
            format!("{}.s{}", final_key, step)
        }
    };

    if rest.is_empty() {
        // Single remote piece at or above the minimum: one-part copy
        let obj = assemble(ctx, &seed, &ctx.dst_bucket, &step_key(0), 0).await?;
        return Ok(ConcatOutput { obj, pad_len });
    }

    let mut acc: Option<ObjectRef> = None;
    for (step, piece) in rest.iter().enumerate() {
        let first = match &acc {
            Some(obj) => Piece::whole_of_object(obj),
            None => seed.remove(0),
        };
        let two = [first, piece.clone()];
        acc = Some(assemble(ctx, &two, &ctx.dst_bucket, &step_key(step), 0).await?);
    }

    // acc is always set: rest is non-empty
    let obj = acc.ok_or_else(|| crate::error::StarchError::invariant("empty fold".to_string()))?;
    Ok(ConcatOutput { obj, pad_len })
}
