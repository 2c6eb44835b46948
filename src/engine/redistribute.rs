//! Final rewrite
//!
//! After assembly the destination holds `pad + archive`. The redistributor
//! rewrites it under the final key with the pad trimmed and the parts
//! rebalanced to even sizes, using nothing but range copies of the oversized
//! object, which keeps the rewrite free of data transfer.

use crate::error::StarchResult;
use crate::models::{ObjectRef, Piece, StoreLimits};
use log::info;

use super::assemble::assemble;
use super::context::RunContext;

/// Candidate part counts for one rewrite
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartWindow {
    pub min: u64,
    pub max: u64,
    pub mid: u64,
}

/// Policy choosing the part-count window for a final object size
pub trait PartPolicy: Send + Sync {
    fn window(&self, final_size: u64, limits: &StoreLimits) -> PartWindow;
}

/// Default policy: the largest candidate keeps every part at or above the
/// minimum part size, the smallest keeps every part within the single-part
/// ceiling, and `mid` splits the window.
pub struct DefaultPartPolicy {
    pub max_part_size: u64,
}

impl Default for DefaultPartPolicy {
    fn default() -> Self {
        Self {
            max_part_size: 5 * 1024 * 1024 * 1024,
        }
    }
}

impl PartPolicy for DefaultPartPolicy {
    fn window(&self, final_size: u64, limits: &StoreLimits) -> PartWindow {
        let max = (final_size / limits.min_part_size).clamp(1, limits.max_parts as u64);
        let min = final_size.div_ceil(self.max_part_size).clamp(1, max);
        PartWindow {
            min,
            max,
            mid: (min + max) / 2,
        }
    }
}

/// Scan `max` down to `min` for the first count dividing `final_size`
/// evenly; fall back to `mid` with the last part absorbing the remainder.
pub fn choose_part_count(final_size: u64, window: PartWindow) -> u64 {
    (window.min..=window.max)
        .rev()
        .find(|i| final_size % i == 0)
        .unwrap_or(window.mid)
}

/// The inclusive copy ranges for `k` parts of the oversized object,
/// skipping `trim_offset` leading bytes
fn copy_ranges(src_size: u64, trim_offset: u64, k: u64) -> Vec<(u64, u64)> {
    let part_size = (src_size - trim_offset) / k;
    (0..k)
        .map(|j| {
            let start = trim_offset + j * part_size;
            let end = if j + 1 == k {
                src_size - 1
            } else {
                start + part_size - 1
            };
            (start, end)
        })
        .collect()
}

/// Rewrite `src` as `dst_key` without its first `trim_offset` bytes
pub async fn redistribute(
    ctx: &RunContext,
    src: &ObjectRef,
    dst_key: &str,
    trim_offset: u64,
) -> StarchResult<ObjectRef> {
    let final_size = src.size - trim_offset;
    let window = ctx.part_policy.window(final_size, &ctx.limits);
    let k = choose_part_count(final_size, window);
    info!(
        "redistributing {} bytes into {} part(s) of ~{} bytes",
        final_size,
        k,
        final_size / k
    );

    let pieces: Vec<Piece> = copy_ranges(src.size, trim_offset, k)
        .into_iter()
        .map(|(start, end)| Piece::range_of_object(src, start, end))
        .collect();
    assemble(ctx, &pieces, &ctx.dst_bucket, dst_key, 0).await
}
