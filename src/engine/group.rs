//! Grouping policy
//!
//! Partitions the plan into contiguous batches whose sizes let every batch
//! intermediate serve as a non-final part in the final merge.

use crate::models::{Group, Piece, StoreLimits};

/// Walk the pieces in order, closing a group whenever the accumulated size
/// exceeds the batch target. A trailing group below the minimum part size is
/// merged into its predecessor, so only the last group of the run may end up
/// undersized, and only when the whole plan is one group.
pub fn group_pieces(pieces: &[Piece], limits: &StoreLimits) -> Vec<Group> {
    let mut groups: Vec<Group> = Vec::new();
    let mut start = 0usize;
    let mut curr = 0u64;

    for (i, piece) in pieces.iter().enumerate() {
        curr += piece.len();
        if curr > limits.batch_target {
            groups.push(Group {
                start,
                end: i + 1,
                size: curr,
            });
            start = i + 1;
            curr = 0;
        }
    }
    if start < pieces.len() {
        groups.push(Group {
            start,
            end: pieces.len(),
            size: curr,
        });
    }

    if groups.len() >= 2 {
        let last = groups[groups.len() - 1].clone();
        if last.size < limits.min_part_size {
            groups.pop();
            let merged = groups
                .last_mut()
                .map(|prev| {
                    prev.end = last.end;
                    prev.size += last.size;
                })
                .is_some();
            debug_assert!(merged);
        }
    }

    groups
}
