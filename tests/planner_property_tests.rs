// Property tests for the layout planner and grouping policy.

use bytes::Bytes;
use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use starch::engine::{group, plan};
use starch::{manifest, Entry, Piece, StoreLimits};

const PAD: u64 = 64 * 1024;

fn limits() -> StoreLimits {
    StoreLimits {
        min_part_size: PAD,
        max_parts: 10_000,
        batch_target: 4 * PAD,
    }
}

fn entries_from(sizes: &[u64]) -> Vec<Entry> {
    let mtime = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
    sizes
        .iter()
        .enumerate()
        .map(|(i, &size)| Entry::new("src", format!("k/{:04}", i), size, "etag", mtime))
        .collect()
}

fn plan_for(sizes: &[u64]) -> starch::Plan {
    let entries = entries_from(sizes);
    let payload = manifest::render(&entries);
    let now = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
    let m = manifest::manifest_entry("dst", "a.tar", payload.len() as u64, now);
    plan::layout(
        Bytes::from(vec![0u8; PAD as usize]),
        &m,
        Bytes::from(payload),
        &entries,
    )
}

proptest! {
    #[test]
    fn archive_is_always_block_aligned(sizes in prop::collection::vec(0u64..200_000, 1..40)) {
        let plan = plan_for(&sizes);
        prop_assert_eq!(plan.archive_len() % 512, 0);
        prop_assert_eq!(plan.trim_prefix, PAD);
    }

    #[test]
    fn every_nonempty_entry_is_one_remote_piece(sizes in prop::collection::vec(0u64..200_000, 1..40)) {
        let plan = plan_for(&sizes);
        let remote_sizes: Vec<u64> = plan
            .pieces
            .iter()
            .filter_map(|p| match p {
                Piece::RemoteWhole { size, .. } => Some(*size),
                _ => None,
            })
            .collect();
        let expected: Vec<u64> = sizes.iter().copied().filter(|&s| s > 0).collect();
        prop_assert_eq!(remote_sizes, expected);
    }

    #[test]
    fn planning_twice_gives_identical_layouts(sizes in prop::collection::vec(0u64..200_000, 1..40)) {
        let a = plan_for(&sizes);
        let b = plan_for(&sizes);
        prop_assert_eq!(a.pieces.len(), b.pieces.len());
        for (pa, pb) in a.pieces.iter().zip(&b.pieces) {
            prop_assert_eq!(pa.len(), pb.len());
            if let (Piece::Literal { bytes: ba }, Piece::Literal { bytes: bb }) = (pa, pb) {
                prop_assert_eq!(ba, bb);
            }
        }
    }

    #[test]
    fn coalescing_never_changes_the_byte_layout(sizes in prop::collection::vec(0u64..200_000, 1..40)) {
        let plan = plan_for(&sizes);
        let fused = plan::coalesce(&plan.pieces);
        prop_assert_eq!(
            fused.iter().map(Piece::len).sum::<u64>(),
            plan.total_len()
        );
        // no two adjacent literals survive
        for pair in fused.windows(2) {
            prop_assert!(!(pair[0].is_literal() && pair[1].is_literal()));
        }
    }

    #[test]
    fn groups_partition_the_plan(sizes in prop::collection::vec(0u64..200_000, 1..40)) {
        let plan = plan_for(&sizes);
        let pieces = plan::coalesce(&plan.pieces);
        let groups = group::group_pieces(&pieces, &limits());

        let mut next = 0usize;
        for g in &groups {
            prop_assert_eq!(g.start, next);
            prop_assert!(g.end > g.start);
            prop_assert_eq!(
                g.size,
                pieces[g.start..g.end].iter().map(Piece::len).sum::<u64>()
            );
            next = g.end;
        }
        prop_assert_eq!(next, pieces.len());
    }

    #[test]
    fn only_the_last_group_may_be_undersized(sizes in prop::collection::vec(0u64..200_000, 1..40)) {
        let plan = plan_for(&sizes);
        let pieces = plan::coalesce(&plan.pieces);
        let groups = group::group_pieces(&pieces, &limits());
        for g in &groups[..groups.len().saturating_sub(1)] {
            prop_assert!(g.size >= limits().min_part_size);
        }
    }
}
