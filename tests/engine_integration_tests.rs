// End-to-end engine tests against the in-memory store: archive correctness,
// part-size law, scratch cleanup and cancellation.

mod common;

use bytes::Bytes;
use common::{parse_archive, payload, run_context, scaled_limits, seed_entries, KIB};
use starch::engine::run;
use starch::{manifest, MemoryStore, StarchError, StoreLimits, MIB};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Every committed upload obeys the store's part rules
fn assert_part_law(store: &MemoryStore, limits: &StoreLimits) {
    for sizes in store.completed_part_sizes() {
        assert!(sizes.len() <= limits.max_parts);
        let Some((_, non_final)) = sizes.split_last() else {
            continue;
        };
        for &size in non_final {
            assert!(
                size >= limits.min_part_size,
                "non-final part of {} bytes below minimum {}",
                size,
                limits.min_part_size
            );
        }
    }
}

/// Nothing is left under the scratch prefixes and no upload is open
async fn assert_clean(store: &MemoryStore) {
    use starch::ObjectStore;
    assert_eq!(store.open_upload_count(), 0);
    for prefix in ["out/parts/", "out/headers/"] {
        let leftovers = store.list_objects("dst", prefix).await.unwrap();
        assert!(
            leftovers.is_empty(),
            "scratch remains under {}: {:?}",
            prefix,
            leftovers.iter().map(|o| &o.key).collect::<Vec<_>>()
        );
    }
    assert!(store.object("dst", "out/archive.tar.temp").is_none());
}

/// The archive lists the manifest plus every entry, in order, and every
/// payload is byte-identical to its source object.
fn assert_archive_contents(archive: &[u8], sizes: &[u64]) {
    let listed = parse_archive(archive);
    assert_eq!(listed.len(), sizes.len() + 1);
    assert_eq!(listed[0].name, "archive.tar.manifest.csv");

    for (i, &size) in sizes.iter().enumerate() {
        let entry = &listed[i + 1];
        assert_eq!(entry.name, format!("data/obj-{:05}.bin", i));
        assert_eq!(entry.size, size);
        let got = &archive[entry.offset as usize..(entry.offset + size) as usize];
        assert_eq!(
            Bytes::copy_from_slice(got),
            payload(i as u8, size as usize),
            "payload {} differs from its source",
            i
        );
    }
}

#[tokio::test]
async fn small_entries_take_the_grouped_path() {
    // three 4 MiB entries: every entry is below the 5 MiB minimum
    let limits = StoreLimits::default();
    let store = Arc::new(MemoryStore::new(limits));
    let sizes = vec![4 * MIB, 4 * MIB, 4 * MIB];
    let entries = seed_entries(&store, "src", &sizes);
    let ctx = run_context(store.clone(), limits);

    let final_obj = run(ctx, entries.clone()).await.unwrap();
    assert_eq!(final_obj.key, "out/archive.tar");

    let archive = store.object("dst", "out/archive.tar").unwrap();
    assert_eq!(archive.len() as u64, final_obj.size);
    assert_eq!(archive.len() % 512, 0);

    // expected length: manifest header+payload, three headers and payloads
    // (4 MiB is block aligned), trailer
    let manifest_len = manifest::render(&entries).len() as u64;
    let manifest_padded = manifest_len.div_ceil(512) * 512;
    let expected = 512 + manifest_padded + 3 * 512 + 12 * MIB + 1024;
    assert_eq!(archive.len() as u64, expected);

    assert_archive_contents(&archive, &sizes);
    assert_part_law(&store, &limits);
    assert_clean(&store).await;
}

#[tokio::test]
async fn archived_manifest_lists_the_sources() {
    let limits = scaled_limits();
    let store = Arc::new(MemoryStore::new(limits));
    let sizes = vec![10 * KIB, 3 * KIB, 7 * KIB];
    let entries = seed_entries(&store, "src", &sizes);
    let ctx = run_context(store.clone(), limits);

    run(ctx, entries.clone()).await.unwrap();

    let archive = store.object("dst", "out/archive.tar").unwrap();
    let listed = parse_archive(&archive);
    let manifest_entry = &listed[0];
    let got = &archive[manifest_entry.offset as usize
        ..(manifest_entry.offset + manifest_entry.size) as usize];
    assert_eq!(got, manifest::render(&entries).as_slice());
}

#[tokio::test]
async fn large_entries_take_the_pair_path_and_rebalance() {
    // two 16 MiB entries: every entry clears the minimum, so payload/header
    // pairs are flat two-part uploads
    let limits = StoreLimits::default();
    let store = Arc::new(MemoryStore::new(limits));
    let sizes = vec![16 * MIB, 16 * MIB];
    let entries = seed_entries(&store, "src", &sizes);
    let ctx = run_context(store.clone(), limits);

    let final_obj = run(ctx, entries).await.unwrap();

    let archive = store.object("dst", "out/archive.tar").unwrap();
    // manifest header + padded payload + two entry headers + trailer
    assert_eq!(archive.len() as u64, 32 * MIB + 3072);
    assert_eq!(final_obj.size, 32 * MIB + 3072);
    assert_archive_contents(&archive, &sizes);

    // 32 MiB + 3072 divides four ways evenly within the part window, so the
    // rewrite lands exactly four equal parts
    let last_parts = store
        .completed_part_sizes()
        .into_iter()
        .last()
        .unwrap();
    assert_eq!(last_parts, vec![(32 * MIB + 3072) / 4; 4]);

    assert_part_law(&store, &limits);
    assert_clean(&store).await;
}

#[tokio::test]
async fn below_minimum_total_is_an_input_error_before_io() {
    let limits = StoreLimits::default();
    let store = Arc::new(MemoryStore::new(limits));
    let entries = seed_entries(&store, "src", &[4 * MIB]);
    let ctx = run_context(store.clone(), limits);

    let err = run(ctx, entries).await.unwrap_err();
    assert!(matches!(err, StarchError::Input(_)));
    // nothing was written or opened: only the seeded source remains
    assert_eq!(store.created_upload_count(), 0);
    assert_eq!(store.object_count(), 1);
}

#[tokio::test]
async fn empty_source_set_is_an_input_error() {
    let limits = StoreLimits::default();
    let store = Arc::new(MemoryStore::new(limits));
    let ctx = run_context(store.clone(), limits);
    let err = run(ctx, Vec::new()).await.unwrap_err();
    assert!(matches!(err, StarchError::Input(_)));
}

#[tokio::test]
async fn ten_thousand_tiny_entries_stay_within_part_limits() {
    // lots of 1 KiB entries against proportionally scaled limits; the law
    // under test is relative to min_part_size
    let limits = StoreLimits {
        min_part_size: 2 * KIB,
        max_parts: 10_000,
        batch_target: 4 * KIB,
    };
    let store = Arc::new(MemoryStore::new(limits));
    let sizes = vec![KIB; 10_000];
    let entries = seed_entries(&store, "src", &sizes);
    let ctx = run_context(store.clone(), limits);

    let final_obj = run(ctx, entries).await.unwrap();

    let archive = store.object("dst", "out/archive.tar").unwrap();
    assert_eq!(archive.len() as u64, final_obj.size);
    let listed = parse_archive(&archive);
    assert_eq!(listed.len(), 10_001);

    // spot-check payload identity across the range
    for i in [0usize, 1, 4_999, 9_999] {
        let entry = &listed[i + 1];
        assert_eq!(entry.name, format!("data/obj-{:05}.bin", i));
        let got = &archive[entry.offset as usize..(entry.offset + KIB) as usize];
        assert_eq!(Bytes::copy_from_slice(got), payload(i as u8, KIB as usize));
    }

    assert_part_law(&store, &limits);
    assert_clean(&store).await;
}

#[tokio::test]
async fn long_keys_survive_prefix_split_and_pax() {
    let limits = scaled_limits();
    let store = Arc::new(MemoryStore::new(limits));

    // 120 characters with a slash: ustar prefix/name split
    let split_key = format!("{}/{}", "d".repeat(60), "f".repeat(59));
    // 120 characters without one: PAX long-name extension
    let pax_key = "x".repeat(120);
    let split_obj = store.insert_object("src", &split_key, payload(1, 9 * 1024));
    let pax_obj = store.insert_object("src", &pax_key, payload(2, 9 * 1024));

    let mtime = chrono::Utc::now();
    let entries = vec![
        starch::Entry::new("src", split_key.clone(), 9 * 1024, split_obj.etag, mtime),
        starch::Entry::new("src", pax_key.clone(), 9 * 1024, pax_obj.etag, mtime),
    ];
    let ctx = run_context(store.clone(), limits);
    run(ctx, entries).await.unwrap();

    let archive = store.object("dst", "out/archive.tar").unwrap();
    let listed = parse_archive(&archive);
    assert_eq!(listed.len(), 3);
    assert_eq!(listed[1].name, split_key);
    assert_eq!(listed[2].name, pax_key);
    for (i, seed) in [(1usize, 1u8), (2, 2)] {
        let entry = &listed[i];
        let got = &archive[entry.offset as usize..(entry.offset + 9 * 1024) as usize];
        assert_eq!(Bytes::copy_from_slice(got), payload(seed, 9 * 1024));
    }
    assert_clean(&store).await;
}

#[tokio::test]
async fn cancellation_mid_run_aborts_every_open_upload() {
    let limits = scaled_limits();
    let store = Arc::new(MemoryStore::new(limits));
    let sizes = vec![4 * KIB; 40];
    let entries = seed_entries(&store, "src", &sizes);

    let cancel = CancellationToken::new();
    // fire as soon as the first batch upload commits
    store.cancel_after_completes(cancel.clone(), 1);

    let ctx = Arc::new(
        starch::RunContext::new(store.clone(), limits, "dst", "out", "archive.tar")
            .with_cancel(cancel),
    );
    let err = run(ctx, entries).await.unwrap_err();
    assert!(matches!(err, StarchError::Cancelled));

    // no final object, no open uploads; scratch may remain for a later sweep
    assert!(store.object("dst", "out/archive.tar").is_none());
    assert_eq!(store.open_upload_count(), 0);
}

#[tokio::test]
async fn mixed_sizes_group_and_concatenate_correctly() {
    // entries straddling the minimum still take the grouped path together
    let limits = scaled_limits();
    let store = Arc::new(MemoryStore::new(limits));
    let sizes = vec![3 * KIB, 40 * KIB, 700, 18 * KIB, 5 * KIB, 64 * KIB, 1];
    let entries = seed_entries(&store, "src", &sizes);
    let ctx = run_context(store.clone(), limits);

    let final_obj = run(ctx, entries).await.unwrap();
    let archive = store.object("dst", "out/archive.tar").unwrap();
    assert_eq!(archive.len() as u64, final_obj.size);
    assert_archive_contents(&archive, &sizes);
    assert_part_law(&store, &limits);
    assert_clean(&store).await;
}

#[tokio::test]
async fn zero_byte_entries_are_archived_as_bare_headers() {
    let limits = scaled_limits();
    let store = Arc::new(MemoryStore::new(limits));
    let sizes = vec![8 * KIB, 0, 9 * KIB];
    let entries = seed_entries(&store, "src", &sizes);
    let ctx = run_context(store.clone(), limits);

    run(ctx, entries).await.unwrap();
    let archive = store.object("dst", "out/archive.tar").unwrap();
    assert_archive_contents(&archive, &sizes);
}
