// Shared helpers for the engine integration tests: deterministic source
// seeding and a small ustar reader used to check the assembled archives.

use bytes::Bytes;
use chrono::{TimeZone, Utc};
use starch::{Entry, MemoryStore, RunContext, StoreLimits};
use std::sync::Arc;

pub const KIB: u64 = 1024;

/// Limits scaled down from the real store so the recursive paths stay fast
/// in-memory; the engine only ever reasons relative to `min_part_size`.
pub fn scaled_limits() -> StoreLimits {
    StoreLimits {
        min_part_size: 16 * KIB,
        max_parts: 10_000,
        batch_target: 32 * KIB,
    }
}

/// Deterministic payload bytes for one seeded entry
pub fn payload(seed: u8, len: usize) -> Bytes {
    let mut buf = Vec::with_capacity(len);
    for i in 0..len {
        buf.push(seed.wrapping_add((i % 251) as u8));
    }
    Bytes::from(buf)
}

/// Seed `sizes.len()` source objects and return them as archive entries
pub fn seed_entries(store: &MemoryStore, bucket: &str, sizes: &[u64]) -> Vec<Entry> {
    let mtime = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
    sizes
        .iter()
        .enumerate()
        .map(|(i, &size)| {
            let key = format!("data/obj-{:05}.bin", i);
            let obj = store.insert_object(bucket, &key, payload(i as u8, size as usize));
            Entry::new(bucket, key, size, obj.etag, mtime)
        })
        .collect()
}

pub fn run_context(store: Arc<MemoryStore>, limits: StoreLimits) -> Arc<RunContext> {
    Arc::new(RunContext::new(store, limits, "dst", "out", "archive.tar"))
}

/// One entry listed out of an assembled archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TarEntry {
    pub name: String,
    pub size: u64,
    /// Byte offset of the entry's payload within the archive
    pub offset: u64,
}

fn parse_octal(field: &[u8]) -> u64 {
    field
        .iter()
        .take_while(|&&b| b != 0 && b != b' ')
        .fold(0, |acc, &b| acc * 8 + u64::from(b - b'0'))
}

fn field_string(field: &[u8]) -> String {
    String::from_utf8_lossy(
        &field
            .iter()
            .copied()
            .take_while(|&b| b != 0)
            .collect::<Vec<u8>>(),
    )
    .to_string()
}

fn checksum_of(block: &[u8]) -> u64 {
    block
        .iter()
        .enumerate()
        .map(|(i, &b)| {
            if (148..156).contains(&i) {
                b' ' as u64
            } else {
                b as u64
            }
        })
        .sum()
}

fn pax_path(data: &[u8]) -> Option<String> {
    let text = std::str::from_utf8(data).ok()?;
    for record in text.split_terminator('\n') {
        let (_, rest) = record.split_once(' ')?;
        if let Some(path) = rest.strip_prefix("path=") {
            return Some(path.to_string());
        }
    }
    None
}

/// List an archive's entries, verifying header checksums, ustar magic, PAX
/// long names and the terminating zero blocks along the way.
pub fn parse_archive(bytes: &[u8]) -> Vec<TarEntry> {
    assert_eq!(bytes.len() % 512, 0, "archive is not block aligned");

    let mut entries = Vec::new();
    let mut pos = 0usize;
    let mut long_name: Option<String> = None;

    loop {
        assert!(pos + 512 <= bytes.len(), "archive ended without a trailer");
        let block = &bytes[pos..pos + 512];
        if block.iter().all(|&b| b == 0) {
            // end of archive: a second zero block and nothing but zeros after
            assert!(
                bytes[pos..].iter().all(|&b| b == 0),
                "trailing bytes are not zero"
            );
            assert!(bytes.len() - pos >= 1024, "trailer is short");
            break;
        }

        assert_eq!(&block[257..263], b"ustar\0", "bad magic at offset {}", pos);
        assert_eq!(
            parse_octal(&block[148..156]),
            checksum_of(block),
            "bad checksum at offset {}",
            pos
        );

        let size = parse_octal(&block[124..136]);
        let data_start = pos + 512;
        let padded = (size as usize).div_ceil(512) * 512;

        match block[156] {
            b'x' => {
                let data = &bytes[data_start..data_start + size as usize];
                long_name = pax_path(data);
            }
            b'0' | 0 => {
                let name = long_name.take().unwrap_or_else(|| {
                    let name = field_string(&block[0..100]);
                    let prefix = field_string(&block[345..500]);
                    if prefix.is_empty() {
                        name
                    } else {
                        format!("{}/{}", prefix, name)
                    }
                });
                entries.push(TarEntry {
                    name,
                    size,
                    offset: data_start as u64,
                });
            }
            other => panic!("unexpected typeflag {} at offset {}", other, pos),
        }
        pos = data_start + padded;
    }
    entries
}
