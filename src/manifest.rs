//! Source manifests
//!
//! Handles both directions: loading a user-supplied CSV manifest that
//! enumerates the source objects, and rendering the synthetic manifest that
//! is archived as the first tar entry of every run.

use crate::error::StarchResult;
use crate::models::Entry;
use chrono::{DateTime, Utc};
use csv::{ReaderBuilder, WriterBuilder};
use std::fs::File;
use std::path::Path;

/// Load a source manifest. Columns: `bucket,key,size,etag`.
pub fn load_csv(path: &Path, skip_header: bool) -> StarchResult<Vec<Entry>> {
    let file = File::open(path)?;
    let mut reader = ReaderBuilder::new()
        .has_headers(skip_header)
        .flexible(false)
        .from_reader(file);

    let loaded_at = Utc::now();
    let mut entries = Vec::new();
    for record in reader.records() {
        let record = record?;
        let size: u64 = record
            .get(2)
            .unwrap_or("")
            .trim()
            .parse()
            .map_err(|e| crate::error::StarchError::input(format!("bad size field: {}", e)))?;
        entries.push(Entry::new(
            record.get(0).unwrap_or("").to_string(),
            record.get(1).unwrap_or("").to_string(),
            size,
            record.get(3).unwrap_or("").to_string(),
            loaded_at,
        ));
    }
    Ok(entries)
}

/// Render the synthetic manifest payload: one CSV line per input entry, in
/// archive order. The manifest does not list itself.
pub fn render(entries: &[Entry]) -> Vec<u8> {
    let mut writer = WriterBuilder::new().has_headers(false).from_writer(vec![]);
    for entry in entries {
        // Serialising four string fields cannot fail on a Vec sink
        let _ = writer.write_record([
            entry.bucket.as_str(),
            entry.key.as_str(),
            &entry.size.to_string(),
            entry.etag.as_str(),
        ]);
    }
    writer.into_inner().unwrap_or_default()
}

/// The synthetic entry the manifest payload is archived under
pub fn manifest_entry(dst_bucket: &str, dst_key: &str, payload_len: u64, now: DateTime<Utc>) -> Entry {
    Entry::new(
        dst_bucket,
        format!("{}.manifest.csv", dst_key),
        payload_len,
        String::new(),
        now,
    )
}
