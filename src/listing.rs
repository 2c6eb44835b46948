//! Source enumeration by prefix listing

use crate::error::StarchResult;
use crate::models::Entry;
use crate::store::ObjectStore;
use chrono::Utc;
use log::info;

/// Every object under `prefix`, as archive entries in key order.
///
/// Zero-byte keys ending in `/` are console-created folder markers, not
/// archivable payloads.
pub async fn list_source_entries(
    store: &dyn ObjectStore,
    bucket: &str,
    prefix: &str,
) -> StarchResult<Vec<Entry>> {
    let listed_at = Utc::now();
    let objects = store.list_objects(bucket, prefix).await?;
    let entries: Vec<Entry> = objects
        .into_iter()
        .filter(|obj| !(obj.size == 0 && obj.key.ends_with('/')))
        .map(|obj| Entry::new(bucket, obj.key, obj.size, obj.etag, listed_at))
        .collect();
    info!(
        "listed {} source objects under {}/{}",
        entries.len(),
        bucket,
        prefix
    );
    Ok(entries)
}
