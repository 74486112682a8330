use crate::models::{expose_id, FieldValue, ListingRecord};
use crate::scrapers::types::URL;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Write all records as one pretty-printed JSON array.
///
/// The array goes to `<path>.tmp` first and is renamed over `path`, so an
/// interrupted write never leaves a truncated file behind.
pub async fn write_records(path: &Path, records: &[ListingRecord]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let json = serde_json::to_string_pretty(records)?;
    let tmp = temp_path(path);
    tokio::fs::write(&tmp, json)
        .await
        .with_context(|| format!("Failed to write {}", tmp.display()))?;
    tokio::fs::rename(&tmp, path)
        .await
        .with_context(|| format!("Failed to move {} into place", tmp.display()))?;

    info!("💾 Saved {} records to {}", records.len(), path.display());
    Ok(())
}

/// One file per record under `dir`, named after the listing's expose id
pub async fn write_raw(dir: &Path, records: &[ListingRecord]) -> Result<()> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("Failed to create {}", dir.display()))?;

    for (idx, record) in records.iter().enumerate() {
        let name = record_id(record).unwrap_or_else(|| format!("record-{}", idx + 1));
        let file = dir.join(format!("{name}.json"));
        let json = serde_json::to_string_pretty(record)?;
        tokio::fs::write(&file, json)
            .await
            .with_context(|| format!("Failed to write {}", file.display()))?;
        debug!("Wrote {}", file.display());
    }

    info!("💾 Saved {} individual record files to {}", records.len(), dir.display());
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Expose id from the record's `url` field, if it is safe as a file name
fn record_id(record: &ListingRecord) -> Option<String> {
    let url = record.get(URL).and_then(FieldValue::as_text)?;
    let id = expose_id(url)?;
    id.chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        .then(|| id.to_string())
}
