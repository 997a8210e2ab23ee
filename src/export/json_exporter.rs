use anyhow::Result;
use tracing::debug;

use crate::error::PlaceScrapeError;
use crate::scraper::Record;

/// Render records as a pretty-printed JSON array, absent fields as null
pub fn write_json(records: &[Record]) -> Result<Vec<u8>> {
    debug!("Exporting {} records to JSON", records.len());

    serde_json::to_vec_pretty(records)
        .map_err(|e| PlaceScrapeError::export(format!("Failed to serialize JSON: {}", e)).into())
}

pub fn read_json(bytes: &[u8]) -> Result<Vec<Record>> {
    serde_json::from_slice(bytes)
        .map_err(|e| PlaceScrapeError::export(format!("Failed to parse JSON: {}", e)).into())
}
