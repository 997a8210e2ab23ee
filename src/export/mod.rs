use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

pub mod csv_exporter;
pub mod json_exporter;

use crate::error::PlaceScrapeError;
use crate::scraper::Record;

/// Export format enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Csv,
    Json,
}

impl ExportFormat {
    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "text/csv; charset=utf-8",
            ExportFormat::Json => "application/json",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
        }
    }

    /// Format implied by a file name, if any
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| ext.parse().ok())
    }
}

impl std::str::FromStr for ExportFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "json" => Ok(ExportFormat::Json),
            _ => Err(anyhow::anyhow!("Invalid export format: {}", s)),
        }
    }
}

impl std::fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.extension())
    }
}

/// Render records in the given format
pub fn export_records(records: &[Record], format: ExportFormat) -> Result<Vec<u8>> {
    let bytes = match format {
        ExportFormat::Csv => csv_exporter::write_csv(records)?,
        ExportFormat::Json => json_exporter::write_json(records)?,
    };
    Ok(bytes)
}

/// Parse records previously rendered by [`export_records`]
pub fn import_records(bytes: &[u8], format: ExportFormat) -> Result<Vec<Record>> {
    match format {
        ExportFormat::Csv => csv_exporter::read_csv(bytes),
        ExportFormat::Json => json_exporter::read_json(bytes),
    }
}

/// Write records to `output_path`
pub async fn export_to_file(records: &[Record], output_path: &Path, format: ExportFormat) -> Result<u64> {
    info!("Exporting {} records to {} as {}", records.len(), output_path.display(), format);

    let bytes = export_records(records, format)?;
    tokio::fs::write(output_path, &bytes).await.map_err(|e| {
        PlaceScrapeError::export(format!("Failed to write {}: {}", output_path.display(), e))
    })?;

    info!("Export completed: {} bytes", bytes.len());
    Ok(bytes.len() as u64)
}
