use anyhow::Result;
use csv::{ReaderBuilder, WriterBuilder};
use tracing::debug;

use crate::error::PlaceScrapeError;
use crate::scraper::Record;

/// Render records as CSV with the fixed record header.
///
/// An absent field is an empty cell. Extracted text is never blank, so an
/// empty cell always reads back as absent.
pub fn write_csv(records: &[Record]) -> Result<Vec<u8>> {
    debug!("Exporting {} records to CSV", records.len());

    let mut writer = WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());

    // Header is written by hand so an empty result set still carries it
    writer.write_record(Record::FIELDS).map_err(csv_error)?;
    for record in records {
        writer.serialize(record).map_err(csv_error)?;
    }

    writer
        .into_inner()
        .map_err(|e| PlaceScrapeError::export(format!("Failed to flush CSV: {}", e)).into())
}

/// Parse CSV produced by [`write_csv`]
pub fn read_csv(bytes: &[u8]) -> Result<Vec<Record>> {
    let mut reader = ReaderBuilder::new().has_headers(true).from_reader(bytes);

    let headers = reader.headers().map_err(csv_error)?;
    if headers.iter().ne(Record::FIELDS) {
        return Err(PlaceScrapeError::export(format!(
            "Unexpected CSV header: {}",
            headers.iter().collect::<Vec<_>>().join(",")
        ))
        .into());
    }

    let mut records = Vec::new();
    for row in reader.deserialize::<Record>() {
        records.push(row.map_err(csv_error)?);
    }
    Ok(records)
}

fn csv_error(error: csv::Error) -> anyhow::Error {
    PlaceScrapeError::export(format!("CSV error: {}", error)).into()
}
