//! CSV export and re-import of located citation records.
//!
//! The CSV is the pipeline's durable output: every record lands in it, blank
//! location fields included, so a user can hand-correct rows and rebuild the
//! map from the file without re-scraping.

use crate::error::Result;
use crate::geocode::LocatedRecord;
use std::path::Path;
use tracing::info;

/// Write records to a CSV file, headers from the record's serde names.
pub fn write_csv(records: &[LocatedRecord], path: &Path) -> Result<()> {
    let mut writer = csv::WriterBuilder::new().has_headers(true).from_path(path)?;
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    info!(count = records.len(), path = %path.display(), "Citation information exported");
    Ok(())
}

/// Read records back from a CSV file written by [`write_csv`].
pub fn read_csv(path: &Path) -> Result<Vec<LocatedRecord>> {
    let mut reader = csv::ReaderBuilder::new().has_headers(true).from_path(path)?;
    let mut records = Vec::new();
    for row in reader.deserialize::<LocatedRecord>() {
        records.push(row?);
    }
    info!(count = records.len(), path = %path.display(), "Citation information loaded");
    Ok(records)
}
