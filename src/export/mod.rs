//! CSV export of a reconciled record set.
//!
//! Columns always follow [`EXPORT_COLUMNS`]; missing values are written as
//! empty cells so every row has the same width.

use crate::models::{Record, EXPORT_COLUMNS};
use anyhow::{Context, Result};
use std::io::Write;
use std::path::Path;
use tracing::info;

/// Write header + one line per record to any writer.
pub fn write_records<'a, W: Write>(
    writer: W,
    records: impl IntoIterator<Item = &'a Record>,
) -> Result<usize> {
    let mut wtr = csv::WriterBuilder::new().has_headers(false).from_writer(writer);

    wtr.write_record(EXPORT_COLUMNS.iter().map(|c| c.header()))?;

    let mut n = 0usize;
    for record in records {
        wtr.write_record(EXPORT_COLUMNS.iter().map(|c| record.value(*c)))
            .with_context(|| format!("write row {}", record.row_id))?;
        n += 1;
    }

    wtr.flush()?;
    Ok(n)
}

pub fn write_csv<'a>(
    records: impl IntoIterator<Item = &'a Record>,
    path: &Path,
) -> Result<usize> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Could not create dir {:?}", parent))?;
    }
    let file = std::fs::File::create(path)
        .with_context(|| format!("Could not create {:?}", path))?;

    let n = write_records(file, records)?;
    info!("{} rows written to {:?}", n, path);
    Ok(n)
}
