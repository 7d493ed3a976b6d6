//! Intermediate files between export and import.
//!
//! One CSV file per table pair: comma delimited, no header, one record per
//! source row, every field as text. NULL is written as an empty field.

use crate::error::{MigrateError, Result};
use crate::identifier::TableName;
use crate::session::TextRow;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// A fully written intermediate file.
#[derive(Debug)]
pub struct IntermediateFile {
    path: PathBuf,
    records: usize,
}

impl IntermediateFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of records written.
    pub fn records(&self) -> usize {
        self.records
    }

    /// Read every record back in file order.
    pub fn read_records(&self) -> Result<Vec<Vec<String>>> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(&self.path)?;

        let mut records = Vec::with_capacity(self.records);
        for record in reader.records() {
            let record = record?;
            records.push(record.iter().map(str::to_string).collect());
        }
        Ok(records)
    }

    /// Delete the file.
    pub fn remove(self) -> Result<()> {
        std::fs::remove_file(&self.path)?;
        debug!("Removed intermediate file {:?}", self.path);
        Ok(())
    }
}

/// `<dir>/<source>_<destination>.csv`
pub fn intermediate_path(dir: &Path, source: &TableName, destination: &TableName) -> PathBuf {
    dir.join(format!("{}_{}.csv", source, destination))
}

/// Create the file at `path` and write `rows` into it.
pub fn export_rows(path: &Path, rows: &[TextRow]) -> Result<Option<IntermediateFile>> {
    let file = File::create(path)?;
    write_intermediate(path, file, rows)
}

/// Write `rows` to `writer`, flushing after every record.
///
/// If fewer records reach the writer than there are rows, the file at `path`
/// is deleted and `None` is returned. Write failures are not raised: they
/// only show up as a short count.
pub fn write_intermediate<W: Write>(
    path: &Path,
    writer: W,
    rows: &[TextRow],
) -> Result<Option<IntermediateFile>> {
    let mut csv_writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);

    let mut written = 0;
    for row in rows {
        let fields = row.iter().map(|field| field.as_deref().unwrap_or(""));
        let result = csv_writer
            .write_record(fields)
            .and_then(|_| csv_writer.flush().map_err(csv::Error::from));
        if let Err(e) = result {
            warn!("Write to {:?} failed after {} records: {}", path, written, e);
            break;
        }
        written += 1;
    }
    drop(csv_writer);

    if written != rows.len() {
        let err = MigrateError::ExportIncomplete {
            table: path.display().to_string(),
            read: rows.len(),
            written,
        };
        warn!("{}", err);
        discard(path);
        return Ok(None);
    }

    Ok(Some(IntermediateFile {
        path: path.to_path_buf(),
        records: written,
    }))
}

fn discard(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Could not remove partial file {:?}: {}", path, e);
        }
    }
}
