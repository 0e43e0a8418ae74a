//! Append-only CSV output.
//!
//! Each record is flushed and synced as soon as it is written, so a crash
//! after N appends leaves exactly N complete rows on disk.

use crate::error::Result;
use crate::record::ArticleRecord;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// CSV file opened for incremental appends
pub struct CsvSink {
    writer: csv::Writer<File>,
    path: PathBuf,
    columns: &'static [&'static str],
    written: usize,
}

impl CsvSink {
    /// Open `path` for appending.
    ///
    /// A missing or empty file gets the header row; an existing file is
    /// appended to as-is.
    pub fn open(path: &Path, columns: &'static [&'static str]) -> Result<Self> {
        let has_content = std::fs::metadata(path)
            .map(|m| m.len() > 0)
            .unwrap_or(false);

        if has_content {
            check_header(path, columns)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);

        let mut sink = Self {
            writer,
            path: path.to_path_buf(),
            columns,
            written: 0,
        };

        if has_content {
            info!(path = ?sink.path, "Appending to existing output");
        } else {
            sink.writer.write_record(columns)?;
            sink.sync()?;
            info!(path = ?sink.path, columns = columns.len(), "Created output with header");
        }

        Ok(sink)
    }

    /// Write one record and push it to stable storage.
    pub fn append(&mut self, record: &ArticleRecord) -> Result<()> {
        self.writer.write_record(record.to_row(self.columns))?;
        self.sync()?;
        self.written += 1;
        debug!(written = self.written, url = %record.url, "Record persisted");
        Ok(())
    }

    /// Records appended through this handle
    pub fn written(&self) -> usize {
        self.written
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flush and release the file. Returns the number of records written.
    pub fn close(mut self) -> Result<usize> {
        self.sync()?;
        info!(path = ?self.path, written = self.written, "Output closed");
        Ok(self.written)
    }

    fn sync(&mut self) -> Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_data()?;
        Ok(())
    }
}

/// Warn when an existing file was written with a different column set.
fn check_header(path: &Path, columns: &[&str]) -> Result<()> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)?;

    if let Some(first) = reader.records().next() {
        let first = first?;
        if !first.iter().eq(columns.iter().copied()) {
            warn!(
                path = ?path,
                found = ?first.iter().collect::<Vec<_>>(),
                expected = ?columns,
                "Existing output has a different header, appending anyway"
            );
        }
    }
    Ok(())
}
