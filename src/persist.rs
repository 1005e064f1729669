//! Append-only CSV dataset files.

use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use log::{debug, info, warn};

use crate::errors::{CaptureError, Result};
use crate::frame::{Sample, Schema, TIME_FORMAT};

/// Result of a persistence call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppendOutcome {
    /// Nothing to write; the filesystem was not touched.
    Skipped,
    Written {
        path: PathBuf,
        rows: usize,
        header_written: bool,
    },
}

/// Destination for flushed samples.
pub trait SampleSink {
    fn persist(
        &mut self,
        label: &str,
        flushed_at: NaiveDateTime,
        samples: &[Sample],
    ) -> Result<AppendOutcome>;
}

/// Writes samples to `<data_dir>/<label>_<timestamp>.csv`.
#[derive(Debug, Clone)]
pub struct DatasetWriter {
    data_dir: PathBuf,
    schema: Schema,
}

impl DatasetWriter {
    pub fn new(data_dir: impl Into<PathBuf>, schema: Schema) -> Self {
        Self {
            data_dir: data_dir.into(),
            schema,
        }
    }

    /// File path for a flush of `label` at `flushed_at`.
    pub fn path_for(&self, label: &str, flushed_at: NaiveDateTime) -> PathBuf {
        self.data_dir.join(format!(
            "{}_{}.csv",
            sanitize_label(label),
            flushed_at.format(TIME_FORMAT)
        ))
    }

    /// Append rows to `path`, writing the header only into a new or empty file.
    pub fn append(&self, path: &Path, samples: &[Sample]) -> Result<AppendOutcome> {
        if samples.is_empty() {
            warn!(
                "No samples buffered, skipping write to {}",
                path.display()
            );
            return Ok(AppendOutcome::Skipped);
        }

        self.write_rows(path, samples)
            .map_err(|source| CaptureError::Persistence {
                path: path.to_path_buf(),
                pending: samples.len(),
                source,
            })
    }

    fn write_rows(&self, path: &Path, samples: &[Sample]) -> io::Result<AppendOutcome> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let header_written = file.metadata()?.len() == 0;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        if header_written {
            writer.write_record(self.schema.header())?;
        }
        for sample in samples {
            writer.write_record(sample.to_record(&self.schema))?;
        }
        writer.flush()?;

        debug!(
            "Appended {} rows to {} (header={})",
            samples.len(),
            path.display(),
            header_written
        );
        Ok(AppendOutcome::Written {
            path: path.to_path_buf(),
            rows: samples.len(),
            header_written,
        })
    }
}

impl SampleSink for DatasetWriter {
    fn persist(
        &mut self,
        label: &str,
        flushed_at: NaiveDateTime,
        samples: &[Sample],
    ) -> Result<AppendOutcome> {
        let path = self.path_for(label, flushed_at);
        let outcome = self.append(&path, samples)?;
        if let AppendOutcome::Written { rows, .. } = &outcome {
            info!("File generation complete: {} ({} rows)", path.display(), rows);
        }
        Ok(outcome)
    }
}

fn sanitize_label(label: &str) -> String {
    label
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
