//! Decoding of raw telemetry lines into samples.
//!
//! The firmware emits one ASCII line per sample:
//!
//! ```text
//! **<index>,<ch1>,<ch2>,...,<chN>**\r\n
//! ```
//!
//! optionally padded with null bytes. The host appends the capture time and,
//! when the schema has a label column, the active label. A line whose field
//! count then differs from the schema arity is dropped.

use chrono::{Local, NaiveDateTime};
use log::{debug, error, warn};
use thiserror::Error;

/// Timestamp layout used in dataset rows and file names.
pub const TIME_FORMAT: &str = "%Y-%m-%d-%H-%M-%S%.6f";

pub const INDEX_COLUMN: &str = "index";
pub const TIME_COLUMN: &str = "datetime";
pub const LABEL_COLUMN: &str = "label";

/// Source of capture timestamps.
pub trait Clock {
    fn now(&self) -> NaiveDateTime;
}

/// Local wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// One decoded telemetry frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub sequence_index: i64,
    pub channels: Vec<f64>,
    pub captured_at: NaiveDateTime,
    pub label: Option<String>,
}

impl Sample {
    /// Row cells in schema column order.
    pub fn to_record(&self, schema: &Schema) -> Vec<String> {
        let mut row = Vec::with_capacity(schema.arity());
        row.push(self.sequence_index.to_string());
        row.extend(self.channels.iter().map(|v| v.to_string()));
        row.push(self.captured_at.format(TIME_FORMAT).to_string());
        if schema.label_column() {
            row.push(self.label.clone().unwrap_or_default());
        }
        row
    }
}

/// Fixed column layout of an acquisition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    channels: Vec<String>,
    label_column: bool,
}

impl Schema {
    pub fn new(channels: Vec<String>, label_column: bool) -> Self {
        Self {
            channels,
            label_column,
        }
    }

    pub fn label_column(&self) -> bool {
        self.label_column
    }

    /// Fields per row: index, channels, timestamp and optional label.
    pub fn arity(&self) -> usize {
        self.channels.len() + 2 + usize::from(self.label_column)
    }

    pub fn header(&self) -> Vec<String> {
        let mut header = Vec::with_capacity(self.arity());
        header.push(INDEX_COLUMN.to_string());
        header.extend(self.channels.iter().cloned());
        header.push(TIME_COLUMN.to_string());
        if self.label_column {
            header.push(LABEL_COLUMN.to_string());
        }
        header
    }
}

/// Why a read produced no sample. None of these stop acquisition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameDiagnostic {
    #[error("empty read: no bytes before timeout")]
    EmptyRead,
    #[error("frame decode error: {0}")]
    Decode(String),
    #[error("length mismatch: received {received} fields, schema requires {expected}")]
    LengthMismatch { received: usize, expected: usize },
}

/// Stateless line decoder for one schema.
#[derive(Debug, Clone)]
pub struct FrameParser {
    schema: Schema,
    sentinel: String,
    delimiter: char,
}

impl FrameParser {
    pub fn new(schema: Schema, sentinel: impl Into<String>, delimiter: char) -> Self {
        Self {
            schema,
            sentinel: sentinel.into(),
            delimiter,
        }
    }

    /// Decode one raw line, logging a diagnostic when it is dropped.
    pub fn parse(
        &self,
        raw: &[u8],
        label: Option<&str>,
        captured_at: NaiveDateTime,
    ) -> Result<Sample, FrameDiagnostic> {
        let result = self.decode(raw, label, captured_at);
        match &result {
            Ok(sample) => debug!("Decoded frame index={}", sample.sequence_index),
            Err(FrameDiagnostic::EmptyRead) => warn!("No data received before read timeout"),
            Err(e) => error!("{e}; dropping frame {:?}", String::from_utf8_lossy(raw)),
        }
        result
    }

    fn decode(
        &self,
        raw: &[u8],
        label: Option<&str>,
        captured_at: NaiveDateTime,
    ) -> Result<Sample, FrameDiagnostic> {
        if raw.is_empty() {
            return Err(FrameDiagnostic::EmptyRead);
        }

        let text = std::str::from_utf8(raw)
            .map_err(|e| FrameDiagnostic::Decode(format!("invalid utf-8: {e}")))?;
        let body = self.unwrap_line(text);

        let fields: Vec<&str> = body.split(self.delimiter).map(str::trim).collect();

        // Timestamp and label are appended on the host side.
        let received = fields.len() + 1 + usize::from(self.schema.label_column());
        let expected = self.schema.arity();
        if received != expected {
            return Err(FrameDiagnostic::LengthMismatch { received, expected });
        }

        let sequence_index = fields[0]
            .parse::<i64>()
            .map_err(|_| FrameDiagnostic::Decode(format!("non-integer index {:?}", fields[0])))?;

        let channels = fields[1..]
            .iter()
            .map(|f| {
                f.parse::<f64>()
                    .map_err(|_| FrameDiagnostic::Decode(format!("non-numeric reading {f:?}")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Sample {
            sequence_index,
            channels,
            captured_at,
            label: label.map(str::to_string),
        })
    }

    /// Strip whitespace, null padding and the sentinel wrapper.
    fn unwrap_line<'a>(&self, text: &'a str) -> &'a str {
        let mut body = text.trim_matches(|c: char| c.is_whitespace() || c == '\0');
        if !self.sentinel.is_empty() {
            while let Some(rest) = body.strip_prefix(self.sentinel.as_str()) {
                body = rest;
            }
            while let Some(rest) = body.strip_suffix(self.sentinel.as_str()) {
                body = rest;
            }
        }
        body.trim_matches(|c: char| c.is_whitespace() || c == '\0')
    }
}
