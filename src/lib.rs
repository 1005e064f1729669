//! Serial IMU telemetry capture and offline dataset validation.
//!
//! # Acquisition
//!
//! The sensor board streams one comma-separated line per sample over a
//! serial link. [`SerialLink`] opens the first reachable device,
//! [`FrameParser`] turns each line into a [`Sample`], an
//! [`AcquisitionBuffer`] holds samples until a flush trigger fires, and a
//! [`DatasetWriter`] appends them to a CSV file named after the label and
//! flush time.
//!
//! Two flush triggers exist:
//!
//! 1. **Interval**: in unlabeled background mode, every `flush_interval`.
//! 2. **Terminal**: when the operator interrupts the session, regardless of
//!    the interval.
//!
//! A failed write keeps the buffered samples for the next attempt.
//!
//! # Validation
//!
//! [`QualityAggregator`] walks a directory of dataset files, checks each one
//! for packet loss (sequence index deltas other than 1) and output data rate
//! (samples per whole second outside the accepted set), then repeats the
//! checks over all files merged. The resulting [`Report`] renders to Markdown
//! and HTML.

mod aggregate;
mod buffer;
mod config;
mod dataset;
mod errors;
mod frame;
pub mod logging;
mod persist;
mod report;
mod serial_link;
mod session;
mod validate;

pub use aggregate::{AggregatorOptions, QualityAggregator, AGGREGATE_SOURCE};
pub use buffer::{AcquisitionBuffer, FlushPolicy, FlushTrigger};
pub use config::{
    AcquisitionConfig, Config, DataBitsSetting, ParitySetting, RunMode, SchemaConfig,
    SerialConfig, StopBitsSetting, ValidationConfig,
};
pub use dataset::{parse_timestamp, ColumnNames, DatasetRow, DatasetTable};
pub use errors::*;
pub use frame::{
    Clock, FrameDiagnostic, FrameParser, Sample, Schema, SystemClock, TIME_FORMAT,
};
pub use persist::{AppendOutcome, DatasetWriter, SampleSink};
pub use report::{Finding, Report, Status, Summary};
pub use serial_link::{LineSource, SerialLink};
pub use session::{
    install_interrupt_handler, Acquisition, AcquisitionMode, CancelToken, RestartPolicy,
    Session, SessionStats, Supervisor, SupervisorReport,
};
pub use validate::{
    check_odr, detect_gaps, odr_buckets, run_checks, sort_rows, ContinuityGap, OdrBucket,
    OdrSummary, CHECK_FILENAME, CHECK_INDEX_TYPE, CHECK_MISSING, CHECK_ODR, CHECK_PACKET_LOSS,
    CHECK_TIMESTAMPS,
};
