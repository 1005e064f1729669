//! Acquisition sessions and their supervisor.
//!
//! A session is a single-threaded loop over one serial handle:
//! read a line, decode it, buffer it, check the interval trigger. An operator
//! interrupt sets a [`CancelToken`]; the loop notices it between reads (a read
//! blocks for at most the serial timeout), performs the terminal flush and
//! returns so the caller can release the handle.
//!
//! The [`Supervisor`] runs sessions back to back, up to a fixed number of
//! restarts, instead of re-entering the program on every interrupt.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDateTime;
use log::{debug, error, info, warn};

use crate::buffer::{AcquisitionBuffer, FlushPolicy, FlushTrigger};
use crate::errors::{CaptureError, Result};
use crate::frame::{Clock, FrameDiagnostic, FrameParser};
use crate::persist::{AppendOutcome, SampleSink};
use crate::serial_link::LineSource;

/// Acquisition mode chosen by the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquisitionMode {
    /// Every sample carries `label`; data is written when the session ends.
    LabeledSession { label: String },
    /// Unlabeled background capture, written every flush interval.
    IntervalUnlabeled,
}

impl AcquisitionMode {
    pub fn label(&self) -> Option<&str> {
        match self {
            AcquisitionMode::LabeledSession { label } => Some(label),
            AcquisitionMode::IntervalUnlabeled => None,
        }
    }

    pub fn flush_policy(&self) -> FlushPolicy {
        match self {
            AcquisitionMode::LabeledSession { .. } => FlushPolicy::TerminalOnly,
            AcquisitionMode::IntervalUnlabeled => FlushPolicy::Interval,
        }
    }
}

/// Shared cancellation flag set by the interrupt listener.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Route Ctrl+C to `token` from a dedicated listener thread.
pub fn install_interrupt_handler(token: CancelToken) -> Result<()> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    std::thread::Builder::new()
        .name("interrupt-listener".into())
        .spawn(move || {
            rt.block_on(async {
                while tokio::signal::ctrl_c().await.is_ok() {
                    info!("Interrupt received, ending session");
                    token.cancel();
                }
            });
        })?;
    Ok(())
}

/// Counters for one session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub frames: usize,
    pub empty_reads: usize,
    pub length_mismatches: usize,
    pub decode_errors: usize,
    pub sequence_gaps: usize,
    pub flushes: usize,
    pub failed_flushes: usize,
    pub rows_written: usize,
}

/// One acquisition run.
#[derive(Debug, Clone)]
pub struct Session {
    pub started_at: NaiveDateTime,
    pub mode: AcquisitionMode,
}

/// Drives sessions for one mode and schema.
pub struct Acquisition<'a, C: Clock> {
    parser: &'a FrameParser,
    mode: &'a AcquisitionMode,
    clock: &'a C,
    cancel: &'a CancelToken,
}

impl<'a, C: Clock> Acquisition<'a, C> {
    pub fn new(
        parser: &'a FrameParser,
        mode: &'a AcquisitionMode,
        clock: &'a C,
        cancel: &'a CancelToken,
    ) -> Self {
        Self {
            parser,
            mode,
            clock,
            cancel,
        }
    }

    /// Read until cancelled, then flush. A read error also ends the session
    /// after the terminal flush and is returned to the caller.
    pub fn run_session<S, W>(
        &self,
        source: &mut S,
        buffer: &mut AcquisitionBuffer,
        sink: &mut W,
    ) -> Result<SessionStats>
    where
        S: LineSource + ?Sized,
        W: SampleSink + ?Sized,
    {
        let session = Session {
            started_at: self.clock.now(),
            mode: self.mode.clone(),
        };
        info!(
            "Session started at {} ({:?})",
            session.started_at, session.mode
        );
        let label = session.mode.label();
        let mut stats = SessionStats::default();
        let mut last_index: Option<i64> = None;
        let mut read_error = None;

        while !self.cancel.is_cancelled() {
            match source.read_line() {
                Ok(Some(raw)) => {
                    match self.parser.parse(&raw, label, self.clock.now()) {
                        Ok(sample) => {
                            if let Some(prev) = last_index {
                                if prev.checked_add(1) != Some(sample.sequence_index) {
                                    warn!(
                                        "Sequence gap: index {} followed {}",
                                        sample.sequence_index, prev
                                    );
                                    stats.sequence_gaps += 1;
                                }
                            }
                            last_index = Some(sample.sequence_index);
                            stats.frames += 1;
                            buffer.push(sample);
                        }
                        Err(FrameDiagnostic::EmptyRead) => stats.empty_reads += 1,
                        Err(FrameDiagnostic::LengthMismatch { .. }) => {
                            stats.length_mismatches += 1
                        }
                        Err(FrameDiagnostic::Decode(_)) => stats.decode_errors += 1,
                    }
                }
                Ok(None) => {
                    warn!("No data received before read timeout");
                    stats.empty_reads += 1;
                }
                Err(e) => {
                    error!("Serial read failed: {}", e);
                    read_error = Some(e);
                    break;
                }
            }

            let now = self.clock.now();
            if buffer.interval_due(now, label) {
                self.flush(buffer, FlushTrigger::Interval, now, sink, &mut stats);
            }
        }

        let now = self.clock.now();
        self.flush(buffer, FlushTrigger::Terminal, now, sink, &mut stats);
        info!("Session ended: {:?}", stats);

        match read_error {
            Some(e) => Err(CaptureError::Io(e)),
            None => Ok(stats),
        }
    }

    fn flush<W: SampleSink + ?Sized>(
        &self,
        buffer: &mut AcquisitionBuffer,
        trigger: FlushTrigger,
        now: NaiveDateTime,
        sink: &mut W,
        stats: &mut SessionStats,
    ) {
        match buffer.flush(trigger, self.mode.label(), now, sink) {
            Ok(AppendOutcome::Written { rows, .. }) => {
                stats.flushes += 1;
                stats.rows_written += rows;
            }
            Ok(AppendOutcome::Skipped) => debug!("{:?} flush had nothing to write", trigger),
            // Already logged by the buffer; samples stay for the next attempt.
            Err(_) => stats.failed_flushes += 1,
        }
    }
}

/// Restart behaviour after an interrupt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartPolicy {
    /// Start a new session after an interrupt instead of exiting.
    pub resume: bool,
    pub max_restarts: u32,
    pub delay: Duration,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            resume: false,
            max_restarts: 0,
            delay: Duration::from_secs(1),
        }
    }
}

/// Totals across all supervised sessions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SupervisorReport {
    pub sessions: Vec<SessionStats>,
    /// Samples that could not be persisted before exit.
    pub unpersisted: usize,
}

impl SupervisorReport {
    pub fn rows_written(&self) -> usize {
        self.sessions.iter().map(|s| s.rows_written).sum()
    }
}

pub struct Supervisor<C: Clock> {
    parser: FrameParser,
    mode: AcquisitionMode,
    clock: C,
    cancel: CancelToken,
    restart: RestartPolicy,
    flush_interval: Duration,
    default_label: String,
}

impl<C: Clock> Supervisor<C> {
    pub fn new(
        parser: FrameParser,
        mode: AcquisitionMode,
        clock: C,
        cancel: CancelToken,
        flush_interval: Duration,
        default_label: impl Into<String>,
    ) -> Self {
        Self {
            parser,
            mode,
            clock,
            cancel,
            restart: RestartPolicy::default(),
            flush_interval,
            default_label: default_label.into(),
        }
    }

    pub fn with_restart(mut self, restart: RestartPolicy) -> Self {
        self.restart = restart;
        self
    }

    /// Run sessions until an interrupt ends one with no restarts left.
    ///
    /// `open` is called at the start of every session; its error (typically a
    /// connection failure) is fatal. The handle is dropped before any restart.
    pub fn run<S, W, O>(&self, mut open: O, sink: &mut W) -> Result<SupervisorReport>
    where
        S: LineSource,
        W: SampleSink + ?Sized,
        O: FnMut() -> Result<S>,
    {
        let mut buffer = AcquisitionBuffer::new(
            self.mode.flush_policy(),
            self.flush_interval,
            self.default_label.clone(),
            self.clock.now(),
        );
        let acquisition = Acquisition::new(&self.parser, &self.mode, &self.clock, &self.cancel);
        let mut report = SupervisorReport::default();
        let mut restarts = 0u32;

        let outcome = loop {
            let mut source = match open() {
                Ok(source) => source,
                Err(e) => break Err(e),
            };
            buffer.reset_clock(self.clock.now());

            let result = acquisition.run_session(&mut source, &mut buffer, sink);
            drop(source);

            match result {
                Ok(stats) => report.sessions.push(stats),
                Err(e) => break Err(e),
            }

            if !self.restart.resume || restarts >= self.restart.max_restarts {
                info!("Acquisition ended");
                break Ok(());
            }
            restarts += 1;
            info!(
                "Resuming acquisition (restart {}/{})",
                restarts, self.restart.max_restarts
            );
            self.cancel.reset();
            std::thread::sleep(self.restart.delay);
            if self.cancel.is_cancelled() {
                info!("Interrupted during restart delay, stopping");
                break Ok(());
            }
        };

        if !buffer.is_empty() {
            let now = self.clock.now();
            if let Err(e) = buffer.flush(FlushTrigger::Terminal, self.mode.label(), now, sink) {
                error!("Final flush failed: {}", e);
            }
        }
        report.unpersisted = buffer.len();
        if report.unpersisted > 0 {
            error!("{} samples were not persisted", report.unpersisted);
        }

        outcome.map(|()| report)
    }
}
