//! In-memory sample buffer with interval and terminal flush triggers.

use std::time::Duration;

use chrono::NaiveDateTime;
use log::{debug, error};

use crate::errors::Result;
use crate::frame::Sample;
use crate::persist::{AppendOutcome, SampleSink};

/// When a session writes its buffer out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushPolicy {
    /// Periodic flushes while no label is active, plus the terminal flush.
    Interval,
    /// Only the terminal flush.
    TerminalOnly,
}

/// What caused a flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushTrigger {
    Interval,
    Terminal,
}

#[derive(Debug)]
pub struct AcquisitionBuffer {
    samples: Vec<Sample>,
    policy: FlushPolicy,
    interval: Duration,
    default_label: String,
    last_flush: NaiveDateTime,
}

impl AcquisitionBuffer {
    pub fn new(
        policy: FlushPolicy,
        interval: Duration,
        default_label: impl Into<String>,
        started_at: NaiveDateTime,
    ) -> Self {
        Self {
            samples: Vec::new(),
            policy,
            interval,
            default_label: default_label.into(),
            last_flush: started_at,
        }
    }

    pub fn push(&mut self, sample: Sample) {
        self.samples.push(sample);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Restart the interval clock, e.g. when a new session begins.
    pub fn reset_clock(&mut self, now: NaiveDateTime) {
        self.last_flush = now;
    }

    /// Whether the interval trigger fires at `now`.
    pub fn interval_due(&self, now: NaiveDateTime, active_label: Option<&str>) -> bool {
        if self.policy != FlushPolicy::Interval || active_label.is_some() {
            return false;
        }
        // A clock that moved backwards never triggers.
        now.signed_duration_since(self.last_flush)
            .to_std()
            .map(|elapsed| elapsed >= self.interval)
            .unwrap_or(false)
    }

    /// Write the buffer through `sink`; samples are dropped only once the sink
    /// reports success. Unlabeled samples take the flush label. `&mut self`
    /// keeps a second flush from starting while one is in progress.
    pub fn flush<W: SampleSink + ?Sized>(
        &mut self,
        trigger: FlushTrigger,
        active_label: Option<&str>,
        now: NaiveDateTime,
        sink: &mut W,
    ) -> Result<AppendOutcome> {
        let label = match trigger {
            FlushTrigger::Interval => self.default_label.as_str(),
            FlushTrigger::Terminal => active_label.unwrap_or(self.default_label.as_str()),
        };
        for sample in self.samples.iter_mut().filter(|s| s.label.is_none()) {
            sample.label = Some(label.to_string());
        }
        // The interval restarts even on failure, so retries happen once per interval.
        self.last_flush = now;

        match sink.persist(label, now, &self.samples) {
            Ok(outcome) => {
                debug!(
                    "{:?} flush persisted {} samples",
                    trigger,
                    self.samples.len()
                );
                self.samples.clear();
                Ok(outcome)
            }
            Err(e) => {
                error!(
                    "{:?} flush failed, retaining {} samples for retry: {}",
                    trigger,
                    self.samples.len(),
                    e
                );
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::CaptureError;
    use chrono::{NaiveDate, TimeDelta};
    use std::path::PathBuf;

    #[derive(Default)]
    struct RecordingSink {
        calls: Vec<(String, usize)>,
        labels: Vec<Option<String>>,
        fail: bool,
    }

    impl SampleSink for RecordingSink {
        fn persist(
            &mut self,
            label: &str,
            _flushed_at: NaiveDateTime,
            samples: &[Sample],
        ) -> Result<AppendOutcome> {
            self.calls.push((label.to_string(), samples.len()));
            self.labels.extend(samples.iter().map(|s| s.label.clone()));
            if self.fail {
                return Err(CaptureError::Persistence {
                    path: PathBuf::from("/unwritable"),
                    pending: samples.len(),
                    source: std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
                });
            }
            if samples.is_empty() {
                return Ok(AppendOutcome::Skipped);
            }
            Ok(AppendOutcome::Written {
                path: PathBuf::from(format!("{label}.csv")),
                rows: samples.len(),
                header_written: true,
            })
        }
    }

    fn t0() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap()
    }

    fn sample(index: i64) -> Sample {
        Sample {
            sequence_index: index,
            channels: vec![0.0; 3],
            captured_at: t0(),
            label: None,
        }
    }

    fn interval_buffer() -> AcquisitionBuffer {
        AcquisitionBuffer::new(FlushPolicy::Interval, Duration::from_secs(300), "farm_ft", t0())
    }

    #[test]
    fn interval_trigger_waits_for_elapsed_time() {
        let buffer = interval_buffer();
        assert!(!buffer.interval_due(t0() + TimeDelta::seconds(299), None));
        assert!(buffer.interval_due(t0() + TimeDelta::seconds(300), None));
        assert!(!buffer.interval_due(t0() - TimeDelta::seconds(10), None));
    }

    #[test]
    fn interval_trigger_suppressed_while_labeled() {
        let buffer = interval_buffer();
        assert!(!buffer.interval_due(t0() + TimeDelta::hours(1), Some("walk")));

        let terminal_only =
            AcquisitionBuffer::new(FlushPolicy::TerminalOnly, Duration::from_secs(1), "x", t0());
        assert!(!terminal_only.interval_due(t0() + TimeDelta::hours(1), None));
    }

    #[test]
    fn successful_flush_clears_and_resets_interval() {
        let mut buffer = interval_buffer();
        let mut sink = RecordingSink::default();
        buffer.push(sample(0));
        buffer.push(sample(1));

        let now = t0() + TimeDelta::seconds(300);
        buffer
            .flush(FlushTrigger::Interval, None, now, &mut sink)
            .unwrap();
        assert!(buffer.is_empty());
        assert_eq!(sink.calls, vec![("farm_ft".to_string(), 2)]);
        assert!(!buffer.interval_due(now + TimeDelta::seconds(1), None));
    }

    #[test]
    fn failed_flush_retains_samples() {
        let mut buffer = interval_buffer();
        let mut sink = RecordingSink {
            fail: true,
            ..Default::default()
        };
        buffer.push(sample(0));
        buffer.push(sample(1));

        let err = buffer
            .flush(FlushTrigger::Terminal, Some("walk"), t0(), &mut sink)
            .unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(buffer.len(), 2);

        sink.fail = false;
        buffer
            .flush(FlushTrigger::Terminal, Some("walk"), t0(), &mut sink)
            .unwrap();
        assert!(buffer.is_empty());
        assert_eq!(sink.calls.len(), 2);
        assert_eq!(sink.calls[1], ("walk".to_string(), 2));
    }

    #[test]
    fn terminal_flush_falls_back_to_default_label() {
        let mut buffer =
            AcquisitionBuffer::new(FlushPolicy::TerminalOnly, Duration::from_secs(300), "idle", t0());
        let mut sink = RecordingSink::default();
        buffer.push(sample(0));
        buffer
            .flush(FlushTrigger::Terminal, None, t0(), &mut sink)
            .unwrap();
        assert_eq!(sink.calls, vec![("idle".to_string(), 1)]);
    }

    #[test]
    fn unlabeled_samples_take_flush_label() {
        let mut buffer = interval_buffer();
        let mut sink = RecordingSink::default();
        buffer.push(sample(0));
        buffer.push(Sample {
            label: Some("walk".into()),
            ..sample(1)
        });

        buffer
            .flush(FlushTrigger::Interval, None, t0(), &mut sink)
            .unwrap();
        assert_eq!(
            sink.labels,
            vec![Some("farm_ft".to_string()), Some("walk".to_string())]
        );
    }
}
