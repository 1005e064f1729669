//! Continuity checks over persisted datasets.
//!
//! Two checks matter most:
//!
//! - **Packet loss**: rows are ordered by capture time, then sequence index,
//!   and every successive index delta must be exactly 1. The first row of a
//!   segment has delta 1 by definition. Forward gaps and reversals are both
//!   reported; nothing is reordered to hide them.
//! - **ODR**: timestamps are truncated to whole seconds and counted per
//!   bucket. The set of observed counts must lie inside the accepted set.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{NaiveDateTime, Timelike};
use log::info;

use crate::dataset::{DatasetRow, DatasetTable};
use crate::report::{Finding, Status};

pub const CHECK_FILENAME: &str = "Filename";
pub const CHECK_MISSING: &str = "Missing Values";
pub const CHECK_TIMESTAMPS: &str = "Timestamp Parsing";
pub const CHECK_INDEX_TYPE: &str = "Index Column Type";
pub const CHECK_PACKET_LOSS: &str = "Packet Loss";
pub const CHECK_ODR: &str = "ODR";

/// A row whose index does not follow its predecessor by exactly 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContinuityGap {
    /// Position in the sorted row order.
    pub position: usize,
    pub index: Option<i64>,
    /// Difference to the previous index, if both are known.
    pub delta: Option<i64>,
}

/// Sample count for one whole second.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OdrBucket {
    pub time_bucket: NaiveDateTime,
    pub sample_count: usize,
}

/// Result of the ODR check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OdrSummary {
    pub buckets: Vec<OdrBucket>,
    pub observed: BTreeSet<usize>,
    pub within_band: bool,
}

/// Sort rows by segment, capture time (unparsed last) and index (missing last).
pub fn sort_rows(rows: &mut [DatasetRow]) {
    rows.sort_by(|a, b| {
        a.segment
            .cmp(&b.segment)
            .then_with(|| cmp_missing_last(&a.captured_at, &b.captured_at))
            .then_with(|| cmp_missing_last(&a.index, &b.index))
    });
}

fn cmp_missing_last<T: Ord>(a: &Option<T>, b: &Option<T>) -> std::cmp::Ordering {
    use std::cmp::Ordering;
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Single pass over already sorted rows.
pub fn detect_gaps(rows: &[DatasetRow]) -> Vec<ContinuityGap> {
    let mut gaps = Vec::new();
    for (position, pair) in rows.windows(2).enumerate() {
        let (prev, row) = (&pair[0], &pair[1]);
        if prev.segment != row.segment {
            continue;
        }
        let delta = match (prev.index, row.index) {
            (Some(p), Some(c)) => c.checked_sub(p),
            _ => None,
        };
        if delta != Some(1) {
            gaps.push(ContinuityGap {
                position: position + 1,
                index: row.index,
                delta,
            });
        }
    }
    gaps
}

/// Count rows per whole second; rows without a timestamp are skipped.
pub fn odr_buckets(rows: &[DatasetRow]) -> Vec<OdrBucket> {
    let mut counts: BTreeMap<NaiveDateTime, usize> = BTreeMap::new();
    for ts in rows.iter().filter_map(|r| r.captured_at) {
        let bucket = ts.with_nanosecond(0).unwrap_or(ts);
        *counts.entry(bucket).or_insert(0) += 1;
    }
    counts
        .into_iter()
        .map(|(time_bucket, sample_count)| OdrBucket {
            time_bucket,
            sample_count,
        })
        .collect()
}

pub fn check_odr(rows: &[DatasetRow], accepted: &BTreeSet<usize>) -> OdrSummary {
    let buckets = odr_buckets(rows);
    let observed: BTreeSet<usize> = buckets.iter().map(|b| b.sample_count).collect();
    let within_band = observed.is_subset(accepted);
    OdrSummary {
        buckets,
        observed,
        within_band,
    }
}

fn bucket_table(buckets: &[OdrBucket]) -> String {
    let mut out = String::from("time                 odr\n");
    for b in buckets {
        out.push_str(&format!(
            "{}  {}\n",
            b.time_bucket.format("%Y-%m-%d %H:%M:%S"),
            b.sample_count
        ));
    }
    out
}

fn format_set(set: &BTreeSet<usize>) -> String {
    let items: Vec<String> = set.iter().map(|v| v.to_string()).collect();
    format!("{{{}}}", items.join(", "))
}

/// Run every check over `table`, returning findings tagged with its name.
pub fn run_checks(table: &DatasetTable, accepted_odr: &BTreeSet<usize>) -> Vec<Finding> {
    let source = table.name.as_str();
    let finding = |check: &str, status: Status, details: String| {
        Finding::new(source, check, status, details)
    };
    let mut findings = vec![finding(CHECK_FILENAME, Status::Info, source.to_string())];

    if table.missing_values > 0 {
        findings.push(finding(
            CHECK_MISSING,
            Status::Warning,
            format!(
                "{} missing values in {} columns",
                table.missing_values, table.columns_with_missing
            ),
        ));
    } else {
        findings.push(finding(
            CHECK_MISSING,
            Status::Ok,
            "No missing values detected".to_string(),
        ));
    }

    let unparsed = table.unparsed_timestamps();
    if unparsed > 0 {
        findings.push(finding(
            CHECK_TIMESTAMPS,
            Status::Warning,
            format!("{unparsed} timestamps could not be parsed"),
        ));
    }

    if table.coerced_index > 0 {
        findings.push(finding(
            CHECK_INDEX_TYPE,
            Status::Warning,
            format!(
                "{} index values were non-integer and have been converted",
                table.coerced_index
            ),
        ));
    }

    let mut rows = table.rows.clone();
    sort_rows(&mut rows);

    let gaps = detect_gaps(&rows);
    if gaps.is_empty() {
        findings.push(finding(
            CHECK_PACKET_LOSS,
            Status::Ok,
            "No packet loss detected".to_string(),
        ));
    } else {
        let positions: Vec<String> = gaps.iter().map(|g| g.position.to_string()).collect();
        findings.push(finding(
            CHECK_PACKET_LOSS,
            Status::Error,
            format!("Packet loss detected at positions: [{}]", positions.join(", ")),
        ));
    }

    if rows.iter().all(|r| r.captured_at.is_none()) {
        findings.push(finding(
            CHECK_ODR,
            Status::Warning,
            "No timestamped samples to measure".to_string(),
        ));
    } else {
        let odr = check_odr(&rows, accepted_odr);
        if odr.within_band {
            findings.push(finding(
                CHECK_ODR,
                Status::Ok,
                format!(
                    "Valid ODR values found: {}\n{}",
                    format_set(&odr.observed),
                    bucket_table(&odr.buckets)
                ),
            ));
        } else {
            findings.push(finding(
                CHECK_ODR,
                Status::Error,
                format!(
                    "Invalid ODR values detected: {} (accepted {})\n{}",
                    format_set(&odr.observed),
                    format_set(accepted_odr),
                    bucket_table(&odr.buckets)
                ),
            ));
        }
    }

    info!("Quality checks completed for: {}", source);
    findings
}
