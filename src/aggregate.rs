//! Directory-wide data quality report.
//!
//! Files are checked independently on the blocking pool of a multi-thread
//! runtime; the merged pass starts only after every per-file task has joined.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use futures::future::join_all;
use log::{error, info, warn};

use crate::config::ValidationConfig;
use crate::dataset::{ColumnNames, DatasetTable};
use crate::errors::{CaptureError, Result};
use crate::report::{Finding, Report, Status};
use crate::validate::run_checks;

/// Source name used for the merged pass.
pub const AGGREGATE_SOURCE: &str = "After merging";

#[derive(Debug, Clone)]
pub struct AggregatorOptions {
    pub extension: String,
    pub columns: ColumnNames,
    pub accepted_odr: BTreeSet<usize>,
}

impl From<&ValidationConfig> for AggregatorOptions {
    fn from(config: &ValidationConfig) -> Self {
        Self {
            extension: config.extension.trim_start_matches('.').to_string(),
            columns: ColumnNames {
                index: config.index_column.clone(),
                time: config.time_column.clone(),
            },
            accepted_odr: config.accepted_odr.clone(),
        }
    }
}

/// Per-file result: findings plus the table when loading succeeded.
#[derive(Debug)]
struct FileOutcome {
    findings: Vec<Finding>,
    table: Option<DatasetTable>,
}

pub struct QualityAggregator {
    options: AggregatorOptions,
}

impl QualityAggregator {
    pub fn new(options: AggregatorOptions) -> Self {
        Self { options }
    }

    /// Walk `root`, check every dataset file and then their concatenation.
    ///
    /// Per-file failures become findings. Only an unreadable `root` is an error.
    pub fn run(&self, root: &Path) -> Result<Report> {
        let mut report = Report::new();
        let files = self.collect_files(root, &mut report)?;
        info!("Validating {} dataset files under {}", files.len(), root.display());

        let rt = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?;
        let outcomes = rt.block_on(self.check_files(root, files));

        let mut tables = Vec::with_capacity(outcomes.len());
        for outcome in outcomes {
            report.extend(outcome.findings);
            if let Some(table) = outcome.table {
                tables.push(table);
            }
        }

        match DatasetTable::concat(AGGREGATE_SOURCE, &tables) {
            Ok(merged) => report.extend(run_checks(&merged, &self.options.accepted_odr)),
            Err(e) => {
                error!("Aggregate pass skipped: {}", e);
                report.push(Finding::new(
                    AGGREGATE_SOURCE,
                    "Aggregate",
                    Status::Error,
                    e.to_string(),
                ));
            }
        }
        Ok(report)
    }

    async fn check_files(&self, root: &Path, files: Vec<PathBuf>) -> Vec<FileOutcome> {
        let tasks = files.into_iter().map(|path| {
            let name = display_name(root, &path);
            let options = self.options.clone();
            let task_name = name.clone();
            let handle =
                tokio::task::spawn_blocking(move || check_file(&path, task_name, &options));
            async move {
                handle.await.unwrap_or_else(|e| {
                    error!("Validation task for {} failed: {}", name, e);
                    failed(&name, format!("validation task failed: {e}"))
                })
            }
        });
        join_all(tasks).await
    }

    /// Dataset files under `root`, sorted for a stable report order.
    fn collect_files(&self, root: &Path, report: &mut Report) -> Result<Vec<PathBuf>> {
        let entries = std::fs::read_dir(root).map_err(|e| {
            CaptureError::Validation(format!("cannot read {}: {e}", root.display()))
        })?;
        let mut files = Vec::new();
        let mut pending: Vec<PathBuf> = Vec::new();
        self.scan(root, entries, &mut files, &mut pending, report);

        while let Some(dir) = pending.pop() {
            match std::fs::read_dir(&dir) {
                Ok(entries) => self.scan(root, entries, &mut files, &mut pending, report),
                Err(e) => {
                    warn!("Skipping unreadable directory {}: {}", dir.display(), e);
                    report.push(Finding::new(
                        display_name(root, &dir),
                        "Directory",
                        Status::Error,
                        format!("cannot read directory: {e}"),
                    ));
                }
            }
        }
        files.sort();
        Ok(files)
    }

    fn scan(
        &self,
        root: &Path,
        entries: std::fs::ReadDir,
        files: &mut Vec<PathBuf>,
        pending: &mut Vec<PathBuf>,
        report: &mut Report,
    ) {
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable entry under {}: {}", root.display(), e);
                    continue;
                }
            };
            let path = entry.path();
            let symlink = entry.file_type().map_or(false, |t| t.is_symlink());
            if symlink && path.is_dir() {
                warn!("Not following directory link {}", path.display());
            } else if path.is_dir() {
                pending.push(path);
            } else if path.is_file() && self.is_dataset(&path) {
                files.push(path);
            } else if !path.is_file() {
                report.push(Finding::new(
                    display_name(root, &path),
                    "Directory",
                    Status::Warning,
                    "entry is neither file nor directory".to_string(),
                ));
            }
        }
    }

    fn is_dataset(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map_or(false, |e| e == self.options.extension)
    }
}

fn check_file(path: &Path, name: String, options: &AggregatorOptions) -> FileOutcome {
    match DatasetTable::load(path, name.clone(), &options.columns) {
        Ok(table) => FileOutcome {
            findings: run_checks(&table, &options.accepted_odr),
            table: Some(table),
        },
        Err(e) => {
            error!("Error processing {}: {}", path.display(), e);
            failed(&name, e.to_string())
        }
    }
}

fn failed(name: &str, details: String) -> FileOutcome {
    FileOutcome {
        findings: vec![
            Finding::new(name, "Filename", Status::Info, name),
            Finding::new(name, "Load", Status::Error, details),
        ],
        table: None,
    }
}

fn display_name(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> AggregatorOptions {
        AggregatorOptions::from(&ValidationConfig::default())
    }

    #[test]
    fn empty_directory_fails_only_the_aggregate_pass() {
        let tmp = tempfile::tempdir().unwrap();
        let report = QualityAggregator::new(options()).run(tmp.path()).unwrap();
        assert_eq!(report.findings().len(), 1);
        assert_eq!(report.findings()[0].source, AGGREGATE_SOURCE);
        assert_eq!(report.findings()[0].status, Status::Error);
    }

    #[test]
    fn missing_root_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let result = QualityAggregator::new(options()).run(&tmp.path().join("absent"));
        assert!(matches!(result, Err(CaptureError::Validation(_))));
    }

    #[test]
    fn unreadable_file_is_recorded_and_walk_continues() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("broken.csv"), "no,header,match\n1,2,3\n").unwrap();
        std::fs::write(tmp.path().join("notes.txt"), "ignored").unwrap();
        std::fs::create_dir(tmp.path().join("sub")).unwrap();
        std::fs::write(
            tmp.path().join("sub").join("ok.csv"),
            "index,ax,datetime\n0,1.0,2024-03-01-12-00-00.000000\n",
        )
        .unwrap();

        let report = QualityAggregator::new(options()).run(tmp.path()).unwrap();
        let load_errors: Vec<&Finding> = report
            .findings()
            .iter()
            .filter(|f| f.check == "Load")
            .collect();
        assert_eq!(load_errors.len(), 1);
        assert_eq!(load_errors[0].source, "broken.csv");
        assert!(report.for_source("sub/ok.csv").count() > 0);
        assert!(report.for_source(AGGREGATE_SOURCE).count() > 0);
        assert_eq!(report.for_source("notes.txt").count(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn directory_links_are_not_followed() {
        let tmp = tempfile::tempdir().unwrap();
        let sub = tmp.path().join("sub");
        std::fs::create_dir(&sub).unwrap();
        std::fs::write(
            sub.join("a.csv"),
            "index,ax,datetime\n0,1.0,2024-03-01-12-00-00.000000\n",
        )
        .unwrap();
        std::os::unix::fs::symlink(tmp.path(), sub.join("loop")).unwrap();

        let report = QualityAggregator::new(options()).run(tmp.path()).unwrap();
        let filenames: Vec<&str> = report
            .findings()
            .iter()
            .filter(|f| f.check == "Filename" && f.source != AGGREGATE_SOURCE)
            .map(|f| f.source.as_str())
            .collect();
        assert_eq!(filenames, vec!["sub/a.csv"]);
    }

    #[test]
    fn full_range_index_jump_is_packet_loss_not_a_load_failure() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(
            tmp.path().join("a.csv"),
            "index,ax,datetime\n\
             -9223372036854775808,1.0,2024-03-01-12-00-00.000000\n\
             9223372036854775807,1.0,2024-03-01-12-00-00.040000\n",
        )
        .unwrap();

        let report = QualityAggregator::new(options()).run(tmp.path()).unwrap();
        assert!(report.findings().iter().all(|f| f.check != "Load"));
        for source in ["a.csv", AGGREGATE_SOURCE] {
            let loss = report
                .for_source(source)
                .find(|f| f.check == "Packet Loss")
                .unwrap();
            assert_eq!(loss.status, Status::Error, "{source}");
        }
    }
}
