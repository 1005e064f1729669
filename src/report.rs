//! Validation findings and their tabular rendering.

use std::fmt;
use std::path::{Path, PathBuf};

use log::info;

use crate::errors::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Status {
    Info,
    Ok,
    Warning,
    Error,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Info => "info",
            Status::Ok => "ok",
            Status::Warning => "warning",
            Status::Error => "error",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of a report, attributed to the dataset it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub source: String,
    pub check: String,
    pub status: Status,
    pub details: String,
}

impl Finding {
    pub fn new(
        source: impl Into<String>,
        check: impl Into<String>,
        status: Status,
        details: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            check: check.into(),
            status,
            details: details.into(),
        }
    }
}

/// Counts of findings per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    pub info: usize,
    pub ok: usize,
    pub warning: usize,
    pub error: usize,
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ok, {} warning, {} error, {} info",
            self.ok, self.warning, self.error, self.info
        )
    }
}

const SEPARATOR: (&str, &str, &str) = ("----------------", "----------", "--------------------");

/// Ordered findings; consecutive findings with the same source form a section.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Report {
    findings: Vec<Finding>,
}

impl Report {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, finding: Finding) {
        self.findings.push(finding);
    }

    pub fn extend<I: IntoIterator<Item = Finding>>(&mut self, findings: I) {
        self.findings.extend(findings);
    }

    pub fn findings(&self) -> &[Finding] {
        &self.findings
    }

    pub fn for_source<'a>(&'a self, source: &'a str) -> impl Iterator<Item = &'a Finding> + 'a {
        self.findings.iter().filter(move |f| f.source == source)
    }

    pub fn summary(&self) -> Summary {
        let mut summary = Summary::default();
        for finding in &self.findings {
            match finding.status {
                Status::Info => summary.info += 1,
                Status::Ok => summary.ok += 1,
                Status::Warning => summary.warning += 1,
                Status::Error => summary.error += 1,
            }
        }
        summary
    }

    pub fn has_errors(&self) -> bool {
        self.findings.iter().any(|f| f.status == Status::Error)
    }

    /// `(check, status, details)` rows with a separator row between sections.
    pub fn rows(&self) -> Vec<(String, String, String)> {
        let mut rows = Vec::with_capacity(self.findings.len() + 8);
        for (i, finding) in self.findings.iter().enumerate() {
            if i > 0 && self.findings[i - 1].source != finding.source {
                rows.push(separator_row());
            }
            rows.push((
                finding.check.clone(),
                finding.status.to_string(),
                finding.details.clone(),
            ));
        }
        if !rows.is_empty() {
            rows.push(separator_row());
        }
        rows
    }

    pub fn to_markdown(&self) -> String {
        let mut out = String::from("| Check | Status | Details |\n|---|---|---|\n");
        for (check, status, details) in self.rows() {
            out.push_str(&format!(
                "| {} | {} | {} |\n",
                markdown_cell(&check),
                markdown_cell(&status),
                markdown_cell(&details)
            ));
        }
        out
    }

    pub fn to_html(&self) -> String {
        let mut out = String::from(
            "<table border=\"1\" class=\"dataframe\">\n  <thead>\n    <tr><th>Check</th><th>Status</th><th>Details</th></tr>\n  </thead>\n  <tbody>\n",
        );
        for (check, status, details) in self.rows() {
            out.push_str(&format!(
                "    <tr><td>{}</td><td>{}</td><td>{}</td></tr>\n",
                html_cell(&check),
                html_cell(&status),
                html_cell(&details)
            ));
        }
        out.push_str("  </tbody>\n</table>\n");
        out
    }

    /// Write `<stem>.md` and `<stem>.html` into `dir`.
    pub fn write_to(&self, dir: &Path, stem: &str) -> Result<Vec<PathBuf>> {
        std::fs::create_dir_all(dir)?;
        let md = dir.join(format!("{stem}.md"));
        let html = dir.join(format!("{stem}.html"));
        std::fs::write(&md, self.to_markdown())?;
        std::fs::write(&html, self.to_html())?;
        info!(
            "Data quality report saved at {}.[html|md]",
            dir.join(stem).display()
        );
        Ok(vec![md, html])
    }
}

fn separator_row() -> (String, String, String) {
    (
        SEPARATOR.0.to_string(),
        SEPARATOR.1.to_string(),
        SEPARATOR.2.to_string(),
    )
}

fn markdown_cell(text: &str) -> String {
    text.trim_end()
        .replace('|', "\\|")
        .replace('\n', "<br>")
}

fn html_cell(text: &str) -> String {
    text.trim_end()
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\n', "<br>")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report() -> Report {
        let mut report = Report::new();
        report.push(Finding::new("a.csv", "Filename", Status::Info, "a.csv"));
        report.push(Finding::new("a.csv", "Packet Loss", Status::Ok, "No packet loss detected"));
        report.push(Finding::new("b.csv", "Filename", Status::Info, "b.csv"));
        report.push(Finding::new("b.csv", "ODR", Status::Error, "20 <bad>\n25"));
        report
    }

    #[test]
    fn separators_mark_section_boundaries() {
        let rows = report().rows();
        assert_eq!(rows.len(), 6);
        assert_eq!(rows[2].0, SEPARATOR.0);
        assert_eq!(rows[5].0, SEPARATOR.0);
        assert_eq!(rows[3].0, "Filename");
    }

    #[test]
    fn summary_counts_statuses() {
        let report = report();
        let summary = report.summary();
        assert_eq!((summary.info, summary.ok, summary.error), (2, 1, 1));
        assert!(report.has_errors());
        assert_eq!(report.for_source("b.csv").count(), 2);
    }

    #[test]
    fn renders_escaped_tables() {
        let report = report();
        let md = report.to_markdown();
        assert!(md.starts_with("| Check | Status | Details |"));
        assert!(md.contains("| ODR | error | 20 <bad><br>25 |"));

        let html = report.to_html();
        assert!(html.contains("<td>20 &lt;bad&gt;<br>25</td>"));
    }

    #[test]
    fn writes_both_formats() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = report().write_to(tmp.path(), "DATA_check").unwrap();
        assert_eq!(paths.len(), 2);
        assert!(paths.iter().all(|p| p.is_file()));
    }
}
