//! Outcome of a synchronisation run

use std::ffi::OsStr;
use std::fmt;
use std::path::Path;

use chrono::{DateTime, Utc};
use tabled::{
    builder::Builder,
    settings::{Alignment, Modify, Style, object::Rows},
};
use uuid::Uuid;

use crate::encoder::ExportFile;

/// Pipeline stage at which an isolated failure happened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureStage {
    Fetch,
    Encode,
    Upload,
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureStage::Fetch => "fetch",
            FailureStage::Encode => "encode",
            FailureStage::Upload => "upload",
        };
        f.write_str(s)
    }
}

/// A collection or file dropped from the run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureRecord {
    /// Qualified collection name or file path
    pub target: String,
    pub stage: FailureStage,
    pub message: String,
}

/// A staged file that reached the remote folder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRecord {
    pub file: String,
    pub remote_id: String,
}

/// Summary returned by a completed run
#[derive(Debug, Clone)]
pub struct SyncReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub first_run: bool,
    pub folder_id: String,
    pub exports: Vec<ExportFile>,
    pub uploads: Vec<UploadRecord>,
    pub failures: Vec<FailureRecord>,
}

impl SyncReport {
    pub fn new(
        run_id: Uuid,
        started_at: DateTime<Utc>,
        first_run: bool,
        folder_id: impl Into<String>,
    ) -> Self {
        Self {
            run_id,
            started_at,
            first_run,
            folder_id: folder_id.into(),
            exports: Vec::new(),
            uploads: Vec::new(),
            failures: Vec::new(),
        }
    }

    pub fn record_failure(
        &mut self,
        target: impl Into<String>,
        stage: FailureStage,
        message: impl Into<String>,
    ) {
        self.failures.push(FailureRecord {
            target: target.into(),
            stage,
            message: message.into(),
        });
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    /// Exports and failures as a table for the terminal
    pub fn render_table(&self) -> String {
        let mut builder = Builder::default();
        builder.push_record(["file", "rows", "columns", "status"]);

        for export in &self.exports {
            let uploaded = self
                .uploads
                .iter()
                .any(|u| Path::new(&u.file).file_name() == Some(OsStr::new(&export.name)));
            let status = if uploaded { "uploaded" } else { "staged" };
            builder.push_record([
                export.name.clone(),
                export.row_count.to_string(),
                export.columns.len().to_string(),
                status.to_string(),
            ]);
        }
        for failure in &self.failures {
            builder.push_record([
                failure.target.clone(),
                "-".to_string(),
                "-".to_string(),
                format!("{} failed: {}", failure.stage, failure.message),
            ]);
        }

        let mut table = builder.build();
        table
            .with(Style::modern())
            .with(Modify::new(Rows::first()).with(Alignment::center()));
        table.to_string()
    }
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "run {} at {}: {} exported, {} uploaded, {} failed{}",
            self.run_id.simple(),
            self.started_at.format("%Y-%m-%d %H:%M:%S UTC"),
            self.exports.len(),
            self.uploads.len(),
            self.failures.len(),
            if self.first_run { " (first run)" } else { "" }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::ColumnSet;
    use chrono::TimeZone;
    use std::path::PathBuf;

    fn export(name: &str, rows: usize) -> ExportFile {
        ExportFile {
            name: name.to_string(),
            path: PathBuf::from("/tmp/upload").join(name),
            columns: ColumnSet::default(),
            row_count: rows,
        }
    }

    #[test]
    fn test_table_lists_exports_and_failures() {
        let mut report = SyncReport::new(Uuid::new_v4(), Utc::now(), true, "f1");
        report.exports.push(export("shop.users.csv", 2));
        report.exports.push(export("shop.orders.csv", 0));
        report.uploads.push(UploadRecord {
            file: "/tmp/upload/shop.users.csv".into(),
            remote_id: "u1".into(),
        });
        report.record_failure("shop.blobs", FailureStage::Encode, "NUL in cell");

        let table = report.render_table();
        assert!(table.contains("shop.users.csv"));
        assert!(table.contains("uploaded"));
        assert!(table.contains("staged"));
        assert!(table.contains("encode failed: NUL in cell"));
        assert!(report.has_failures());
    }

    #[test]
    fn test_display_summary() {
        let started = Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap();
        let mut report = SyncReport::new(Uuid::nil(), started, false, "f1");
        report.exports.push(export("a.b.csv", 1));
        assert_eq!(
            report.to_string(),
            "run 00000000000000000000000000000000 at 2024-03-01 09:30:00 UTC: 1 exported, 0 uploaded, 0 failed"
        );
    }

    #[test]
    fn test_upload_status_matches_whole_file_name() {
        let mut report = SyncReport::new(Uuid::new_v4(), Utc::now(), true, "f1");
        report.exports.push(export("shop.users.csv", 2));
        report.uploads.push(UploadRecord {
            file: "/tmp/upload/a.shop.users.csv".into(),
            remote_id: "u1".into(),
        });

        let table = report.render_table();
        let row = table
            .lines()
            .find(|line| line.contains("shop.users.csv"))
            .unwrap();
        assert!(row.contains("staged"));
        assert!(!row.contains("uploaded"));
    }
}
