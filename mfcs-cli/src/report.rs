//! Run reports
//!
//! A run is written as one JSON document under the reports directory and
//! summarized on the console with comfy-table.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use mfcs_core::{OutcomeRecord, RunOptions, RunSummary};
use serde::Serialize;
use uuid::Uuid;

/// Everything known about one finished (or interrupted) run
#[derive(Debug, Serialize)]
pub struct Report {
    pub run_id: Uuid,
    pub app: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Set when the run was cancelled before every pair finished
    pub interrupted: bool,
    pub options: RunOptions,
    pub summary: RunSummary,
    /// Per-model summaries keyed by model identifier
    pub models: BTreeMap<String, RunSummary>,
    pub records: Vec<OutcomeRecord>,
}

impl Report {
    pub fn new(
        app: impl Into<String>,
        options: RunOptions,
        started_at: DateTime<Utc>,
        records: Vec<OutcomeRecord>,
        interrupted: bool,
    ) -> Self {
        Self {
            run_id: Uuid::now_v7(),
            app: app.into(),
            started_at,
            finished_at: Utc::now(),
            interrupted,
            options,
            summary: RunSummary::from_records(&records),
            models: RunSummary::per_model(&records),
            records,
        }
    }

    /// `report_<YYYYmmdd_HHMMSS>.json`, stamped with the local start time
    pub fn file_name(&self) -> String {
        self.started_at
            .with_timezone(&Local)
            .format("report_%Y%m%d_%H%M%S.json")
            .to_string()
    }

    /// Write the report as pretty JSON, creating `dir` if needed
    pub fn write(&self, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create reports directory {}", dir.display()))?;

        let mut path = dir.join(self.file_name());
        if path.exists() {
            // Two runs in the same second
            path = dir.join(format!(
                "{}_{}.json",
                self.file_name().trim_end_matches(".json"),
                self.run_id.simple()
            ));
        }

        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json)
            .with_context(|| format!("failed to write report {}", path.display()))?;
        Ok(path)
    }
}

fn header(titles: &[&str]) -> Vec<Cell> {
    titles
        .iter()
        .map(|title| Cell::new(title).fg(Color::Cyan))
        .collect()
}

fn new_table(titles: &[&str]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(header(titles));
    table
}

/// One row per model plus a total row
pub fn summary_table(report: &Report) -> Table {
    let mut table = new_table(&[
        "Model", "Pairs", "Passed", "Failed", "Errors", "Pass Rate", "Accuracy", "Avg Time",
        "Tokens",
    ]);

    let rows = report
        .models
        .iter()
        .map(|(id, summary)| (id.as_str(), summary))
        .chain(std::iter::once(("total", &report.summary)));

    for (label, summary) in rows {
        table.add_row(vec![
            Cell::new(label),
            Cell::new(summary.total),
            Cell::new(summary.passed).fg(Color::Green),
            Cell::new(summary.failed),
            Cell::new(summary.errored).fg(if summary.errored > 0 {
                Color::Red
            } else {
                Color::Reset
            }),
            Cell::new(format!("{:.2}%", summary.pass_rate())),
            Cell::new(format!("{:.2}%", summary.mean_accuracy)),
            Cell::new(format!("{:.2}s", summary.mean_response_time_secs)),
            Cell::new(summary.total_tokens),
        ]);
    }
    table
}

/// One row per pair
pub fn records_table(records: &[OutcomeRecord]) -> Table {
    let mut table = new_table(&[
        "Model", "Test Case", "Tool Usage", "Semantic", "Accuracy", "Time", "Result",
    ]);

    for record in records {
        let (tool, semantic, accuracy, time) = match &record.scores {
            Some(scores) => (
                scores
                    .tool_usage
                    .as_ref()
                    .map(|tool| {
                        let called = tool.actual.as_deref().unwrap_or("none");
                        let verdict = if tool.passed { "pass" } else { "fail" };
                        format!("{verdict} ({called})")
                    })
                    .unwrap_or_else(|| "-".to_string()),
                scores
                    .semantic
                    .as_ref()
                    .map(|s| format!("{:.2} / {:.2}", s.similarity, s.threshold))
                    .unwrap_or_else(|| "-".to_string()),
                format!("{:.2}%", scores.accuracy),
                format!("{:.2}s", scores.response_time.as_secs_f64()),
            ),
            None => ("-".into(), "-".into(), "-".into(), "-".into()),
        };

        let result = match (&record.error, record.success) {
            (Some(error), _) => Cell::new(error.kind).fg(Color::Red),
            (None, true) => Cell::new("pass").fg(Color::Green),
            (None, false) => Cell::new("fail").fg(Color::Yellow),
        };

        table.add_row(vec![
            Cell::new(&record.model_id),
            Cell::new(&record.test_case_id),
            Cell::new(tool),
            Cell::new(semantic),
            Cell::new(accuracy),
            Cell::new(time),
            result,
        ]);
    }
    table
}
