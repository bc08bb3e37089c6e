//! Report sink for deletion outcomes
//!
//! Outcomes are recorded in execution order. [`JsonLinesSink`] writes one
//! JSON object per outcome; [`MemorySink`] keeps them for inspection; the
//! summary table is for humans at the end of a run.

use crate::executor::{Outcome, Status};
use anyhow::{Context, Result};
use comfy_table::{Cell, ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use serde::Serialize;
use std::io::Write;

/// One line of machine-readable output
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportRecord {
    pub resource_type: String,
    pub identifier: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
}

impl From<&Outcome> for ReportRecord {
    fn from(outcome: &Outcome) -> Self {
        Self {
            resource_type: outcome.target.kind().to_string(),
            identifier: outcome.target.identifier(),
            status: outcome.status.as_str().to_string(),
            cause: outcome.status.cause().map(str::to_string),
        }
    }
}

/// Receives the final (target, outcome) sequence
pub trait ReportSink {
    fn record(&mut self, outcome: &Outcome) -> Result<()>;

    /// Flush buffered output
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Writes one JSON object per line
pub struct JsonLinesSink<W: Write> {
    writer: W,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> ReportSink for JsonLinesSink<W> {
    fn record(&mut self, outcome: &Outcome) -> Result<()> {
        serde_json::to_writer(&mut self.writer, &ReportRecord::from(outcome))
            .context("Failed to serialize report record")?;
        self.writer
            .write_all(b"\n")
            .context("Failed to write report record")
    }

    fn finish(&mut self) -> Result<()> {
        self.writer.flush().context("Failed to flush report")
    }
}

/// Keeps records in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    pub records: Vec<ReportRecord>,
}

impl ReportSink for MemorySink {
    fn record(&mut self, outcome: &Outcome) -> Result<()> {
        self.records.push(ReportRecord::from(outcome));
        Ok(())
    }
}

/// Send every outcome to `sink`, then finish it.
pub fn emit(sink: &mut dyn ReportSink, outcomes: &[Outcome]) -> Result<()> {
    for outcome in outcomes {
        sink.record(outcome)?;
    }
    sink.finish()
}

/// Counts per status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub deleted: usize,
    pub failed: usize,
    pub skipped: usize,
    pub cancelled: usize,
    pub dry_run: usize,
}

impl RunSummary {
    pub fn from_outcomes(outcomes: &[Outcome]) -> Self {
        let mut summary = Self::default();
        for outcome in outcomes {
            match outcome.status {
                Status::Deleted => summary.deleted += 1,
                Status::Failed(_) => summary.failed += 1,
                Status::SkippedDependencyFailed => summary.skipped += 1,
                Status::Cancelled => summary.cancelled += 1,
                Status::DryRun => summary.dry_run += 1,
            }
        }
        summary
    }

    pub fn total(&self) -> usize {
        self.deleted + self.failed + self.skipped + self.cancelled + self.dry_run
    }

    /// Outcomes that need an operator to look at them
    pub fn needs_attention(&self) -> bool {
        self.failed > 0 || self.skipped > 0
    }
}

/// Human-readable table of every outcome
pub fn outcome_table(outcomes: &[Outcome]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Type"),
            Cell::new("ID"),
            Cell::new("Status"),
            Cell::new("Cause"),
        ]);

    for outcome in outcomes {
        table.add_row(vec![
            Cell::new(outcome.target.kind()),
            Cell::new(outcome.target.identifier()),
            Cell::new(outcome.status.as_str()),
            Cell::new(outcome.status.cause().unwrap_or("")),
        ]);
    }
    table
}

/// Status counts as a two-column table
pub fn summary_table(summary: &RunSummary) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_header(vec![Cell::new("Status"), Cell::new("Count")]);
    for (label, count) in [
        ("deleted", summary.deleted),
        ("failed", summary.failed),
        ("skipped (dependency failed)", summary.skipped),
        ("cancelled", summary.cancelled),
        ("dry run", summary.dry_run),
    ] {
        table.add_row(vec![Cell::new(label), Cell::new(count)]);
    }
    table
}
