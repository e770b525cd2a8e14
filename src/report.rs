//! Run reporting
//!
//! A [`ReportSink`] receives the run as it happens: the start, every
//! progress event, one row per finished file and the final report.
//! Three renderers exist: a console table ([`ConsoleReport`]), a summary
//! only variant ([`SummaryReport`]) and a JSON document ([`JsonReport`]).

use std::io::{self, Write};
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::cli::VerbosityLevel;
use crate::error::Result;
use crate::format::{TargetFormat, Variant};
use crate::orchestrator::{
    ComparisonPhase, ComparisonProgress, ComparisonResult, ErrorRecord, FileRow, RunAggregate,
    RunReport, RunSettings,
};

const BAR_WIDTH: usize = 40;
const NAME_WIDTH: usize = 40;
const CELL_WIDTH: usize = 11;

/// Observer of a comparison run
pub trait ReportSink {
    fn on_run_started(&mut self, _settings: &RunSettings, _total_files: usize) -> Result<()> {
        Ok(())
    }

    fn on_progress(&mut self, _progress: &ComparisonProgress) {}

    fn on_row(&mut self, _row: &FileRow, _aggregate: &RunAggregate) -> Result<()> {
        Ok(())
    }

    fn on_run_finished(&mut self, _report: &RunReport) -> Result<()> {
        Ok(())
    }
}

/// Sink that ignores everything
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentReport;

impl ReportSink for SilentReport {}

/// Human-readable console renderer
pub struct ConsoleReport<W: Write = io::Stdout> {
    verbosity: VerbosityLevel,
    show_colors: bool,
    errors_to_print: usize,
    formats: Vec<TargetFormat>,
    writer: W,
}

impl ConsoleReport<io::Stdout> {
    pub fn new(verbosity: VerbosityLevel, errors_to_print: usize) -> Self {
        Self {
            verbosity,
            show_colors: atty::is(atty::Stream::Stdout),
            errors_to_print,
            formats: TargetFormat::ALL.to_vec(),
            writer: io::stdout(),
        }
    }
}

impl<W: Write> ConsoleReport<W> {
    /// Render into `writer` without colors
    pub fn with_writer(verbosity: VerbosityLevel, errors_to_print: usize, writer: W) -> Self {
        Self {
            verbosity,
            show_colors: false,
            errors_to_print,
            formats: TargetFormat::ALL.to_vec(),
            writer,
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn colorize(&self, text: &str, color: &str) -> String {
        if self.show_colors {
            format!("\x1b[{}m{}\x1b[0m", color, text)
        } else {
            text.to_string()
        }
    }

    pub fn format_header(&self) -> String {
        let mut line = format!("{:<width$}", "Filename", width = NAME_WIDTH);
        for format in &self.formats {
            line.push_str(&format!(" | {:<width$}", format.label(), width = CELL_WIDTH - 3));
        }
        line.push('\n');
        line.push_str(&"-".repeat(line.trim_end().chars().count()));
        line.push('\n');
        line
    }

    pub fn format_row(&self, row: &FileRow) -> String {
        let name = row
            .file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| row.file.display().to_string());

        let mut line = format!("{:<width$}", name, width = NAME_WIDTH);
        for outcome in &row.outcomes {
            let (label, color) = status_cell(&outcome.result);
            let padded = format!("{:<width$}", label, width = CELL_WIDTH - 3);
            line.push_str(" | ");
            line.push_str(&self.colorize(&padded, color));
        }
        line.push('\n');
        line
    }

    /// Totals as scaled text bars, followed by rate and duration
    pub fn format_summary(&self, report: &RunReport) -> String {
        let aggregate = &report.aggregate;
        let mut bars = vec![("Total".to_string(), aggregate.total, "36")];
        for (format, counters) in &aggregate.formats {
            bars.push((
                format!("{} errors", format.label()),
                counters.errors(),
                "31",
            ));
        }

        let max = bars.iter().map(|(_, v, _)| *v).max().unwrap_or(0).max(1);
        let label_width = bars.iter().map(|(l, _, _)| l.len()).max().unwrap_or(0);

        let mut output = String::new();
        output.push_str("Comparison Summary:\n");
        output.push_str(&format!(
            "  Files: {}  Comparisons: {}\n",
            aggregate.files, aggregate.total
        ));
        for (label, value, color) in &bars {
            let bar = "█".repeat(scaled(*value, max));
            output.push_str(&format!(
                "  {:<width$} {} {}\n",
                label,
                self.colorize(&bar, color),
                value,
                width = label_width
            ));
        }

        if self.verbosity >= VerbosityLevel::Verbose {
            for (format, counters) in &aggregate.formats {
                output.push_str(&format!(
                    "  {}: processed {}, equal {}, different {}, failed {}\n",
                    format.label(),
                    counters.processed,
                    counters.equal,
                    counters.different,
                    counters.failed
                ));
            }
        }

        output.push_str(&format!("  Success rate: {:.1}%\n", aggregate.success_rate()));
        output.push_str(&format!("  Duration: {}\n", format_duration(report.duration)));

        if self.verbosity == VerbosityLevel::Debug {
            output.push_str(&format!("  Run id: {}\n", report.run_id));
        }

        output
    }

    pub fn format_error(&self, record: &ErrorRecord, baseline: &Variant, candidate: &Variant) -> String {
        let title = format!(
            " {} | {} ",
            record.format.label(),
            record.file.display()
        );
        let mut output = String::new();
        output.push_str(&self.colorize(&format!("────{}────", title), "33"));
        output.push('\n');

        if let Some(message) = &record.message {
            output.push_str(message);
            if !message.ends_with('\n') {
                output.push('\n');
            }
        }
        if let Some(path) = &record.baseline_path {
            output.push_str(&format!("  Baseline ({}): {}\n", baseline.name, path.display()));
        }
        if let Some(path) = &record.candidate_path {
            output.push_str(&format!("  Candidate ({}): {}\n", candidate.name, path.display()));
        }
        if let Some(cause) = &record.cause {
            output.push_str(&format!("  {} {}\n", self.colorize("Error:", "31"), cause));
        }
        output
    }

    pub fn format_errors(&self, report: &RunReport) -> String {
        let shown = report.displayed_errors(self.errors_to_print);
        let mut output = String::new();
        for record in shown {
            output.push('\n');
            output.push_str(&self.format_error(record, &report.baseline, &report.candidate));
        }

        let hidden = report.errors.len() - shown.len();
        if hidden > 0 {
            output.push_str(&format!(
                "\n{} more error{} not shown (raise --errors-to-print to see them)\n",
                hidden,
                if hidden == 1 { "" } else { "s" }
            ));
        }
        output
    }

    /// One-line pass/fail counts
    pub fn format_counts(&self, report: &RunReport) -> String {
        let aggregate = &report.aggregate;
        let (equal, different, failed) = aggregate
            .formats
            .values()
            .fold((0, 0, 0), |(e, d, f), c| (e + c.equal, d + c.different, f + c.failed));
        format!(
            "{} files, {} comparisons: {} equal, {} different, {} failed\n",
            aggregate.files, aggregate.total, equal, different, failed
        )
    }

    fn write_final(&mut self, report: &RunReport) -> Result<()> {
        if self.verbosity == VerbosityLevel::Quiet && !report.has_differences() {
            let line = self.format_counts(report);
            self.writer.write_all(line.as_bytes())?;
            self.writer.flush()?;
            return Ok(());
        }

        let mut output = String::from("\n");
        output.push_str(&self.format_summary(report));
        output.push_str(&self.format_errors(report));
        self.writer.write_all(output.as_bytes())?;
        self.writer.flush()?;
        Ok(())
    }
}

impl<W: Write> ReportSink for ConsoleReport<W> {
    fn on_run_started(&mut self, settings: &RunSettings, total_files: usize) -> Result<()> {
        self.formats = settings.formats.clone();
        if self.verbosity == VerbosityLevel::Quiet {
            return Ok(());
        }

        let header = self.format_header();
        writeln!(
            self.writer,
            "Compare all files in {}",
            settings.input_root.display()
        )?;
        writeln!(self.writer, "Found {} files.\n", total_files)?;
        self.writer.write_all(header.as_bytes())?;
        Ok(())
    }

    fn on_progress(&mut self, progress: &ComparisonProgress) {
        if self.verbosity >= VerbosityLevel::Verbose
            && progress.phase == ComparisonPhase::ConvertingBaseline
        {
            eprintln!(
                "[{}/{}] {} {}",
                progress.index + 1,
                progress.total,
                progress.format.label(),
                progress.file.display()
            );
        }
    }

    fn on_row(&mut self, row: &FileRow, _aggregate: &RunAggregate) -> Result<()> {
        if self.verbosity == VerbosityLevel::Quiet {
            return Ok(());
        }
        let line = self.format_row(row);
        self.writer.write_all(line.as_bytes())?;
        Ok(())
    }

    fn on_run_finished(&mut self, report: &RunReport) -> Result<()> {
        self.write_final(report)
    }
}

/// Console renderer that leaves out the per-file table
pub struct SummaryReport<W: Write = io::Stdout> {
    console: ConsoleReport<W>,
}

impl SummaryReport<io::Stdout> {
    pub fn new(verbosity: VerbosityLevel, errors_to_print: usize) -> Self {
        Self {
            console: ConsoleReport::new(verbosity, errors_to_print),
        }
    }
}

impl<W: Write> SummaryReport<W> {
    pub fn with_writer(verbosity: VerbosityLevel, errors_to_print: usize, writer: W) -> Self {
        Self {
            console: ConsoleReport::with_writer(verbosity, errors_to_print, writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.console.into_inner()
    }
}

impl<W: Write> ReportSink for SummaryReport<W> {
    fn on_run_finished(&mut self, report: &RunReport) -> Result<()> {
        self.console.write_final(report)
    }
}

/// Serialized view of a run with the detailed errors capped
#[derive(Debug, Serialize)]
pub struct JsonRunReport<'a> {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u128,
    pub input_root: &'a Path,
    pub baseline: &'a Variant,
    pub candidate: &'a Variant,
    pub aggregate: &'a RunAggregate,
    pub rows: &'a [FileRow],
    /// Errors recorded in total
    pub error_count: usize,
    /// The first `errors_to_print` errors
    pub errors: &'a [ErrorRecord],
}

impl<'a> JsonRunReport<'a> {
    pub fn new(report: &'a RunReport, errors_to_print: usize) -> Self {
        Self {
            run_id: report.run_id,
            started_at: report.started_at,
            finished_at: report.finished_at,
            duration_ms: report.duration.as_millis(),
            input_root: &report.input_root,
            baseline: &report.baseline,
            candidate: &report.candidate,
            aggregate: &report.aggregate,
            rows: &report.rows,
            error_count: report.errors.len(),
            errors: report.displayed_errors(errors_to_print),
        }
    }
}

/// Writes the final report as one JSON document
pub struct JsonReport<W: Write = io::Stdout> {
    errors_to_print: usize,
    writer: W,
}

impl JsonReport<io::Stdout> {
    pub fn new(errors_to_print: usize) -> Self {
        Self {
            errors_to_print,
            writer: io::stdout(),
        }
    }
}

impl<W: Write> JsonReport<W> {
    pub fn with_writer(errors_to_print: usize, writer: W) -> Self {
        Self {
            errors_to_print,
            writer,
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> ReportSink for JsonReport<W> {
    fn on_run_finished(&mut self, report: &RunReport) -> Result<()> {
        let document = JsonRunReport::new(report, self.errors_to_print);
        serde_json::to_writer_pretty(&mut self.writer, &document)?;
        writeln!(self.writer)?;
        self.writer.flush()?;
        Ok(())
    }
}

fn status_cell(result: &ComparisonResult) -> (&'static str, &'static str) {
    match result {
        ComparisonResult::Equal => ("OK", "32"),
        ComparisonResult::Different { .. } => ("DIFF", "33"),
        ComparisonResult::Failed { .. } => ("ERROR", "31"),
    }
}

fn scaled(value: usize, max: usize) -> usize {
    if value == 0 {
        return 0;
    }
    // Any non-zero value gets at least one block
    ((value * BAR_WIDTH) / max).max(1)
}

fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs_f64();
    if total_secs < 1.0 {
        format!("{:.0}ms", duration.as_millis())
    } else if total_secs < 60.0 {
        format!("{:.2}s", total_secs)
    } else {
        let mins = (total_secs / 60.0) as u64;
        let secs = total_secs % 60.0;
        format!("{}m{:.1}s", mins, secs)
    }
}
