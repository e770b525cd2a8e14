//! Comparison orchestration
//!
//! For every corpus file and every configured target format the orchestrator
//! converts the file with the baseline build, then with the candidate build,
//! and diffs the two outputs. Each (file, format) pair ends in exactly one
//! [`ComparisonResult`]; a failure never stops the rest of the run.
//!
//! Work is strictly sequential: files in enumeration order, formats in the
//! fixed GAEB-90, GAEB-2000, GAEB-XML order.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{FailureCause, Result};
use crate::format::{DiffKind, TargetFormat, Variant, VariantRole};
use crate::invoker::{ConversionRequest, Converter, Credentials};
use crate::report::ReportSink;
use crate::text_diff::TextDiffEngine;
use crate::xml_diff::XmlDiffEngine;

/// Everything one run needs, fixed before the first file is touched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSettings {
    pub input_root: PathBuf,
    pub output_root: PathBuf,
    pub credentials: Credentials,
    pub baseline: Variant,
    pub candidate: Variant,
    /// Formats to compare, in canonical order
    pub formats: Vec<TargetFormat>,
    /// How many detailed error reports a renderer shows
    pub errors_to_print: usize,
    pub excluded_extension: String,
}

impl RunSettings {
    pub fn variant(&self, role: VariantRole) -> &Variant {
        match role {
            VariantRole::Baseline => &self.baseline,
            VariantRole::Candidate => &self.candidate,
        }
    }
}

/// Outcome of comparing one file in one format
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ComparisonResult {
    /// Both outputs are equivalent
    Equal,
    /// Outputs differ; the report says where
    Different { report: String },
    /// No verdict could be reached
    Failed { cause: FailureCause },
}

impl ComparisonResult {
    pub fn is_equal(&self) -> bool {
        matches!(self, ComparisonResult::Equal)
    }

    pub fn is_different(&self) -> bool {
        matches!(self, ComparisonResult::Different { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, ComparisonResult::Failed { .. })
    }
}

/// Details of one non-equal comparison
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorRecord {
    pub file: PathBuf,
    pub format: TargetFormat,
    /// Diff report, when the outputs differ
    pub message: Option<String>,
    pub baseline_path: Option<PathBuf>,
    pub candidate_path: Option<PathBuf>,
    /// Why no verdict was reached, when the comparison failed
    pub cause: Option<FailureCause>,
}

/// Counters of one target format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FormatCounters {
    pub processed: usize,
    pub equal: usize,
    pub different: usize,
    pub failed: usize,
}

impl FormatCounters {
    /// Comparisons that did not end `Equal`
    pub fn errors(&self) -> usize {
        self.different + self.failed
    }
}

/// Run-wide counters. Only ever incremented during a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunAggregate {
    pub formats: BTreeMap<TargetFormat, FormatCounters>,
    /// Files fully processed
    pub files: usize,
    /// Comparisons made over all formats
    pub total: usize,
}

impl RunAggregate {
    fn new(formats: &[TargetFormat]) -> Self {
        Self {
            formats: formats
                .iter()
                .map(|&f| (f, FormatCounters::default()))
                .collect(),
            files: 0,
            total: 0,
        }
    }

    fn record(&mut self, format: TargetFormat, result: &ComparisonResult) {
        let counters = self.formats.entry(format).or_default();
        counters.processed += 1;
        match result {
            ComparisonResult::Equal => counters.equal += 1,
            ComparisonResult::Different { .. } => counters.different += 1,
            ComparisonResult::Failed { .. } => counters.failed += 1,
        }
        self.total += 1;
    }

    pub fn counters(&self, format: TargetFormat) -> FormatCounters {
        self.formats.get(&format).copied().unwrap_or_default()
    }

    pub fn total_errors(&self) -> usize {
        self.formats.values().map(FormatCounters::errors).sum()
    }

    /// Percentage of comparisons that ended `Equal`
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        let equal: usize = self.formats.values().map(|c| c.equal).sum();
        (equal as f64 / self.total as f64) * 100.0
    }
}

/// Result of one format inside a [`FileRow`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormatOutcome {
    pub format: TargetFormat,
    pub result: ComparisonResult,
}

/// One file with its results in canonical format order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileRow {
    pub file: PathBuf,
    pub outcomes: Vec<FormatOutcome>,
}

impl FileRow {
    pub fn result(&self, format: TargetFormat) -> Option<&ComparisonResult> {
        self.outcomes
            .iter()
            .find(|o| o.format == format)
            .map(|o| &o.result)
    }
}

/// Where a single comparison currently stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonPhase {
    Pending,
    ConvertingBaseline,
    ConvertingCandidate,
    Diffing,
    Recorded,
}

/// Progress event emitted to report sinks
#[derive(Debug, Clone)]
pub struct ComparisonProgress {
    pub file: PathBuf,
    /// Zero-based position of the file in the corpus
    pub index: usize,
    pub total: usize,
    pub format: TargetFormat,
    pub phase: ComparisonPhase,
}

/// Final result of a run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration: Duration,
    pub input_root: PathBuf,
    pub baseline: Variant,
    pub candidate: Variant,
    pub aggregate: RunAggregate,
    pub rows: Vec<FileRow>,
    pub errors: Vec<ErrorRecord>,
}

impl RunReport {
    /// The first `cap` error records in the order they were recorded
    pub fn displayed_errors(&self, cap: usize) -> &[ErrorRecord] {
        &self.errors[..cap.min(self.errors.len())]
    }

    pub fn has_differences(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Drives baseline and candidate conversions and collects the verdicts
pub struct ComparisonOrchestrator<C: Converter> {
    settings: Arc<RunSettings>,
    converter: C,
    text_engine: TextDiffEngine,
    xml_engine: XmlDiffEngine,
    aggregate: RunAggregate,
    errors: Vec<ErrorRecord>,
}

impl<C: Converter> ComparisonOrchestrator<C> {
    pub fn new(settings: Arc<RunSettings>, converter: C) -> Self {
        let aggregate = RunAggregate::new(&settings.formats);
        Self {
            settings,
            converter,
            text_engine: TextDiffEngine::new(),
            xml_engine: XmlDiffEngine::new(),
            aggregate,
            errors: Vec::new(),
        }
    }

    pub fn settings(&self) -> &RunSettings {
        &self.settings
    }

    /// Counters recorded so far
    pub fn aggregate(&self) -> &RunAggregate {
        &self.aggregate
    }

    /// Error records in encounter order
    pub fn errors(&self) -> &[ErrorRecord] {
        &self.errors
    }

    /// Compare every file, reporting progress and rows to `sink`
    pub async fn run(&mut self, files: &[PathBuf], sink: &mut dyn ReportSink) -> Result<RunReport> {
        self.aggregate = RunAggregate::new(&self.settings.formats);
        self.errors.clear();

        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let clock = Instant::now();

        info!(%run_id, files = files.len(), "comparison run started");
        sink.on_run_started(&self.settings, files.len())?;

        let mut rows = Vec::with_capacity(files.len());
        for (index, file) in files.iter().enumerate() {
            let row = self.compare_file(file, index, files.len(), sink).await;
            sink.on_row(&row, &self.aggregate)?;
            rows.push(row);
        }

        let report = RunReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            duration: clock.elapsed(),
            input_root: self.settings.input_root.clone(),
            baseline: self.settings.baseline.clone(),
            candidate: self.settings.candidate.clone(),
            aggregate: self.aggregate.clone(),
            rows,
            errors: self.errors.clone(),
        };

        info!(
            %run_id,
            comparisons = report.aggregate.total,
            errors = report.errors.len(),
            "comparison run finished"
        );
        sink.on_run_finished(&report)?;

        Ok(report)
    }

    /// Compare one file in every configured format and record the results
    pub async fn compare_file(
        &mut self,
        file: &Path,
        index: usize,
        total: usize,
        sink: &mut dyn ReportSink,
    ) -> FileRow {
        let formats = self.settings.formats.clone();
        let mut outcomes = Vec::with_capacity(formats.len());

        for format in formats {
            let result = self
                .compare_format(file, format, |phase| {
                    sink.on_progress(&ComparisonProgress {
                        file: file.to_path_buf(),
                        index,
                        total,
                        format,
                        phase,
                    })
                })
                .await;

            self.record(file, format, &result);
            sink.on_progress(&ComparisonProgress {
                file: file.to_path_buf(),
                index,
                total,
                format,
                phase: ComparisonPhase::Recorded,
            });
            outcomes.push(FormatOutcome { format, result });
        }

        self.aggregate.files += 1;
        FileRow {
            file: file.to_path_buf(),
            outcomes,
        }
    }

    /// Convert `file` with both variants and diff the outputs. Nothing is
    /// recorded; `on_phase` is told each phase as it is entered.
    pub async fn compare_format(
        &self,
        file: &Path,
        format: TargetFormat,
        mut on_phase: impl FnMut(ComparisonPhase),
    ) -> ComparisonResult {
        on_phase(ComparisonPhase::Pending);

        let settings = &self.settings;
        let mut outputs = Vec::with_capacity(2);

        for (role, phase) in [
            (VariantRole::Baseline, ComparisonPhase::ConvertingBaseline),
            (VariantRole::Candidate, ComparisonPhase::ConvertingCandidate),
        ] {
            on_phase(phase);
            let variant = settings.variant(role);
            let output = variant.output_path(&settings.output_root, format, file);
            let request = ConversionRequest {
                input: file,
                output: &output,
                format,
                variant,
            };

            debug!(file = %file.display(), %format, %role, "converting");
            match self.converter.convert(&request).await {
                Ok(path) => outputs.push(path),
                Err(failure) => {
                    warn!(
                        file = %file.display(),
                        %format,
                        %role,
                        error = %failure,
                        "conversion failed"
                    );
                    return ComparisonResult::Failed {
                        cause: FailureCause::Invocation {
                            variant: variant.name.clone(),
                            failure,
                        },
                    };
                }
            }
        }

        on_phase(ComparisonPhase::Diffing);
        let (left, right) = (&outputs[0], &outputs[1]);
        let diff = match format.diff_kind() {
            DiffKind::Text => self.text_engine.diff_files(left, right).await,
            DiffKind::Xml => self.xml_engine.diff_files(left, right).await,
        };

        match diff {
            Ok(None) => ComparisonResult::Equal,
            Ok(Some(report)) => {
                debug!(file = %file.display(), %format, "outputs differ");
                ComparisonResult::Different { report }
            }
            Err(err) => {
                warn!(file = %file.display(), %format, error = %err, "diff failed");
                ComparisonResult::Failed { cause: err.into() }
            }
        }
    }

    fn record(&mut self, file: &Path, format: TargetFormat, result: &ComparisonResult) {
        self.aggregate.record(format, result);

        let (message, cause) = match result {
            ComparisonResult::Equal => return,
            ComparisonResult::Different { report } => (Some(report.clone()), None),
            ComparisonResult::Failed { cause } => (None, Some(cause.clone())),
        };

        let settings = &self.settings;
        self.errors.push(ErrorRecord {
            file: file.to_path_buf(),
            format,
            message,
            baseline_path: Some(
                settings
                    .baseline
                    .output_path(&settings.output_root, format, file),
            ),
            candidate_path: Some(
                settings
                    .candidate
                    .output_path(&settings.output_root, format, file),
            ),
            cause,
        });
    }
}
