//! # conversion-compare Library
//!
//! Regression harness for document converters: every file of a corpus is
//! converted by a baseline build and a candidate build into each target
//! format, and the two outputs are compared line by line (text formats) or
//! structurally (XML).

pub mod cli;
pub mod config;
pub mod corpus;
pub mod error;
pub mod format;
pub mod invoker;
pub mod logging;
pub mod orchestrator;
pub mod report;
pub mod text_diff;
pub mod xml_diff;

pub use cli::{Cli, OutputFormat, VerbosityLevel};
pub use config::{Config, ConfigError, ConfigManager, EnvProvider, SystemEnvProvider};
pub use corpus::{CorpusEnumerator, warn_on_name_collisions};
pub use error::{CompareError, DiffError, FailureCause, InvocationFailure};
pub use format::{DiffKind, TargetFormat, Variant, VariantRole};
pub use invoker::{ConversionInvoker, ConversionRequest, Converter, Credentials};
pub use orchestrator::{
    ComparisonOrchestrator, ComparisonPhase, ComparisonProgress, ComparisonResult, ErrorRecord,
    FileRow, FormatCounters, FormatOutcome, RunAggregate, RunReport, RunSettings,
};
pub use report::{ConsoleReport, JsonReport, ReportSink, SilentReport, SummaryReport};
pub use text_diff::TextDiffEngine;
pub use xml_diff::XmlDiffEngine;
