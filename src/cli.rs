use clap::{ArgAction, Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Verbosity levels for output
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum VerbosityLevel {
    /// Only show the summary, and only when something differs
    Quiet,
    /// Show standard information
    #[default]
    Normal,
    /// Show detailed information
    Verbose,
    /// Show all available debugging information
    Debug,
}

/// How the run report is rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Per-file table, summary chart and error details
    #[default]
    Human,
    /// Machine-readable run report
    Json,
    /// Summary and error details only
    Summary,
}

/// Compare the outputs of two converter builds over a corpus
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "conversion-compare")]
#[command(
    about = "Convert every corpus file with a baseline and a candidate converter and report where their outputs differ"
)]
#[command(version)]
pub struct Cli {
    /// Root of the input corpus
    #[arg(short = 'i', long = "input")]
    pub input: Option<PathBuf>,

    /// Root of the converted outputs
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,

    /// Primary serial number passed to the converter
    #[arg(short = 's', long = "serial")]
    pub serial: Option<String>,

    /// Secondary serial number passed to the converter
    #[arg(short = 'c', long = "converter-serial")]
    pub converter_serial: Option<String>,

    /// Baseline converter executable
    #[arg(long = "baseline")]
    pub baseline: Option<PathBuf>,

    /// Output directory name of the baseline variant
    #[arg(long = "baseline-name")]
    pub baseline_name: Option<String>,

    /// Candidate converter executable
    #[arg(long = "candidate")]
    pub candidate: Option<PathBuf>,

    /// Output directory name of the candidate variant
    #[arg(long = "candidate-name")]
    pub candidate_name: Option<String>,

    /// Number of detailed error reports to print
    #[arg(short = 'n', long = "errors-to-print")]
    pub errors_to_print: Option<usize>,

    /// Target formats to compare (comma-separated codes)
    #[arg(long = "formats", help = "Formats to compare (e.g. 'GAEB90,GAEBDAXML')")]
    pub formats: Option<String>,

    /// Extension of corpus files to skip
    #[arg(long = "exclude-extension")]
    pub exclude_extension: Option<String>,

    /// Report format
    #[arg(long = "format", value_enum)]
    pub output_format: Option<OutputFormat>,

    /// Configuration file (TOML or JSON)
    #[arg(long = "config")]
    pub config: Option<PathBuf>,

    /// Enable verbose output (repeat for debug output)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,

    /// Enable quiet mode (summary only)
    #[arg(
        short = 'q',
        long = "quiet",
        help = "Quiet mode",
        conflicts_with = "verbose"
    )]
    pub quiet: bool,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// `-vv` and beyond ask for debug output on top of verbose mode
    pub fn debug_requested(&self) -> bool {
        self.verbose >= 2
    }
}
