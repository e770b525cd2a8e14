use crate::cli::{Cli, OutputFormat, VerbosityLevel};
use crate::corpus::DEFAULT_EXCLUDED_EXTENSION;
use crate::format::{TargetFormat, Variant};
use crate::invoker::Credentials;
use crate::orchestrator::RunSettings;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_INPUT_ROOT: &str = "InputFiles";
pub const DEFAULT_OUTPUT_ROOT: &str = "OutputFiles";
pub const DEFAULT_ERRORS_TO_PRINT: usize = 3;
pub const DEFAULT_BASELINE_NAME: &str = "framework";
pub const DEFAULT_BASELINE_EXECUTABLE: &str = "FrameworkApp.exe";
pub const DEFAULT_CANDIDATE_NAME: &str = "core";
pub const DEFAULT_CANDIDATE_EXECUTABLE: &str = "CoreApp.exe";

/// Trait for abstracting environment variable access
pub trait EnvProvider {
    fn get(&self, key: &str) -> Option<String>;
}

/// System environment variable provider for production use
pub struct SystemEnvProvider;

impl EnvProvider for SystemEnvProvider {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParsing(#[from] toml::de::Error),

    #[error("JSON parsing error: {0}")]
    JsonParsing(#[from] serde_json::Error),

    #[error("Configuration validation error: {0}")]
    Validation(String),

    #[error("Environment variable error: {0}")]
    Environment(String),

    #[error("Unsupported configuration file format: {0}")]
    UnsupportedFormat(String),

    #[error("Unknown target format: {0}")]
    UnknownFormat(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub paths: PathsConfig,
    pub credentials: CredentialsConfig,
    pub baseline: VariantConfig,
    pub candidate: VariantConfig,
    pub comparison: ComparisonConfig,
    pub report: ReportConfig,
}

/// Corpus and output locations
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PathsConfig {
    /// Root of the input corpus
    pub input: PathBuf,
    /// Root under which each variant writes its outputs
    pub output: PathBuf,
}

/// Serial numbers handed to the converter
#[derive(Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct CredentialsConfig {
    pub primary: Option<String>,
    pub secondary: Option<String>,
}

impl std::fmt::Debug for CredentialsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialsConfig")
            .field("primary", &self.primary.as_ref().map(|_| "<redacted>"))
            .field("secondary", &self.secondary.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// One converter build. Unset fields fall back to the role's defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct VariantConfig {
    pub name: Option<String>,
    pub executable: Option<PathBuf>,
}

/// What gets compared
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ComparisonConfig {
    /// Target formats to compare
    pub formats: Vec<TargetFormat>,
    /// Extension of corpus files to skip
    pub excluded_extension: String,
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReportConfig {
    /// Number of detailed error reports to print
    pub errors_to_print: usize,
    /// Output format
    pub format: OutputFormat,
    /// Verbose output
    pub verbose: bool,
    /// Quiet mode (summary only)
    pub quiet: bool,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            input: PathBuf::from(DEFAULT_INPUT_ROOT),
            output: PathBuf::from(DEFAULT_OUTPUT_ROOT),
        }
    }
}

impl Default for ComparisonConfig {
    fn default() -> Self {
        Self {
            formats: TargetFormat::ALL.to_vec(),
            excluded_extension: DEFAULT_EXCLUDED_EXTENSION.to_string(),
        }
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            errors_to_print: DEFAULT_ERRORS_TO_PRINT,
            format: OutputFormat::Human,
            verbose: false,
            quiet: false,
        }
    }
}

impl Config {
    pub fn baseline_variant(&self) -> Variant {
        resolve_variant(
            &self.baseline,
            DEFAULT_BASELINE_NAME,
            DEFAULT_BASELINE_EXECUTABLE,
        )
    }

    pub fn candidate_variant(&self) -> Variant {
        resolve_variant(
            &self.candidate,
            DEFAULT_CANDIDATE_NAME,
            DEFAULT_CANDIDATE_EXECUTABLE,
        )
    }

    pub fn verbosity(&self) -> VerbosityLevel {
        if self.report.quiet {
            VerbosityLevel::Quiet
        } else if self.report.verbose {
            VerbosityLevel::Verbose
        } else {
            VerbosityLevel::Normal
        }
    }

    /// Freeze the configuration into the settings of one run
    pub fn run_settings(&self) -> Result<RunSettings> {
        let primary = self
            .credentials
            .primary
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                ConfigError::Validation(
                    "A primary credential is required (--serial or CONVERSION_COMPARE_SERIAL)"
                        .to_string(),
                )
            })?;

        let mut formats = self.comparison.formats.clone();
        formats.sort();
        formats.dedup();

        Ok(RunSettings {
            input_root: self.paths.input.clone(),
            output_root: self.paths.output.clone(),
            credentials: Credentials::new(primary, self.credentials.secondary.clone()),
            baseline: self.baseline_variant(),
            candidate: self.candidate_variant(),
            formats,
            errors_to_print: self.report.errors_to_print,
            excluded_extension: self.comparison.excluded_extension.clone(),
        })
    }
}

fn resolve_variant(config: &VariantConfig, name: &str, executable: &str) -> Variant {
    Variant::new(
        config.name.clone().unwrap_or_else(|| name.to_string()),
        config
            .executable
            .clone()
            .unwrap_or_else(|| PathBuf::from(executable)),
    )
}

/// Configuration manager for loading and merging configurations
pub struct ConfigManager;

impl ConfigManager {
    /// Load configuration with precedence: file -> environment -> CLI
    pub async fn load_config(cli: &Cli) -> Result<Config> {
        Self::load_config_with(&SystemEnvProvider, cli).await
    }

    /// Same as [`ConfigManager::load_config`] with a custom environment provider
    pub async fn load_config_with(env: &impl EnvProvider, cli: &Cli) -> Result<Config> {
        let mut config = Config::default();

        if let Some(config_path) = &cli.config {
            config = Self::load_from_file(config_path).await?;
        } else if let Some(found_config) = Self::find_config_file().await? {
            config = found_config;
        }

        config = Self::apply_environment_overrides_with(env, config)?;

        // CLI arguments have the highest precedence
        config = Self::merge_with_cli(config, cli)?;

        Self::validate_config(&config)?;

        Ok(config)
    }

    /// Load configuration from a file (TOML or JSON). Missing keys keep
    /// their defaults.
    pub async fn load_from_file(path: &Path) -> Result<Config> {
        let content = tokio::fs::read_to_string(path).await?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Ok(toml::from_str(&content)?),
            Some("json") => Ok(serde_json::from_str(&content)?),
            Some(ext) => Err(ConfigError::UnsupportedFormat(ext.to_string())),
            None => {
                // Try to parse as TOML first, then JSON
                if let Ok(config) = toml::from_str::<Config>(&content) {
                    Ok(config)
                } else {
                    Ok(serde_json::from_str(&content)?)
                }
            }
        }
    }

    /// Find configuration file in standard locations
    pub async fn find_config_file() -> Result<Option<Config>> {
        let config_names = [
            "conversion-compare.toml",
            "conversion-compare.json",
            ".conversion-compare.toml",
            ".conversion-compare.json",
        ];

        for name in &config_names {
            let path = PathBuf::from(name);
            if path.exists() {
                return Ok(Some(Self::load_from_file(&path).await?));
            }
        }

        if let Some(config_dir) = dirs::config_dir() {
            let app_config_dir = config_dir.join("conversion-compare");
            for name in &config_names {
                let path = app_config_dir.join(name);
                if path.exists() {
                    return Ok(Some(Self::load_from_file(&path).await?));
                }
            }
        }

        Ok(None)
    }

    /// Apply environment variable overrides using the system environment
    pub fn apply_environment_overrides(config: Config) -> Result<Config> {
        Self::apply_environment_overrides_with(&SystemEnvProvider, config)
    }

    /// Apply environment variable overrides with a custom environment provider
    pub fn apply_environment_overrides_with(
        env: &impl EnvProvider,
        mut config: Config,
    ) -> Result<Config> {
        if let Some(input) = env.get("CONVERSION_COMPARE_INPUT") {
            config.paths.input = PathBuf::from(input);
        }
        if let Some(output) = env.get("CONVERSION_COMPARE_OUTPUT") {
            config.paths.output = PathBuf::from(output);
        }

        if let Some(serial) = env.get("CONVERSION_COMPARE_SERIAL") {
            config.credentials.primary = Some(serial);
        }
        if let Some(serial) = env.get("CONVERSION_COMPARE_CONVERTER_SERIAL") {
            config.credentials.secondary = Some(serial);
        }

        if let Some(baseline) = env.get("CONVERSION_COMPARE_BASELINE") {
            config.baseline.executable = Some(PathBuf::from(baseline));
        }
        if let Some(candidate) = env.get("CONVERSION_COMPARE_CANDIDATE") {
            config.candidate.executable = Some(PathBuf::from(candidate));
        }

        if let Some(formats) = env.get("CONVERSION_COMPARE_FORMATS") {
            config.comparison.formats = TargetFormat::parse_list(&formats)?;
        }

        if let Some(count) = env.get("CONVERSION_COMPARE_ERRORS_TO_PRINT") {
            config.report.errors_to_print = count.parse().map_err(|_| {
                ConfigError::Environment(format!(
                    "Invalid CONVERSION_COMPARE_ERRORS_TO_PRINT value: {}",
                    count
                ))
            })?;
        }

        if let Some(verbose) = env.get("CONVERSION_COMPARE_VERBOSE") {
            config.report.verbose = verbose.parse().map_err(|_| {
                ConfigError::Environment(format!(
                    "Invalid CONVERSION_COMPARE_VERBOSE value: {}",
                    verbose
                ))
            })?;
        }

        if let Some(quiet) = env.get("CONVERSION_COMPARE_QUIET") {
            config.report.quiet = quiet.parse().map_err(|_| {
                ConfigError::Environment(format!("Invalid CONVERSION_COMPARE_QUIET value: {}", quiet))
            })?;
        }

        if let Some(format) = env.get("CONVERSION_COMPARE_FORMAT") {
            config.report.format = match format.to_lowercase().as_str() {
                "human" => OutputFormat::Human,
                "json" => OutputFormat::Json,
                "summary" => OutputFormat::Summary,
                _ => {
                    return Err(ConfigError::Environment(format!(
                        "Invalid CONVERSION_COMPARE_FORMAT value: {}",
                        format
                    )));
                }
            };
        }

        Ok(config)
    }

    /// Merge CLI arguments with configuration. Only flags given on the
    /// command line override.
    pub fn merge_with_cli(mut config: Config, cli: &Cli) -> Result<Config> {
        if let Some(input) = &cli.input {
            config.paths.input = input.clone();
        }
        if let Some(output) = &cli.output {
            config.paths.output = output.clone();
        }

        if let Some(serial) = &cli.serial {
            config.credentials.primary = Some(serial.clone());
        }
        if let Some(serial) = &cli.converter_serial {
            config.credentials.secondary = Some(serial.clone());
        }

        if let Some(executable) = &cli.baseline {
            config.baseline.executable = Some(executable.clone());
        }
        if let Some(name) = &cli.baseline_name {
            config.baseline.name = Some(name.clone());
        }
        if let Some(executable) = &cli.candidate {
            config.candidate.executable = Some(executable.clone());
        }
        if let Some(name) = &cli.candidate_name {
            config.candidate.name = Some(name.clone());
        }

        if let Some(formats) = &cli.formats {
            config.comparison.formats = TargetFormat::parse_list(formats)?;
        }
        if let Some(extension) = &cli.exclude_extension {
            config.comparison.excluded_extension = extension.trim_start_matches('.').to_string();
        }

        if let Some(count) = cli.errors_to_print {
            config.report.errors_to_print = count;
        }
        if let Some(format) = cli.output_format {
            config.report.format = format;
        }
        if cli.verbose > 0 {
            config.report.verbose = true;
            config.report.quiet = false;
        }
        if cli.quiet {
            config.report.quiet = true;
            config.report.verbose = false;
        }

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate_config(config: &Config) -> Result<()> {
        if config.report.verbose && config.report.quiet {
            return Err(ConfigError::Validation(
                "Cannot enable both verbose and quiet modes".to_string(),
            ));
        }

        if config.comparison.formats.is_empty() {
            return Err(ConfigError::Validation(
                "At least one target format must be specified".to_string(),
            ));
        }

        let extension = &config.comparison.excluded_extension;
        if extension.contains('/') || extension.contains('\\') {
            return Err(ConfigError::Validation(format!(
                "Invalid excluded extension: {}",
                extension
            )));
        }

        let baseline = config.baseline_variant();
        let candidate = config.candidate_variant();
        for variant in [&baseline, &candidate] {
            if variant.name.trim().is_empty() {
                return Err(ConfigError::Validation(
                    "Variant names must not be empty".to_string(),
                ));
            }
            if variant.name.contains('/') || variant.name.contains('\\') {
                return Err(ConfigError::Validation(format!(
                    "Variant name must be a single directory name: {}",
                    variant.name
                )));
            }
            if variant.executable.as_os_str().is_empty() {
                return Err(ConfigError::Validation(format!(
                    "No converter executable configured for variant {}",
                    variant.name
                )));
            }
        }
        if baseline.name == candidate.name {
            return Err(ConfigError::Validation(format!(
                "Baseline and candidate share the output directory name {}",
                baseline.name
            )));
        }

        // Primary credential presence is checked when freezing settings
        config.run_settings().map(|_| ())
    }
}
