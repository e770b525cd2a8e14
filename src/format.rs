//! Target formats and converter variants
//!
//! The set of target formats is closed. Each format knows the code the
//! converter expects, the directory its outputs land in, and which diff
//! engine understands it.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

/// One of the three output encodings a converter can produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TargetFormat {
    /// GAEB 90 fixed-width text format
    #[serde(rename = "GAEB90")]
    Gaeb90,
    /// GAEB 2000 tagged text format
    #[serde(rename = "GAEB2000")]
    Gaeb2000,
    /// GAEB DA XML
    #[serde(rename = "GAEBDAXML")]
    GaebXml,
}

/// Which diff engine compares outputs of a format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffKind {
    Text,
    Xml,
}

impl TargetFormat {
    /// All formats in the fixed processing and reporting order
    pub const ALL: [TargetFormat; 3] = [
        TargetFormat::Gaeb90,
        TargetFormat::Gaeb2000,
        TargetFormat::GaebXml,
    ];

    /// Token passed to the converter's format argument
    pub fn code(self) -> &'static str {
        match self {
            TargetFormat::Gaeb90 => "GAEB90",
            TargetFormat::Gaeb2000 => "GAEB2000",
            TargetFormat::GaebXml => "GAEBDAXML",
        }
    }

    /// Directory name under each variant's output root
    pub fn dir_name(self) -> &'static str {
        match self {
            TargetFormat::Gaeb90 => "gaeb90",
            TargetFormat::Gaeb2000 => "gaeb2000",
            TargetFormat::GaebXml => "gaebXml",
        }
    }

    /// Column heading used by reports
    pub fn label(self) -> &'static str {
        match self {
            TargetFormat::Gaeb90 => "GAEB-90",
            TargetFormat::Gaeb2000 => "GAEB-2000",
            TargetFormat::GaebXml => "GAEB-XML",
        }
    }

    pub fn diff_kind(self) -> DiffKind {
        match self {
            TargetFormat::Gaeb90 | TargetFormat::Gaeb2000 => DiffKind::Text,
            TargetFormat::GaebXml => DiffKind::Xml,
        }
    }

    /// Position in [`TargetFormat::ALL`]
    pub fn index(self) -> usize {
        match self {
            TargetFormat::Gaeb90 => 0,
            TargetFormat::Gaeb2000 => 1,
            TargetFormat::GaebXml => 2,
        }
    }

    /// Parse a comma-separated list of format codes, returned in canonical
    /// order without duplicates
    pub fn parse_list(list: &str) -> Result<Vec<TargetFormat>, ConfigError> {
        let mut formats = list
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(TargetFormat::from_str)
            .collect::<Result<Vec<_>, _>>()?;
        formats.sort();
        formats.dedup();
        Ok(formats)
    }
}

impl fmt::Display for TargetFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for TargetFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GAEB90" | "GAEB-90" => Ok(TargetFormat::Gaeb90),
            "GAEB2000" | "GAEB-2000" => Ok(TargetFormat::Gaeb2000),
            "GAEBDAXML" | "GAEB-XML" | "GAEBXML" => Ok(TargetFormat::GaebXml),
            _ => Err(ConfigError::UnknownFormat(s.to_string())),
        }
    }
}

/// Role a converter build plays in a comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VariantRole {
    Baseline,
    Candidate,
}

impl fmt::Display for VariantRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VariantRole::Baseline => f.write_str("baseline"),
            VariantRole::Candidate => f.write_str("candidate"),
        }
    }
}

/// A converter build under comparison
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variant {
    /// Output sub-directory, e.g. `framework` or `core`
    pub name: String,
    /// Converter program to launch
    pub executable: PathBuf,
}

impl Variant {
    pub fn new(name: impl Into<String>, executable: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            executable: executable.into(),
        }
    }

    /// Where this variant's output for `input` in `format` is written:
    /// `<output_root>/<variant>/<format dir>/<input file name>`.
    ///
    /// Only the file name of `input` is kept, so two inputs sharing a name in
    /// different sub-directories map to the same output path.
    pub fn output_path(&self, output_root: &Path, format: TargetFormat, input: &Path) -> PathBuf {
        let mut path = output_root.join(&self.name).join(format.dir_name());
        if let Some(name) = input.file_name() {
            path.push(name);
        }
        path
    }
}
