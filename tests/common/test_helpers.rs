use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;

use conversion_compare::{Credentials, RunSettings, TargetFormat, Variant};

/// Shell prologue shared by the script converters: parses the converter
/// arguments into `$in`, `$out`, `$fmt`, `$serial` and `$conv`
pub const CONVERTER_PRELUDE: &str = r#"#!/bin/sh
in=""; out=""; fmt=""; serial=""; conv=""
while [ $# -gt 0 ]; do
  case "$1" in
    -i) in="$2"; shift 2 ;;
    -o) out="$2"; shift 2 ;;
    -f) fmt="$2"; shift 2 ;;
    -s) serial="$2"; shift 2 ;;
    -c) conv="$2"; shift 2 ;;
    *) shift ;;
  esac
done
"#;

/// Converter body that copies the input unchanged
pub const COPY_BODY: &str = "cp \"$in\" \"$out\"\n";

/// A corpus and output tree inside one temporary directory
pub struct TestWorkspace {
    pub dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("InputFiles")).unwrap();
        Self { dir }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn input_root(&self) -> PathBuf {
        self.dir.path().join("InputFiles")
    }

    pub fn output_root(&self) -> PathBuf {
        self.dir.path().join("OutputFiles")
    }

    /// Add a corpus file below the input root
    pub fn add_file(&self, relative: &str, content: &str) -> PathBuf {
        let path = self.input_root().join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, content).unwrap();
        path
    }

    pub fn settings(&self, baseline: &Path, candidate: &Path) -> Arc<RunSettings> {
        Arc::new(RunSettings {
            input_root: self.input_root(),
            output_root: self.output_root(),
            credentials: Credentials::new("SERIAL-0001", None),
            baseline: Variant::new("framework", baseline),
            candidate: Variant::new("core", candidate),
            formats: TargetFormat::ALL.to_vec(),
            errors_to_print: 3,
            excluded_extension: "md".to_string(),
        })
    }

    /// Write an executable converter script into the workspace
    #[cfg(unix)]
    pub fn write_converter(&self, name: &str, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = self.dir.path().join(name);
        std::fs::write(&path, format!("{}{}", CONVERTER_PRELUDE, body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }
}

impl Default for TestWorkspace {
    fn default() -> Self {
        Self::new()
    }
}

/// Small XML document, valid input for every format, with one varying item
pub fn sample_document(item: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<GAEB>\n  <Award>\n    <Item>{}</Item>\n  </Award>\n</GAEB>\n",
        item
    )
}
