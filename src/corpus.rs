use crate::error::{CompareError, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

/// Extension of documentation files that live next to corpus items
pub const DEFAULT_EXCLUDED_EXTENSION: &str = "md";

/// Async corpus enumerator.
///
/// Lists every file below a root directory: the direct files of a directory
/// first, in the order the platform lists them, then each subdirectory
/// recursively in listing order. Files ending in the excluded extension are
/// skipped. Any unreadable directory fails the whole enumeration.
#[derive(Debug, Clone)]
pub struct CorpusEnumerator {
    /// Extension (without the dot) of files to leave out
    excluded_extension: String,
}

impl CorpusEnumerator {
    pub fn new() -> Self {
        Self {
            excluded_extension: DEFAULT_EXCLUDED_EXTENSION.to_string(),
        }
    }

    /// Set the documentation extension to exclude
    pub fn with_excluded_extension(mut self, extension: impl Into<String>) -> Self {
        self.excluded_extension = extension.into().trim_start_matches('.').to_string();
        self
    }

    /// Enumerate the corpus below `root`.
    ///
    /// Returned paths are absolute. The call can be repeated and yields the
    /// same sequence for an unchanged tree.
    pub async fn enumerate(&self, root: &Path) -> Result<Vec<PathBuf>> {
        let root = fs::canonicalize(root)
            .await
            .map_err(|e| enumeration_error(root, e))?;

        let metadata = fs::metadata(&root)
            .await
            .map_err(|e| enumeration_error(&root, e))?;
        if !metadata.is_dir() {
            return Err(CompareError::Enumeration {
                path: root,
                reason: "not a directory".to_string(),
            });
        }

        let mut files = Vec::new();
        self.enumerate_recursive(&root, &mut files).await?;

        debug!(root = %root.display(), count = files.len(), "corpus enumerated");
        Ok(files)
    }

    /// Recursive helper: files of `dir` first, then its subdirectories
    fn enumerate_recursive<'a>(
        &'a self,
        dir: &'a Path,
        files: &'a mut Vec<PathBuf>,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<()>> + 'a>> {
        Box::pin(async move {
            let mut read_dir = fs::read_dir(dir)
                .await
                .map_err(|e| enumeration_error(dir, e))?;

            let mut subdirectories = Vec::new();
            while let Some(entry) = read_dir
                .next_entry()
                .await
                .map_err(|e| enumeration_error(dir, e))?
            {
                let entry_path = entry.path();
                // Follows symlinks, so a link to a file counts as a file
                let metadata = fs::metadata(&entry_path)
                    .await
                    .map_err(|e| enumeration_error(&entry_path, e))?;

                if metadata.is_dir() {
                    subdirectories.push(entry_path);
                } else if self.should_include(&entry_path) {
                    files.push(entry_path);
                }
            }

            for subdirectory in &subdirectories {
                self.enumerate_recursive(subdirectory, files).await?;
            }

            Ok(())
        })
    }

    /// Check whether a file is a corpus item (not documentation)
    pub fn should_include(&self, path: &Path) -> bool {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return true;
        };
        if self.excluded_extension.is_empty() {
            return true;
        }
        !name.ends_with(&format!(".{}", self.excluded_extension))
    }
}

impl Default for CorpusEnumerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Log every file name shared by more than one corpus item. Outputs are keyed
/// by file name only, so such items overwrite each other's converted output.
pub fn warn_on_name_collisions(files: &[PathBuf]) -> usize {
    let mut by_name: HashMap<&std::ffi::OsStr, Vec<&PathBuf>> = HashMap::new();
    for file in files {
        if let Some(name) = file.file_name() {
            by_name.entry(name).or_default().push(file);
        }
    }

    let mut collisions = 0;
    for (name, paths) in by_name {
        if paths.len() > 1 {
            collisions += 1;
            warn!(
                name = %name.to_string_lossy(),
                count = paths.len(),
                "corpus files share a name; their converted outputs overwrite each other"
            );
        }
    }
    collisions
}

fn enumeration_error(path: &Path, err: std::io::Error) -> CompareError {
    CompareError::Enumeration {
        path: path.to_path_buf(),
        reason: err.to_string(),
    }
}
