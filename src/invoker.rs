//! External converter invocation
//!
//! Every conversion runs the converter program once as a child process:
//!
//! ```text
//! <executable> -i <input> -o <output> -f <format code> -s <primary> [-c <secondary>]
//! ```
//!
//! The child's stdout is drained by a separate task while the exit status is
//! awaited. A converter that prints more than the OS pipe buffer holds would
//! otherwise block on write while we block on wait.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::debug;

use crate::error::InvocationFailure;
use crate::format::{TargetFormat, Variant};

/// Opaque authorization strings handed to the converter
#[derive(Clone, PartialEq, Eq, Default)]
pub struct Credentials {
    pub primary: String,
    pub secondary: Option<String>,
}

impl Credentials {
    pub fn new(primary: impl Into<String>, secondary: Option<String>) -> Self {
        Self {
            primary: primary.into(),
            secondary: secondary.filter(|s| !s.trim().is_empty()),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("primary", &"<redacted>")
            .field("secondary", &self.secondary.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// One conversion of one input file to one format by one variant
#[derive(Debug, Clone)]
pub struct ConversionRequest<'a> {
    pub input: &'a Path,
    pub output: &'a Path,
    pub format: TargetFormat,
    pub variant: &'a Variant,
}

/// Capability to convert a document. The comparison engine only relies on
/// this contract: `Ok` carries the written output path, `Err` the reason the
/// conversion did not happen.
#[async_trait]
pub trait Converter: Send + Sync {
    async fn convert(&self, request: &ConversionRequest<'_>) -> Result<PathBuf, InvocationFailure>;
}

/// Runs converter builds as external processes
#[derive(Debug, Clone)]
pub struct ConversionInvoker {
    credentials: Credentials,
}

impl ConversionInvoker {
    pub fn new(credentials: Credentials) -> Self {
        Self { credentials }
    }

    /// Convert `input` into `output` using the converter at `executable`.
    /// Any file already at `output` is deleted first.
    ///
    /// No retry is attempted. There is no timeout either: a converter that
    /// never exits stalls the caller.
    pub async fn invoke(
        &self,
        input: &Path,
        output: &Path,
        format: TargetFormat,
        executable: &Path,
    ) -> Result<PathBuf, InvocationFailure> {
        if let Some(parent) = output.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                InvocationFailure::OutputDirectory {
                    path: parent.to_path_buf(),
                    reason: e.to_string(),
                }
            })?;
        }

        // A converter that exits 0 without writing must not leave an older
        // run's file in place
        match tokio::fs::remove_file(output).await {
            Ok(()) => debug!(output = %output.display(), "removed previous output"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(InvocationFailure::StaleOutput {
                    path: output.to_path_buf(),
                    reason: e.to_string(),
                });
            }
        }

        let mut command = Command::new(executable);
        command
            .arg("-i")
            .arg(input)
            .arg("-o")
            .arg(output)
            .arg("-f")
            .arg(format.code())
            .arg("-s")
            .arg(&self.credentials.primary);
        if let Some(secondary) = &self.credentials.secondary {
            command.arg("-c").arg(secondary);
        }
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        debug!(
            executable = %executable.display(),
            input = %input.display(),
            format = format.code(),
            "launching converter"
        );

        let mut child = command.spawn().map_err(|e| InvocationFailure::Spawn {
            executable: executable.to_path_buf(),
            reason: e.to_string(),
        })?;

        let mut stdout = child.stdout.take().ok_or_else(|| InvocationFailure::Io {
            executable: executable.to_path_buf(),
            reason: "stdout was not captured".to_string(),
        })?;

        let reader = tokio::spawn(async move {
            let mut captured = Vec::new();
            stdout.read_to_end(&mut captured).await.map(|_| captured)
        });

        let (status, captured) = tokio::join!(child.wait(), reader);

        let io_failure = |reason: String| InvocationFailure::Io {
            executable: executable.to_path_buf(),
            reason,
        };
        let status = status.map_err(|e| io_failure(e.to_string()))?;
        let captured = captured
            .map_err(|e| io_failure(format!("stdout reader task failed: {}", e)))?
            .map_err(|e| io_failure(e.to_string()))?;

        if status.success() {
            debug!(output = %output.display(), "converter finished");
            Ok(output.to_path_buf())
        } else {
            Err(InvocationFailure::NonZeroExit {
                executable: executable.to_path_buf(),
                status: status.to_string(),
                exit_code: status.code(),
                output: String::from_utf8_lossy(&captured).into_owned(),
            })
        }
    }
}

#[async_trait]
impl Converter for ConversionInvoker {
    async fn convert(&self, request: &ConversionRequest<'_>) -> Result<PathBuf, InvocationFailure> {
        self.invoke(
            request.input,
            request.output,
            request.format,
            &request.variant.executable,
        )
        .await
    }
}
