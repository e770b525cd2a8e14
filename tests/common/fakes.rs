use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;

use conversion_compare::{ConversionRequest, Converter, InvocationFailure, TargetFormat};

type Script =
    dyn Fn(&ConversionRequest<'_>) -> Result<String, InvocationFailure> + Send + Sync;

/// A converter invocation as seen by a fake
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub input: PathBuf,
    pub output: PathBuf,
    pub format: TargetFormat,
    pub variant: String,
}

/// In-process converter: writes whatever the script returns to the requested
/// output path, or fails with the script's error
pub struct ScriptedConverter {
    script: Box<Script>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedConverter {
    pub fn new(
        script: impl Fn(&ConversionRequest<'_>) -> Result<String, InvocationFailure>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        Self {
            script: Box::new(script),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Converter whose variants always agree
    pub fn identical() -> Self {
        Self::new(|request| Ok(default_output(request.format)))
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Converter for ScriptedConverter {
    async fn convert(&self, request: &ConversionRequest<'_>) -> Result<PathBuf, InvocationFailure> {
        self.calls.lock().unwrap().push(RecordedCall {
            input: request.input.to_path_buf(),
            output: request.output.to_path_buf(),
            format: request.format,
            variant: request.variant.name.clone(),
        });

        let content = (self.script)(request)?;
        if let Some(parent) = request.output.parent() {
            tokio::fs::create_dir_all(parent).await.unwrap();
        }
        tokio::fs::write(request.output, content).await.unwrap();
        Ok(request.output.to_path_buf())
    }
}

/// Output both variants produce unless a test says otherwise
pub fn default_output(format: TargetFormat) -> String {
    match format {
        TargetFormat::GaebXml => {
            "<GAEB><Award><BoQ ID=\"1\"><Item>Concrete</Item></BoQ></Award></GAEB>".to_string()
        }
        TargetFormat::Gaeb90 => "00 header\n21 item one\n22 item two\n99 end\n".to_string(),
        TargetFormat::Gaeb2000 => "#begin[GAEB]\n#begin[Item]\nConcrete\n#end[Item]\n#end[GAEB]\n"
            .to_string(),
    }
}

/// Failure of a converter that rejects its serial number
pub fn license_expired(executable: &str) -> InvocationFailure {
    InvocationFailure::NonZeroExit {
        executable: PathBuf::from(executable),
        status: "exit status: 2".to_string(),
        exit_code: Some(2),
        output: "license expired\n".to_string(),
    }
}
