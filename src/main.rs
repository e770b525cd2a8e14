use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use conversion_compare::{
    Cli, ComparisonOrchestrator, ConfigManager, ConsoleReport, ConversionInvoker,
    CorpusEnumerator, JsonReport, OutputFormat, ReportSink, SummaryReport, VerbosityLevel,
    logging, warn_on_name_collisions,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse_args();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {:#}", err);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = ConfigManager::load_config(&cli)
        .await
        .context("Failed to load configuration")?;

    let verbosity = if cli.debug_requested() {
        VerbosityLevel::Debug
    } else {
        config.verbosity()
    };
    logging::init(verbosity);

    let settings = Arc::new(config.run_settings()?);

    let files = CorpusEnumerator::new()
        .with_excluded_extension(settings.excluded_extension.clone())
        .enumerate(&settings.input_root)
        .await
        .context("Failed to enumerate the input corpus")?;
    info!(
        root = %settings.input_root.display(),
        count = files.len(),
        "corpus ready"
    );
    warn_on_name_collisions(&files);

    let mut sink: Box<dyn ReportSink> = match config.report.format {
        OutputFormat::Human => Box::new(ConsoleReport::new(verbosity, settings.errors_to_print)),
        OutputFormat::Summary => Box::new(SummaryReport::new(verbosity, settings.errors_to_print)),
        OutputFormat::Json => Box::new(JsonReport::new(settings.errors_to_print)),
    };

    let invoker = ConversionInvoker::new(settings.credentials.clone());
    let mut orchestrator = ComparisonOrchestrator::new(Arc::clone(&settings), invoker);
    orchestrator.run(&files, sink.as_mut()).await?;

    Ok(())
}
