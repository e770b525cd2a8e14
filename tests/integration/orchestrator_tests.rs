use std::path::{Path, PathBuf};
use std::sync::Arc;

use conversion_compare::{
    ComparisonOrchestrator, ComparisonPhase, ComparisonProgress, ComparisonResult,
    CorpusEnumerator, FailureCause, FileRow, ReportSink, RunAggregate, RunReport, RunSettings,
    SilentReport, TargetFormat,
};

use crate::common::fakes::{ScriptedConverter, default_output, license_expired};
use crate::common::test_helpers::TestWorkspace;

/// Sink that keeps every event it sees
#[derive(Default)]
struct RecordingSink {
    started_with: Option<usize>,
    progress: Vec<(usize, TargetFormat, ComparisonPhase)>,
    files_seen_per_row: Vec<usize>,
    finished: bool,
}

impl ReportSink for RecordingSink {
    fn on_run_started(
        &mut self,
        _settings: &RunSettings,
        total_files: usize,
    ) -> conversion_compare::error::Result<()> {
        self.started_with = Some(total_files);
        Ok(())
    }

    fn on_progress(&mut self, progress: &ComparisonProgress) {
        self.progress
            .push((progress.index, progress.format, progress.phase));
    }

    fn on_row(
        &mut self,
        _row: &FileRow,
        aggregate: &RunAggregate,
    ) -> conversion_compare::error::Result<()> {
        self.files_seen_per_row.push(aggregate.files);
        Ok(())
    }

    fn on_run_finished(&mut self, _report: &RunReport) -> conversion_compare::error::Result<()> {
        self.finished = true;
        Ok(())
    }
}

fn dummy_settings(workspace: &TestWorkspace) -> Arc<RunSettings> {
    workspace.settings(Path::new("FrameworkApp.exe"), Path::new("CoreApp.exe"))
}

fn file_name(path: &Path) -> String {
    path.file_name().unwrap().to_string_lossy().into_owned()
}

#[tokio::test]
async fn test_enumerated_corpus_is_compared_in_order() {
    let workspace = TestWorkspace::new();
    workspace.add_file("a.txt", "a");
    workspace.add_file("b.md", "# notes");
    workspace.add_file("sub/c.txt", "c");

    let files = CorpusEnumerator::new()
        .enumerate(&workspace.input_root())
        .await
        .unwrap();

    let mut orchestrator =
        ComparisonOrchestrator::new(dummy_settings(&workspace), ScriptedConverter::identical());
    let mut sink = RecordingSink::default();
    let report = orchestrator.run(&files, &mut sink).await.unwrap();

    let names: Vec<_> = report.rows.iter().map(|r| file_name(&r.file)).collect();
    assert_eq!(names, vec!["a.txt", "c.txt"]);
    assert_eq!(report.aggregate.files, 2);
    assert_eq!(report.aggregate.total, 6);
    assert!(!report.has_differences());

    assert_eq!(sink.started_with, Some(2));
    assert_eq!(sink.files_seen_per_row, vec![1, 2]);
    assert!(sink.finished);

    // Outputs land under <output>/<variant>/<format dir>/<file name>
    for variant in ["framework", "core"] {
        for dir in ["gaeb90", "gaeb2000", "gaebXml"] {
            assert!(
                workspace
                    .output_root()
                    .join(variant)
                    .join(dir)
                    .join("c.txt")
                    .is_file()
            );
        }
    }
}

#[tokio::test]
async fn test_progress_events_follow_phases() {
    let workspace = TestWorkspace::new();
    let file = workspace.add_file("a.x83", "a");

    let mut orchestrator =
        ComparisonOrchestrator::new(dummy_settings(&workspace), ScriptedConverter::identical());
    let mut sink = RecordingSink::default();
    orchestrator.run(&[file], &mut sink).await.unwrap();

    let gaeb90: Vec<_> = sink
        .progress
        .iter()
        .filter(|(_, format, _)| *format == TargetFormat::Gaeb90)
        .map(|(_, _, phase)| *phase)
        .collect();
    assert_eq!(
        gaeb90,
        vec![
            ComparisonPhase::Pending,
            ComparisonPhase::ConvertingBaseline,
            ComparisonPhase::ConvertingCandidate,
            ComparisonPhase::Diffing,
            ComparisonPhase::Recorded,
        ]
    );

    // Formats are visited in canonical order
    let mut formats: Vec<_> = sink.progress.iter().map(|(_, f, _)| *f).collect();
    formats.dedup();
    assert_eq!(formats, TargetFormat::ALL.to_vec());
}

#[tokio::test]
async fn test_error_cap_keeps_first_recorded() {
    let workspace = TestWorkspace::new();
    let files: Vec<PathBuf> = (1..=4)
        .map(|i| workspace.add_file(&format!("{i}.x83"), "data"))
        .collect();

    let converter = ScriptedConverter::new(|request| {
        if request.variant.name == "core" && request.format == TargetFormat::GaebXml {
            Err(license_expired("CoreApp.exe"))
        } else {
            Ok(default_output(request.format))
        }
    });
    let mut orchestrator = ComparisonOrchestrator::new(dummy_settings(&workspace), converter);
    let report = orchestrator.run(&files, &mut SilentReport).await.unwrap();

    assert_eq!(report.errors.len(), 4);
    assert_eq!(report.aggregate.counters(TargetFormat::GaebXml).failed, 4);
    assert_eq!(report.aggregate.counters(TargetFormat::Gaeb90).equal, 4);

    let shown = report.displayed_errors(2);
    assert_eq!(shown.len(), 2);
    assert_eq!(file_name(&shown[0].file), "1.x83");
    assert_eq!(file_name(&shown[1].file), "2.x83");
    assert_eq!(report.displayed_errors(usize::MAX).len(), 4);
}

#[tokio::test]
async fn test_xml_formatting_differences_are_equal() {
    let workspace = TestWorkspace::new();
    let file = workspace.add_file("a.x83", "a");

    let converter = ScriptedConverter::new(|request| {
        Ok(match (request.format, request.variant.name.as_str()) {
            (TargetFormat::GaebXml, "framework") => {
                "<GAEB><Item a=\"1\" b=\"2\">Concrete</Item></GAEB>".to_string()
            }
            (TargetFormat::GaebXml, _) => {
                "<GAEB>\n  <!-- candidate -->\n  <Item b=\"2\"  a=\"1\">\n    Concrete\n  </Item>\n</GAEB>\n"
                    .to_string()
            }
            (format, _) => default_output(format),
        })
    });
    let mut orchestrator = ComparisonOrchestrator::new(dummy_settings(&workspace), converter);
    let report = orchestrator.run(&[file], &mut SilentReport).await.unwrap();

    assert!(report.rows[0].result(TargetFormat::GaebXml).unwrap().is_equal());
    assert!(report.errors.is_empty());
}

#[tokio::test]
async fn test_renamed_xml_element_is_different() {
    let workspace = TestWorkspace::new();
    let file = workspace.add_file("a.x83", "a");

    let converter = ScriptedConverter::new(|request| {
        Ok(match (request.format, request.variant.name.as_str()) {
            (TargetFormat::GaebXml, "core") => {
                "<GAEB><Award><BoQ ID=\"1\"><Position>Concrete</Position></BoQ></Award></GAEB>"
                    .to_string()
            }
            (format, _) => default_output(format),
        })
    });
    let mut orchestrator = ComparisonOrchestrator::new(dummy_settings(&workspace), converter);
    let report = orchestrator.run(&[file], &mut SilentReport).await.unwrap();

    match report.rows[0].result(TargetFormat::GaebXml).unwrap() {
        ComparisonResult::Different { report } => {
            assert!(report.contains("/GAEB[1]/Award[1]/BoQ[1]/Item[1]"));
        }
        other => panic!("Expected a difference, got {other:?}"),
    }
    let record = &report.errors[0];
    assert_eq!(record.format, TargetFormat::GaebXml);
    assert!(record.cause.is_none());
    assert!(record.baseline_path.as_ref().unwrap().ends_with("framework/gaebXml/a.x83"));
}

#[tokio::test]
async fn test_missing_output_is_diff_failure() {
    let workspace = TestWorkspace::new();
    let file = workspace.add_file("a.x83", "a");

    // Converter that reports success for an output it never wrote
    struct LyingConverter;

    #[async_trait::async_trait]
    impl conversion_compare::Converter for LyingConverter {
        async fn convert(
            &self,
            request: &conversion_compare::ConversionRequest<'_>,
        ) -> Result<PathBuf, conversion_compare::InvocationFailure> {
            Ok(request.output.to_path_buf())
        }
    }

    let mut orchestrator = ComparisonOrchestrator::new(dummy_settings(&workspace), LyingConverter);
    let report = orchestrator.run(&[file], &mut SilentReport).await.unwrap();

    assert_eq!(report.errors.len(), 3);
    assert!(report.errors.iter().all(|e| matches!(
        e.cause,
        Some(FailureCause::DiffComputation { .. })
    )));
}

#[cfg(unix)]
mod with_script_converters {
    use super::*;
    use crate::common::test_helpers::{COPY_BODY, sample_document};

    #[tokio::test]
    async fn test_license_failure_is_reported_and_run_continues() {
        let workspace = TestWorkspace::new();
        let expired = workspace.add_file("expired.x83", &sample_document("Concrete"));
        let fine = workspace.add_file("fine.x83", &sample_document("Steel"));

        let baseline = workspace.write_converter("framework.sh", COPY_BODY);
        let candidate = workspace.write_converter(
            "core.sh",
            "case \"$in\" in\n  *expired*) echo \"license expired\"; exit 2 ;;\nesac\ncp \"$in\" \"$out\"\n",
        );

        let mut orchestrator = ComparisonOrchestrator::new(
            workspace.settings(&baseline, &candidate),
            conversion_compare::ConversionInvoker::new(conversion_compare::Credentials::new(
                "SERIAL-0001",
                None,
            )),
        );
        let report = orchestrator
            .run(&[expired, fine], &mut SilentReport)
            .await
            .unwrap();

        let expired_row = &report.rows[0];
        assert!(expired_row.outcomes.iter().all(|o| o.result.is_failed()));
        for record in &report.errors {
            let cause = record.cause.as_ref().unwrap();
            assert!(cause.to_string().contains("license expired"));
        }
        assert_eq!(report.errors.len(), 3);

        let fine_row = &report.rows[1];
        assert!(fine_row.outcomes.iter().all(|o| o.result.is_equal()));
    }

    #[tokio::test]
    async fn test_candidate_not_invoked_after_baseline_failure() {
        let workspace = TestWorkspace::new();
        let file = workspace.add_file("a.x83", &sample_document("Concrete"));
        let log = workspace.root().join("candidate.log");

        let baseline = workspace.write_converter(
            "framework.sh",
            "if [ \"$fmt\" = \"GAEB2000\" ]; then echo \"cannot write GAEB2000\"; exit 1; fi\ncp \"$in\" \"$out\"\n",
        );
        let candidate = workspace.write_converter(
            "core.sh",
            &format!("echo \"$fmt\" >> \"{}\"\ncp \"$in\" \"$out\"\n", log.display()),
        );

        let mut orchestrator = ComparisonOrchestrator::new(
            workspace.settings(&baseline, &candidate),
            conversion_compare::ConversionInvoker::new(conversion_compare::Credentials::new(
                "SERIAL-0001",
                None,
            )),
        );
        let report = orchestrator.run(&[file], &mut SilentReport).await.unwrap();

        let row = &report.rows[0];
        assert!(row.result(TargetFormat::Gaeb90).unwrap().is_equal());
        assert!(row.result(TargetFormat::Gaeb2000).unwrap().is_failed());
        assert!(row.result(TargetFormat::GaebXml).unwrap().is_equal());

        let invoked = std::fs::read_to_string(&log).unwrap();
        let formats: Vec<_> = invoked.lines().collect();
        assert_eq!(formats, vec!["GAEB90", "GAEBDAXML"]);

        match &report.errors[0].cause {
            Some(FailureCause::Invocation { variant, failure }) => {
                assert_eq!(variant, "framework");
                assert_eq!(failure.diagnostic_output().map(str::trim), Some("cannot write GAEB2000"));
            }
            other => panic!("Expected invocation failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_text_difference_report() {
        let workspace = TestWorkspace::new();
        let file = workspace.add_file("a.x83", "one\ntwo\nfoo\nfour\nfive\n");

        let baseline = workspace.write_converter("framework.sh", COPY_BODY);
        let candidate = workspace.write_converter(
            "core.sh",
            "if [ \"$fmt\" = \"GAEB90\" ]; then sed 's/foo/bar/' \"$in\" > \"$out\"; else cp \"$in\" \"$out\"; fi\n",
        );

        let mut settings = (*workspace.settings(&baseline, &candidate)).clone();
        settings.formats = vec![TargetFormat::Gaeb90, TargetFormat::Gaeb2000];

        let mut orchestrator = ComparisonOrchestrator::new(
            Arc::new(settings),
            conversion_compare::ConversionInvoker::new(conversion_compare::Credentials::new(
                "SERIAL-0001",
                None,
            )),
        );
        let report = orchestrator.run(&[file], &mut SilentReport).await.unwrap();

        assert_eq!(report.errors.len(), 1);
        let message = report.errors[0].message.as_deref().unwrap();
        assert!(message.contains("===== (line: 3)"));
        assert!(message.contains("- foo"));
        assert!(message.contains("+ bar"));
        assert_eq!(message.matches("=====").count(), 1);
        assert_eq!(
            message.lines().filter(|l| l.starts_with("- ") || l.starts_with("+ ")).count(),
            2
        );
        assert!(report.rows[0].result(TargetFormat::Gaeb2000).unwrap().is_equal());
    }

    #[tokio::test]
    async fn test_rerun_does_not_compare_previous_outputs() {
        let workspace = TestWorkspace::new();
        let file = workspace.add_file("a.x83", &sample_document("Concrete"));
        let baseline = workspace.write_converter("framework.sh", COPY_BODY);
        let copying = workspace.write_converter("core.sh", COPY_BODY);
        let silent = workspace.write_converter("core-silent.sh", "exit 0\n");
        let invoker = || {
            conversion_compare::ConversionInvoker::new(conversion_compare::Credentials::new(
                "SERIAL-0001",
                None,
            ))
        };

        let first = ComparisonOrchestrator::new(workspace.settings(&baseline, &copying), invoker())
            .run(std::slice::from_ref(&file), &mut SilentReport)
            .await
            .unwrap();
        assert_eq!(first.aggregate.total_errors(), 0);

        let second = ComparisonOrchestrator::new(workspace.settings(&baseline, &silent), invoker())
            .run(&[file], &mut SilentReport)
            .await
            .unwrap();
        assert_eq!(second.errors.len(), 3);
        assert!(second.errors.iter().all(|record| matches!(
            record.cause,
            Some(FailureCause::DiffComputation { .. })
        )));
    }

    #[tokio::test]
    async fn test_legacy_encoded_outputs_differing_in_one_byte() {
        let workspace = TestWorkspace::new();
        let file = workspace.add_file("a.x83", "21 Mueller\n");

        // 0xFC and 0xF6 are u-umlaut and o-umlaut in ISO-8859-1
        let baseline =
            workspace.write_converter("framework.sh", "printf '21 M\\374ller\\n' > \"$out\"\n");
        let candidate =
            workspace.write_converter("core.sh", "printf '21 M\\366ller\\n' > \"$out\"\n");

        let mut settings = (*workspace.settings(&baseline, &candidate)).clone();
        settings.formats = vec![TargetFormat::Gaeb90];

        let mut orchestrator = ComparisonOrchestrator::new(
            Arc::new(settings),
            conversion_compare::ConversionInvoker::new(conversion_compare::Credentials::new(
                "SERIAL-0001",
                None,
            )),
        );
        let report = orchestrator.run(&[file], &mut SilentReport).await.unwrap();

        assert!(report.rows[0].result(TargetFormat::Gaeb90).unwrap().is_different());
        let message = report.errors[0].message.as_deref().unwrap();
        assert!(message.contains("- 21 M\u{fc}ller"));
        assert!(message.contains("+ 21 M\u{f6}ller"));
    }
}
