//! End-to-end summarize scenarios against deterministic stub clients.

use std::sync::Arc;

use crisisbrief_core::testing::{
    EARTHQUAKE_REPORT, EchoBackend, RecordingProgress, ScriptedBackend, StubTranscriber,
};
use crisisbrief_core::{
    AudioInput, CancelToken, GenerationBackend, Pipeline, PipelineState, SilentProgress, Source,
    Transcriber,
};
use crisisbrief_shared::{AppConfig, CrisisBriefError, SectionKind};

fn pipeline(backend: Arc<dyn GenerationBackend>, asr: Arc<dyn Transcriber>) -> Pipeline {
    Pipeline::with_clients(AppConfig::default(), backend, asr).expect("valid default config")
}

fn echo_pipeline() -> Pipeline {
    pipeline(
        Arc::new(EchoBackend::default()),
        Arc::new(StubTranscriber::new(EARTHQUAKE_REPORT)),
    )
}

#[tokio::test]
async fn earthquake_report_end_to_end() {
    let pipeline = echo_pipeline();
    let result = pipeline
        .run(
            Source::Text(EARTHQUAKE_REPORT.into()),
            &CancelToken::new(),
            &SilentProgress,
        )
        .await
        .expect("run succeeds");

    let buckets = &pipeline.config().generation.buckets;
    // the echo ignores the bucket; its first sentence alone is 21 words
    assert_eq!(result.alert.word_count, buckets.public.max);
    assert!(result.responder_summary.word_count >= buckets.responder.min);
    assert!(result.responder_summary.word_count <= buckets.responder.max);

    let sections = result.authority_report.sections();
    assert_eq!(sections.len(), 6);
    for (output, kind) in sections.iter().zip(SectionKind::ALL) {
        assert_eq!(output.section(), Some(kind));
        assert!(!output.text.trim().is_empty());
    }
    assert_eq!(result.event_type.label, "earthquake");

    let record = serde_json::to_value(result.to_record()).expect("serialize");
    assert!(record["alert"].is_string());
    assert!(record["responderSummary"].is_string());
    assert_eq!(record["authorityReport"].as_array().map(Vec::len), Some(6));
    assert_eq!(record["authorityReport"][0]["section"], "TITLE");
}

#[tokio::test]
async fn audio_source_end_to_end() {
    let result = echo_pipeline()
        .run(
            Source::Audio(AudioInput::from_bytes(vec![0u8; 128], "field-report.m4a")),
            &CancelToken::new(),
            &SilentProgress,
        )
        .await
        .expect("run succeeds");
    assert_eq!(result.transcript.as_deref(), Some(EARTHQUAKE_REPORT));
    assert_eq!(result.authority_report.len(), 6);
}

#[tokio::test]
async fn empty_transcript_fails_before_generation() {
    let backend = Arc::new(EchoBackend::default());
    let pipeline = pipeline(backend.clone(), Arc::new(StubTranscriber::new("  \n ")));
    let progress = RecordingProgress::new();

    let err = pipeline
        .run(
            Source::Audio(AudioInput::from_bytes(vec![1u8; 16], "silence.wav")),
            &CancelToken::new(),
            &progress,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, CrisisBriefError::EmptyTranscript));
    assert_eq!(
        progress.states(),
        vec![PipelineState::Transcribing, PipelineState::Failed]
    );
    assert!(!progress.reached(PipelineState::GeneratingLevels));
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn missing_audio_file_reports_not_found() {
    let err = echo_pipeline()
        .run(
            Source::Audio(AudioInput::from_path("/definitely/not/here.wav")),
            &CancelToken::new(),
            &SilentProgress,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, CrisisBriefError::AudioNotFound { .. }));
}

#[tokio::test]
async fn cancel_during_report_assembly_yields_no_result() {
    let token = CancelToken::new();
    let progress = RecordingProgress::cancelling_on(PipelineState::AssemblingReport, token.clone());

    let err = echo_pipeline()
        .run(Source::Text(EARTHQUAKE_REPORT.into()), &token, &progress)
        .await
        .unwrap_err();

    assert!(matches!(err, CrisisBriefError::Cancelled));
    assert!(progress.reached(PipelineState::AssemblingReport));
    assert!(!progress.reached(PipelineState::Done));
    assert_eq!(progress.states().last(), Some(&PipelineState::Failed));
}

#[tokio::test]
async fn cancelled_before_start_never_generates() {
    let backend = Arc::new(EchoBackend::default());
    let pipeline = pipeline(backend.clone(), Arc::new(StubTranscriber::new("")));
    let token = CancelToken::new();
    token.cancel();

    let err = pipeline
        .run(Source::Text(EARTHQUAKE_REPORT.into()), &token, &SilentProgress)
        .await
        .unwrap_err();
    assert!(matches!(err, CrisisBriefError::Cancelled));
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn repeated_runs_are_idempotent() {
    let pipeline = echo_pipeline();
    let cancel = CancelToken::new();
    let first = pipeline
        .run(Source::Text(EARTHQUAKE_REPORT.into()), &cancel, &SilentProgress)
        .await
        .unwrap();
    let second = pipeline
        .run(Source::Text(EARTHQUAKE_REPORT.into()), &cancel, &SilentProgress)
        .await
        .unwrap();

    assert_ne!(first.request_id, second.request_id);
    assert_eq!(first.alert, second.alert);
    assert_eq!(first.responder_summary, second.responder_summary);
    assert_eq!(first.authority_report, second.authority_report);
    assert_eq!(first.source_sha256, second.source_sha256);
}

#[tokio::test]
async fn identical_sections_trigger_one_regeneration() {
    let repeated = "The earthquake destroyed homes across the northern region overnight.";
    let backend = Arc::new(
        ScriptedBackend::new()
            .vary_on_dedup("Tectonic plates slipped along a shallow fault line")
            .respond_when("one-line emergency alert", "Earthquake hits north; stay indoors now.")
            .respond_when("professional title", "Northern Region Quake Report")
            .respond_when("what type of", repeated)
            .respond_when("developed and progressed", repeated)
            .respond_when("impact figures", "Five deaths and fifty injuries according to reports.")
            .respond_when("rescue operations", "Search teams deployed while hospitals accepted patients.")
            .respond_when("ongoing risks", "Aftershocks remain possible; rebuilding will take months."),
    );
    let result = pipeline(backend.clone(), Arc::new(StubTranscriber::new("")))
        .run(
            Source::Text(EARTHQUAKE_REPORT.into()),
            &CancelToken::new(),
            &SilentProgress,
        )
        .await
        .unwrap();

    assert_eq!(backend.dedup_calls(), 1);
    let report = &result.authority_report;
    let intro = report.section(SectionKind::Introduction).unwrap();
    let details = report.section(SectionKind::EventDetails).unwrap();
    assert_eq!(intro.text, repeated);
    assert_ne!(details.text, intro.text);
    assert!(report.sections().iter().all(|s| !s.low_diversity));
}

#[tokio::test]
async fn concurrent_runs_share_one_pipeline() {
    let pipeline = Arc::new(echo_pipeline());
    let mut tasks = tokio::task::JoinSet::new();
    for _ in 0..4 {
        let pipeline = Arc::clone(&pipeline);
        tasks.spawn(async move {
            pipeline
                .run(
                    Source::Text(EARTHQUAKE_REPORT.into()),
                    &CancelToken::new(),
                    &SilentProgress,
                )
                .await
        });
    }
    let mut alerts = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        alerts.push(joined.expect("task").expect("run").alert.text);
    }
    assert_eq!(alerts.len(), 4);
    assert!(alerts.windows(2).all(|w| w[0] == w[1]));
}
