//! Full pipeline runs against mocked generation and transcription services.

use crisisbrief_backends::{generation_loader, transcriber_loader};
use crisisbrief_core::{AudioInput, CancelToken, Pipeline, SilentProgress, Source};
use crisisbrief_shared::{AppConfig, CrisisBriefError, SectionKind};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const FLOOD_REPORT: &str = "Heavy monsoon rain caused the Kosi river to overflow its banks \
late on Tuesday. Flood water entered twelve villages in the lower district and forced more \
than four thousand residents to leave their homes. Two people drowned and several are missing. \
Rescue boats from the state disaster force reached the worst hit areas by morning while relief \
camps opened in three schools. Roads to the district hospital remain cut off.";

const MODEL_PATH: &str = "/models/facebook/bart-large-cnn";

async fn mount_summary(server: &MockServer, needle: &str, summary: &str) {
    Mock::given(method("POST"))
        .and(path(MODEL_PATH))
        .and(body_string_contains(needle))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!([{ "summary_text": summary }])),
        )
        .mount(server)
        .await;
}

async fn generation_server() -> MockServer {
    let server = MockServer::start().await;
    mount_summary(&server, "one-line emergency alert", "Flooding in lower district; move to high ground.").await;
    mount_summary(
        &server,
        "emergency response teams",
        "Twelve villages flooded after the Kosi overflowed. Two dead, several missing, \
         four thousand displaced. Boats deployed; hospital road cut off.",
    )
    .await;
    mount_summary(&server, "professional title", "Kosi River Flood Situation Report.").await;
    mount_summary(&server, "what type of", "A riverine flood struck the lower district after monsoon rain.").await;
    mount_summary(&server, "developed and progressed", "Water rose overnight on Tuesday and spread village by village.").await;
    mount_summary(&server, "impact figures", "Two deaths, several missing and four thousand people displaced.").await;
    mount_summary(&server, "rescue operations", "State teams used boats while schools became relief camps.").await;
    mount_summary(&server, "ongoing risks", "Access to the hospital is blocked and more rain may follow.").await;
    server
}

fn config(generation: &MockServer, asr: &MockServer) -> AppConfig {
    let mut config = AppConfig::default();
    config.backend.endpoint = generation.uri();
    config.backend.api_key_env = "CRISISBRIEF_TEST_UNSET_KEY".into();
    config.backend.timeout_secs = 5;
    config.asr.endpoint = asr.uri();
    config.asr.api_key_env = "CRISISBRIEF_TEST_UNSET_ASR_KEY".into();
    config.asr.timeout_secs = 5;
    config.generation.retry_base_delay_ms = 1;
    config
}

fn pipeline(config: AppConfig) -> Pipeline {
    let backend = generation_loader(&config.backend);
    let transcriber = transcriber_loader(&config.asr);
    Pipeline::new(config, backend, transcriber).expect("valid config")
}

#[tokio::test]
async fn text_report_over_http() {
    let generation = generation_server().await;
    let asr = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&asr)
        .await;

    let pipeline = pipeline(config(&generation, &asr));
    let result = pipeline
        .run(
            Source::Text(FLOOD_REPORT.into()),
            &CancelToken::new(),
            &SilentProgress,
        )
        .await
        .expect("run succeeds");

    assert_eq!(result.alert.text, "Flooding in lower district; move to high ground.");
    assert_eq!(result.event_type.label, "flood");
    assert_eq!(
        result.authority_report.section(SectionKind::Title).map(|s| s.text.as_str()),
        Some("Kosi River Flood Situation Report")
    );
    assert!(result.authority_report.sections().iter().all(|s| !s.placeholder));
    assert!(!pipeline.transcriber_handle().is_loaded().await);
}

#[tokio::test]
async fn audio_report_over_http() {
    let generation = generation_server().await;
    let asr = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/audio/transcriptions"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "text": FLOOD_REPORT })),
        )
        .expect(1)
        .mount(&asr)
        .await;

    let result = pipeline(config(&generation, &asr))
        .run(
            Source::Audio(AudioInput::from_bytes(vec![7u8; 64], "call.mp3").with_language(Some("en".into()))),
            &CancelToken::new(),
            &SilentProgress,
        )
        .await
        .expect("run succeeds");

    assert_eq!(result.transcript.as_deref(), Some(FLOOD_REPORT));
    assert_eq!(result.authority_report.len(), 6);
}

#[tokio::test]
async fn unreachable_backend_fails_run() {
    let asr = MockServer::start().await;
    let mut config = config(&asr, &asr);
    config.backend.endpoint = "http://127.0.0.1:1".into();

    let err = pipeline(config)
        .run(
            Source::Text(FLOOD_REPORT.into()),
            &CancelToken::new(),
            &SilentProgress,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, CrisisBriefError::GenerationFailure(_)));
}
