//! Config files on disk driving real clients.

use std::collections::HashMap;

use precis_config::PrecisConfig;
use precis_context::{Chunker, Tokenizer};
use precis_core::{FINAL_INSTRUCTION, PipelineCoordinator, SUMMARIZATION_INSTRUCTION, Summarizer};
use precis_providers::{ChatClient, CompletionRequest, LanguageModel};
use precis_types::CombinePolicy;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::{COMPLETIONS_PATH, completion};

fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();
    move |key: &str| map.get(key).cloned()
}

fn write_config(contents: &str) -> (tempfile::TempDir, PrecisConfig) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, contents).unwrap();
    let config = PrecisConfig::load_from(&path).unwrap();
    (dir, config)
}

#[tokio::test]
async fn config_file_drives_an_openai_pipeline_run() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(COMPLETIONS_PATH))
        .and(header("authorization", "Bearer sk-from-env"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("short summary")))
        .expect(1)
        .mount(&server)
        .await;

    let (_dir, config) = write_config(&format!(
        r#"
        [model]
        api_key = "${{PRECIS_TEST_KEY}}"
        base_url = "{}/v1"
        max_response_tokens = 256

        [chunking]
        max_tokens = 5000

        [pipeline]
        combine = "resummarize"
        "#,
        server.uri()
    ));

    let api = config
        .api_config_with(lookup(&[("PRECIS_TEST_KEY", "sk-from-env")]))
        .unwrap();
    let chunking = config.chunk_settings().unwrap();
    let settings = config.pipeline_settings().unwrap();
    assert_eq!(settings.combine, CombinePolicy::Resummarize);

    let chunker = Chunker::new(
        Tokenizer::for_model(&chunking.tokenizer_model).unwrap(),
        chunking.max_tokens,
    )
    .unwrap();
    let summarizer = Summarizer::new(ChatClient::new(api).unwrap())
        .with_max_response_tokens(settings.max_response_tokens);
    let mut pipeline = PipelineCoordinator::new(chunker, summarizer).with_policy(settings.combine);

    // One chunk, so resummarize collapses to the chunk summary.
    let summary = pipeline
        .run(
            b"A short memo about the budget.",
            &SUMMARIZATION_INSTRUCTION,
            &FINAL_INSTRUCTION,
        )
        .await
        .unwrap();
    assert_eq!(summary.as_str(), "short summary");

    let requests = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body["max_tokens"], 256);
}

#[tokio::test]
async fn azure_config_routes_to_the_deployment() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/openai/deployments/summaries/chat/completions"))
        .and(query_param("api-version", "2024-06-01"))
        .and(header("api-key", "az-env-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("from azure")))
        .expect(1)
        .mount(&server)
        .await;

    let (_dir, config) = write_config(
        r#"
        [model]
        provider = "azure"
        model = "gpt-4o"
        azure_deployment = "summaries"
        max_retries = 0
        "#,
    );
    let endpoint = server.uri();
    let api = config
        .api_config_with(lookup(&[
            ("AZURE_OPENAI_API_KEY", "az-env-key"),
            ("AZURE_OPENAI_ENDPOINT", endpoint.as_str()),
        ]))
        .unwrap();
    let client = ChatClient::new(api).unwrap();

    let text = client
        .complete(CompletionRequest {
            instruction: SUMMARIZATION_INSTRUCTION.as_str(),
            content: "hello",
            max_tokens: 100,
        })
        .await
        .unwrap();
    assert_eq!(text, "from azure");
}

#[test]
fn email_section_overrides_environment_field_by_field() {
    let (_dir, config) = write_config(
        r#"
        [email]
        smtp_server = "smtp.internal"
        smtp_port = 2525
        "#,
    );
    let email = config.email_config_with(lookup(&[
        ("EMAIL_ADDRESS", "bot@example.com"),
        ("EMAIL_PASSWORD", "pw"),
        ("SMTP_SERVER", "smtp.example.com"),
        ("SMTP_PORT", "587"),
        ("TO_EMAIL", "team@example.com"),
    ]));

    assert_eq!(email.smtp_server.as_deref(), Some("smtp.internal"));
    assert_eq!(email.smtp_port.as_deref(), Some("2525"));
    assert_eq!(email.address.as_deref(), Some("bot@example.com"));
    let settings = email.validate().unwrap();
    assert_eq!(settings.port, 2525);
}

#[test]
fn unknown_keys_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[model]\ntemperature = 0.2\n").unwrap();
    let err = PrecisConfig::load_from(&path).unwrap_err();
    assert_eq!(err.path(), Some(path.as_path()));
}
