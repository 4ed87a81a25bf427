//! Transport behavior of the chat client: retries and error classification.

use precis_providers::{
    ApiConfig, ChatClient, CompletionRequest, Endpoint, LanguageModel, ModelError,
};
use precis_types::{ApiKey, Provider};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::{COMPLETIONS_PATH, completion, fast_retry, openai_client};

fn request(content: &str) -> CompletionRequest<'_> {
    CompletionRequest {
        instruction: "Summarize.",
        content,
        max_tokens: 3000,
    }
}

#[tokio::test]
async fn rate_limit_is_retried_then_succeeds() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(COMPLETIONS_PATH))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after-ms", "1"))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(COMPLETIONS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("after retry")))
        .mount(&server)
        .await;

    let text = openai_client(&server)
        .complete(request("hi"))
        .await
        .unwrap();

    assert_eq!(text, "after retry");
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn unprocessable_entity_is_invalid_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(COMPLETIONS_PATH))
        .respond_with(ResponseTemplate::new(422).set_body_string("bad"))
        .expect(1)
        .mount(&server)
        .await;

    let err = openai_client(&server)
        .complete(request("hi"))
        .await
        .unwrap_err();
    assert!(err.is_invalid_request());
}

#[tokio::test]
async fn content_filter_finish_reason_is_invalid_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(COMPLETIONS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{
                "index": 0,
                "message": { "role": "assistant", "content": null },
                "finish_reason": "content_filter"
            }]
        })))
        .mount(&server)
        .await;

    let err = openai_client(&server)
        .complete(request("hi"))
        .await
        .unwrap_err();
    assert!(err.is_invalid_request());
}

#[tokio::test]
async fn unauthorized_is_failure_without_retry() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(COMPLETIONS_PATH))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": { "message": "bad key", "type": "invalid_api_key" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let err = openai_client(&server)
        .complete(request("hi"))
        .await
        .unwrap_err();
    assert!(matches!(err, ModelError::Failure(_)));
}

#[tokio::test]
async fn unreachable_server_is_failure() {
    // Nothing listens on a port freed right after binding it.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    let base_url = format!("http://127.0.0.1:{port}/v1");

    let config = ApiConfig::new(
        ApiKey::new(Provider::OpenAI, "sk-test"),
        Provider::OpenAI.default_model(),
        Endpoint::OpenAI { base_url },
    )
    .unwrap()
    .with_retry(fast_retry(1));
    let client = ChatClient::new(config).unwrap();

    let err = client.complete(request("hi")).await.unwrap_err();
    assert!(matches!(err, ModelError::Failure(_)));
}

#[test]
fn remote_plain_http_is_rejected() {
    let result = ApiConfig::new(
        ApiKey::new(Provider::OpenAI, "sk-test"),
        Provider::OpenAI.default_model(),
        Endpoint::OpenAI {
            base_url: "http://api.example.com/v1".to_string(),
        },
    );
    assert!(result.is_err());
}
