//! Shared test utilities and fixtures
//!
//! Mock chat-completion servers and in-memory collaborators for the
//! integration suite.

#![allow(dead_code)]

use std::sync::Mutex;
use std::time::Duration;

use precis_notify::{Notifier, NotifyError, NotifyFut};
use precis_providers::{ApiConfig, ChatClient, Endpoint, RetryConfig};
use precis_types::{ApiKey, Provider};
use serde_json::Value;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

pub const COMPLETIONS_PATH: &str = "/v1/chat/completions";

/// Retry quickly so retry tests don't sleep.
pub fn fast_retry(max_retries: u32) -> RetryConfig {
    RetryConfig {
        max_retries,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        jitter_factor: 0.0,
    }
}

/// OpenAI-style client pointed at `server`.
pub fn openai_client(server: &MockServer) -> ChatClient {
    let config = ApiConfig::new(
        ApiKey::new(Provider::OpenAI, "sk-test"),
        Provider::OpenAI.default_model(),
        Endpoint::OpenAI {
            base_url: format!("{}/v1", server.uri()),
        },
    )
    .expect("loopback config is valid")
    .with_retry(fast_retry(1));
    ChatClient::new(config).expect("client builds")
}

/// A successful Chat Completions body.
pub fn completion(text: &str) -> Value {
    serde_json::json!({
        "id": "chatcmpl-test",
        "object": "chat.completion",
        "created": 1_700_000_000,
        "model": "gpt-4o",
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": text },
            "finish_reason": "stop"
        }],
        "usage": { "prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15 }
    })
}

/// A 400 body the way OpenAI reports a rejected prompt.
pub fn invalid_request(message: &str) -> Value {
    serde_json::json!({
        "error": {
            "message": message,
            "type": "invalid_request_error",
            "param": null,
            "code": null
        }
    })
}

/// Mount a fixed reply for every completion request.
pub async fn mount_completion(server: &MockServer, text: &str) {
    Mock::given(method("POST"))
        .and(path(COMPLETIONS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(text)))
        .mount(server)
        .await;
}

/// The (system, user) messages of a captured completion request.
pub fn messages(request: &Request) -> (String, String) {
    let body: Value = serde_json::from_slice(&request.body).expect("request body is JSON");
    let text = |i: usize| {
        body["messages"][i]["content"]
            .as_str()
            .unwrap_or_default()
            .to_string()
    };
    (text(0), text(1))
}

/// Replies `"summary of N bytes"` where N is the length of the user message,
/// so replies identify their chunk whatever order requests arrive in.
pub struct LengthEcho;

impl LengthEcho {
    pub fn reply_for(content: &str) -> String {
        format!("summary of {} bytes", content.len())
    }
}

impl Respond for LengthEcho {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let (_, user) = messages(request);
        ResponseTemplate::new(200).set_body_json(completion(&Self::reply_for(&user)))
    }
}

/// Plain ASCII prose with `paragraphs` numbered paragraphs.
pub fn long_document(paragraphs: usize) -> String {
    (1..=paragraphs)
        .map(|n| {
            format!(
                "Section {n}. The committee reviewed the quarterly figures and noted that \
                 shipping volumes rose while unit costs held steady across every region."
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Records every report; optionally fails each send.
#[derive(Default)]
pub struct RecordingNotifier {
    fail_with: Option<NotifyError>,
    sent: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn failing(error: NotifyError) -> Self {
        Self {
            fail_with: Some(error),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn send<'a>(&'a self, report: &'a str) -> NotifyFut<'a> {
        self.sent.lock().unwrap().push(report.to_string());
        let result = self.fail_with.clone().map_or(Ok(()), Err);
        Box::pin(async move { result })
    }

    fn channel_name(&self) -> &str {
        "recording"
    }
}
