//! In-memory model and notifier doubles for unit tests.

use std::sync::Mutex;

use precis_notify::{Notifier, NotifyError, NotifyFut};
use precis_providers::{CompletionFut, CompletionRequest, LanguageModel, ModelError};

type Responder = Box<dyn Fn(&str, &str) -> Result<String, ModelError> + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub instruction: String,
    pub content: String,
    pub max_tokens: u32,
}

/// Answers each request with a closure over `(instruction, content)`.
pub struct ScriptedModel {
    respond: Responder,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedModel {
    pub fn new(
        respond: impl Fn(&str, &str) -> Result<String, ModelError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            respond: Box::new(respond),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Replies `"summary: {content}"` to everything.
    pub fn echo() -> Self {
        Self::new(|_, content| Ok(format!("summary: {content}")))
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }
}

impl LanguageModel for ScriptedModel {
    fn complete<'a>(&'a self, request: CompletionRequest<'a>) -> CompletionFut<'a> {
        self.calls.lock().unwrap().push(RecordedCall {
            instruction: request.instruction.to_string(),
            content: request.content.to_string(),
            max_tokens: request.max_tokens,
        });
        let result = (self.respond)(request.instruction, request.content);
        Box::pin(async move { result })
    }
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
