//! End-to-end pipeline runs against a mock Chat Completions server.

use precis_context::{Chunker, Tokenizer};
use precis_core::{
    FAILURE_SENTINEL, FINAL_INSTRUCTION, INVALID_REQUEST_SENTINEL, PipelineCoordinator,
    SUMMARIZATION_INSTRUCTION, Summarizer, combine,
};
use precis_providers::ChatClient;
use precis_types::{Chunk, CombinePolicy, PipelineState};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::{
    COMPLETIONS_PATH, LengthEcho, invalid_request, long_document, messages, openai_client,
};

/// A document and a chunker that splits it into exactly three chunks.
fn three_chunk_fixture() -> (String, Chunker, Vec<Chunk>) {
    let text = long_document(30);
    let tokenizer = Tokenizer::cl100k().unwrap();
    let bound = tokenizer.count(&text).div_ceil(3);
    let chunker = Chunker::new(tokenizer, bound).unwrap();
    let chunks = chunker.chunk(&text).unwrap();
    assert_eq!(chunks.len(), 3);
    (text, chunker, chunks)
}

fn coordinator(server: &MockServer, chunker: Chunker) -> PipelineCoordinator<ChatClient> {
    PipelineCoordinator::new(chunker, Summarizer::new(openai_client(server)))
}

async fn mount_echo(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path(COMPLETIONS_PATH))
        .respond_with(LengthEcho)
        .mount(server)
        .await;
}

fn expected_replies(chunks: &[Chunk]) -> Vec<String> {
    chunks
        .iter()
        .map(|c| LengthEcho::reply_for(c.text()))
        .collect()
}

#[tokio::test]
async fn three_chunks_are_summarized_in_order_and_concatenated() {
    let server = MockServer::start().await;
    mount_echo(&server).await;
    let (text, chunker, chunks) = three_chunk_fixture();
    let mut pipeline = coordinator(&server, chunker);

    let summary = pipeline
        .run(
            text.as_bytes(),
            &SUMMARIZATION_INSTRUCTION,
            &FINAL_INSTRUCTION,
        )
        .await
        .unwrap();

    assert_eq!(summary.as_str(), combine(&expected_replies(&chunks)));
    assert_eq!(summary.chunk_count(), 3);
    assert_eq!(summary.failed_chunks(), 0);
    assert!(summary.document().as_str().starts_with("doc-"));
    assert_eq!(pipeline.state(), PipelineState::Done);

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 3);
    for (request, chunk) in requests.iter().zip(&chunks) {
        let (system, user) = messages(request);
        assert_eq!(system, SUMMARIZATION_INSTRUCTION.as_str());
        assert_eq!(user, chunk.text());
    }
}

#[tokio::test]
async fn concurrent_requests_keep_chunk_order() {
    let server = MockServer::start().await;
    mount_echo(&server).await;
    let (text, chunker, chunks) = three_chunk_fixture();
    let mut pipeline = PipelineCoordinator::new(
        chunker,
        Summarizer::new(openai_client(&server)).with_concurrency(3),
    );

    let summary = pipeline
        .run(
            text.as_bytes(),
            &SUMMARIZATION_INSTRUCTION,
            &FINAL_INSTRUCTION,
        )
        .await
        .unwrap();

    assert_eq!(summary.as_str(), combine(&expected_replies(&chunks)));
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
}

#[tokio::test]
async fn rejected_chunk_becomes_sentinel_and_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(COMPLETIONS_PATH))
        .and(body_string_contains("Section 1."))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(invalid_request("repetitive patterns")),
        )
        .with_priority(1)
        .mount(&server)
        .await;
    mount_echo(&server).await;
    let (text, chunker, chunks) = three_chunk_fixture();
    let mut pipeline = coordinator(&server, chunker);

    let summary = pipeline
        .run(
            text.as_bytes(),
            &SUMMARIZATION_INSTRUCTION,
            &FINAL_INSTRUCTION,
        )
        .await
        .unwrap();

    let mut expected = expected_replies(&chunks);
    expected[0] = INVALID_REQUEST_SENTINEL.to_string();
    assert_eq!(summary.as_str(), combine(&expected));
    assert_eq!(summary.failed_chunks(), 1);
    assert_eq!(pipeline.state(), PipelineState::Done);
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
}

#[tokio::test]
async fn server_error_is_retried_then_becomes_failure_sentinel() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(COMPLETIONS_PATH))
        .and(body_string_contains("Section 1."))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .with_priority(1)
        .mount(&server)
        .await;
    mount_echo(&server).await;
    let (text, chunker, chunks) = three_chunk_fixture();
    let mut pipeline = coordinator(&server, chunker);

    let summary = pipeline
        .run(
            text.as_bytes(),
            &SUMMARIZATION_INSTRUCTION,
            &FINAL_INSTRUCTION,
        )
        .await
        .unwrap();

    let mut expected = expected_replies(&chunks);
    expected[0] = FAILURE_SENTINEL.to_string();
    assert_eq!(summary.as_str(), combine(&expected));
    // One retry for the failing chunk, one request each for the others.
    assert_eq!(server.received_requests().await.unwrap().len(), 4);
}

#[tokio::test]
async fn resummarize_sends_joined_summaries_with_final_instruction() {
    let server = MockServer::start().await;
    mount_echo(&server).await;
    let (text, chunker, chunks) = three_chunk_fixture();
    let mut pipeline = coordinator(&server, chunker).with_policy(CombinePolicy::Resummarize);

    let summary = pipeline
        .run(
            text.as_bytes(),
            &SUMMARIZATION_INSTRUCTION,
            &FINAL_INSTRUCTION,
        )
        .await
        .unwrap();

    let joined = combine(&expected_replies(&chunks));
    assert_eq!(summary.as_str(), LengthEcho::reply_for(&joined));

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 4);
    let (system, user) = messages(&requests[3]);
    assert_eq!(system, FINAL_INSTRUCTION.as_str());
    assert_eq!(user, joined);
}

#[tokio::test]
async fn failed_final_call_fails_the_run() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(COMPLETIONS_PATH))
        .and(body_string_contains("summary of"))
        .respond_with(ResponseTemplate::new(500))
        .with_priority(1)
        .mount(&server)
        .await;
    mount_echo(&server).await;
    let (text, chunker, _) = three_chunk_fixture();
    let mut pipeline = coordinator(&server, chunker).with_policy(CombinePolicy::Resummarize);

    let err = pipeline
        .run(
            text.as_bytes(),
            &SUMMARIZATION_INSTRUCTION,
            &FINAL_INSTRUCTION,
        )
        .await
        .unwrap_err();

    assert_eq!(err.stage(), PipelineState::Combining);
    assert_eq!(pipeline.state(), PipelineState::Failed);
}

#[tokio::test]
async fn empty_document_makes_no_requests() {
    let server = MockServer::start().await;
    mount_echo(&server).await;
    let chunker = Chunker::new(Tokenizer::cl100k().unwrap(), 100).unwrap();
    let mut pipeline = coordinator(&server, chunker);

    let summary = pipeline
        .run(b"", &SUMMARIZATION_INSTRUCTION, &FINAL_INSTRUCTION)
        .await
        .unwrap();

    assert_eq!(summary.as_str(), "");
    assert_eq!(summary.chunk_count(), 0);
    assert!(server.received_requests().await.unwrap().is_empty());
}
