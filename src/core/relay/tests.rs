use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{self, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::*;
use crate::core::message::{ChatMessage, ConversationHistory};

fn token_frame(content: &str) -> Bytes {
    let payload = serde_json::json!({ "choices": [{ "delta": { "content": content } }] });
    Bytes::from(format!("data: {payload}\n\n"))
}

fn turn(text: &str) -> ChatTurn {
    ChatTurn {
        history: ConversationHistory::from(vec![ChatMessage::user(text)]),
        attachments: Vec::new(),
        stream: true,
    }
}

fn channel_stream(rx: mpsc::Receiver<Result<Bytes, RelayError>>) -> ByteStream {
    stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|item| (item, rx)) }).boxed()
}

/// Hands out one prepared body and remembers the request it was asked for.
struct StubUpstream {
    body: Mutex<Option<ByteStream>>,
    seen: Mutex<Option<UpstreamRequest>>,
}

impl StubUpstream {
    fn new(body: ByteStream) -> Self {
        Self {
            body: Mutex::new(Some(body)),
            seen: Mutex::new(None),
        }
    }
}

#[async_trait]
impl Upstream for StubUpstream {
    async fn complete(&self, request: &UpstreamRequest) -> Result<String, RelayError> {
        *self.seen.lock().unwrap() = Some(request.clone());
        Ok("stubbed".to_string())
    }

    async fn stream(&self, request: &UpstreamRequest) -> Result<ByteStream, RelayError> {
        *self.seen.lock().unwrap() = Some(request.clone());
        self.body
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| RelayError::Transport("body already taken".to_string()))
    }
}

async fn openai_relay(server: &MockServer) -> Relay {
    let upstream = OpenAiUpstream::new(reqwest::Client::new(), server.uri(), "test-key");
    Relay::new(Arc::new(upstream), GenerationParams::default())
}

#[tokio::test]
async fn non_streaming_reply_is_returned_as_single_record() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer test-key"))
        .and(body_partial_json(serde_json::json!({
            "model": "gpt-4o",
            "max_tokens": 4096,
            "stream": false,
            "messages": [{ "role": "user", "content": "hi" }]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": "Hello" } }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let relay = openai_relay(&server).await;
    let record = relay.complete(turn("hi")).await.expect("completion");
    assert_eq!(record, RelayRecord::complete("Hello"));
}

#[tokio::test]
async fn upstream_failure_status_is_propagated() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_json(serde_json::json!({
            "error": { "message": "Rate limit reached", "type": "requests" }
        })))
        .mount(&server)
        .await;

    let relay = openai_relay(&server).await;
    let err = relay.open_stream(turn("hi")).await.err().expect("stream should fail");
    assert_eq!(
        err,
        RelayError::Upstream {
            status: 429,
            message: "Rate limit reached".to_string(),
        }
    );

    let err = relay.complete(turn("hi")).await.unwrap_err();
    assert_eq!(err.status_code(), 429);
    assert_eq!(err.code(), "API_ERROR");
}

#[tokio::test]
async fn malformed_completion_body_is_an_upstream_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "choices": [] })))
        .mount(&server)
        .await;

    let relay = openai_relay(&server).await;
    let err = relay.complete(turn("hi")).await.unwrap_err();
    assert!(matches!(err, RelayError::MalformedUpstream(_)));
    assert_eq!(err.status_code(), 500);
}

#[tokio::test]
async fn streamed_tokens_are_relayed_in_order_then_done() {
    let server = MockServer::start().await;
    let mut body = String::new();
    body.push_str(std::str::from_utf8(&token_frame("A")).unwrap());
    body.push_str(": keep-alive\n\n");
    body.push_str(std::str::from_utf8(&token_frame("B")).unwrap());
    body.push_str("data: [DONE]\n\n");
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(serde_json::json!({ "stream": true })))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let relay = openai_relay(&server).await;
    let mut stream = relay.open_stream(turn("hi")).await.expect("stream");

    assert_eq!(stream.next_record().await, Some(RelayRecord::token("A")));
    assert_eq!(stream.next_record().await, Some(RelayRecord::token("B")));
    assert_eq!(stream.next_record().await, Some(RelayRecord::done()));
    assert_eq!(stream.next_record().await, None);
}

#[tokio::test]
async fn body_stream_emits_sse_frames() {
    let body = stream::iter(vec![
        Ok(token_frame("A")),
        Ok(Bytes::from_static(b"data: [DONE]\n\n")),
    ])
    .boxed();
    let relay = Relay::new(Arc::new(StubUpstream::new(body)), GenerationParams::default());

    let frames: Vec<Bytes> = relay
        .open_stream(turn("hi"))
        .await
        .unwrap()
        .into_body_stream()
        .map(|frame| frame.unwrap())
        .collect()
        .await;
    assert_eq!(
        frames,
        vec![
            Bytes::from("data: {\"content\":\"A\",\"done\":false}\n\n"),
            Bytes::from("data: {\"content\":\"\",\"done\":true}\n\n"),
        ]
    );
}

#[tokio::test]
async fn transport_failure_mid_stream_sends_error_record() {
    let body = stream::iter(vec![
        Ok(token_frame("partial")),
        Err(RelayError::Transport("connection reset".to_string())),
        Ok(token_frame("never")),
    ])
    .boxed();
    let relay = Relay::new(Arc::new(StubUpstream::new(body)), GenerationParams::default());
    let mut stream = relay.open_stream(turn("hi")).await.unwrap();

    assert_eq!(stream.next_record().await, Some(RelayRecord::token("partial")));
    let failure = stream.next_record().await.expect("error record");
    assert_eq!(failure, RelayRecord::failure(STREAM_FAILED_MESSAGE));
    assert!(!failure.to_sse_frame().contains("connection reset"));
    assert_eq!(stream.next_record().await, None);
}

#[tokio::test]
async fn upstream_ending_without_sentinel_still_completes() {
    let body = stream::iter(vec![Ok(token_frame("only"))]).boxed();
    let relay = Relay::new(Arc::new(StubUpstream::new(body)), GenerationParams::default());
    let mut stream = relay.open_stream(turn("hi")).await.unwrap();

    assert_eq!(stream.next_record().await, Some(RelayRecord::token("only")));
    assert_eq!(stream.next_record().await, Some(RelayRecord::done()));
    assert_eq!(stream.next_record().await, None);
}

#[tokio::test]
async fn dropping_the_downstream_cancels_the_upstream_read() {
    let (upstream_tx, upstream_rx) = mpsc::channel(8);
    let relay = Relay::new(
        Arc::new(StubUpstream::new(channel_stream(upstream_rx))),
        GenerationParams::default(),
    );
    let mut stream = relay.open_stream(turn("hi")).await.unwrap();

    upstream_tx.send(Ok(token_frame("A"))).await.unwrap();
    assert_eq!(stream.next_record().await, Some(RelayRecord::token("A")));

    drop(stream);

    tokio::time::timeout(Duration::from_secs(2), upstream_tx.closed())
        .await
        .expect("upstream read should be abandoned");
    assert!(upstream_tx.send(Ok(token_frame("B"))).await.is_err());
}

#[tokio::test]
async fn pump_writes_nothing_after_cancellation() {
    let (upstream_tx, upstream_rx) = mpsc::channel(8);
    let (tx, mut rx) = mpsc::channel(8);
    let cancel = CancellationToken::new();
    let pump = tokio::spawn(pump_stream(
        channel_stream(upstream_rx),
        tx,
        cancel.clone(),
    ));

    upstream_tx.send(Ok(token_frame("A"))).await.unwrap();
    assert_eq!(rx.recv().await, Some(RelayRecord::token("A")));

    cancel.cancel();
    let _ = upstream_tx.send(Ok(token_frame("B"))).await;

    assert_eq!(pump.await.unwrap(), PumpOutcome::Cancelled);
    assert_eq!(rx.recv().await, None);
}

#[tokio::test]
async fn pump_stops_when_receiver_is_gone() {
    let body = stream::iter(vec![Ok(token_frame("A")), Ok(token_frame("B"))]).boxed();
    let (tx, rx) = mpsc::channel(8);
    drop(rx);

    let outcome = pump_stream(body, tx, CancellationToken::new()).await;
    assert_eq!(outcome, PumpOutcome::Cancelled);
}

#[test]
fn prepare_folds_attachments_and_copies_generation_params() {
    let upstream = StubUpstream::new(stream::empty().boxed());
    let params = GenerationParams {
        model: "gpt-test".to_string(),
        temperature: 0.2,
        max_tokens: 128,
        top_p: 0.5,
    };
    let relay = Relay::new(Arc::new(upstream), params);

    let mut chat = turn("describe");
    chat.attachments = vec![
        crate::core::attachments::AttachedFile::new("a.png", "image/png", b"img".to_vec()).unwrap(),
        crate::core::attachments::AttachedFile::new("b.txt", "text/plain", b"text".to_vec()).unwrap(),
    ];
    let request = relay.prepare(chat);

    assert_eq!(request.body.model, "gpt-test");
    assert_eq!(request.body.max_tokens, 128);
    assert!(request.body.stream);
    assert_eq!(request.attachments.len(), 2);
    assert_eq!(request.attachments[1].name, "b.txt");

    let value = serde_json::to_value(&request.body).unwrap();
    let content = &value["messages"][0]["content"];
    assert_eq!(content[0]["text"], "describe\n\n[Attached file: b.txt (0.00KB)]");
    assert_eq!(content[1]["type"], "image_url");
    assert_eq!(value["temperature"].as_f64().map(|t| (t * 10.0).round()), Some(2.0));
}

#[tokio::test]
async fn stream_request_records_stream_flag() {
    let upstream = Arc::new(StubUpstream::new(stream::empty().boxed()));
    let relay = Relay::new(upstream.clone(), GenerationParams::default());

    let mut chat = turn("hi");
    chat.stream = false;
    let mut stream = relay.open_stream(chat).await.unwrap();
    assert_eq!(stream.next_record().await, Some(RelayRecord::done()));

    let seen = upstream.seen.lock().unwrap().clone().expect("request recorded");
    assert!(seen.body.stream);
}
