use super::*;
use crate::cli::ask::{ask, AskArgs, RelayRejected, DEFAULT_ENDPOINT};
use crate::core::message::Role;
use crate::core::relay::{GenerationParams, MockUpstream, Relay};
use crate::server::{router, AppState, ServerMode};
use std::fs;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;

mod test_helpers {
    use super::*;

    pub(super) fn parse_args(argv: &[&str]) -> Args {
        Args::try_parse_from(argv)
            .unwrap_or_else(|err| panic!("argv={argv:?} should parse successfully: {err}"))
    }

    pub(super) async fn spawn_mock_relay() -> String {
        let state = AppState::new(
            Relay::new(
                Arc::new(MockUpstream::with_word_delay(Duration::ZERO)),
                GenerationParams::default(),
            ),
            ServerMode::Mock,
        );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(state)).await.unwrap();
        });
        format!("http://{addr}/api/chat")
    }

    pub(super) fn ask_args(endpoint: String, prompt: &str) -> AskArgs {
        AskArgs {
            prompt: vec![prompt.to_string()],
            endpoint,
            files: Vec::new(),
            no_stream: false,
            html: false,
            save_transcript: None,
        }
    }
}

use test_helpers::*;

#[test]
fn serve_flags_become_overrides() {
    let argv = ["chatbot-relay", "serve", "--mock", "-P", "4000", "-m", "gpt-test"];
    let args = parse_args(&argv);
    match args.command {
        Commands::Serve(serve) => {
            assert_eq!(serve.mode(), ServerMode::Mock);
            let overrides = serve.overrides();
            assert_eq!(overrides.port, Some(4000));
            assert_eq!(overrides.model.as_deref(), Some("gpt-test"));
            assert_eq!(overrides.bind, None);
        }
        other => panic!("expected serve, got {other:?}"),
    }
}

#[test]
fn global_flags_work_after_the_subcommand() {
    let argv = ["chatbot-relay", "serve", "--log", "relay.log", "--config", "relay.toml"];
    let args = parse_args(&argv);
    assert_eq!(args.log.as_deref(), Some(std::path::Path::new("relay.log")));
    assert_eq!(args.config.as_deref(), Some(std::path::Path::new("relay.toml")));
}

#[test]
fn ask_collects_prompt_words_and_files() {
    let argv = [
        "chatbot-relay",
        "ask",
        "--file",
        "a.png",
        "-f",
        "b.txt",
        "--no-stream",
        "what",
        "is",
        "this",
    ];
    let args = parse_args(&argv);
    match args.command {
        Commands::Ask(ask) => {
            assert_eq!(ask.prompt.join(" "), "what is this");
            assert_eq!(ask.files.len(), 2);
            assert!(ask.no_stream);
            assert_eq!(ask.endpoint, DEFAULT_ENDPOINT);
        }
        other => panic!("expected ask, got {other:?}"),
    }
}

#[test]
fn ask_requires_a_prompt() {
    assert!(Args::try_parse_from(["chatbot-relay", "ask"]).is_err());
}

#[tokio::test]
async fn ask_streams_tokens_and_records_the_reply() {
    let endpoint = spawn_mock_relay().await;
    let args = ask_args(endpoint, "hello there");

    let mut out = Vec::new();
    let outcome = ask(&args, &mut out).await.expect("ask");
    let rendered = outcome.reply.expect("reply");

    assert_eq!(String::from_utf8(out).unwrap(), rendered.source());
    assert_eq!(outcome.history.len(), 2);
    assert_eq!(outcome.history.messages()[0].content.text(), "hello there");
    assert_eq!(outcome.history.messages()[1].role, Role::Assistant);
}

#[tokio::test]
async fn ask_html_mode_prints_nothing_while_streaming() {
    let endpoint = spawn_mock_relay().await;
    let mut args = ask_args(endpoint, "hi");
    args.html = true;
    args.no_stream = true;

    let mut out = Vec::new();
    let outcome = ask(&args, &mut out).await.expect("ask");
    assert!(out.is_empty());
    let rendered = outcome.reply.expect("reply");
    assert!(rendered.html().starts_with("<p>"));
}

#[tokio::test]
async fn ask_uploads_files_and_notes_them_in_the_history() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let file_path = temp_dir.path().join("notes.txt");
    fs::write(&file_path, "remember the milk").unwrap();

    let endpoint = spawn_mock_relay().await;
    let mut args = ask_args(endpoint, "read this");
    args.files = vec![file_path];

    let mut out = Vec::new();
    let outcome = ask(&args, &mut out).await.expect("ask");

    assert_eq!(
        outcome.history.messages()[0].content.text(),
        "read this\n\n📎 Attached files: notes.txt"
    );
    let rendered = outcome.reply.expect("reply");
    assert!(rendered.source().starts_with("I received your files: notes.txt"));
}

#[tokio::test]
async fn ask_rejects_a_sixth_file_before_sending() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let files: Vec<_> = (0..6)
        .map(|i| {
            let path = temp_dir.path().join(format!("f{i}.txt"));
            fs::write(&path, "x").unwrap();
            path
        })
        .collect();

    let mut args = ask_args("http://127.0.0.1:9/api/chat".to_string(), "too many");
    args.files = files;

    let err = ask(&args, &mut Vec::new()).await.err().expect("should fail");
    assert_eq!(err.to_string(), "Maximum 5 files allowed");
}

#[tokio::test]
async fn ask_reports_relay_errors() {
    let server = wiremock::MockServer::start().await;
    wiremock::Mock::given(wiremock::matchers::method("POST"))
        .respond_with(wiremock::ResponseTemplate::new(429).set_body_json(serde_json::json!({
            "error": { "message": "Rate limit reached", "code": "API_ERROR" }
        })))
        .mount(&server)
        .await;

    let args = ask_args(format!("{}/api/chat", server.uri()), "hi");
    let err = ask(&args, &mut Vec::new()).await.err().expect("should fail");
    let rejected = err.downcast_ref::<RelayRejected>().expect("relay rejection");
    assert_eq!(rejected.status, 429);
    assert_eq!(err.to_string(), "Rate limit reached (API_ERROR, HTTP 429)");
}

#[tokio::test]
async fn ask_keeps_partial_reply_when_stream_fails() {
    let server = wiremock::MockServer::start().await;
    let body = "data: {\"content\":\"par\",\"done\":false}\n\n\
                data: {\"error\":\"Stream processing failed\",\"done\":true}\n\n";
    wiremock::Mock::given(wiremock::matchers::method("POST"))
        .respond_with(
            wiremock::ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"),
        )
        .mount(&server)
        .await;

    let args = ask_args(format!("{}/api/chat", server.uri()), "hi");
    let mut out = Vec::new();
    let outcome = ask(&args, &mut out).await.expect("ask");

    assert_eq!(out, b"par");
    assert_eq!(
        outcome.reply.unwrap_err().to_string(),
        "Stream processing failed"
    );
    assert_eq!(outcome.history.messages()[1].content.text(), "par");
}
