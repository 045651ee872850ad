//! `ask`: a terminal client for a running relay

use std::error::Error;
use std::fmt;
use std::io::{self, Write};
use std::path::PathBuf;

use chrono::Utc;
use futures_util::StreamExt;
use reqwest::multipart::{Form, Part};
use serde_json::json;

use crate::api::{ErrorBody, RelayRecord};
use crate::core::attachments::{AttachedFile, AttachmentSet};
use crate::core::message::{ChatMessage, ConversationHistory};
use crate::core::reply::{ReplyFailed, ReplyStream};
use crate::ui::markdown::RenderedMessage;
use crate::ui::widget::{save_transcript, SEND_FAILED_NOTICE};

pub const DEFAULT_ENDPOINT: &str = "http://localhost:3000/api/chat";

#[derive(clap::Args, Debug, Clone)]
pub struct AskArgs {
    /// Message to send
    #[arg(required = true)]
    pub prompt: Vec<String>,

    /// Chat endpoint of the relay
    #[arg(short = 'e', long, default_value = DEFAULT_ENDPOINT)]
    pub endpoint: String,

    /// Attach a file (repeatable, at most 5)
    #[arg(short = 'f', long = "file", value_name = "PATH")]
    pub files: Vec<PathBuf>,

    /// Ask for the whole reply at once instead of a stream
    #[arg(long)]
    pub no_stream: bool,

    /// Print the rendered HTML of the reply instead of echoing tokens
    #[arg(long)]
    pub html: bool,

    /// Save the conversation as chat-YYYY-MM-DD.txt in this directory
    #[arg(long, value_name = "DIR")]
    pub save_transcript: Option<PathBuf>,
}

/// The relay answered with an error body instead of a reply.
#[derive(Debug, Clone)]
pub struct RelayRejected {
    pub status: u16,
    pub body: Option<ErrorBody>,
}

impl fmt::Display for RelayRejected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.body {
            Some(body) => write!(
                f,
                "{} ({}, HTTP {})",
                body.error.message, body.error.code, self.status
            ),
            None => write!(f, "relay answered HTTP {}", self.status),
        }
    }
}

impl Error for RelayRejected {}

pub struct AskOutcome {
    pub history: ConversationHistory,
    pub reply: Result<RenderedMessage, ReplyFailed>,
}

pub async fn run_ask(args: AskArgs) -> Result<(), Box<dyn Error>> {
    let mut stdout = io::stdout();
    let outcome = match ask(&args, &mut stdout).await {
        Ok(outcome) => outcome,
        Err(err) => {
            eprintln!("❌ Error: {err}");
            std::process::exit(1);
        }
    };

    if let Some(dir) = &args.save_transcript {
        let path = save_transcript(&outcome.history, dir, Utc::now().date_naive())?;
        eprintln!("Transcript saved to {}", path.display());
    }

    match outcome.reply {
        Ok(rendered) => {
            if args.html {
                println!("{}", rendered.html());
            } else {
                println!();
            }
            Ok(())
        }
        Err(err) => {
            eprintln!("\n\n❌ Error: {err}");
            std::process::exit(1);
        }
    }
}

/// Send the prompt and consume the reply, echoing tokens to `out` unless
/// HTML output was requested.
pub async fn ask<W: Write>(args: &AskArgs, out: &mut W) -> Result<AskOutcome, Box<dyn Error>> {
    let prompt = args.prompt.join(" ");
    let prompt = prompt.trim();

    let mut attachments = AttachmentSet::default();
    for path in &args.files {
        attachments.try_add(AttachedFile::load(path).await?)?;
    }
    if prompt.is_empty() && attachments.is_empty() {
        return Err("nothing to send".into());
    }

    let mut history = ConversationHistory::new();
    history.push(ChatMessage::user(attachments.annotate(prompt)));

    let stream = !args.no_stream;
    let client = reqwest::Client::new();
    let request = if attachments.is_empty() {
        client
            .post(&args.endpoint)
            .json(&json!({ "messages": &history, "stream": stream }))
    } else {
        client
            .post(&args.endpoint)
            .multipart(build_form(&history, stream, attachments.take())?)
    };

    let response = request.send().await.map_err(|err| {
        tracing::debug!(error = %err, "request to relay failed");
        SEND_FAILED_NOTICE
    })?;

    let status = response.status();
    if !status.is_success() {
        let body = response.json::<ErrorBody>().await.ok();
        return Err(Box::new(RelayRejected {
            status: status.as_u16(),
            body,
        }));
    }

    let is_event_stream = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("text/event-stream"));

    let mut reply = ReplyStream::new();
    if is_event_stream {
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            for fragment in reply.feed(&chunk?) {
                echo(out, args.html, &fragment)?;
            }
            if reply.is_finished() {
                break;
            }
        }
    } else {
        let record = response.json::<RelayRecord>().await?;
        if let Some(fragment) = reply.apply(record) {
            echo(out, args.html, &fragment)?;
        }
    }

    let reply = reply.finish(&mut history);
    Ok(AskOutcome { history, reply })
}

fn echo<W: Write>(out: &mut W, html: bool, fragment: &str) -> io::Result<()> {
    if html {
        return Ok(());
    }
    write!(out, "{fragment}")?;
    out.flush()
}

fn build_form(
    history: &ConversationHistory,
    stream: bool,
    files: Vec<AttachedFile>,
) -> Result<Form, Box<dyn Error>> {
    let mut form = Form::new()
        .text("messages", serde_json::to_string(history)?)
        .text("stream", stream.to_string());
    for (index, file) in files.into_iter().enumerate() {
        let part = Part::bytes(file.bytes.to_vec())
            .file_name(file.name)
            .mime_str(&file.mime_type)?;
        form = form.part(format!("file_{index}"), part);
    }
    Ok(form)
}
