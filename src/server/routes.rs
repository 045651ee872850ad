use axum::body::Body;
use axum::extract::{FromRequest, Multipart, Request, State};
use axum::http::header::{self, HeaderName};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{SecondsFormat, Utc};
use serde_json::Value;
use tracing::{debug, error, info};

use super::{AppState, ServerMode, BODY_LIMIT};
use crate::api::HealthResponse;
use crate::core::attachments::AttachedFile;
use crate::core::error::RelayError;
use crate::core::message::{ChatMessage, ConversationHistory};
use crate::core::relay::{ChatTurn, RelayStream};

const X_ACCEL_BUFFERING: HeaderName = HeaderName::from_static("x-accel-buffering");
const MESSAGES_REQUIRED: &str = "Messages array is required";

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        match &self {
            RelayError::Transport(detail) => error!(%detail, "chat request failed"),
            RelayError::MalformedUpstream(detail) => error!(%detail, "unreadable provider reply"),
            other => debug!(error = %other, "chat request rejected"),
        }
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.to_body())).into_response()
    }
}

pub(super) async fn chat(State(state): State<AppState>, request: Request) -> Response {
    match handle_chat(&state, request).await {
        Ok(response) => response,
        Err(err) => err.into_response(),
    }
}

async fn handle_chat(state: &AppState, request: Request) -> Result<Response, RelayError> {
    let turn = read_turn(state, request).await?;
    info!(
        messages = turn.history.len(),
        attachments = turn.attachments.len(),
        stream = turn.stream,
        "chat request"
    );

    if turn.stream {
        let stream = state.relay.open_stream(turn).await?;
        Ok(event_stream(stream))
    } else {
        let record = state.relay.complete(turn).await?;
        Ok(Json(record).into_response())
    }
}

fn event_stream(stream: RelayStream) -> Response {
    (
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
            (header::CONNECTION, "keep-alive"),
            (X_ACCEL_BUFFERING, "no"),
        ],
        Body::from_stream(stream.into_body_stream()),
    )
        .into_response()
}

async fn read_turn(state: &AppState, request: Request) -> Result<ChatTurn, RelayError> {
    let is_multipart = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("multipart/form-data"));

    if is_multipart {
        let multipart = Multipart::from_request(request, state)
            .await
            .map_err(|rejection| RelayError::Validation(rejection.body_text()))?;
        read_multipart(multipart).await
    } else {
        let body = axum::body::to_bytes(request.into_body(), BODY_LIMIT)
            .await
            .map_err(|err| RelayError::Validation(format!("Unreadable request body: {err}")))?;
        parse_json_turn(&body)
    }
}

/// JSON body: `{messages: [...], stream?: bool}`, streaming by default.
pub(super) fn parse_json_turn(body: &[u8]) -> Result<ChatTurn, RelayError> {
    let value: Value = if body.iter().all(u8::is_ascii_whitespace) {
        Value::Null
    } else {
        serde_json::from_slice(body)
            .map_err(|err| RelayError::Validation(format!("Invalid JSON body: {err}")))?
    };

    let history = parse_history(value.get("messages"))?;
    let stream = match value.get("stream") {
        None | Some(Value::Null) => true,
        Some(Value::Bool(stream)) => *stream,
        Some(_) => return Err(RelayError::Validation("stream must be a boolean".to_string())),
    };

    Ok(ChatTurn {
        history,
        attachments: Vec::new(),
        stream,
    })
}

fn parse_history(messages: Option<&Value>) -> Result<ConversationHistory, RelayError> {
    let Some(Value::Array(items)) = messages else {
        return Err(RelayError::Validation(MESSAGES_REQUIRED.to_string()));
    };
    let messages: Vec<ChatMessage> = serde_json::from_value(Value::Array(items.clone()))
        .map_err(|err| RelayError::Validation(format!("Invalid messages: {err}")))?;
    Ok(ConversationHistory::from(messages))
}

/// Multipart body: a JSON-encoded `messages` field, an optional `stream`
/// field (`"true"` to stream), and any number of file parts.
async fn read_multipart(mut multipart: Multipart) -> Result<ChatTurn, RelayError> {
    let mut messages = None;
    let mut stream = false;
    let mut attachments = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| RelayError::Validation(err.body_text()))?
    {
        if let Some(file_name) = field.file_name().map(str::to_string) {
            let mime_type = field
                .content_type()
                .map(str::to_string)
                .unwrap_or_else(|| {
                    mime_guess::from_path(&file_name)
                        .first_or_octet_stream()
                        .to_string()
                });
            let bytes = field
                .bytes()
                .await
                .map_err(|err| RelayError::Validation(err.body_text()))?;
            attachments.push(AttachedFile::new(file_name, mime_type, bytes)?);
            continue;
        }

        let name = field.name().unwrap_or_default().to_string();
        let text = field
            .text()
            .await
            .map_err(|err| RelayError::Validation(err.body_text()))?;
        match name.as_str() {
            "messages" => messages = Some(text),
            "stream" => stream = text.trim() == "true",
            other => debug!(field = other, "ignoring form field"),
        }
    }

    let messages = messages.ok_or_else(|| RelayError::Validation(MESSAGES_REQUIRED.to_string()))?;
    let value: Value = serde_json::from_str(&messages)
        .map_err(|err| RelayError::Validation(format!("Invalid messages field: {err}")))?;

    Ok(ChatTurn {
        history: parse_history(Some(&value))?,
        attachments,
        stream,
    })
}

pub(super) async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        mode: (state.mode == ServerMode::Mock).then(|| "mock".to_string()),
    })
}
