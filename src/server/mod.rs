//! HTTP surface: `POST /api/chat` and `GET /health`.

mod routes;


use std::future::Future;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::core::attachments::{MAX_ATTACHMENTS, MAX_ATTACHMENT_BYTES};
use crate::core::config::RelaySettings;
use crate::core::relay::{MockUpstream, OpenAiUpstream, Relay};

/// Room for a full attachment tray plus the JSON-encoded history.
pub const BODY_LIMIT: usize = (MAX_ATTACHMENTS + 1) * MAX_ATTACHMENT_BYTES;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerMode {
    Live,
    Mock,
}

/// Shared, read-only state handed to every request.
#[derive(Clone)]
pub struct AppState {
    relay: Relay,
    mode: ServerMode,
}

impl AppState {
    pub fn new(relay: Relay, mode: ServerMode) -> Self {
        Self { relay, mode }
    }

    /// Build the relay described by `settings`, or the canned one for `Mock`.
    pub fn from_settings(
        settings: &RelaySettings,
        mode: ServerMode,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let relay = match mode {
            ServerMode::Mock => Relay::new(
                Arc::new(MockUpstream::default()),
                settings.generation.clone(),
            ),
            ServerMode::Live => {
                let api_key = settings.api_key.clone().unwrap_or_else(|| {
                    warn!("OPENAI_API_KEY is not set; provider requests will be rejected");
                    String::new()
                });
                let client = reqwest::Client::builder()
                    .user_agent(concat!("chatbot-relay/", env!("CARGO_PKG_VERSION")))
                    .build()?;
                let upstream = OpenAiUpstream::new(client, settings.base_url.clone(), api_key);
                Relay::new(Arc::new(upstream), settings.generation.clone())
            }
        };
        Ok(Self::new(relay, mode))
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/chat", axum::routing::post(routes::chat))
        .route("/health", axum::routing::get(routes::health))
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until `shutdown` resolves; in-flight streams are allowed to finish.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, mode = ?state.mode, model = %state.relay.generation().model, "chat relay listening");
    }
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}
