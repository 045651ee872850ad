use async_trait::async_trait;
use futures_util::StreamExt;
use tracing::warn;

use super::{ByteStream, Upstream, UpstreamRequest};
use crate::api::CompletionResponse;
use crate::core::error::{upstream_error_message, RelayError};

/// Chat-completions provider reached over HTTP with a bearer token.
#[derive(Clone)]
pub struct OpenAiUpstream {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl OpenAiUpstream {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    async fn send(&self, request: &UpstreamRequest) -> Result<reqwest::Response, RelayError> {
        let response = self
            .client
            .post(self.completions_url())
            .header("Content-Type", "application/json")
            .bearer_auth(&self.api_key)
            .json(&request.body)
            .send()
            .await
            .map_err(|e| RelayError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            let message = upstream_error_message(&error_text);
            warn!(status = status.as_u16(), %message, "provider rejected request");
            return Err(RelayError::Upstream {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response)
    }
}

#[async_trait]
impl Upstream for OpenAiUpstream {
    async fn complete(&self, request: &UpstreamRequest) -> Result<String, RelayError> {
        let response = self.send(request).await?;
        let body = response
            .json::<CompletionResponse>()
            .await
            .map_err(|e| RelayError::MalformedUpstream(e.to_string()))?;

        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                RelayError::MalformedUpstream("missing choices[0].message.content".to_string())
            })
    }

    async fn stream(&self, request: &UpstreamRequest) -> Result<ByteStream, RelayError> {
        let response = self.send(request).await?;
        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| RelayError::Transport(e.to_string())))
            .boxed())
    }
}
