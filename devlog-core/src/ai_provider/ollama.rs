use crate::ai_provider::{AnalysisError, AnalysisRequest, TextGenerator};
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GenerateResponse {
    pub model: String,
    pub created_at: String,
    pub response: String,
    pub done: bool,
    #[serde(default)]
    pub done_reason: Option<String>,
}

/// Client for the Ollama `/api/generate` endpoint. Cloning shares the
/// underlying connection pool.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl OllamaClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, AnalysisError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AnalysisError::TransportFailure {
                message: format!("failed to create HTTP client: {}", e),
                timed_out: false,
            })?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn endpoint(&self) -> String {
        format!("{}/api/generate", self.base_url.trim_end_matches('/'))
    }

    /// One non-streaming generate call. The configured timeout covers the
    /// whole exchange, body included.
    pub async fn generate_raw(&self, model: &str, prompt: &str) -> Result<GenerateResponse, AnalysisError> {
        let body = serde_json::to_vec(&GenerateRequest {
            model,
            prompt,
            stream: false,
        })
        .map_err(|e| AnalysisError::EncodeFailure(e.to_string()))?;

        let response = self
            .client
            .post(self.endpoint())
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|e| format!("<response body unavailable: {}>", e));
            return Err(AnalysisError::UpstreamError {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await.map_err(transport_error)?;
        serde_json::from_slice(&bytes).map_err(|e| AnalysisError::DecodeFailure(e.to_string()))
    }
}

fn transport_error(e: reqwest::Error) -> AnalysisError {
    AnalysisError::TransportFailure {
        timed_out: e.is_timeout(),
        message: e.to_string(),
    }
}

#[async_trait::async_trait]
impl TextGenerator for OllamaClient {
    async fn generate(
        &self,
        request: &AnalysisRequest,
        cancel: &CancellationToken,
    ) -> Result<String, AnalysisError> {
        debug!(
            model = %request.model,
            prompt_chars = request.prompt.chars().count(),
            "Sending generate request to {}",
            self.endpoint()
        );
        let started = Instant::now();

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(AnalysisError::cancelled()),
            response = self.generate_raw(&request.model, &request.prompt) => response.map(|r| r.response),
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(text) => info!(model = %request.model, elapsed_ms, response_chars = text.chars().count(), "analysis completed"),
            Err(e) => warn!(model = %request.model, elapsed_ms, kind = e.kind(), "analysis failed: {}", e),
        }
        result
    }

    fn provider_name(&self) -> &str {
        "ollama"
    }
}
