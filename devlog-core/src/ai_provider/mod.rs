use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[cfg(feature = "ai-providers")]
pub mod ollama;
pub mod prompts;

#[cfg(feature = "ai-providers")]
pub use ollama::OllamaClient;
pub use prompts::PromptBuilder;

/// Classified failure of one generation call. None of these are retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AnalysisError {
    #[error("request body could not be encoded: {0}")]
    EncodeFailure(String),
    #[error("{}", transport_message(.message, .timed_out))]
    TransportFailure { message: String, timed_out: bool },
    #[error("AI service returned HTTP {status}: {body}")]
    UpstreamError { status: u16, body: String },
    #[error("response could not be decoded: {0}")]
    DecodeFailure(String),
}

fn transport_message(message: &str, timed_out: &bool) -> String {
    if *timed_out {
        format!("request timed out: {}", message)
    } else {
        format!("transport failure: {}", message)
    }
}

impl AnalysisError {
    pub fn kind(&self) -> &'static str {
        match self {
            AnalysisError::EncodeFailure(_) => "EncodeFailure",
            AnalysisError::TransportFailure { .. } => "TransportFailure",
            AnalysisError::UpstreamError { .. } => "UpstreamError",
            AnalysisError::DecodeFailure(_) => "DecodeFailure",
        }
    }

    pub fn cancelled() -> Self {
        AnalysisError::TransportFailure {
            message: "request cancelled".to_string(),
            timed_out: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisRequest {
    pub model: String,
    pub prompt: String,
}

impl AnalysisRequest {
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
        }
    }
}

/// A generative-text backend. Implementations must be shareable across
/// concurrent queries.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(
        &self,
        request: &AnalysisRequest,
        cancel: &CancellationToken,
    ) -> Result<String, AnalysisError>;

    fn provider_name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_failure_messages() {
        let timeout = AnalysisError::TransportFailure {
            message: "operation timed out".into(),
            timed_out: true,
        };
        assert_eq!(timeout.to_string(), "request timed out: operation timed out");
        assert_eq!(AnalysisError::cancelled().to_string(), "transport failure: request cancelled");
        assert_eq!(timeout.kind(), "TransportFailure");
    }

    #[test]
    fn test_upstream_error_surfaces_body() {
        let err = AnalysisError::UpstreamError {
            status: 404,
            body: r#"{"error":"model 'x' not found"}"#.into(),
        };
        assert!(err.to_string().contains("model 'x' not found"));
        assert!(err.to_string().contains("404"));
    }
}
