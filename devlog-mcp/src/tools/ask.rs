use anyhow::{anyhow, Result};
use devlog_core::LogQueryService;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

/// Forward a free-form question to the analysis backend.
pub async fn ask_question(service: &LogQueryService, params: Value, cancel: &CancellationToken) -> Result<String> {
    let question = params
        .get("question")
        .and_then(Value::as_str)
        .filter(|q| !q.trim().is_empty())
        .ok_or_else(|| anyhow!("question is required"))?;
    let context = params.get("context").and_then(Value::as_str);
    let model = params.get("model").and_then(Value::as_str);

    service
        .ask(question, context, model, cancel)
        .await
        .map_err(|e| anyhow!("AI request failed ({}): {}", e.kind(), e))
}
