use anyhow::{anyhow, Result};
use devlog_core::{LogQueryService, RawQuery};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

/// Filter a device's log lines and analyse them. Returns the rendered report;
/// degraded analyses still succeed.
pub async fn query_device_logs(service: &LogQueryService, params: Value, cancel: &CancellationToken) -> Result<String> {
    let raw: RawQuery = serde_json::from_value(params).map_err(|e| anyhow!("Invalid arguments: {}", e))?;

    let report = service
        .execute(&raw, cancel)
        .await
        .map_err(|e| anyhow!(e.user_message()))?;

    Ok(report.render())
}
