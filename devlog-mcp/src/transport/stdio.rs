use rmcp::{service::serve_server, transport::io::stdio};

use crate::server::DevlogMcpHandler;

/// Runs one session over stdin/stdout. Nothing else may write to stdout while
/// it is open.
pub async fn run(handler: DevlogMcpHandler) -> anyhow::Result<()> {
    let service = serve_server(handler, stdio()).await?;
    tracing::info!("stdio session open");

    let reason = service.waiting().await?;
    tracing::info!(?reason, "stdio session closed");
    Ok(())
}
