use rmcp::transport::sse_server::SseServer;
use std::net::SocketAddr;
use tokio_util::sync::CancellationToken;

use crate::server::DevlogMcpHandler;

/// Accepts SSE sessions on `addr`, each with its own handler clone, until
/// `shutdown` is cancelled. Open sessions are cancelled with it.
pub async fn run(handler: DevlogMcpHandler, addr: SocketAddr, shutdown: CancellationToken) -> anyhow::Result<()> {
    let server = SseServer::serve(addr).await?;
    tracing::info!(%addr, "SSE endpoint /sse, messages /message");

    let sessions = server.with_service_directly(move || handler.clone());

    shutdown.cancelled().await;
    tracing::info!(%addr, "stopping SSE server");
    sessions.cancel();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{create_server, Config};
    use devlog_core::{Config as CoreConfig, LogQueryService};
    use std::time::Duration;
    use tokio::net::TcpStream;

    fn free_local_addr() -> SocketAddr {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    }

    #[tokio::test]
    async fn test_accepts_connections_until_shutdown() {
        let service = LogQueryService::from_config(&CoreConfig::default()).unwrap();
        let handler = create_server(service, Config::default()).create_handler();
        let addr = free_local_addr();
        let shutdown = CancellationToken::new();

        let server = tokio::spawn(run(handler, addr, shutdown.clone()));

        let mut connected = false;
        for _ in 0..50 {
            if TcpStream::connect(addr).await.is_ok() {
                connected = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(connected, "SSE server never accepted on {}", addr);

        shutdown.cancel();
        let result = tokio::time::timeout(Duration::from_secs(5), server).await.unwrap().unwrap();
        assert!(result.is_ok());
    }
}
