//! Transports the query handler can be served over.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use tokio_util::sync::CancellationToken;

use crate::server::DevlogMcpHandler;

pub mod sse;
pub mod stdio;

pub const DEFAULT_SSE_PORT: u16 = 8080;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TransportType {
    /// JSON-RPC over stdin/stdout, one client per process.
    #[default]
    Stdio,
    /// Server-sent events at `/sse`, client messages posted to `/message`.
    Sse { addr: SocketAddr },
}

impl TransportType {
    /// SSE on every interface.
    pub fn sse(port: u16) -> Self {
        Self::sse_on(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port)
    }

    pub fn sse_on(host: IpAddr, port: u16) -> Self {
        TransportType::Sse {
            addr: SocketAddr::new(host, port),
        }
    }
}

impl fmt::Display for TransportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportType::Stdio => write!(f, "stdio"),
            TransportType::Sse { addr } => write!(f, "sse on {}", addr),
        }
    }
}

/// Serves `handler` until the client goes away (stdio) or `shutdown` fires (SSE).
pub async fn serve(
    transport: TransportType,
    handler: DevlogMcpHandler,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    tracing::info!(%transport, "serving device log tools");
    match transport {
        TransportType::Stdio => stdio::run(handler).await,
        TransportType::Sse { addr } => sse::run(handler, addr, shutdown).await,
    }
}
