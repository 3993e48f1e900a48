use devlog_core::LogQueryService;

pub mod schema;
pub mod server;
pub mod tools;
pub mod transport;
pub mod validation;

/// Configuration for MCP server
#[derive(Debug, Clone)]
pub struct Config {
    pub server_name: String,
    pub server_version: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_name: "devlog-mcp".to_string(),
            server_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Factory function to create MCP server
pub fn create_server(service: LogQueryService, config: Config) -> McpServer {
    McpServer::new(service, config)
}

pub use server::{DevlogMcpHandler, McpServer};
pub use transport::TransportType;
