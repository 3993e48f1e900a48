use devlog_core::LogQueryService;
use rmcp::{
    model::{
        CallToolRequestParam, CallToolResult, Content, Implementation, ListToolsResult,
        PaginatedRequestParam, ServerCapabilities, ServerInfo, Tool,
    },
    service::{RequestContext, RoleServer},
    ServerHandler,
};
use serde_json::{Map, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::schema::{self, ASK_QUESTION, LIST_ENVIRONMENTS, LIST_LOG_SOURCES, QUERY_DEVICE_LOGS};
use crate::tools::{ask_question, list_environments, list_log_sources, query_device_logs};
use crate::transport::{self, TransportType};
use crate::Config;

/// Main MCP server structure
#[derive(Clone)]
pub struct McpServer {
    pub service: LogQueryService,
    pub config: Config,
}

impl McpServer {
    pub fn new(service: LogQueryService, config: Config) -> Self {
        Self { service, config }
    }

    pub fn service(&self) -> &LogQueryService {
        &self.service
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

/// MCP Server Handler implementing the RMCP ServerHandler trait
#[derive(Clone)]
pub struct DevlogMcpHandler {
    pub server: Arc<McpServer>,
}

impl DevlogMcpHandler {
    pub fn new(server: Arc<McpServer>) -> Self {
        Self { server }
    }

    /// The tools advertised to clients.
    pub fn tools() -> Vec<Tool> {
        vec![
            Tool {
                name: QUERY_DEVICE_LOGS.into(),
                description: Some(
                    "Query a device's log lines by device ID, keyword and time range, then analyse them with AI".into(),
                ),
                input_schema: Arc::new(schema::query_device_logs_schema()),
                annotations: Default::default(),
            },
            Tool {
                name: LIST_ENVIRONMENTS.into(),
                description: Some("List the configured environments".into()),
                input_schema: Arc::new(schema::list_environments_schema()),
                annotations: Default::default(),
            },
            Tool {
                name: LIST_LOG_SOURCES.into(),
                description: Some("List the configured log sources and their aliases".into()),
                input_schema: Arc::new(schema::list_log_sources_schema()),
                annotations: Default::default(),
            },
            Tool {
                name: ASK_QUESTION.into(),
                description: Some("Ask the AI model a general question, with optional context".into()),
                input_schema: Arc::new(schema::ask_question_schema()),
                annotations: Default::default(),
            },
        ]
    }

    /// Runs one tool call. Tool failures come back as error results; protocol
    /// misuse (unknown tool, wrongly typed arguments) as `rmcp::Error`.
    pub async fn dispatch(
        &self,
        tool_name: &str,
        arguments: Map<String, Value>,
        cancel: &CancellationToken,
    ) -> Result<CallToolResult, rmcp::Error> {
        let arguments_value = Value::Object(arguments);

        if schema::known_arguments(tool_name).is_none() {
            return Err(rmcp::Error::invalid_request(format!("Unknown tool: {}", tool_name), None));
        }
        if let Err(e) = crate::validation::validate_tool_params(tool_name, &arguments_value) {
            return Err(rmcp::Error::invalid_params(format!("Validation error: {}", e), None));
        }

        tracing::debug!("Calling tool {}", tool_name);
        let service = self.server.service();
        let result = match tool_name {
            QUERY_DEVICE_LOGS => query_device_logs(service, arguments_value, cancel).await,
            ASK_QUESTION => ask_question(service, arguments_value, cancel).await,
            LIST_ENVIRONMENTS => list_environments(service).await.and_then(pretty),
            LIST_LOG_SOURCES => list_log_sources(service, arguments_value).await.and_then(pretty),
            _ => {
                return Err(rmcp::Error::invalid_request(format!("Unknown tool: {}", tool_name), None));
            }
        };

        match result {
            Ok(text) => Ok(CallToolResult {
                content: vec![Content::text(text)],
                is_error: None,
            }),
            Err(e) => {
                tracing::warn!("Tool {} failed: {}", tool_name, e);
                Ok(CallToolResult {
                    content: vec![Content::text(e.to_string())],
                    is_error: Some(true),
                })
            }
        }
    }
}

fn pretty(value: Value) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(&value)?)
}

impl ServerHandler for DevlogMcpHandler {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Device log query and analysis. Filter an environment's log file by device ID, keyword and time range; \
                 the matching lines are analysed by an AI model. Use list_environments and list_log_sources to discover targets."
                    .into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: self.server.config.server_name.clone(),
                version: self.server.config.server_version.clone(),
            },
            ..Default::default()
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, rmcp::Error> {
        Ok(ListToolsResult {
            tools: Self::tools(),
            next_cursor: None,
        })
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, rmcp::Error> {
        let arguments = request.arguments.unwrap_or_default();
        self.dispatch(&request.name, arguments, &context.ct).await
    }
}

impl McpServer {
    /// Create a handler for this server
    pub fn create_handler(&self) -> DevlogMcpHandler {
        DevlogMcpHandler::new(Arc::new(self.clone()))
    }

    /// Start the MCP server with stdio transport. Logs go to stderr; stdout
    /// carries JSON-RPC only.
    pub async fn start_stdio(&self) -> anyhow::Result<()> {
        self.serve(TransportType::Stdio, CancellationToken::new()).await
    }

    /// Start the MCP server with SSE transport; Ctrl+C stops it.
    pub async fn start_sse(&self, addr: SocketAddr) -> anyhow::Result<()> {
        let shutdown = CancellationToken::new();
        let on_ctrl_c = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                on_ctrl_c.cancel();
            }
        });
        self.serve(TransportType::Sse { addr }, shutdown).await
    }

    pub async fn serve(&self, kind: TransportType, shutdown: CancellationToken) -> anyhow::Result<()> {
        tracing::info!(
            server = %self.config.server_name,
            version = %self.config.server_version,
            tools = ?[QUERY_DEVICE_LOGS, LIST_ENVIRONMENTS, LIST_LOG_SOURCES, ASK_QUESTION],
            "starting MCP server"
        );
        transport::serve(kind, self.create_handler(), shutdown).await
    }
}
