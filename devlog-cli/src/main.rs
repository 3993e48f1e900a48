// Devlog CLI - MCP server and terminal front end for device log analysis

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use devlog_core::{Config, LogQueryService, RawQuery};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "devlog=info,devlog_core=info,devlog_mcp=info";

#[derive(Clone, Copy, ValueEnum, Debug, PartialEq, Eq)]
enum McpTransport {
    Stdio,
    Sse,
}

#[derive(Parser, Debug)]
#[command(name = "devlog")]
#[command(about = "Query device logs and analyse them with a local AI model", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file (otherwise ./.devlog.toml, then ~/.config/devlog/config.toml)
    #[arg(long, global = true, env = "DEVLOG_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Commands {
    /// Start the MCP server (default when no command is given)
    Serve {
        /// Transport mode
        #[arg(long, value_enum, default_value = "stdio")]
        transport: McpTransport,

        /// Address the SSE transport binds to
        #[arg(long, default_value = "0.0.0.0")]
        host: IpAddr,

        /// Port for the SSE transport
        #[arg(long, default_value = "8080")]
        port: u16,
    },

    /// Run one query and print the report
    Query {
        #[arg(long)]
        environment: String,

        /// Log source name or alias
        #[arg(long)]
        log_type: String,

        #[arg(long)]
        device_id: String,

        #[arg(long)]
        keyword: Option<String>,

        /// Number of most recent matching lines to keep
        #[arg(long)]
        lines: Option<String>,

        /// 'YYYY-MM-DD HH:MM:SS[.mmm]'
        #[arg(long)]
        start_time: Option<String>,

        /// 'YYYY-MM-DD HH:MM:SS[.mmm]'
        #[arg(long)]
        end_time: Option<String>,

        #[arg(long)]
        model: Option<String>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// List configured environments and log sources
    Sources,
}

impl Commands {
    fn into_query(self) -> Option<(RawQuery, bool)> {
        match self {
            Commands::Query {
                environment,
                log_type,
                device_id,
                keyword,
                lines,
                start_time,
                end_time,
                model,
                json,
            } => Some((
                RawQuery {
                    environment: Some(environment),
                    log_type: Some(log_type),
                    device_id: Some(device_id),
                    keyword,
                    lines,
                    start_time,
                    end_time,
                    model,
                },
                json,
            )),
            _ => None,
        }
    }
}

fn init_logging() {
    // stdout is reserved for MCP JSON-RPC and reports.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    match path {
        Some(path) => {
            let mut config = Config::load_from_path(path)?;
            config.apply_overrides(|key| std::env::var(key).ok());
            Ok(config)
        }
        None => Config::load(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging();

    let config = load_config(cli.config.as_ref()).context("Failed to load configuration")?;
    let service = LogQueryService::from_config(&config).context("Failed to initialise query service")?;

    let command = cli.command.unwrap_or(Commands::Serve {
        transport: McpTransport::Stdio,
        host: IpAddr::from([0, 0, 0, 0]),
        port: devlog_mcp::transport::DEFAULT_SSE_PORT,
    });

    match command {
        Commands::Serve { transport, host, port } => {
            if let Err(e) = start_mcp_server(service, transport, SocketAddr::new(host, port)).await {
                error!("Failed to start MCP server: {}", e);
                eprintln!("❌ Failed to start MCP server: {}", e);
                std::process::exit(1);
            }
        }
        Commands::Sources => print_sources(&service)?,
        query => {
            if let Some((raw, json)) = query.into_query() {
                run_query(&service, raw, json).await?;
            }
        }
    }

    Ok(())
}

async fn start_mcp_server(service: LogQueryService, transport: McpTransport, addr: SocketAddr) -> Result<()> {
    use devlog_mcp::{create_server, Config as McpConfig};

    let server = create_server(service, McpConfig::default());
    info!("Starting MCP server with {:?} transport", transport);

    match transport {
        McpTransport::Stdio => server.start_stdio().await,
        McpTransport::Sse => server.start_sse(addr).await,
    }
}

async fn run_query(service: &LogQueryService, raw: RawQuery, json: bool) -> Result<()> {
    let cancel = CancellationToken::new();
    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c_cancel.cancel();
        }
    });

    match service.execute(&raw, &cancel).await {
        Ok(report) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{}", report.render());
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("{}", e.user_message());
            std::process::exit(1);
        }
    }
}

fn print_sources(service: &LogQueryService) -> Result<()> {
    let directory = service.directory();

    println!("Environments:");
    for env in directory.environments() {
        println!(
            "  {:<10} {} ({}@{}:{})",
            env.name, env.display_name, env.user, env.host, env.port
        );
    }

    println!("\nLog sources (root: {}):", directory.resolver().root().display());
    for source in directory.log_sources() {
        let aliases = if source.aliases.is_empty() {
            String::new()
        } else {
            format!(" [aliases: {}]", source.aliases.join(", "))
        };
        println!("  {:<10} {}{}", source.name, source.description, aliases);
        println!("             {}", source.path_template);
    }

    println!("\nAI backend: {} (default model {})", service.provider_name(), service.default_model());
    Ok(())
}
