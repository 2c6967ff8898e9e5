//! Quiver host process.
//!
//! Exit codes: 0 on normal shutdown; 1 for configuration errors; 2 for
//! fatal startup failures (the metadata session must open). Data-session
//! failure is not fatal: the server starts in offline mode and
//! `reconnect_db` can bring it back.

use clap::Parser;
use tracing_subscriber::EnvFilter;

use quiver_core::{QuiverConfig, Transport};
use quiver_mcp::{McpServer, ServerState};

#[derive(Parser, Debug)]
#[command(name = "quiver", version, about = "Database-backed dynamic MCP server")]
struct Cli {
    /// Transport: stdio or sse.
    #[arg(long, default_value = "stdio")]
    transport: String,

    /// Bind host (sse transport only).
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Bind port (sse transport only).
    #[arg(long, default_value_t = 8000)]
    port: u16,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Directory for log files; stderr only when unset.
    #[arg(long)]
    logs_dir: Option<String>,

    /// Metadata database URL (required). Holds the registry, artifact
    /// store, execution log, and notebook.
    #[arg(long, env = "QUIVER_META_DB_URL")]
    meta_db_url: String,

    /// Data database URL (optional). SQL tools run against it; absence
    /// starts the server in offline mode.
    #[arg(long, env = "QUIVER_DATA_DB_URL")]
    data_db_url: Option<String>,

    /// Enable the dashboard meta-tool.
    #[arg(long, default_value_t = false)]
    dashboard: bool,

    /// Storage directory for dashboard bodies.
    #[arg(long, default_value = "ui_apps")]
    dashboard_dir: String,
}

fn build_config(cli: &Cli) -> Result<QuiverConfig, String> {
    let mut config = QuiverConfig::default();
    config.server.transport = match cli.transport.as_str() {
        "stdio" => Transport::Stdio,
        "sse" => Transport::Sse,
        other => return Err(format!("unknown transport '{}', expected stdio or sse", other)),
    };
    config.server.host = cli.host.clone();
    config.server.port = cli.port;
    config.server.log_level = cli.log_level.clone();
    config.server.logs_dir = cli.logs_dir.clone();
    config.databases.metadata_url = cli.meta_db_url.clone();
    config.databases.data_url = cli.data_db_url.clone();
    config.dashboard.enabled = cli.dashboard;
    config.dashboard.storage_dir = cli.dashboard_dir.clone();
    config.validate().map_err(|e| e.to_string())?;
    Ok(config)
}

fn init_tracing(level: &str, logs_dir: Option<&str>) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    if let Some(dir) = logs_dir {
        let path = std::path::Path::new(dir).join("quiver.log");
        let _ = std::fs::create_dir_all(dir);
        match std::fs::OpenOptions::new().create(true).append(true).open(&path) {
            Ok(file) => {
                tracing_subscriber::fmt()
                    .with_env_filter(filter)
                    .with_writer(std::sync::Mutex::new(file))
                    .with_ansi(false)
                    .init();
                return;
            }
            Err(e) => {
                eprintln!(
                    "warning: cannot open log file {}: {}; logging to stderr",
                    path.display(),
                    e
                );
            }
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match build_config(&cli) {
        Ok(config) => config,
        Err(message) => {
            eprintln!("configuration error: {}", message);
            std::process::exit(1);
        }
    };

    init_tracing(&config.server.log_level, config.server.logs_dir.as_deref());

    let state = match ServerState::open(config.clone()).await {
        Ok(state) => state,
        Err(e) => {
            tracing::error!(error = %e, "fatal startup failure");
            eprintln!("startup failed: {}", e);
            std::process::exit(2);
        }
    };

    let server = McpServer::new(state.clone());
    let outcome = match config.server.transport {
        Transport::Stdio => server.run_stdio().await,
        Transport::Sse => {
            quiver_mcp::transport::serve(server, &config.server.host, config.server.port).await
        }
    };

    state.shutdown().await;

    if let Err(e) = outcome {
        tracing::error!(error = %e, "transport terminated with an error");
        std::process::exit(2);
    }
}
