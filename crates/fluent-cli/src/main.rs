//! Fluent CLI
//!
//! Serves the adaptive quiz API over HTTP.

use std::net::SocketAddr;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use fluent_quiz::{create_router, AppState, Config, HttpOracle, MockOracle, QuestionOracle};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

/// Fluent - adaptive language quiz server
///
/// Generates vocabulary questions pitched at each learner's level and keeps
/// per-session stats and history in memory.
#[derive(Parser, Debug)]
#[command(name = "fluent")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file (default: fluent.json in current directory)
    #[arg(short, long, value_name = "FILE")]
    config: Option<String>,

    /// Address to bind, overriding the config file
    #[arg(long, value_name = "HOST")]
    host: Option<String>,

    /// Port for the HTTP API server, overriding the config file
    #[arg(short, long)]
    port: Option<u16>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long)]
    verbose: bool,

    /// Serve canned questions instead of calling the oracle endpoint
    #[arg(long)]
    mock_oracle: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if args.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::info!("Fluent starting");
    tracing::debug!(config = ?args.config, "Config file");

    match serve(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(1)
        }
    }
}

/// Loads configuration, builds the oracle and serves until Ctrl+C.
async fn serve(args: Args) -> anyhow::Result<()> {
    let mut config = load_config(args.config.as_deref())?;

    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    config.validate()?;

    let oracle = build_oracle(&config, args.mock_oracle)?;
    print_config(&config, oracle.name());

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .map_err(|e| {
            anyhow::anyhow!(
                "Invalid listen address '{}:{}': {e}\n\nSuggestion: Use an IP address for server.host",
                config.server.host,
                config.server.port
            )
        })?;

    let router = create_router(AppState::new(config, oracle));

    let listener = TcpListener::bind(addr).await.map_err(|e| {
        anyhow::anyhow!(
            "Failed to bind to {addr}: {e}\n\nSuggestion: Try a different port with --port"
        )
    })?;

    println!();
    println!("Fluent quiz API running on http://{addr}");
    println!("Press Ctrl+C to stop");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Received Ctrl+C, shutting down");
            }
        })
        .await?;

    Ok(())
}

/// Loads configuration from the specified path or default location.
fn load_config(config_path: Option<&str>) -> anyhow::Result<Config> {
    match config_path {
        Some(path_str) => {
            let path = Path::new(path_str);
            if !path.exists() {
                anyhow::bail!(
                    "Config file not found: '{}'\n\nSuggestion: Check the path or remove the --config flag to use defaults",
                    path.display()
                );
            }
            Config::load_from_file(path).map_err(|e| anyhow::anyhow!("{e}"))
        }
        None => Config::load().map_err(|e| anyhow::anyhow!("{e}")),
    }
}

/// Builds the question oracle selected by flags and config.
fn build_oracle(config: &Config, mock: bool) -> anyhow::Result<Arc<dyn QuestionOracle>> {
    if mock {
        tracing::warn!("Using canned questions, the oracle endpoint will not be called");
        return Ok(Arc::new(MockOracle::demo()));
    }

    let oracle = HttpOracle::from_config(config.oracle.clone()).map_err(|e| {
        anyhow::anyhow!("{e}\n\nSuggestion: Check oracle.baseUrl or run with --mock-oracle")
    })?;
    Ok(Arc::new(oracle))
}

/// Prints the loaded configuration.
fn print_config(config: &Config, oracle: &str) {
    println!("Configuration loaded:");
    println!("  Listen: {}:{}", config.server.host, config.server.port);
    println!("  Oracle: {oracle} ({} at {})", config.oracle.model, config.oracle.base_url);
    println!("  History cap: {}", config.quiz.history_cap);
    println!("  Recent window: {}", config.quiz.recent_window);
    println!("  Answer writes: {:?}", config.quiz.answer_writes);
    println!(
        "  Trust reported difficulty: {}",
        config.quiz.trust_reported_difficulty
    );
}
