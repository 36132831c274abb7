use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::prelude::*;

use lingumate::audit::{AuditSink, SqliteAuditLog};
use lingumate::config::{DataDir, FileConfig, ProviderKind, ServiceConfig, load_config};
use lingumate::provider::build_provider;
use lingumate::server::{AppState, RunningServer};
use lingumate::smoke::{DEFAULT_SMOKE_URL, run_smoke};

#[derive(Parser)]
#[command(name = "lingumate")]
#[command(about = "Real-time bilingual translation sessions over WebSocket")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Custom data directory (defaults to ~/.lingumate)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the handshake and relay endpoints in the foreground (default)
    Serve(ServeArgs),

    /// Pair two test clients against a relay endpoint and relay one message
    Smoke(SmokeArgs),
}

#[derive(Parser, Default)]
struct ServeArgs {
    /// Host to bind both endpoints to
    #[arg(short = 'b', long)]
    host: Option<String>,

    /// Port for the handshake endpoint (0 = auto-select)
    #[arg(long)]
    handshake_port: Option<u16>,

    /// Port for the relay endpoint (0 = auto-select)
    #[arg(long)]
    relay_port: Option<u16>,

    /// Translation backend
    #[arg(long, value_enum)]
    provider: Option<ProviderKind>,

    /// Base URL of the HTTP translation backend
    #[arg(long)]
    provider_endpoint: Option<String>,
}

#[derive(Parser)]
struct SmokeArgs {
    /// Relay endpoint to test
    #[arg(long, default_value = DEFAULT_SMOKE_URL)]
    url: String,

    /// Seconds to wait for the translated result
    #[arg(long, default_value = "5")]
    timeout_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug, cli.log_json);

    match cli.command {
        Some(Commands::Smoke(args)) => smoke_command(args).await,
        Some(Commands::Serve(args)) => run_server(args, cli.data_dir).await,
        None => run_server(ServeArgs::default(), cli.data_dir).await,
    }
}

fn init_tracing(debug: bool, json: bool) {
    let default_directive = if debug {
        "lingumate=debug,tower_http=debug,info"
    } else {
        "lingumate=info,tower_http=info,warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    tracing_subscriber::registry()
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(tracing_subscriber::fmt::layer))
        .with(env_filter)
        .init();
}

fn apply_overrides(file_config: &mut FileConfig, args: ServeArgs) {
    if let Some(host) = args.host {
        file_config.server.host = host;
    }
    if let Some(port) = args.handshake_port {
        file_config.server.handshake_port = port;
    }
    if let Some(port) = args.relay_port {
        file_config.server.relay_port = port;
    }
    if let Some(kind) = args.provider {
        file_config.provider.kind = kind;
    }
    if let Some(endpoint) = args.provider_endpoint {
        file_config.provider.endpoint = Some(endpoint);
    }
}

async fn run_server(args: ServeArgs, data_dir: Option<PathBuf>) -> Result<()> {
    let data_dir = DataDir::new(data_dir)?;
    let mut file_config: FileConfig = load_config(&data_dir.path)
        .extract()
        .with_context(|| {
            format!(
                "Failed to load configuration from {}",
                data_dir.config_toml_path().display()
            )
        })?;
    apply_overrides(&mut file_config, args);
    let config = ServiceConfig::from_file(&file_config, &data_dir.path)?;

    let provider = build_provider(&config.provider)?;
    let audit: Option<Arc<dyn AuditSink>> = if config.audit.enabled {
        Some(Arc::new(SqliteAuditLog::open(&config.audit).await?))
    } else {
        None
    };

    info!(
        environment = %config.server.environment,
        provider = provider.name(),
        audit = config.audit.enabled,
        "Starting Lingumate"
    );

    let state = AppState::new(config, provider, audit);
    let server = RunningServer::bind(state).await?;

    shutdown_signal().await;
    info!("Received shutdown signal, closing sessions...");
    server.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

async fn smoke_command(args: SmokeArgs) -> Result<()> {
    println!("Connecting to {}", args.url);
    let report = run_smoke(&args.url, Duration::from_secs(args.timeout_secs)).await?;
    println!("Session:    {}", report.session_id);
    println!("Original:   {}", report.original_text);
    println!("Translated: {}", report.translated_text);
    println!("Round trip: {} ms", report.elapsed.as_millis());
    Ok(())
}
