#[global_allocator]
static GLOBAL: jemallocator::Jemalloc = jemallocator::Jemalloc;

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::{info, warn};

use rebekko::config::OAuthConfig;
use rebekko::server::{app_router, AppState};
use rebekko::telemetry::{init_telemetry, shutdown_telemetry, TelemetryConfig};

#[derive(Parser, Debug)]
#[command(name = "rebekko")]
#[command(about = "Rebekko Attendance System - static SPA hosting and Google OAuth token relay")]
#[command(version)]
struct Args {
    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value_t = 8080)]
    port: u16,

    /// Directory holding the front-end bundle
    #[arg(long, default_value = "static")]
    static_dir: PathBuf,

    /// OTLP endpoint for traces and metrics
    #[arg(long, env = "OTEL_EXPORTER_OTLP_ENDPOINT")]
    otlp_endpoint: Option<String>,

    /// Log filter directive
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    log_filter: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Initialize telemetry
    let telemetry_config = TelemetryConfig {
        otlp_endpoint: args.otlp_endpoint.clone(),
        log_filter: args.log_filter.clone(),
    };
    init_telemetry(telemetry_config)?;

    // Load OAuth configuration from the environment
    let oauth = OAuthConfig::from_env();
    if !oauth.has_secret() {
        warn!(
            "GOOGLE_CLIENT_SECRET is not set; token exchange and refresh will fail until it is provided"
        );
    }

    let state = AppState::new(oauth);
    let app = app_router(state, &args.static_dir);

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    let listener = TcpListener::bind(addr).await?;

    info!(
        listen = %addr,
        static_dir = %args.static_dir.display(),
        "Starting Rebekko Attendance server"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    shutdown_telemetry();

    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    info!("Shutdown signal received");
}
