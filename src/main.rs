use anyhow::Result;
use clap::Parser;
use shotplan_server::models::{Config, ImageMode};
use shotplan_server::server::{create_app, AppState};
use std::net::{IpAddr, SocketAddr};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "shotplan-server")]
#[command(about = "Serve product image generation and prompt suggestion endpoints")]
struct CliArgs {
    /// Address to bind.
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    host: IpAddr,

    /// Port to listen on.
    #[arg(long, env = "PORT", default_value_t = 3000)]
    port: u16,

    /// Override IMAGE_MODE (shooting-plan, scene-description, direct-image).
    #[arg(long, value_parser = parse_mode_arg)]
    image_mode: Option<ImageMode>,
}

fn parse_mode_arg(input: &str) -> std::result::Result<ImageMode, String> {
    input.parse()
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shotplan_server=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = CliArgs::parse();

    let mut config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };
    if let Some(mode) = args.image_mode {
        config.image_mode = mode;
    }

    info!(
        "Starting shotplan-server (image mode: {})",
        config.image_mode.as_str()
    );

    let app = create_app(AppState::from_config(&config));

    let addr = SocketAddr::new(args.host, args.port);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
