use cultivate::readiness::ServerReadiness;
use cultivate::shutdown::{serve, spawn_signal_listener, DrainSettings};
use cultivate::{build_state, AppConfig};
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialise structured logging. Reads RUST_LOG environment variable.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let config = AppConfig::from_env()?;

    // Signals are watched from the start so one arriving during startup
    // still ends the process cleanly.
    let readiness = ServerReadiness::new();
    spawn_signal_listener(readiness.clone());

    let state = build_state(&config, readiness)?;

    let addr: std::net::SocketAddr = ([0, 0, 0, 0], config.port).into();
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Cultivate API server running on port {}", config.port);

    serve(listener, state, DrainSettings::from_config(&config)).await?;
    Ok(())
}
