//! Binary entrypoint for the DySART HTTP server.
//!
//! Configuration comes from environment variables, see
//! [`dysart_server::config`]. Log filtering follows `RUST_LOG` (default
//! `info`).

use dysart_server::config::ServerConfig;
use dysart_server::router::build_router;
use dysart_server::state::AppState;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ServerConfig::from_env()?;
    let state = AppState::new(&config)?;
    {
        let lab = state.lab.lock().await;
        let incomplete = lab.incomplete_records()?;
        if !incomplete.is_empty() {
            tracing::warn!(
                count = incomplete.len(),
                "call records left in STARTED by an interrupted refresh"
            );
        }
    }

    let app = build_router(state);
    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("dysart server starting on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
