mod error;
mod routes;
mod state;

use std::sync::Arc;

use anyhow::{Context, Result};
use pipeline::AppConfig;
use tracing_subscriber::EnvFilter;

use crate::state::AppState;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match std::env::var("LOG_FORMAT").as_deref() {
        Ok("json") => builder.json().init(),
        _ => builder.init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = AppConfig::from_env().context("Failed to load configuration")?;
    let listen_addr = config.listen_addr.clone();

    let state = Arc::new(AppState::new(config));
    let app = routes::router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", listen_addr))?;

    tracing::info!("Server listening on http://{}", listen_addr);

    axum::serve(listener, app).await?;
    Ok(())
}
