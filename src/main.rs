mod api;
mod app;
mod auth;
mod config;
mod domain;
mod error;
mod logging;
mod middleware;
mod routes;
mod services;

use anyhow::Result;
use std::time::Duration;

const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let settings = config::Settings::from_env()?;

    logging::init_logging(&settings.env);

    tracing::info!(
        env = ?settings.env,
        server_addr = %settings.server_addr,
        project = %settings.firebase_project_id,
        "Starting DanceBlue portal backend"
    );

    let server_addr = settings.server_addr.clone();
    let state = app::AppState::from_settings(settings)?;

    // Warm the signing key cache so the first sign-in does not wait on it
    if let Err(e) = state.jwks.warm_cache().await {
        tracing::warn!(error = %e, "Failed to warm JWKS cache - will fetch on first sign-in");
    }

    state.sessions.spawn_sweeper(SESSION_SWEEP_INTERVAL);

    let app = app::create_app(state);

    let listener = tokio::net::TcpListener::bind(&server_addr).await?;
    tracing::info!("Listening on {}", server_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
