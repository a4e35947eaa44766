mod config;
mod error;
mod middleware;
mod models;
mod routes;
mod services;
mod state;
mod views;

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use config::Config;
use services::backend::HttpBackend;
use services::session_store::SessionStore;
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file (ignore if missing)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;
    tracing::info!(
        "Starting SQL chat gateway on {} (backend {})",
        config.listen_addr,
        config.backend_url
    );

    let http_client = reqwest::Client::builder().build()?;
    let backend = HttpBackend::new(http_client, config.backend_url.clone(), config.backend_timeout);

    let state = Arc::new(AppState {
        config: config.clone(),
        backend: Arc::new(backend),
        sessions: Arc::new(SessionStore::new()),
    });

    // Spawn background idle-session sweep
    if config.session_idle_minutes > 0 {
        let sessions = state.sessions.clone();
        let max_idle = chrono::Duration::minutes(i64::from(config.session_idle_minutes));
        let interval = config.session_sweep_interval;
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                let removed = sessions.sweep_idle(max_idle, chrono::Utc::now()).await;
                if removed > 0 {
                    tracing::info!(
                        "Evicted {} sessions idle for more than {} minutes ({} active)",
                        removed,
                        max_idle.num_minutes(),
                        sessions.len().await
                    );
                }
            }
        });
    }

    let app = routes::build_app(state);

    let listener = TcpListener::bind(&config.listen_addr).await?;
    tracing::info!("Listening on {}", config.listen_addr);
    axum::serve(listener, app).await?;

    Ok(())
}
