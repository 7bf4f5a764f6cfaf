//! Debate API Server
//!
//! Authentication and session service for the debate platform.

use debate_api::{create_router, state::AppState};
use debate_core::{InMemoryUserStore, PgUserStore, Settings, UserStore};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine
    dotenvy::dotenv().ok();

    // CONFIG_FILE points at a TOML file; the environment still wins
    let settings = match std::env::var("CONFIG_FILE") {
        Ok(path) => Settings::from_file(path)?.with_env_override()?,
        Err(_) => Settings::from_env()?,
    };
    init_tracing(&settings);

    let users: Arc<dyn UserStore> = if settings.database.url.is_empty() {
        tracing::warn!("DATABASE_URL not set; users are kept in memory");
        Arc::new(InMemoryUserStore::new())
    } else {
        let store = PgUserStore::new(&settings.database.url).await?;
        store.ensure_schema().await?;
        Arc::new(store)
    };

    let addr = format!("{}:{}", settings.app.host, settings.app.port);
    let app_name = settings.app.name.clone();

    let state = Arc::new(AppState::new(settings, users)?);
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("{} starting on http://{}", app_name, addr);
    tracing::info!("OpenAPI spec at http://{}/api-docs/openapi.json", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

fn init_tracing(settings: &Settings) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = settings.app.log_level.to_lowercase();
        format!("debate_api={level},debate_core={level},audit=info,tower_http={level}").into()
    });

    if settings.app.debug {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    }
}
