use anyhow::Result;
use clap::Parser;
use classpulse_core::{events::EventBus, timer::TimerRegistry, AppConfig, AppState};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

mod cli;
mod config;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("classpulse=info,tower_http=debug")),
        )
        .init();

    let args = cli::Args::parse();
    let mut config = config::Config::load(&args.config)?;
    if let Some(bind) = args.bind {
        config.server.bind_address = bind;
    }
    if config.auth.jwt_secret.is_empty() {
        anyhow::bail!("auth.jwt_secret must be set (config file or CLASSPULSE_JWT_SECRET)");
    }

    ensure_db_dir(&config.database.url);

    let db =
        classpulse_db::create_pool(&config.database.url, config.database.max_connections).await?;
    classpulse_db::run_migrations(&db).await?;

    let state = AppState {
        db,
        event_bus: EventBus::default(),
        timers: Arc::new(TimerRegistry::new()),
        config: AppConfig {
            jwt_secret: config.auth.jwt_secret.clone(),
            jwt_expiry_seconds: config.auth.jwt_expiry_seconds,
            public_url: config.server.public_url.clone(),
            database_url: config.database.url.clone(),
        },
    };

    // Re-arm the countdown for any poll that was active when the process
    // last stopped; the deadline comes from the persisted start time.
    classpulse_core::hub::resume_on_startup(&state).await;

    let app = classpulse_api::build_router()
        .merge(classpulse_ws::gateway_router())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&config.server.bind_address).await?;
    tracing::info!(
        bind = %config.server.bind_address,
        database = %config.database.url,
        "classpulse server listening"
    );

    let shutdown_signal = async {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutting down");
    };

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    Ok(())
}

/// Create the database parent directory before sqlite tries to open the file.
fn ensure_db_dir(database_url: &str) {
    if let Some(db_path) = database_url
        .strip_prefix("sqlite://")
        .and_then(|s| s.split('?').next())
    {
        if let Some(parent) = std::path::Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() {
                let _ = std::fs::create_dir_all(parent);
            }
        }
    }
}
