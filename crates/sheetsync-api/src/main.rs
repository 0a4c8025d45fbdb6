mod config;
mod error;
mod poller;
mod routes;

use std::sync::Arc;

use config::AppConfig;
use routes::{app_router, AppState};
use sheetsync_core::services::DatabaseService;
use sheetsync_core::sync::SyncDispatcher;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Only load .env in development; production uses platform-native env injection.
    #[cfg(debug_assertions)]
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("sheetsync_api=info".parse()?)
                .add_directive("sheetsync_core=info".parse()?),
        )
        .init();

    let config = AppConfig::from_env()?;
    tracing::info!("Starting sheetsync-api with config: {:?}", config);

    let db = DatabaseService::open_path(&config.sync.database_path).await?;
    let sheets = Arc::new(config.sync.sheets_client()?);
    let dispatcher = SyncDispatcher::new(db.clone(), sheets, config.sync.dispatcher.clone());
    tracing::info!(
        database = ?db.path(),
        sheet = %dispatcher.config().target.scan_range(),
        "Sync pipeline ready"
    );

    if let Some(interval) = config.poll_interval {
        poller::spawn_poller(dispatcher.clone(), interval);
    }

    let router = app_router(AppState::new(db, dispatcher));
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("sheetsync-api listening on {}", config.bind_addr);
    axum::serve(listener, router).await?;
    Ok(())
}
