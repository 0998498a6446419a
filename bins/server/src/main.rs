//! Ledgersync server
//!
//! Wires configuration, the database, the accounting client and the HTTP
//! router, then serves sync triggers and webhook intake.

use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ledgersync_accounting::QboClient;
use ledgersync_api::{AppState, create_router};
use ledgersync_core::SyncService;
use ledgersync_core::resolver::LookupCache;
use ledgersync_db::{SyncRepository, WebhookEventRepository, connect_with_pool};
use ledgersync_shared::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ledgersync=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::load().context("Failed to load configuration")?;

    let db = connect_with_pool(
        &config.database.url,
        config.database.max_connections,
        config.database.min_connections,
    )
    .await?;
    info!("Connected to database");

    let client =
        QboClient::new(&config.accounting).context("Failed to build accounting client")?;
    info!(
        base_url = %config.accounting.base_url,
        realm_id = %config.accounting.realm_id,
        minor_version = config.accounting.minor_version,
        "Accounting client configured"
    );

    let cache = LookupCache::from_config(&config.sync);
    let sync = SyncService::new(
        Arc::new(SyncRepository::new(db.clone())),
        Arc::new(client),
        config.sync.clone(),
        cache,
    );

    let state = AppState {
        sync: Arc::new(sync),
        notifications: Arc::new(WebhookEventRepository::new(db)),
    };

    let app = create_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
