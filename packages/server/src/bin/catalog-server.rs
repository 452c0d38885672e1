//! Catalog HTTP server binary
//!
//! # Usage
//!
//! ```bash
//! # Default settings (127.0.0.1:5000, ~/.tailorspace/catalog.db)
//! cargo run --bin catalog-server
//!
//! # Local image uploads, replace semantics for tree writes
//! IMAGE_STORE_DIR=/var/lib/tailorspace/images RECONCILE_CHILD_POLICY=replace \
//!   cargo run --bin catalog-server
//! ```
//!
//! # Environment Variables
//!
//! - `DATABASE_PATH`, `SERVER_HOST`, `SERVER_PORT`, `CORS_ALLOW_ORIGIN`
//! - `IMAGE_STORE_DIR`, `IMAGE_BUCKET`, `IMAGE_PUBLIC_URL`, `IMAGE_URL_TTL_SECS`
//! - `RECONCILE_CHILD_POLICY`: `additive` (default) or `replace`
//! - `RUST_LOG`: Logging level (e.g., "info", "debug", "trace")

use std::sync::Arc;

use tailorspace_core::DatabaseService;
use tailorspace_server::{start_server, AppConfig, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::from_env()?;
    tracing::info!("Database: {}", config.database_path.display());
    tracing::info!("Child policy: {}", config.child_policy);
    match &config.image_store {
        Some(store) => {
            tokio::fs::create_dir_all(&store.dir).await?;
            tracing::info!("Image store: {}", store.dir.display());
        }
        None => tracing::info!("Image store: disabled, references served as stored"),
    }

    let db = Arc::new(DatabaseService::new(config.database_path.clone()).await?);
    let state = AppState::new(db.clone(), &config);

    start_server(state, &config).await?;

    db.db_close().await?;
    tracing::info!("Catalog server stopped");
    Ok(())
}
