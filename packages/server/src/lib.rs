//! TailorSpace catalog HTTP server
//!
//! REST surface over [`tailorspace_core`]: whole-tree read and write for the
//! product editor, single-record CRUD for products and fabrics, and a blob
//! endpoint for locally stored images.
//!
//! # Architecture
//!
//! Endpoints are grouped into modules that each expose `routes(state)`;
//! [`create_router`] merges them and adds the CORS and tracing layers:
//! - `product_endpoints`: health check and single-node CRUD
//! - `fabric_endpoints`: fabric groups and swatches
//! - `tree_endpoints`: materialize and reconcile nested documents
//! - `image_endpoints`: serve uploaded images behind expiring links
//!
//! # Usage
//!
//! ```bash
//! DATABASE_PATH=/tmp/catalog.db cargo run --bin catalog-server
//! ```

use std::sync::Arc;

use axum::{
    http::{HeaderValue, Method},
    Router,
};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use tailorspace_core::images::{DisabledUploader, LocalImageStore, PassthroughResolver};
use tailorspace_core::{
    CatalogService, DatabaseService, ImageResolver, ImageUploader, TreeService,
};

pub mod config;
mod fabric_endpoints;
mod http_error;
mod image_endpoints;
mod payload;
mod product_endpoints;
mod tree_endpoints;

pub use config::{AppConfig, ConfigError, ImageStoreConfig};
pub use http_error::HttpError;

/// Application state shared across all endpoints
#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<CatalogService>,
    pub tree: Arc<TreeService>,
    pub uploader: Arc<dyn ImageUploader>,
    /// Present when uploads go to a local directory this server also serves
    pub images: Option<Arc<LocalImageStore>>,
}

impl AppState {
    /// Wire the services over one database according to `config`
    pub fn new(db: Arc<DatabaseService>, config: &AppConfig) -> Self {
        let images = config.image_store.as_ref().map(|store| {
            Arc::new(LocalImageStore::new(
                store.dir.clone(),
                store.bucket.clone(),
                store.public_url.clone(),
                store.url_ttl,
            ))
        });

        let resolver: Arc<dyn ImageResolver> = match &images {
            Some(store) => store.clone(),
            None => Arc::new(PassthroughResolver),
        };
        let uploader: Arc<dyn ImageUploader> = match &images {
            Some(store) => store.clone(),
            None => Arc::new(DisabledUploader),
        };

        let tree = TreeService::new(db.clone(), resolver.clone()).with_policy(config.child_policy);
        let catalog = CatalogService::new(db, resolver);

        Self {
            catalog: Arc::new(catalog),
            tree: Arc::new(tree),
            uploader,
            images,
        }
    }
}

/// Body of a 201 response
#[derive(Debug, Serialize)]
pub struct Created {
    pub id: i64,
    pub status: &'static str,
}

impl Created {
    pub fn new(id: i64) -> Self {
        Self {
            id,
            status: "created",
        }
    }
}

/// Create the application router with all endpoint modules
pub fn create_router(state: AppState, config: &AppConfig) -> Router {
    Router::new()
        .merge(product_endpoints::routes(state.clone()))
        .merge(fabric_endpoints::routes(state.clone()))
        .merge(tree_endpoints::routes(state.clone()))
        .merge(image_endpoints::routes(state))
        .layer(cors_layer(&config.cors_origins))
        .layer(TraceLayer::new_for_http())
}

/// CORS for the configured origins, or any origin when none are configured
fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any)
        .allow_credentials(false);

    if origins.is_empty() {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin '{}'", origin);
                None
            }
        })
        .collect();
    layer.allow_origin(origins)
}

/// Serve until Ctrl+C
///
/// # Errors
///
/// Returns error if the server fails to bind or stops abnormally.
pub async fn start_server(state: AppState, config: &AppConfig) -> anyhow::Result<()> {
    let app = create_router(state, config);

    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Catalog server listening on http://{}", addr);
    if config.cors_origins.is_empty() {
        tracing::info!("CORS open to any origin");
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
