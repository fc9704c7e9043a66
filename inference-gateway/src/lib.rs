//! Inference Gateway - supervises a backend inference server and proxies
//! completion requests to it, persisting an audit document per exchange.

pub mod api;
pub mod audit;
pub mod config;
pub mod error;
pub mod logging;
pub mod proxy;
pub mod state;
pub mod supervisor;

use std::sync::Arc;

use axum::routing::get;
use axum::{middleware, Router};
use tower_http::cors::CorsLayer;

pub use audit::{AuditSink, AuditWriteError, ObjectStoreAuditSink};
pub use config::Config;
pub use proxy::BackendClient;
pub use state::AppState;
pub use supervisor::{BackendProcess, ReadinessPolicy, SupervisorError};

/// Build the gateway's HTTP router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .nest("/v1", api::router())
        .route("/health", get(api::health::health))
        .layer(middleware::from_fn(logging::request_logger))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
