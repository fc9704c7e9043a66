//! Shared application state.

use std::sync::{Arc, PoisonError, RwLock};

use crate::audit::AuditSink;
use crate::config::Config;
use crate::proxy::BackendClient;

/// Shared application state passed to all handlers.
pub struct AppState {
    pub config: Config,
    /// Set once the backend is ready, cleared on shutdown.
    backend: RwLock<Option<BackendClient>>,
    pub audit_sink: Arc<dyn AuditSink>,
}

impl AppState {
    pub fn new(config: Config, backend: Option<BackendClient>, audit_sink: Arc<dyn AuditSink>) -> Self {
        Self {
            config,
            backend: RwLock::new(backend),
            audit_sink,
        }
    }

    /// The backend client, if it has been initialized and not yet closed.
    pub fn backend(&self) -> Option<BackendClient> {
        self.backend
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_backend(&self, client: BackendClient) {
        *self.backend.write().unwrap_or_else(PoisonError::into_inner) = Some(client);
    }

    /// Drop the backend client so new requests get 503. In-flight requests
    /// keep their own handle until they finish.
    pub fn close_backend(&self) -> Option<BackendClient> {
        self.backend
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}
