pub mod config;
pub mod routes;
pub mod session;
pub mod session_store;

use std::sync::Arc;

use survey_core::SqliteGateway;

use session_store::SessionStore;

/// Shared state behind the HTTP handlers.
pub struct AppState {
    pub store: Arc<SessionStore<SqliteGateway>>,
    pub gateway: Arc<SqliteGateway>,
}

impl AppState {
    pub fn new(gateway: Arc<SqliteGateway>) -> Self {
        Self {
            store: Arc::new(SessionStore::new(gateway.clone())),
            gateway,
        }
    }
}
