//! Gateway abstraction for the user record store.
//!
//! This module defines the `UserGateway` trait through which the session
//! logic reaches the keyed record store. Implementations can provide
//! different backends (in-memory, SQLite, etc.); the session code never
//! sees which one it is talking to.

mod memory;
mod sqlite;

pub use memory::MemoryGateway;
pub use sqlite::SqliteGateway;

use std::fmt;

use async_trait::async_trait;

use crate::user::{UserId, UserRecord};

/// Error from a gateway backend: the operation that failed plus detail.
///
/// Undecodable stored values are not an error at this layer - reads are
/// lenient and surface such fields as absent - so storage failure is the
/// only shape a gateway call can produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayError {
    operation: String,
    message: String,
}

impl GatewayError {
    pub fn storage(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "storage error during {}: {}",
            self.operation, self.message
        )
    }
}

impl std::error::Error for GatewayError {}

/// Fetch/write contract for a single user's record.
///
/// The underlying store is a keyed document store reached by a string id.
/// `fetch_by_id` returns `Ok(None)` for unknown identifiers - that is a
/// normal, expected outcome, not a failure mode. `write_by_id` is an
/// unconditional overwrite with no concurrency check; if two sessions
/// race on the same identifier, the last write wins.
#[async_trait]
pub trait UserGateway: Send + Sync {
    /// Fetch the record for an identifier, returning `None` if unknown.
    async fn fetch_by_id(&self, id: &UserId) -> Result<Option<UserRecord>, GatewayError>;

    /// Overwrite the record at an identifier (upsert semantics).
    async fn write_by_id(&self, id: &UserId, record: UserRecord) -> Result<(), GatewayError>;
}
