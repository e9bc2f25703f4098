//! In-memory implementation of `UserGateway`.
//!
//! All records are held in memory and lost on restart. Used by tests and
//! as the reference implementation of the gateway contract.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{GatewayError, UserGateway};
use crate::user::{UserId, UserRecord};

/// In-memory user record store.
///
/// Stores records in a `HashMap` protected by a `RwLock`.
pub struct MemoryGateway {
    records: RwLock<HashMap<UserId, UserRecord>>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
        }
    }

    /// Seed a record directly, bypassing the gateway contract.
    pub async fn insert(&self, id: UserId, record: UserRecord) {
        let mut records = self.records.write().await;
        records.insert(id, record);
    }

    /// Number of stored records.
    pub async fn len(&self) -> usize {
        let records = self.records.read().await;
        records.len()
    }
}

impl Default for MemoryGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UserGateway for MemoryGateway {
    async fn fetch_by_id(&self, id: &UserId) -> Result<Option<UserRecord>, GatewayError> {
        let records = self.records.read().await;
        Ok(records.get(id).cloned())
    }

    async fn write_by_id(&self, id: &UserId, record: UserRecord) -> Result<(), GatewayError> {
        let mut records = self.records.write().await;
        records.insert(id.clone(), record);
        Ok(())
    }
}
