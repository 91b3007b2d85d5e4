//! In-memory user directory for tests and local runs

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::Address;

use super::{DirectoryEntry, DirectoryResult, UserDirectory};

/// Directory kept in registration order
#[derive(Debug, Clone, Default)]
pub struct InMemoryDirectory {
    entries: Arc<RwLock<Vec<DirectoryEntry>>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or re-point a username
    pub async fn insert(&self, username: &str, address: Address) {
        let mut entries = self.entries.write().await;
        match entries.iter().position(|e| e.username == username) {
            Some(index) => entries[index].address = address,
            None => entries.push(DirectoryEntry {
                username: username.to_string(),
                address,
            }),
        }
    }
}

#[async_trait]
impl UserDirectory for InMemoryDirectory {
    async fn lookup_address(&self, username: &str) -> DirectoryResult<Option<Address>> {
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .find(|e| e.username == username)
            .map(|e| e.address.clone()))
    }

    async fn list_all_addresses(&self) -> DirectoryResult<Vec<DirectoryEntry>> {
        Ok(self.entries.read().await.clone())
    }
}
