//! User Directory module
//!
//! Read-only lookup of registered users' ledger addresses. Registration
//! itself happens elsewhere; this service only resolves usernames for
//! onboarding and enumerates every address for batch distribution.

mod memory;
mod repository;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{Address, AddressError};

pub use memory::InMemoryDirectory;
pub use repository::PgUserDirectory;

/// Errors that can occur reading the directory
#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored address failed validation
    #[error("User {username} has an invalid address: {source}")]
    InvalidAddress {
        username: String,
        #[source]
        source: AddressError,
    },
}

/// Result type for directory operations
pub type DirectoryResult<T> = Result<T, DirectoryError>;

/// A registered user and their ledger address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    pub username: String,
    pub address: Address,
}

impl DirectoryEntry {
    /// Validate a raw stored row.
    pub fn from_row(username: String, address: &str) -> DirectoryResult<Self> {
        let address = Address::parse(address).map_err(|source| DirectoryError::InvalidAddress {
            username: username.clone(),
            source,
        })?;
        Ok(Self { username, address })
    }
}

/// Username to address resolution.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Address registered for `username`, if any
    async fn lookup_address(&self, username: &str) -> DirectoryResult<Option<Address>>;

    /// Every user with a registered address, oldest registration first
    async fn list_all_addresses(&self) -> DirectoryResult<Vec<DirectoryEntry>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_row_normalizes_address() {
        let entry = DirectoryEntry::from_row(
            "alice".to_string(),
            "0xAbCdEf0000000000000000000000000000000001",
        )
        .unwrap();
        assert_eq!(entry.address.as_str(), "0xabcdef0000000000000000000000000000000001");
    }

    #[test]
    fn test_from_row_rejects_garbage() {
        let err = DirectoryEntry::from_row("bob".to_string(), "not-an-address").unwrap_err();
        assert!(matches!(err, DirectoryError::InvalidAddress { ref username, .. } if username == "bob"));
    }
}
