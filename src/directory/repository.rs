//! Postgres-backed user directory

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::domain::Address;

use super::{DirectoryEntry, DirectoryError, DirectoryResult, UserDirectory};

/// Reads the `users` table of the registration database
#[derive(Debug, Clone)]
pub struct PgUserDirectory {
    pool: PgPool,
}

impl PgUserDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn lookup_address(&self, username: &str) -> DirectoryResult<Option<Address>> {
        let stored: Option<Option<String>> = sqlx::query_scalar(
            r#"
            SELECT ethereum_address FROM users WHERE username = $1
            "#,
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        match stored.flatten() {
            Some(raw) => Address::parse(&raw)
                .map(Some)
                .map_err(|source| DirectoryError::InvalidAddress {
                    username: username.to_string(),
                    source,
                }),
            None => Ok(None),
        }
    }

    async fn list_all_addresses(&self) -> DirectoryResult<Vec<DirectoryEntry>> {
        let rows: Vec<(String, String, DateTime<Utc>)> = sqlx::query_as(
            r#"
            SELECT username, ethereum_address, created_at
            FROM users
            WHERE ethereum_address IS NOT NULL
            ORDER BY created_at ASC, username ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut entries = Vec::with_capacity(rows.len());
        for (username, address, _created_at) in rows {
            match DirectoryEntry::from_row(username, &address) {
                Ok(entry) => entries.push(entry),
                Err(err) => tracing::warn!(error = %err, "Skipping user with invalid address"),
            }
        }

        tracing::debug!(count = entries.len(), "Loaded directory addresses");
        Ok(entries)
    }
}
