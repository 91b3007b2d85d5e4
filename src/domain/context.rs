//! Operation Context
//!
//! Request metadata carried into tracing spans.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use uuid::Uuid;

/// Context for an operation, used for tracing and log correlation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationContext {
    /// Correlation ID for request tracing
    pub correlation_id: Uuid,

    /// Client IP address
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_ip: Option<IpAddr>,

    pub started_at: DateTime<Utc>,
}

impl OperationContext {
    /// Create a context with a fresh correlation ID
    pub fn new() -> Self {
        Self {
            correlation_id: Uuid::new_v4(),
            client_ip: None,
            started_at: Utc::now(),
        }
    }

    /// Reuse a correlation ID supplied by the caller
    pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = correlation_id;
        self
    }

    pub fn with_client_ip(mut self, ip: IpAddr) -> Self {
        self.client_ip = Some(ip);
        self
    }

    /// Milliseconds since the operation started
    pub fn elapsed_ms(&self) -> i64 {
        (Utc::now() - self.started_at).num_milliseconds()
    }
}

impl Default for OperationContext {
    fn default() -> Self {
        Self::new()
    }
}
