//! Ledger Gateway Errors
//!
//! Error taxonomy for ledger capability calls.

use std::time::Duration;

use crate::domain::{AmountError, BaseUnits};

/// Errors that can occur talking to the ledger
#[derive(Debug, Clone, thiserror::Error)]
pub enum GatewayError {
    /// Ledger endpoint unreachable
    #[error("Ledger gateway unavailable: {0}")]
    GatewayUnavailable(String),

    /// Sender cannot cover amount plus fees at submission time
    #[error("Insufficient funds: required {required}, available {}", display_available(.available))]
    InsufficientFunds {
        required: BaseUnits,
        available: Option<BaseUnits>,
    },

    /// Not confirmed within the timeout; the transfer may still land
    #[error("Transaction {confirmation_id} not confirmed within {waited:?}")]
    ConfirmationTimeout {
        confirmation_id: String,
        waited: Duration,
    },

    /// Ledger reported the transaction as failed
    #[error("Transaction {confirmation_id} reverted")]
    TransactionReverted { confirmation_id: String },

    /// JSON-RPC level error reported by the node
    #[error("RPC error: {0}")]
    Rpc(String),

    /// Node answered with something we could not interpret
    #[error("Invalid ledger response: {0}")]
    InvalidResponse(String),
}

fn display_available(available: &Option<BaseUnits>) -> String {
    available
        .map(|a| a.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

impl GatewayError {
    pub fn insufficient_funds(required: BaseUnits, available: Option<BaseUnits>) -> Self {
        Self::InsufficientFunds {
            required,
            available,
        }
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, GatewayError::GatewayUnavailable(_))
    }

    /// Check if retrying could succeed without moving funds twice.
    ///
    /// A timeout is deliberately not retryable: the first attempt may still
    /// land.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GatewayError::InsufficientFunds { .. } | GatewayError::TransactionReverted { .. }
        )
    }
}

impl From<AmountError> for GatewayError {
    fn from(err: AmountError) -> Self {
        GatewayError::InvalidResponse(err.to_string())
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() || err.is_request() {
            GatewayError::GatewayUnavailable(err.to_string())
        } else if err.is_decode() {
            GatewayError::InvalidResponse(err.to_string())
        } else {
            GatewayError::Rpc(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(GatewayError::insufficient_funds(BaseUnits(10), None).is_retryable());
        assert!(GatewayError::TransactionReverted {
            confirmation_id: "0x1".to_string()
        }
        .is_retryable());
        assert!(!GatewayError::ConfirmationTimeout {
            confirmation_id: "0x1".to_string(),
            waited: Duration::from_secs(30),
        }
        .is_retryable());
        assert!(!GatewayError::GatewayUnavailable("down".to_string()).is_retryable());
    }

    #[test]
    fn test_insufficient_funds_message() {
        let err = GatewayError::insufficient_funds(BaseUnits(100), Some(BaseUnits(40)));
        assert_eq!(err.to_string(), "Insufficient funds: required 100, available 40");

        let err = GatewayError::insufficient_funds(BaseUnits(100), None);
        assert!(err.to_string().ends_with("available unknown"));
    }
}
