//! Domain Error Types
//!
//! Validation failures for caller-supplied values. Independent of the web and
//! ledger layers.

use thiserror::Error;

use super::{AddressError, AmountError};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DomainError {
    #[error("Invalid address: {0}")]
    InvalidAddress(#[from] AddressError),

    #[error("Invalid amount: {0}")]
    InvalidAmount(#[from] AmountError),

    /// The faucet cannot be a funding recipient
    #[error("Faucet address {0} cannot be funded from itself")]
    FaucetRecipient(String),

    #[error("History limit must be at most {max} (got {requested})")]
    LimitTooLarge { requested: usize, max: usize },
}
