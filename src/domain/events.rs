//! Ledger Events
//!
//! Transfer events as read back from the ledger's event log, and their
//! projection onto a single address's history.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{Address, BaseUnits};

/// Which side of a transfer an address was on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Sent,
    Received,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Sent => "sent",
            Direction::Received => "received",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One token transfer from the ledger's event log.
///
/// `direction` records which filtered stream produced the event (the queried
/// address was the sender or the recipient). Events are read-only facts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferEvent {
    pub direction: Direction,
    pub from: Address,
    pub to: Address,
    pub amount: BaseUnits,
    /// Hash of the transaction that emitted the event
    pub confirmation_id: String,
    pub block_number: u64,
    /// Position of the log inside its block
    pub log_index: u64,
    pub timestamp: DateTime<Utc>,
}

impl TransferEvent {
    pub fn is_self_transfer(&self) -> bool {
        self.from == self.to
    }
}

/// A transfer seen from one address's point of view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub direction: Direction,
    /// The other party (for a self-transfer, the address itself)
    pub counterparty: Address,
    pub from: Address,
    pub to: Address,
    /// Display units
    pub amount: Decimal,
    pub confirmation_id: String,
    pub block_number: u64,
    pub timestamp: DateTime<Utc>,
}

impl HistoryEntry {
    /// Project an event for `direction`, converting the amount with the
    /// token's decimals.
    pub fn from_event(event: TransferEvent, direction: Direction, decimals: u32) -> Self {
        let counterparty = match direction {
            Direction::Sent => event.to.clone(),
            Direction::Received => event.from.clone(),
        };

        Self {
            direction,
            counterparty,
            amount: event.amount.to_display(decimals),
            from: event.from,
            to: event.to,
            confirmation_id: event.confirmation_id,
            block_number: event.block_number,
            timestamp: event.timestamp,
        }
    }
}
