//! Ledger Gateway module
//!
//! Narrow capability interface over the external ledger. Everything the
//! reconciler, orchestrator and history aggregator know about the ledger goes
//! through [`LedgerGateway`].

mod error;
mod json_rpc;
mod memory;

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::domain::{Address, BaseUnits, Direction, TransferEvent, Unit};

pub use error::GatewayError;
pub use json_rpc::{JsonRpcConfig, JsonRpcGateway};
pub use memory::{ConfirmationMode, InMemoryLedger};

/// Result type for gateway calls
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Lazy, finite stream of transfer events in ascending block order.
pub type EventStream<'a> = Pin<Box<dyn Stream<Item = GatewayResult<TransferEvent>> + Send + 'a>>;

/// Handle for a submitted, not yet confirmed transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingTransfer {
    pub confirmation_id: String,
    pub unit: Unit,
    pub amount: BaseUnits,
}

/// Ledger acknowledgment that a transfer was finalized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Confirmation {
    pub confirmation_id: String,
    pub block_number: u64,
}

/// Capabilities consumed from the ledger.
#[async_trait]
pub trait LedgerGateway: Send + Sync {
    /// Address of the shared faucet account
    fn faucet_address(&self) -> &Address;

    /// Ledger decimals for `unit`
    fn decimals(&self, unit: Unit) -> u32;

    /// Current balance; zero for addresses with no activity
    async fn read_balance(&self, address: &Address, unit: Unit) -> GatewayResult<BaseUnits>;

    /// Currency the sender pays in fees for one transfer of `unit`
    async fn estimate_fee(&self, unit: Unit) -> GatewayResult<BaseUnits>;

    /// Submit a transfer without waiting for it to be finalized
    async fn submit_transfer(
        &self,
        from: &Address,
        to: &Address,
        amount: BaseUnits,
        unit: Unit,
    ) -> GatewayResult<PendingTransfer>;

    /// Wait until the transfer is finalized, reverted or `timeout` elapses
    async fn await_confirmation(
        &self,
        pending: &PendingTransfer,
        timeout: Duration,
    ) -> GatewayResult<Confirmation>;

    /// Token transfer events where `address` is on the `direction` side,
    /// starting at block `from_sequence`. Every call starts a fresh cursor.
    fn read_events<'a>(
        &'a self,
        address: &Address,
        direction: Direction,
        from_sequence: u64,
    ) -> EventStream<'a>;
}
