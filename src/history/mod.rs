//! History Aggregator
//!
//! Builds one address's transaction history from two independently filtered
//! event streams: transfers it sent and transfers it received. Both streams
//! are read concurrently, merged once, sorted most recent first and only
//! then truncated.

use std::sync::Arc;

use futures::TryStreamExt;

use crate::domain::{Address, Direction, HistoryEntry, TransferEvent, Unit};
use crate::gateway::{GatewayResult, LedgerGateway};

/// Entries returned when the caller gives no limit
pub const DEFAULT_HISTORY_LIMIT: usize = 10;

/// Merge both captured sequences into one ordered, deduplicated history.
///
/// A received event whose sender is `address` is a self-transfer already
/// present in `sent`, so it is dropped. Ties on block number keep
/// encounter order (sent before received).
pub fn merge_history(
    address: &Address,
    sent: Vec<TransferEvent>,
    received: Vec<TransferEvent>,
    limit: usize,
    decimals: u32,
) -> Vec<HistoryEntry> {
    let mut merged: Vec<HistoryEntry> = sent
        .into_iter()
        .map(|event| HistoryEntry::from_event(event, Direction::Sent, decimals))
        .chain(
            received
                .into_iter()
                .filter(|event| &event.from != address)
                .map(|event| HistoryEntry::from_event(event, Direction::Received, decimals)),
        )
        .collect();

    // sort_by is stable
    merged.sort_by(|a, b| b.block_number.cmp(&a.block_number));
    merged.truncate(limit);
    merged
}

/// Reads history through the ledger gateway.
#[derive(Clone)]
pub struct HistoryAggregator {
    gateway: Arc<dyn LedgerGateway>,
}

impl HistoryAggregator {
    pub fn new(gateway: Arc<dyn LedgerGateway>) -> Self {
        Self { gateway }
    }

    /// Most recent token transfers touching `address`, newest first.
    pub async fn get_history(
        &self,
        address: &Address,
        limit: Option<usize>,
    ) -> GatewayResult<Vec<HistoryEntry>> {
        let limit = limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
        if limit == 0 {
            return Ok(Vec::new());
        }

        let (sent, received) = tokio::try_join!(
            self.gateway
                .read_events(address, Direction::Sent, 0)
                .try_collect::<Vec<_>>(),
            self.gateway
                .read_events(address, Direction::Received, 0)
                .try_collect::<Vec<_>>(),
        )?;

        tracing::debug!(
            %address, sent = sent.len(), received = received.len(), limit,
            "Merging transfer history"
        );

        Ok(merge_history(
            address,
            sent,
            received,
            limit,
            self.gateway.decimals(Unit::Token),
        ))
    }
}
