//! In-Memory Ledger
//!
//! Deterministic in-process implementation of [`LedgerGateway`] for tests and
//! local demos. Every submitted transfer is mined into its own block; a
//! per-transfer fee is burned from the sender's currency balance.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use futures::stream::{self, StreamExt};
use tokio::sync::RwLock;

use crate::domain::{Address, BaseUnits, Direction, TransferEvent, Unit, CURRENCY_DECIMALS};

use super::{
    Confirmation, EventStream, GatewayError, GatewayResult, LedgerGateway, PendingTransfer,
};

/// Seconds between blocks of the simulated chain
const BLOCK_TIME_SECS: i64 = 12;

/// Unix time of block 0
const GENESIS_TIMESTAMP: i64 = 1_700_000_000;

/// How the ledger treats a submitted transfer when confirmation is awaited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConfirmationMode {
    /// Transfer lands and is confirmed
    #[default]
    Confirm,
    /// Transfer is rejected by the ledger; only the fee is charged
    Revert,
    /// Transfer lands, but confirmation is not observed in time
    Timeout,
}

#[derive(Debug, Clone)]
struct PendingRecord {
    mode: ConfirmationMode,
    block_number: u64,
}

#[derive(Debug, Clone)]
struct LogEntry {
    from: Address,
    to: Address,
    amount: BaseUnits,
    confirmation_id: String,
    block_number: u64,
    log_index: u64,
}

#[derive(Debug)]
struct LedgerState {
    balances: HashMap<(Address, Unit), BaseUnits>,
    logs: Vec<LogEntry>,
    pending: HashMap<String, PendingRecord>,
    block_number: u64,
    tx_counter: u64,
    fee: BaseUnits,
    available: bool,
    default_mode: ConfirmationMode,
    scripted_modes: VecDeque<ConfirmationMode>,
    competing_spends: VecDeque<(Address, Unit, BaseUnits)>,
    submissions: usize,
}

impl LedgerState {
    fn balance(&self, address: &Address, unit: Unit) -> BaseUnits {
        self.balances
            .get(&(address.clone(), unit))
            .copied()
            .unwrap_or_default()
    }

    fn set_balance(&mut self, address: &Address, unit: Unit, value: BaseUnits) {
        self.balances.insert((address.clone(), unit), value);
    }

    fn debit(&mut self, address: &Address, unit: Unit, amount: BaseUnits) {
        let current = self.balance(address, unit);
        self.set_balance(address, unit, current.saturating_sub(amount));
    }

    fn credit(&mut self, address: &Address, unit: Unit, amount: BaseUnits) {
        let current = self.balance(address, unit);
        let updated = current.checked_add(amount).unwrap_or(BaseUnits(u128::MAX));
        self.set_balance(address, unit, updated);
    }

    fn next_tx_hash(&mut self) -> String {
        self.tx_counter += 1;
        format!("0x{:064x}", self.tx_counter)
    }

    fn apply_competing_spends(&mut self) {
        while let Some((address, unit, amount)) = self.competing_spends.pop_front() {
            tracing::debug!(%address, %unit, %amount, "Applying competing spend");
            self.debit(&address, unit, amount);
            self.block_number += 1;
        }
    }

    /// Returns the error the ledger would raise if `from` cannot pay.
    fn check_funds(&self, from: &Address, amount: BaseUnits, unit: Unit) -> GatewayResult<()> {
        let currency = self.balance(from, Unit::Currency);
        match unit {
            Unit::Currency => {
                let required = amount
                    .checked_add(self.fee)
                    .ok_or_else(|| GatewayError::insufficient_funds(amount, Some(currency)))?;
                if currency < required {
                    return Err(GatewayError::insufficient_funds(required, Some(currency)));
                }
            }
            Unit::Token => {
                let tokens = self.balance(from, Unit::Token);
                if tokens < amount {
                    return Err(GatewayError::insufficient_funds(amount, Some(tokens)));
                }
                if currency < self.fee {
                    return Err(GatewayError::insufficient_funds(self.fee, Some(currency)));
                }
            }
        }
        Ok(())
    }
}

fn block_timestamp(block_number: u64) -> DateTime<Utc> {
    let secs = GENESIS_TIMESTAMP + (block_number as i64) * BLOCK_TIME_SECS;
    Utc.timestamp_opt(secs, 0).single().unwrap_or_else(Utc::now)
}

/// In-memory ledger
#[derive(Debug, Clone)]
pub struct InMemoryLedger {
    faucet: Address,
    token_decimals: u32,
    state: Arc<RwLock<LedgerState>>,
}

impl InMemoryLedger {
    pub fn new(faucet: Address, token_decimals: u32) -> Self {
        Self {
            faucet,
            token_decimals,
            state: Arc::new(RwLock::new(LedgerState {
                balances: HashMap::new(),
                logs: Vec::new(),
                pending: HashMap::new(),
                block_number: 0,
                tx_counter: 0,
                fee: BaseUnits::ZERO,
                available: true,
                default_mode: ConfirmationMode::Confirm,
                scripted_modes: VecDeque::new(),
                competing_spends: VecDeque::new(),
                submissions: 0,
            })),
        }
    }

    /// Set the currency fee burned by every submitted transfer
    pub async fn set_fee(&self, fee: BaseUnits) {
        self.state.write().await.fee = fee;
    }

    /// Set a balance directly (genesis allocation)
    pub async fn set_balance(&self, address: &Address, unit: Unit, amount: BaseUnits) {
        self.state.write().await.set_balance(address, unit, amount);
    }

    /// Balance lookup that ignores the availability switch
    pub async fn balance_of(&self, address: &Address, unit: Unit) -> BaseUnits {
        self.state.read().await.balance(address, unit)
    }

    /// Simulate the ledger endpoint going down or coming back
    pub async fn set_available(&self, available: bool) {
        self.state.write().await.available = available;
    }

    /// Mode used once no scripted mode is queued
    pub async fn set_default_mode(&self, mode: ConfirmationMode) {
        self.state.write().await.default_mode = mode;
    }

    /// Queue a mode for the next submission
    pub async fn script_confirmation(&self, mode: ConfirmationMode) {
        self.state.write().await.scripted_modes.push_back(mode);
    }

    /// Debit `amount` from `address` just before the next submission is
    /// checked, as a concurrent request racing on the same account would.
    pub async fn schedule_competing_spend(&self, address: &Address, unit: Unit, amount: BaseUnits) {
        self.state
            .write()
            .await
            .competing_spends
            .push_back((address.clone(), unit, amount));
    }

    /// Transfers accepted by the ledger (including reverted ones)
    pub async fn submission_count(&self) -> usize {
        self.state.read().await.submissions
    }

    pub async fn block_number(&self) -> u64 {
        self.state.read().await.block_number
    }

    /// Append historical token transfers as one new block without touching
    /// balances. Returns the block number.
    pub async fn record_block(&self, transfers: &[(Address, Address, BaseUnits)]) -> u64 {
        let mut state = self.state.write().await;
        state.block_number += 1;
        let block_number = state.block_number;

        for (log_index, (from, to, amount)) in transfers.iter().enumerate() {
            let confirmation_id = state.next_tx_hash();
            state.logs.push(LogEntry {
                from: from.clone(),
                to: to.clone(),
                amount: *amount,
                confirmation_id,
                block_number,
                log_index: log_index as u64,
            });
        }

        block_number
    }
}

#[async_trait]
impl LedgerGateway for InMemoryLedger {
    fn faucet_address(&self) -> &Address {
        &self.faucet
    }

    fn decimals(&self, unit: Unit) -> u32 {
        match unit {
            Unit::Currency => CURRENCY_DECIMALS,
            Unit::Token => self.token_decimals,
        }
    }

    async fn read_balance(&self, address: &Address, unit: Unit) -> GatewayResult<BaseUnits> {
        let state = self.state.read().await;
        if !state.available {
            return Err(GatewayError::GatewayUnavailable("in-memory ledger offline".to_string()));
        }
        Ok(state.balance(address, unit))
    }

    async fn estimate_fee(&self, _unit: Unit) -> GatewayResult<BaseUnits> {
        let state = self.state.read().await;
        if !state.available {
            return Err(GatewayError::GatewayUnavailable("in-memory ledger offline".to_string()));
        }
        Ok(state.fee)
    }

    async fn submit_transfer(
        &self,
        from: &Address,
        to: &Address,
        amount: BaseUnits,
        unit: Unit,
    ) -> GatewayResult<PendingTransfer> {
        let mut state = self.state.write().await;
        if !state.available {
            return Err(GatewayError::GatewayUnavailable("in-memory ledger offline".to_string()));
        }

        state.apply_competing_spends();
        state.check_funds(from, amount, unit)?;

        let mode = state
            .scripted_modes
            .pop_front()
            .unwrap_or(state.default_mode);
        let confirmation_id = state.next_tx_hash();
        let fee = state.fee;

        state.submissions += 1;
        state.block_number += 1;
        let block_number = state.block_number;

        state.debit(from, Unit::Currency, fee);
        if mode != ConfirmationMode::Revert {
            state.debit(from, unit, amount);
            state.credit(to, unit, amount);

            if unit == Unit::Token {
                state.logs.push(LogEntry {
                    from: from.clone(),
                    to: to.clone(),
                    amount,
                    confirmation_id: confirmation_id.clone(),
                    block_number,
                    log_index: 0,
                });
            }
        }

        state.pending.insert(
            confirmation_id.clone(),
            PendingRecord { mode, block_number },
        );

        tracing::debug!(
            %from, %to, %amount, %unit, ?mode, block_number,
            "In-memory ledger accepted transfer"
        );

        Ok(PendingTransfer {
            confirmation_id,
            unit,
            amount,
        })
    }

    async fn await_confirmation(
        &self,
        pending: &PendingTransfer,
        timeout: Duration,
    ) -> GatewayResult<Confirmation> {
        let state = self.state.read().await;
        if !state.available {
            return Err(GatewayError::GatewayUnavailable("in-memory ledger offline".to_string()));
        }

        let record = state
            .pending
            .get(&pending.confirmation_id)
            .ok_or_else(|| GatewayError::Rpc(format!("unknown transaction {}", pending.confirmation_id)))?;

        match record.mode {
            ConfirmationMode::Confirm => Ok(Confirmation {
                confirmation_id: pending.confirmation_id.clone(),
                block_number: record.block_number,
            }),
            ConfirmationMode::Revert => Err(GatewayError::TransactionReverted {
                confirmation_id: pending.confirmation_id.clone(),
            }),
            ConfirmationMode::Timeout => Err(GatewayError::ConfirmationTimeout {
                confirmation_id: pending.confirmation_id.clone(),
                waited: timeout,
            }),
        }
    }

    fn read_events<'a>(
        &'a self,
        address: &Address,
        direction: Direction,
        from_sequence: u64,
    ) -> EventStream<'a> {
        let state = Arc::clone(&self.state);
        let address = address.clone();

        let snapshot = async move {
            let state = state.read().await;
            if !state.available {
                return vec![Err(GatewayError::GatewayUnavailable(
                    "in-memory ledger offline".to_string(),
                ))];
            }

            let mut matching: Vec<&LogEntry> = state
                .logs
                .iter()
                .filter(|log| log.block_number >= from_sequence)
                .filter(|log| match direction {
                    Direction::Sent => log.from == address,
                    Direction::Received => log.to == address,
                })
                .collect();
            matching.sort_by_key(|log| (log.block_number, log.log_index));

            let events: Vec<GatewayResult<TransferEvent>> = matching
                .into_iter()
                .map(|log| {
                    Ok(TransferEvent {
                        direction,
                        from: log.from.clone(),
                        to: log.to.clone(),
                        amount: log.amount,
                        confirmation_id: log.confirmation_id.clone(),
                        block_number: log.block_number,
                        log_index: log.log_index,
                        timestamp: block_timestamp(log.block_number),
                    })
                })
                .collect();
            events
        };

        Box::pin(stream::once(snapshot).flat_map(stream::iter))
    }
}
