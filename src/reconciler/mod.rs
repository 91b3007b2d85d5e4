//! Balance Reconciler
//!
//! Brings a recipient's balance up to a target using funds from the shared
//! faucet. The decision is a pure function of the observed balances, the
//! reserves and the transfer fee; executing it is a single submit-and-confirm
//! against the ledger.
//!
//! No in-process lock guards the faucet balance. Concurrent reconciliations
//! are serialized by the ledger itself; a reconciler that planned against a
//! stale faucet balance sees `InsufficientFunds` on submission, re-reads,
//! re-plans and resubmits once before reporting the failure.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::{Address, BaseUnits, OutcomeStatus, TransferOutcome, Unit};
use crate::gateway::{GatewayError, GatewayResult, LedgerGateway, PendingTransfer};

/// Amount needed to bring `current` up to `target`; zero at or above target.
pub fn amount_to_send(current: BaseUnits, target: BaseUnits) -> BaseUnits {
    target.saturating_sub(current)
}

/// What a reconciliation should do given the balances it observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferPlan {
    /// Recipient is at or above target
    AlreadyFunded,
    /// Send `amount`; `partial` if the reserve forced less than needed
    Send { amount: BaseUnits, partial: bool },
    /// Nothing distributable above the reserve
    Exhausted { available: BaseUnits },
    /// Faucet gas cannot pay the fee without dipping below the gas reserve
    FeeUnaffordable { gas: BaseUnits, required: BaseUnits },
}

impl TransferPlan {
    /// Limit a planned send to `cap`; a zero cap sends nothing.
    pub fn capped(self, cap: Option<BaseUnits>) -> TransferPlan {
        match (self, cap) {
            (TransferPlan::Send { amount, .. }, Some(cap)) if amount > cap => {
                if cap.is_zero() {
                    TransferPlan::Exhausted { available: cap }
                } else {
                    TransferPlan::Send { amount: cap, partial: true }
                }
            }
            (plan, _) => plan,
        }
    }
}

/// Decide how much to send. Never plans a transfer that would leave the
/// faucet below `reserve`.
pub fn plan_transfer(
    current: BaseUnits,
    target: BaseUnits,
    faucet: BaseUnits,
    reserve: BaseUnits,
) -> TransferPlan {
    let needed = amount_to_send(current, target);
    if needed.is_zero() {
        return TransferPlan::AlreadyFunded;
    }

    if faucet < reserve {
        return TransferPlan::Exhausted { available: faucet };
    }

    let distributable = faucet.saturating_sub(reserve);
    let amount = needed.min(distributable);
    if amount.is_zero() {
        return TransferPlan::Exhausted { available: faucet };
    }

    TransferPlan::Send {
        amount,
        partial: amount < needed,
    }
}

/// Faucet balances a plan is made against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaucetFunds {
    /// Faucet balance in the unit being sent
    pub balance: BaseUnits,
    /// Faucet currency balance, which pays the fee
    pub gas: BaseUnits,
    /// Currency fee one transfer burns from the faucet
    pub fee: BaseUnits,
}

impl FaucetFunds {
    /// Balances left after sending `amount` of `unit` and paying the fee.
    pub fn after_send(self, unit: Unit, amount: BaseUnits) -> FaucetFunds {
        let gas = self.gas.saturating_sub(self.fee);
        match unit {
            Unit::Currency => {
                let left = gas.saturating_sub(amount);
                FaucetFunds { balance: left, gas: left, fee: self.fee }
            }
            Unit::Token => FaucetFunds {
                balance: self.balance.saturating_sub(amount),
                gas,
                fee: self.fee,
            },
        }
    }
}

/// Reserve kept undistributed per unit, and confirmation bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcilerConfig {
    pub reserve_currency: BaseUnits,
    pub reserve_token: BaseUnits,
    pub confirmation_timeout: Duration,
}

impl ReconcilerConfig {
    pub fn reserve(&self, unit: Unit) -> BaseUnits {
        match unit {
            Unit::Currency => self.reserve_currency,
            Unit::Token => self.reserve_token,
        }
    }

    /// Plan a transfer with its fee accounted for.
    ///
    /// A currency send keeps `reserve + fee` back, so the fee never eats
    /// into the reserve. A token send also needs the faucet's gas to cover
    /// the fee above the gas reserve.
    pub fn plan(
        &self,
        unit: Unit,
        current: BaseUnits,
        target: BaseUnits,
        funds: FaucetFunds,
    ) -> TransferPlan {
        let gas_floor = self.reserve_currency.saturating_add(funds.fee);
        match unit {
            Unit::Currency => plan_transfer(current, target, funds.balance, gas_floor),
            Unit::Token => match plan_transfer(current, target, funds.balance, self.reserve_token) {
                TransferPlan::Send { .. } if funds.gas < gas_floor => TransferPlan::FeeUnaffordable {
                    gas: funds.gas,
                    required: gas_floor,
                },
                plan => plan,
            },
        }
    }
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            reserve_currency: BaseUnits::ZERO,
            reserve_token: BaseUnits::ZERO,
            confirmation_timeout: Duration::from_secs(30),
        }
    }
}

/// Executes at most one confirmed faucet transfer per call.
#[derive(Clone)]
pub struct BalanceReconciler {
    gateway: Arc<dyn LedgerGateway>,
    config: ReconcilerConfig,
}

impl BalanceReconciler {
    pub fn new(gateway: Arc<dyn LedgerGateway>, config: ReconcilerConfig) -> Self {
        Self { gateway, config }
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    pub fn gateway(&self) -> &Arc<dyn LedgerGateway> {
        &self.gateway
    }

    fn display(&self, amount: BaseUnits, unit: Unit) -> Decimal {
        amount.to_display(self.gateway.decimals(unit))
    }

    /// Faucet balance in `unit`, its gas and the fee for one transfer.
    pub async fn faucet_funds(&self, unit: Unit) -> GatewayResult<FaucetFunds> {
        let faucet = self.gateway.faucet_address();
        match unit {
            Unit::Currency => {
                let (balance, fee) = tokio::try_join!(
                    self.gateway.read_balance(faucet, unit),
                    self.gateway.estimate_fee(unit),
                )?;
                Ok(FaucetFunds { balance, gas: balance, fee })
            }
            Unit::Token => {
                let (balance, gas, fee) = tokio::try_join!(
                    self.gateway.read_balance(faucet, unit),
                    self.gateway.read_balance(faucet, Unit::Currency),
                    self.gateway.estimate_fee(unit),
                )?;
                Ok(FaucetFunds { balance, gas, fee })
            }
        }
    }

    /// Read the balances and plan against them.
    async fn observe(
        &self,
        recipient: &Address,
        target: BaseUnits,
        unit: Unit,
        cap: Option<BaseUnits>,
    ) -> GatewayResult<(BaseUnits, FaucetFunds, TransferPlan)> {
        let (funds, current) = tokio::try_join!(
            self.faucet_funds(unit),
            self.gateway.read_balance(recipient, unit),
        )?;

        let plan = self.config.plan(unit, current, target, funds).capped(cap);
        tracing::debug!(
            %recipient, %unit, %current, %target,
            faucet = %funds.balance, fee = %funds.fee, ?cap, ?plan,
            "Reconciliation planned"
        );

        Ok((current, funds, plan))
    }

    /// Bring `recipient`'s `unit` balance up to `target` (base units).
    ///
    /// Ledger unavailability is returned as `Err`; every other ending is a
    /// [`TransferOutcome`].
    pub async fn reconcile(
        &self,
        recipient: &Address,
        target: BaseUnits,
        unit: Unit,
    ) -> GatewayResult<TransferOutcome> {
        self.reconcile_capped(recipient, target, unit, None).await
    }

    /// Like [`reconcile`](Self::reconcile), sending at most `cap` when set.
    pub async fn reconcile_capped(
        &self,
        recipient: &Address,
        target: BaseUnits,
        unit: Unit,
        cap: Option<BaseUnits>,
    ) -> GatewayResult<TransferOutcome> {
        let mut retried = false;

        loop {
            let (current, funds, plan) = self.observe(recipient, target, unit, cap).await?;

            let (amount, partial) = match plan {
                TransferPlan::AlreadyFunded => {
                    return Ok(TransferOutcome::already_funded(
                        unit,
                        self.display(current, unit),
                        self.display(target, unit),
                    ));
                }
                TransferPlan::Exhausted { available } => {
                    tracing::warn!(
                        %recipient, %unit, faucet = %available,
                        reserve = %self.config.reserve(unit), fee = %funds.fee,
                        "Faucet exhausted"
                    );
                    return Ok(TransferOutcome::faucet_exhausted(
                        unit,
                        self.display(available, unit),
                        self.display(self.config.reserve(unit), unit),
                    ));
                }
                TransferPlan::FeeUnaffordable { gas, required } => {
                    tracing::warn!(
                        %recipient, %unit, %gas, %required,
                        "Faucet gas cannot cover the transfer fee"
                    );
                    return Ok(TransferOutcome::fee_unaffordable(
                        unit,
                        self.display(gas, Unit::Currency),
                        self.display(required, Unit::Currency),
                    ));
                }
                TransferPlan::Send { amount, partial } => (amount, partial),
            };

            if partial {
                tracing::warn!(
                    %recipient, %unit, %amount, faucet = %funds.balance,
                    "Faucet can only partially fund recipient"
                );
            }

            let faucet = self.gateway.faucet_address();
            match self.gateway.submit_transfer(faucet, recipient, amount, unit).await {
                Ok(pending) => return Ok(self.confirm(recipient, pending, partial).await),
                Err(GatewayError::InsufficientFunds { .. }) if !retried => {
                    tracing::info!(
                        %recipient, %unit, %amount,
                        "Faucet balance moved under us, re-planning once"
                    );
                    retried = true;
                }
                Err(err @ GatewayError::InsufficientFunds { .. }) => {
                    tracing::warn!(%recipient, %unit, error = %err, "Submission rejected after retry");
                    return Ok(TransferOutcome::failed(
                        OutcomeStatus::InsufficientFunds,
                        unit,
                        None,
                        err.to_string(),
                    ));
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Wait for confirmation and turn the result into an outcome.
    async fn confirm(
        &self,
        recipient: &Address,
        pending: PendingTransfer,
        partial: bool,
    ) -> TransferOutcome {
        let unit = pending.unit;
        let result = self
            .gateway
            .await_confirmation(&pending, self.config.confirmation_timeout)
            .await;

        match result {
            Ok(confirmation) => {
                let amount = self.display(pending.amount, unit);
                tracing::info!(
                    %recipient, %unit, %amount,
                    tx = %confirmation.confirmation_id,
                    block = confirmation.block_number,
                    "Faucet transfer confirmed"
                );
                TransferOutcome::confirmed(unit, amount, confirmation.confirmation_id, partial)
            }
            Err(GatewayError::ConfirmationTimeout { confirmation_id, waited }) => {
                tracing::warn!(
                    %recipient, %unit, tx = %confirmation_id, ?waited,
                    "Faucet transfer not confirmed in time; it may still land"
                );
                TransferOutcome::failed(
                    OutcomeStatus::ConfirmationTimeout,
                    unit,
                    Some(confirmation_id),
                    format!("Not confirmed within {}s; transfer may still land", waited.as_secs()),
                )
            }
            Err(GatewayError::TransactionReverted { confirmation_id }) => {
                tracing::warn!(%recipient, %unit, tx = %confirmation_id, "Faucet transfer reverted");
                TransferOutcome::failed(
                    OutcomeStatus::TransactionReverted,
                    unit,
                    Some(confirmation_id),
                    "Ledger reverted the transfer; no funds moved",
                )
            }
            Err(err) => {
                // Submitted, so the transfer may still land; keep the hash.
                tracing::error!(%recipient, %unit, tx = %pending.confirmation_id, error = %err, "Lost track of faucet transfer");
                let status = if err.is_unavailable() {
                    OutcomeStatus::GatewayUnavailable
                } else {
                    OutcomeStatus::ConfirmationTimeout
                };
                TransferOutcome::failed(status, unit, Some(pending.confirmation_id), err.to_string())
            }
        }
    }
}
