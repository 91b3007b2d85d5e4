//! Transfer and onboarding outcomes
//!
//! Value types returned to callers after a reconciliation attempt. An outcome
//! is built once, after the ledger confirmed or the attempt ended, and is
//! never partially filled in.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{Address, Unit};

/// How a reconciliation attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    /// Transfer confirmed on the ledger
    Confirmed,
    /// Recipient already at or above target; nothing sent
    AlreadyFunded,
    /// Faucet has nothing left above its reserve
    FaucetExhausted,
    /// Ledger rejected the submission for lack of funds (after one retry)
    InsufficientFunds,
    /// Submitted but not confirmed in time; the transfer may still land
    ConfirmationTimeout,
    /// Ledger reported the transfer as failed; no funds moved
    TransactionReverted,
    /// Ledger endpoint unreachable
    GatewayUnavailable,
}

impl OutcomeStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, OutcomeStatus::Confirmed | OutcomeStatus::AlreadyFunded)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeStatus::Confirmed => "confirmed",
            OutcomeStatus::AlreadyFunded => "already_funded",
            OutcomeStatus::FaucetExhausted => "faucet_exhausted",
            OutcomeStatus::InsufficientFunds => "insufficient_funds",
            OutcomeStatus::ConfirmationTimeout => "confirmation_timeout",
            OutcomeStatus::TransactionReverted => "transaction_reverted",
            OutcomeStatus::GatewayUnavailable => "gateway_unavailable",
        }
    }
}

impl std::fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one reconciliation call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferOutcome {
    pub success: bool,
    pub status: OutcomeStatus,
    pub unit: Unit,
    /// Amount actually sent, in display units (zero unless confirmed)
    pub amount: Decimal,
    /// Transaction hash; present for confirmed, reverted and timed-out sends
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmation_id: Option<String>,
    /// True when the faucet could only cover part of what was needed
    #[serde(default)]
    pub partial: bool,
    pub message: String,
}

impl TransferOutcome {
    fn build(
        status: OutcomeStatus,
        unit: Unit,
        amount: Decimal,
        confirmation_id: Option<String>,
        partial: bool,
        message: String,
    ) -> Self {
        Self {
            success: status.is_success(),
            status,
            unit,
            amount,
            confirmation_id,
            partial,
            message,
        }
    }

    pub fn confirmed(unit: Unit, amount: Decimal, confirmation_id: String, partial: bool) -> Self {
        let message = if partial {
            format!("Sent {} {} (partial: faucet limited by reserve)", amount, unit)
        } else {
            format!("Sent {} {}", amount, unit)
        };
        Self::build(OutcomeStatus::Confirmed, unit, amount, Some(confirmation_id), partial, message)
    }

    pub fn already_funded(unit: Unit, current: Decimal, target: Decimal) -> Self {
        Self::build(
            OutcomeStatus::AlreadyFunded,
            unit,
            Decimal::ZERO,
            None,
            false,
            format!("Balance {} {} already meets target {}", current, unit, target),
        )
    }

    pub fn faucet_exhausted(unit: Unit, faucet: Decimal, reserve: Decimal) -> Self {
        Self::build(
            OutcomeStatus::FaucetExhausted,
            unit,
            Decimal::ZERO,
            None,
            false,
            format!(
                "Faucet {} balance {} has nothing above reserve {}",
                unit, faucet, reserve
            ),
        )
    }

    /// Faucet gas can't pay the fee for a transfer of `unit` above the gas reserve.
    pub fn fee_unaffordable(unit: Unit, gas: Decimal, required: Decimal) -> Self {
        Self::build(
            OutcomeStatus::FaucetExhausted,
            unit,
            Decimal::ZERO,
            None,
            false,
            format!(
                "Faucet gas balance {} cannot pay the {} transfer fee (needs {} including reserve)",
                gas, unit, required
            ),
        )
    }

    pub fn failed(
        status: OutcomeStatus,
        unit: Unit,
        confirmation_id: Option<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::build(status, unit, Decimal::ZERO, confirmation_id, false, message.into())
    }
}

/// One step of onboarding: either attempted (with its outcome) or skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum StepResult {
    Attempted(TransferOutcome),
    Skipped { reason: String },
}

impl StepResult {
    pub fn outcome(&self) -> Option<&TransferOutcome> {
        match self {
            StepResult::Attempted(outcome) => Some(outcome),
            StepResult::Skipped { .. } => None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome().map(|o| o.success).unwrap_or(false)
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, StepResult::Skipped { .. })
    }
}

/// Aggregated result of onboarding one address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnboardingResult {
    pub address: Address,
    pub gas: StepResult,
    pub token: StepResult,
}

impl OnboardingResult {
    /// Both steps ended in a successful outcome.
    pub fn fully_funded(&self) -> bool {
        self.gas.is_success() && self.token.is_success()
    }
}
