//! Onboarding Orchestrator
//!
//! Funds a newly registered address with gas and then tokens. The two steps
//! are independent reconciliations: a failed token step never undoes the gas
//! step, and a failed gas step only blocks the token step when the recipient
//! has no gas of its own to pay the token transfer fee.

use std::sync::Arc;

use crate::directory::{DirectoryError, UserDirectory};
use crate::domain::{
    Address, Amount, AmountError, BaseUnits, DomainError, OnboardingResult, OutcomeStatus,
    StepResult, TransferOutcome, Unit, CURRENCY_DECIMALS,
};
use crate::gateway::{GatewayError, LedgerGateway};
use crate::reconciler::{BalanceReconciler, ReconcilerConfig};

/// Reason recorded when the token step cannot pay its own fee
pub const SKIPPED_NO_GAS: &str = "no gas balance to pay token transfer fees";

/// Errors that prevent onboarding from starting
#[derive(Debug, thiserror::Error)]
pub enum OnboardingError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("User not found: {0}")]
    UnknownUser(String),

    #[error(transparent)]
    Directory(#[from] DirectoryError),
}

/// Targets for new users plus the reconciler settings they are funded with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OnboardingConfig {
    pub initial_gas_balance: BaseUnits,
    pub initial_token_balance: BaseUnits,
    pub reconciler: ReconcilerConfig,
}

impl OnboardingConfig {
    /// Build from display amounts; conversion rounds down.
    pub fn from_display(
        initial_gas_balance: Amount,
        initial_token_balance: Amount,
        reserve_gas: Amount,
        reserve_tokens: Amount,
        token_decimals: u32,
        confirmation_timeout: std::time::Duration,
    ) -> Result<Self, AmountError> {
        Ok(Self {
            initial_gas_balance: initial_gas_balance.to_base_units(CURRENCY_DECIMALS)?,
            initial_token_balance: initial_token_balance.to_base_units(token_decimals)?,
            reconciler: ReconcilerConfig {
                reserve_currency: reserve_gas.to_base_units(CURRENCY_DECIMALS)?,
                reserve_token: reserve_tokens.to_base_units(token_decimals)?,
                confirmation_timeout,
            },
        })
    }

    pub fn target(&self, unit: Unit) -> BaseUnits {
        match unit {
            Unit::Currency => self.initial_gas_balance,
            Unit::Token => self.initial_token_balance,
        }
    }
}

/// Turn a gateway error that escaped reconciliation into a recorded outcome.
pub fn outcome_from_error(unit: Unit, err: &GatewayError) -> TransferOutcome {
    let status = match err {
        GatewayError::InsufficientFunds { .. } => OutcomeStatus::InsufficientFunds,
        GatewayError::ConfirmationTimeout { .. } => OutcomeStatus::ConfirmationTimeout,
        GatewayError::TransactionReverted { .. } => OutcomeStatus::TransactionReverted,
        _ => OutcomeStatus::GatewayUnavailable,
    };
    TransferOutcome::failed(status, unit, None, err.to_string())
}

/// Onboards addresses, optionally resolving usernames first.
#[derive(Clone)]
pub struct OnboardingOrchestrator {
    reconciler: BalanceReconciler,
    directory: Arc<dyn UserDirectory>,
    config: OnboardingConfig,
}

impl OnboardingOrchestrator {
    pub fn new(
        gateway: Arc<dyn LedgerGateway>,
        directory: Arc<dyn UserDirectory>,
        config: OnboardingConfig,
    ) -> Self {
        Self {
            reconciler: BalanceReconciler::new(gateway, config.reconciler),
            directory,
            config,
        }
    }

    pub fn reconciler(&self) -> &BalanceReconciler {
        &self.reconciler
    }

    pub fn config(&self) -> &OnboardingConfig {
        &self.config
    }

    /// Run one funding step, recording ledger failures instead of aborting.
    async fn fund(&self, address: &Address, unit: Unit) -> TransferOutcome {
        let result = self
            .reconciler
            .reconcile(address, self.config.target(unit), unit)
            .await;

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::error!(%address, %unit, error = %err, "Funding step failed at the ledger");
                outcome_from_error(unit, &err)
            }
        };

        if outcome.status == OutcomeStatus::FaucetExhausted {
            tracing::warn!(
                %address, %unit, faucet = %self.reconciler.gateway().faucet_address(),
                "ALERT: faucet exhausted during onboarding, refill required"
            );
        }
        outcome
    }

    /// Fund `address` with gas, then tokens.
    pub async fn onboard(&self, address: &Address) -> Result<OnboardingResult, OnboardingError> {
        let gateway = self.reconciler.gateway();
        if address == gateway.faucet_address() {
            return Err(DomainError::FaucetRecipient(address.to_string()).into());
        }

        tracing::info!(%address, "Onboarding address");

        let gas = self.fund(address, Unit::Currency).await;

        let token = if gas.success {
            StepResult::Attempted(self.fund(address, Unit::Token).await)
        } else {
            match gateway.read_balance(address, Unit::Currency).await {
                Ok(balance) if !balance.is_zero() => {
                    tracing::info!(%address, %balance, "Gas step failed; recipient has own gas, funding tokens");
                    StepResult::Attempted(self.fund(address, Unit::Token).await)
                }
                Ok(_) => {
                    tracing::warn!(%address, gas_status = %gas.status, "Skipping token step: {}", SKIPPED_NO_GAS);
                    StepResult::Skipped {
                        reason: SKIPPED_NO_GAS.to_string(),
                    }
                }
                Err(err) => {
                    tracing::error!(%address, error = %err, "Could not read recipient gas balance");
                    StepResult::Attempted(outcome_from_error(Unit::Token, &err))
                }
            }
        };

        let result = OnboardingResult {
            address: address.clone(),
            gas: StepResult::Attempted(gas),
            token,
        };

        tracing::info!(
            %address,
            fully_funded = result.fully_funded(),
            token_skipped = result.token.is_skipped(),
            "Onboarding finished"
        );
        Ok(result)
    }

    /// Resolve `username` through the directory and onboard its address.
    pub async fn onboard_user(&self, username: &str) -> Result<OnboardingResult, OnboardingError> {
        let address = self
            .directory
            .lookup_address(username)
            .await?
            .ok_or_else(|| OnboardingError::UnknownUser(username.to_string()))?;

        tracing::debug!(username, %address, "Resolved user address");
        self.onboard(&address).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::directory::InMemoryDirectory;
    use crate::gateway::{ConfirmationMode, InMemoryLedger};
    use rust_decimal_macros::dec;

    const ONE: u128 = 1_000_000_000_000_000_000;

    fn addr(n: u8) -> Address {
        Address::parse(&format!("0x{:040x}", n)).unwrap()
    }

    fn config() -> OnboardingConfig {
        OnboardingConfig {
            initial_gas_balance: BaseUnits(ONE),
            initial_token_balance: BaseUnits(10 * ONE),
            reconciler: ReconcilerConfig {
                reserve_currency: BaseUnits(ONE / 10),
                reserve_token: BaseUnits::ZERO,
                confirmation_timeout: Duration::from_secs(1),
            },
        }
    }

    async fn setup(faucet_gas: u128, faucet_tokens: u128) -> (Arc<InMemoryLedger>, Arc<InMemoryDirectory>, OnboardingOrchestrator) {
        let ledger = Arc::new(InMemoryLedger::new(addr(0xfa), 18));
        ledger.set_balance(&addr(0xfa), Unit::Currency, BaseUnits(faucet_gas)).await;
        ledger.set_balance(&addr(0xfa), Unit::Token, BaseUnits(faucet_tokens)).await;
        let directory = Arc::new(InMemoryDirectory::new());
        let orchestrator = OnboardingOrchestrator::new(ledger.clone(), directory.clone(), config());
        (ledger, directory, orchestrator)
    }

    #[test]
    fn test_config_from_display_rounds_down() {
        let config = OnboardingConfig::from_display(
            Amount::new(dec!(1.5)).unwrap(),
            Amount::new(dec!(0.0000009)).unwrap(),
            Amount::zero(),
            Amount::zero(),
            6,
            Duration::from_secs(30),
        )
        .unwrap();
        assert_eq!(config.initial_gas_balance, BaseUnits(1_500_000_000_000_000_000));
        assert_eq!(config.initial_token_balance, BaseUnits::ZERO);
    }

    #[tokio::test]
    async fn test_onboard_funds_gas_then_tokens() {
        let (ledger, _, orchestrator) = setup(10 * ONE, 100 * ONE).await;

        let result = orchestrator.onboard(&addr(1)).await.unwrap();

        assert!(result.fully_funded());
        assert_eq!(result.gas.outcome().unwrap().amount, dec!(1));
        assert_eq!(result.token.outcome().unwrap().amount, dec!(10));
        assert_eq!(ledger.balance_of(&addr(1), Unit::Currency).await, BaseUnits(ONE));
        assert_eq!(ledger.balance_of(&addr(1), Unit::Token).await, BaseUnits(10 * ONE));
    }

    #[tokio::test]
    async fn test_onboard_twice_does_not_double_fund() {
        let (ledger, _, orchestrator) = setup(10 * ONE, 100 * ONE).await;

        orchestrator.onboard(&addr(1)).await.unwrap();
        let again = orchestrator.onboard(&addr(1)).await.unwrap();

        assert_eq!(again.gas.outcome().unwrap().status, OutcomeStatus::AlreadyFunded);
        assert_eq!(again.token.outcome().unwrap().status, OutcomeStatus::AlreadyFunded);
        assert_eq!(ledger.submission_count().await, 2);
    }

    #[tokio::test]
    async fn test_token_step_skipped_without_gas() {
        // Faucet gas sits below its reserve, so the gas step is exhausted.
        let (ledger, _, orchestrator) = setup(ONE / 20, 100 * ONE).await;

        let result = orchestrator.onboard(&addr(1)).await.unwrap();

        assert_eq!(result.gas.outcome().unwrap().status, OutcomeStatus::FaucetExhausted);
        assert!(result.token.is_skipped());
        assert!(matches!(result.token, StepResult::Skipped { ref reason } if reason == SKIPPED_NO_GAS));
        assert_eq!(ledger.submission_count().await, 0);
    }

    #[tokio::test]
    async fn test_token_step_attempted_with_own_gas() {
        let (ledger, _, orchestrator) = setup(ONE / 20, 100 * ONE).await;
        ledger.set_balance(&addr(1), Unit::Currency, BaseUnits(ONE / 2)).await;

        let result = orchestrator.onboard(&addr(1)).await.unwrap();

        assert!(!result.gas.is_success());
        assert!(result.token.is_success());
        assert!(!result.fully_funded());
    }

    #[tokio::test]
    async fn test_reverted_gas_does_not_roll_back_or_block_with_gas() {
        let (ledger, _, orchestrator) = setup(10 * ONE, 100 * ONE).await;
        ledger.set_balance(&addr(1), Unit::Currency, BaseUnits(1)).await;
        ledger.script_confirmation(ConfirmationMode::Revert).await;

        let result = orchestrator.onboard(&addr(1)).await.unwrap();

        assert_eq!(result.gas.outcome().unwrap().status, OutcomeStatus::TransactionReverted);
        assert_eq!(result.token.outcome().unwrap().status, OutcomeStatus::Confirmed);
    }

    #[tokio::test]
    async fn test_unavailable_ledger_recorded_not_raised() {
        let (ledger, _, orchestrator) = setup(10 * ONE, 100 * ONE).await;
        ledger.set_available(false).await;

        let result = orchestrator.onboard(&addr(1)).await.unwrap();

        assert_eq!(result.gas.outcome().unwrap().status, OutcomeStatus::GatewayUnavailable);
        assert_eq!(result.token.outcome().unwrap().status, OutcomeStatus::GatewayUnavailable);
    }

    #[tokio::test]
    async fn test_faucet_cannot_onboard_itself() {
        let (_, _, orchestrator) = setup(10 * ONE, 100 * ONE).await;

        let err = orchestrator.onboard(&addr(0xfa)).await.unwrap_err();
        assert!(matches!(err, OnboardingError::Domain(DomainError::FaucetRecipient(_))));
    }

    #[tokio::test]
    async fn test_onboard_user_resolves_directory() {
        let (ledger, directory, orchestrator) = setup(10 * ONE, 100 * ONE).await;
        directory.insert("alice", addr(7)).await;

        let result = orchestrator.onboard_user("alice").await.unwrap();
        assert_eq!(result.address, addr(7));
        assert_eq!(ledger.balance_of(&addr(7), Unit::Token).await, BaseUnits(10 * ONE));

        let err = orchestrator.onboard_user("nobody").await.unwrap_err();
        assert!(matches!(err, OnboardingError::UnknownUser(ref name) if name == "nobody"));
    }
}
