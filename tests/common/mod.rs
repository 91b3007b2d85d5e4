//! Common test utilities

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use faucet_onboarding::api::{self, AppState};
use faucet_onboarding::directory::InMemoryDirectory;
use faucet_onboarding::domain::{Address, BaseUnits, Unit};
use faucet_onboarding::gateway::InMemoryLedger;
use faucet_onboarding::onboarding::OnboardingConfig;
use faucet_onboarding::reconciler::ReconcilerConfig;

/// One whole unit at 18 decimals
pub const ONE: u128 = 1_000_000_000_000_000_000;

pub fn addr(n: u8) -> Address {
    Address::parse(&format!("0x{:040x}", n)).unwrap()
}

pub fn faucet() -> Address {
    addr(0xfa)
}

/// Defaults matching a fresh deployment: 1 gas and 10 tokens per user,
/// 0.1 gas held back.
pub fn onboarding_config() -> OnboardingConfig {
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

pub struct TestEnv {
    pub ledger: Arc<InMemoryLedger>,
    pub directory: Arc<InMemoryDirectory>,
    pub state: AppState,
}

impl TestEnv {
    pub fn router(&self) -> axum::Router {
        api::build_router(self.state.clone())
    }
}

/// Ledger with a funded faucet and an empty directory
pub async fn setup(faucet_gas: u128, faucet_tokens: u128) -> TestEnv {
    setup_with_config(faucet_gas, faucet_tokens, onboarding_config()).await
}

pub async fn setup_with_config(
    faucet_gas: u128,
    faucet_tokens: u128,
    config: OnboardingConfig,
) -> TestEnv {
    let ledger = Arc::new(InMemoryLedger::new(faucet(), 18));
    ledger.set_balance(&faucet(), Unit::Currency, BaseUnits(faucet_gas)).await;
    ledger.set_balance(&faucet(), Unit::Token, BaseUnits(faucet_tokens)).await;

    let directory = Arc::new(InMemoryDirectory::new());
    let state = AppState::new(ledger.clone(), directory.clone(), config);

    TestEnv {
        ledger,
        directory,
        state,
    }
}
