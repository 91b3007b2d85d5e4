//! faucet_onboarding Library
//!
//! Ledger faucet that funds newly registered users with gas and tokens and
//! serves their merged transfer history. Re-exports modules for integration
//! testing and the binaries.

pub mod api;
pub mod config;
pub mod db;
pub mod directory;
pub mod domain;
pub mod gateway;
pub mod history;
pub mod jobs;
pub mod onboarding;
pub mod reconciler;
pub mod telemetry;

mod error;

pub use config::Config;
pub use error::{AppError, AppResult, ErrorResponse};
pub use domain::{Address, Amount, BaseUnits, OnboardingResult, TransferOutcome, Unit};
