//! Domain module
//!
//! Core value types shared by the reconciler, orchestrator and history
//! aggregator.

pub mod address;
pub mod amount;
pub mod context;
pub mod error;
pub mod events;
pub mod outcome;

pub use address::{Address, AddressError};
pub use amount::{Amount, AmountError, BaseUnits, Unit, CURRENCY_DECIMALS, MAX_DISPLAY_DECIMALS};
pub use context::OperationContext;
pub use error::DomainError;
pub use events::{Direction, HistoryEntry, TransferEvent};
pub use outcome::{OnboardingResult, OutcomeStatus, StepResult, TransferOutcome};
