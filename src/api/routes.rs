//! API Routes
//!
//! HTTP endpoint definitions.

use axum::{
    extract::{Extension, Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::{
    Address, Amount, DomainError, HistoryEntry, OnboardingResult, OperationContext,
    TransferOutcome, Unit,
};
use crate::error::AppError;

use super::AppState;

/// Largest history page a caller may request
pub const MAX_HISTORY_LIMIT: usize = 100;

// =========================================================================
// Request/Response types
// =========================================================================

#[derive(Debug, Deserialize)]
pub struct OnboardRequest {
    pub address: String,
}

#[derive(Debug, Deserialize)]
pub struct ReconcileRequest {
    pub address: String,
    /// Display amount, e.g. "10" or "0.5"
    pub target: String,
    pub unit: Unit,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub address: Address,
    pub entries: Vec<HistoryEntry>,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub address: Address,
    pub currency_balance: Decimal,
    pub token_balance: Decimal,
}

#[derive(Debug, Serialize)]
pub struct FaucetResponse {
    pub address: Address,
    pub currency_balance: Decimal,
    pub token_balance: Decimal,
    pub currency_reserve: Decimal,
    pub token_reserve: Decimal,
}

fn parse_address(raw: &str) -> Result<Address, AppError> {
    Address::parse(raw).map_err(|e| AppError::Domain(DomainError::InvalidAddress(e)))
}

// =========================================================================
// API Router
// =========================================================================

/// Create the API router
pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/onboard", post(onboard))
        .route("/users/:username/onboard", post(onboard_user))
        .route("/reconcile", post(reconcile))
        .route("/balance/:address", get(get_balance))
        .route("/history/:address", get(get_history))
        .route("/faucet", get(get_faucet))
}

// =========================================================================
// POST /onboard
// =========================================================================

/// Fund an address with the initial gas and token balances
async fn onboard(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Json(request): Json<OnboardRequest>,
) -> Result<Json<OnboardingResult>, AppError> {
    let address = parse_address(&request.address)?;
    tracing::info!(correlation_id = %context.correlation_id, %address, "Onboarding requested");

    let result = state.onboarding.onboard(&address).await?;
    Ok(Json(result))
}

// =========================================================================
// POST /users/:username/onboard
// =========================================================================

/// Onboard a registered user by username
async fn onboard_user(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Path(username): Path<String>,
) -> Result<Json<OnboardingResult>, AppError> {
    tracing::info!(correlation_id = %context.correlation_id, %username, "User onboarding requested");

    let result = state.onboarding.onboard_user(&username).await?;
    Ok(Json(result))
}

// =========================================================================
// POST /reconcile
// =========================================================================

/// Top an address up to an arbitrary target
async fn reconcile(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Json(request): Json<ReconcileRequest>,
) -> Result<Json<TransferOutcome>, AppError> {
    let address = parse_address(&request.address)?;
    if &address == state.gateway.faucet_address() {
        return Err(DomainError::FaucetRecipient(address.to_string()).into());
    }

    let target: Amount = request.target.parse().map_err(DomainError::InvalidAmount)?;
    let target = target
        .to_base_units(state.gateway.decimals(request.unit))
        .map_err(DomainError::InvalidAmount)?;

    tracing::info!(
        correlation_id = %context.correlation_id, %address, unit = %request.unit, %target,
        "Reconciliation requested"
    );

    let outcome = state
        .onboarding
        .reconciler()
        .reconcile(&address, target, request.unit)
        .await?;
    Ok(Json(outcome))
}

// =========================================================================
// GET /balance/:address
// =========================================================================

/// Current gas and token balances of any address
async fn get_balance(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Result<Json<BalanceResponse>, AppError> {
    let address = parse_address(&address)?;
    let gateway = &state.gateway;
    let (currency, token) = tokio::try_join!(
        gateway.read_balance(&address, Unit::Currency),
        gateway.read_balance(&address, Unit::Token),
    )?;

    Ok(Json(BalanceResponse {
        currency_balance: currency.to_display(gateway.decimals(Unit::Currency)),
        token_balance: token.to_display(gateway.decimals(Unit::Token)),
        address,
    }))
}

// =========================================================================
// GET /history/:address
// =========================================================================

/// Merged transfer history, newest first
async fn get_history(
    State(state): State<AppState>,
    Path(address): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, AppError> {
    let address = parse_address(&address)?;

    if let Some(requested) = query.limit {
        if requested > MAX_HISTORY_LIMIT {
            return Err(DomainError::LimitTooLarge {
                requested,
                max: MAX_HISTORY_LIMIT,
            }
            .into());
        }
    }

    let entries = state.history.get_history(&address, query.limit).await?;

    Ok(Json(HistoryResponse {
        address,
        count: entries.len(),
        entries,
    }))
}

// =========================================================================
// GET /faucet
// =========================================================================

/// Faucet balances and reserves
async fn get_faucet(State(state): State<AppState>) -> Result<Json<FaucetResponse>, AppError> {
    let gateway = &state.gateway;
    let faucet = gateway.faucet_address();
    let (currency, token) = tokio::try_join!(
        gateway.read_balance(faucet, Unit::Currency),
        gateway.read_balance(faucet, Unit::Token),
    )?;

    let reserves = state.onboarding.reconciler().config();
    let currency_decimals = gateway.decimals(Unit::Currency);
    let token_decimals = gateway.decimals(Unit::Token);

    Ok(Json(FaucetResponse {
        address: faucet.clone(),
        currency_balance: currency.to_display(currency_decimals),
        token_balance: token.to_display(token_decimals),
        currency_reserve: reserves.reserve_currency.to_display(currency_decimals),
        token_reserve: reserves.reserve_token.to_display(token_decimals),
    }))
}
