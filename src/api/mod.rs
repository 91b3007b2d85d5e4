//! API module
//!
//! HTTP API endpoints and middleware. Routing stays thin: every handler
//! validates input, calls one exposed operation and serializes its result.

pub mod middleware;
pub mod routes;

use std::sync::Arc;

use axum::{middleware as axum_middleware, routing::get, Router};
use tower_http::trace::TraceLayer;

use crate::directory::UserDirectory;
use crate::gateway::LedgerGateway;
use crate::history::HistoryAggregator;
use crate::onboarding::{OnboardingConfig, OnboardingOrchestrator};

pub use routes::create_router;

/// Shared services handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<dyn LedgerGateway>,
    pub onboarding: Arc<OnboardingOrchestrator>,
    pub history: Arc<HistoryAggregator>,
}

impl AppState {
    pub fn new(
        gateway: Arc<dyn LedgerGateway>,
        directory: Arc<dyn UserDirectory>,
        config: OnboardingConfig,
    ) -> Self {
        Self {
            onboarding: Arc::new(OnboardingOrchestrator::new(
                gateway.clone(),
                directory,
                config,
            )),
            history: Arc::new(HistoryAggregator::new(gateway.clone())),
            gateway,
        }
    }
}

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    // Layers run last-added first: context -> logging -> handler
    let api_routes = create_router()
        .layer(axum_middleware::from_fn(middleware::logging_middleware))
        .layer(axum_middleware::from_fn(middleware::context_middleware));

    Router::new()
        .route("/health", get(health_check))
        .merge(api_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}
