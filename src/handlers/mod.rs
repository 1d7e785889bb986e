pub mod health;
pub mod verify;

pub use health::*;
pub use verify::*;

use crate::services::{ChainClient, PaymentStore, PaymentVerifier};
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Instant;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, TraceLayer},
};

#[derive(Clone)]
pub struct AppState {
    pub verifier: Arc<PaymentVerifier>,
    pub chain: Arc<dyn ChainClient>,
    pub store: Arc<dyn PaymentStore>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(
        verifier: Arc<PaymentVerifier>,
        chain: Arc<dyn ChainClient>,
        store: Arc<dyn PaymentStore>,
    ) -> Self {
        Self {
            verifier,
            chain,
            store,
            started_at: Instant::now(),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/verify-payment", post(verify_payment).options(preflight))
        .with_state(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default().include_headers(true)),
        )
        .layer(CorsLayer::permissive())
}
