use crate::{
    error::PaymentError,
    handlers::AppState,
    models::{PaymentRequest, VerifyPaymentRequest, VerifyPaymentResponse},
};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};

pub async fn verify_payment(
    State(state): State<AppState>,
    payload: Result<Json<VerifyPaymentRequest>, JsonRejection>,
) -> Result<Json<VerifyPaymentResponse>, PaymentError> {
    // Shape errors are rejected before any I/O and leave no audit row.
    let Json(body) = payload.map_err(|e| {
        PaymentError::InvalidRequest(format!("Invalid request body: {}", e.body_text()))
    })?;
    let request = PaymentRequest::try_from(body)?;

    let verified = state.verifier.verify(&request).await?;

    Ok(Json(verified.into()))
}

/// Bare `OPTIONS` without CORS request headers; real preflights are answered
/// by the CORS layer before reaching this.
pub async fn preflight() -> StatusCode {
    StatusCode::OK
}
