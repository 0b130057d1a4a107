use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;

use super::ApiError;
use crate::middleware::CurrentSession;
use crate::models::{Booking, PendingBooking};
use crate::services::payment::PaymentForm;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/payment", post(submit_payment))
        .route("/payment/pending", get(pending_payment))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PendingResponse {
    pending: PendingBooking,
    time_remaining: u64,
}

// GET /api/payment/pending
async fn pending_payment(
    State(state): State<Arc<AppState>>,
    session: CurrentSession,
) -> Result<Json<PendingResponse>, ApiError> {
    let pending = state.payment.pending(&session).await?;
    Ok(Json(PendingResponse {
        pending,
        time_remaining: session.store.time_remaining(),
    }))
}

// POST /api/payment
async fn submit_payment(
    State(state): State<Arc<AppState>>,
    session: CurrentSession,
    Json(form): Json<PaymentForm>,
) -> Result<(StatusCode, Json<Booking>), ApiError> {
    let booking = state.payment.submit(&session, form).await?;
    Ok((StatusCode::CREATED, Json(booking)))
}
