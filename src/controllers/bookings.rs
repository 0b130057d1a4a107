use axum::{
    extract::Path,
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;

use super::ApiError;
use crate::middleware::CurrentSession;
use crate::models::Booking;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/bookings", get(list_bookings))
        .route("/bookings/refresh", post(refresh_bookings))
        .route("/bookings/{booking_id}/cancel", post(cancel_booking))
}

// GET /api/bookings
async fn list_bookings(session: CurrentSession) -> Json<Vec<Booking>> {
    Json(session.store.bookings())
}

// POST /api/bookings/refresh
async fn refresh_bookings(session: CurrentSession) -> Json<Vec<Booking>> {
    session.store.refresh_bookings().await;
    Json(session.store.bookings())
}

// POST /api/bookings/{booking_id}/cancel
async fn cancel_booking(
    session: CurrentSession,
    Path(booking_id): Path<String>,
) -> Result<Json<Booking>, ApiError> {
    let booking = session.store.cancel_booking(&booking_id).await?;
    Ok(Json(booking))
}
