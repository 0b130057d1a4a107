use axum::{
    extract::Path,
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;

use super::{booking::SeatRequest, ApiError};
use crate::middleware::CurrentSession;
use crate::models::{CartItem, SeatId};
use crate::services::session::Session;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/cart", get(get_cart).delete(clear_cart))
        .route("/cart/seats", post(add_seat))
        .route("/cart/seats/{seat}", delete(remove_seat))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CartResponse {
    cart: Option<CartItem>,
    time_remaining: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    changed: Option<bool>,
}

impl CartResponse {
    async fn of(session: &Session, changed: Option<bool>) -> Self {
        CartResponse {
            cart: session.store.cart().await,
            time_remaining: session.store.time_remaining(),
            changed,
        }
    }
}

// GET /api/cart
async fn get_cart(session: CurrentSession) -> Json<CartResponse> {
    Json(CartResponse::of(&session, None).await)
}

// DELETE /api/cart
async fn clear_cart(session: CurrentSession) -> StatusCode {
    session.store.clear_cart().await;
    StatusCode::NO_CONTENT
}

// POST /api/cart/seats
async fn add_seat(
    session: CurrentSession,
    Json(req): Json<SeatRequest>,
) -> Result<Json<CartResponse>, ApiError> {
    let seat = req.seat_id()?;
    let added = session.store.add_seat(seat).await;
    Ok(Json(CartResponse::of(&session, Some(added)).await))
}

// DELETE /api/cart/seats/{seat}
async fn remove_seat(
    session: CurrentSession,
    Path(seat): Path<String>,
) -> Result<Json<CartResponse>, ApiError> {
    let seat: SeatId = seat
        .parse()
        .map_err(|e: crate::models::seat::ParseSeatIdError| ApiError::BadRequest(e.to_string()))?;
    let removed = session.store.remove_seat(seat).await;
    Ok(Json(CartResponse::of(&session, Some(removed)).await))
}
