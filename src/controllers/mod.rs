pub mod booking;
pub mod bookings;
pub mod cart;
pub mod error;
pub mod movies;
pub mod payment;

pub use error::ApiError;

use axum::Router;
use std::sync::Arc;

pub fn routes() -> Router<Arc<crate::AppState>> {
    Router::new()
        .merge(movies::routes())
        .merge(booking::routes())
        .merge(cart::routes())
        .merge(payment::routes())
        .merge(bookings::routes())
}
