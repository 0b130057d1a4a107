use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::seat::SeatId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Momo,
    Vnpay,
    Card,
}

/// Корзина: зафиксированный набор мест, который держится таймером.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub movie_id: String,
    pub theater_id: String,
    pub showtime_id: String,
    pub seats: BTreeSet<SeatId>,
    pub total_price: u64,
}

/// То, что мастер бронирования передаёт на страницу оплаты.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingBooking {
    pub movie_id: String,
    pub theater_id: String,
    pub showtime_id: String,
    pub seats: BTreeSet<SeatId>,
    pub total_price: u64,
}

impl From<PendingBooking> for CartItem {
    fn from(pending: PendingBooking) -> Self {
        CartItem {
            movie_id: pending.movie_id,
            theater_id: pending.theater_id,
            showtime_id: pending.showtime_id,
            seats: pending.seats,
            total_price: pending.total_price,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub id: String,
    pub user_id: String,
    pub movie_id: String,
    pub theater_id: String,
    pub showtime_id: String,
    pub seats: BTreeSet<SeatId>,
    pub total_price: u64,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: String,
    pub payment_method: Option<PaymentMethod>,
    pub status: BookingStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("booking {id} cannot move from {from:?} to cancelled")]
pub struct InvalidTransition {
    pub id: String,
    pub from: BookingStatus,
}

impl Booking {
    /// Отмена возможна только из `confirmed` и необратима.
    pub fn cancel(&mut self) -> Result<(), InvalidTransition> {
        match self.status {
            BookingStatus::Confirmed => {
                self.status = BookingStatus::Cancelled;
                Ok(())
            }
            from => Err(InvalidTransition { id: self.id.clone(), from }),
        }
    }
}
