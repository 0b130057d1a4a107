//! payment.rs
//!
//! Имитация оплаты. Реального шлюза нет:
//! 1.  Заказ забирается из слота передачи сессии (его туда кладёт мастер).
//!     Пока идёт оплата, второй запрос его уже не увидит.
//! 2.  Данные покупателя проверяются через `validator`.
//! 3.  Удержание мест должно быть ещё живо, иначе заказ сгорает.
//! 4.  После фиксированной задержки корзина одним шагом превращается в
//!     подтверждённое бронирование, удержание останавливается.
//!
//! Если оплата оборвалась раньше (форма с ошибками, клиент ушёл), заказ
//! возвращается в слот.

use chrono::Utc;
use serde::Deserialize;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::config::PaymentConfig;
use crate::models::{Booking, BookingStatus, PaymentMethod, PendingBooking};
use crate::services::session::{HandoffSlot, Session};

#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("invalid payment form: {0}")]
    Validation(#[from] ValidationErrors),
    #[error("no pending booking to pay for")]
    NoPendingBooking,
    #[error("pending booking refers to unknown {0}")]
    StaleBooking(String),
    #[error("seat hold expired, start the booking again")]
    HoldExpired,
}

/// Форма оплаты со страницы покупателя.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PaymentForm {
    #[validate(custom(function = "validate_name"))]
    pub name: String,
    #[validate(email(message = "enter a valid email"))]
    pub email: String,
    #[validate(custom(function = "validate_phone"))]
    pub phone: String,
    pub method: PaymentMethod,
    #[validate(custom(function = "validate_terms"))]
    pub accepted_terms: bool,
    #[serde(default)]
    pub user_id: Option<String>,
}

fn validate_name(name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        return Err(ValidationError::new("required").with_message("enter your full name".into()));
    }
    Ok(())
}

/// `0` и ещё 9-10 цифр.
fn validate_phone(phone: &str) -> Result<(), ValidationError> {
    let phone = phone.trim();
    let valid = phone.starts_with('0')
        && (10..=11).contains(&phone.len())
        && phone.chars().all(|c| c.is_ascii_digit());
    if !valid {
        return Err(ValidationError::new("phone")
            .with_message("enter a valid phone number (10-11 digits)".into()));
    }
    Ok(())
}

fn validate_terms(accepted: &bool) -> Result<(), ValidationError> {
    if !*accepted {
        return Err(ValidationError::new("terms").with_message("accept the terms of use".into()));
    }
    Ok(())
}

/// Заказ, забранный из слота на время оплаты. Без явного `discard`
/// возвращается в слот при drop.
struct ClaimedOrder<'a> {
    slot: &'a HandoffSlot,
    pending: PendingBooking,
    restore: bool,
}

impl<'a> ClaimedOrder<'a> {
    fn claim(slot: &'a HandoffSlot) -> Option<Self> {
        let pending = slot.take()?;
        Some(Self { slot, pending, restore: true })
    }

    fn discard(mut self) {
        self.restore = false;
    }
}

impl Drop for ClaimedOrder<'_> {
    fn drop(&mut self) {
        if self.restore {
            self.slot.restore(self.pending.clone());
        }
    }
}

#[derive(Debug, Clone)]
pub struct PaymentService {
    processing_delay: Duration,
}

impl PaymentService {
    pub fn from_config(config: &PaymentConfig) -> Self {
        Self {
            processing_delay: Duration::from_millis(config.processing_delay_ms),
        }
    }

    /// Заказ, ожидающий оплаты. Заказ с истёкшим удержанием убирается.
    pub async fn pending(&self, session: &Session) -> Result<PendingBooking, PaymentError> {
        let pending = session.handoff.peek().ok_or(PaymentError::NoPendingBooking)?;
        if let Err(err) = self.check_hold(session, &pending).await {
            session.handoff.remove(&pending);
            return Err(err);
        }
        Ok(pending)
    }

    /// Проводит оплату заказа из слота передачи сессии.
    pub async fn submit(&self, session: &Session, form: PaymentForm) -> Result<Booking, PaymentError> {
        let claim = ClaimedOrder::claim(&session.handoff).ok_or(PaymentError::NoPendingBooking)?;
        form.validate()?;

        let pending = claim.pending.clone();
        let checked = match self.check_references(&pending, session) {
            Ok(()) => self.check_hold(session, &pending).await,
            Err(err) => Err(err),
        };
        if let Err(err) = checked {
            claim.discard();
            return Err(err);
        }

        info!(
            "Processing payment for session {}: {} seats, total {}",
            session.id(),
            pending.seats.len(),
            pending.total_price
        );
        tokio::time::sleep(self.processing_delay).await;

        let PaymentForm { name, email, phone, method, user_id, .. } = form;
        // Корзина могла измениться после checkout: бронируем то, что в ней сейчас
        let result = session
            .store
            .complete_purchase(&pending.showtime_id, move |cart| Booking {
                id: generate_booking_id(),
                user_id: user_id.unwrap_or_default(),
                movie_id: cart.movie_id.clone(),
                theater_id: cart.theater_id.clone(),
                showtime_id: cart.showtime_id.clone(),
                seats: cart.seats.clone(),
                total_price: cart.total_price,
                customer_name: name.trim().to_string(),
                customer_email: email.trim().to_string(),
                customer_phone: phone.trim().to_string(),
                payment_method: Some(method),
                // pending -> confirmed происходит в этом же действии
                status: BookingStatus::Confirmed,
                created_at: Utc::now(),
            })
            .await;
        claim.discard();

        match result {
            Ok(booking) => {
                info!("💳 Payment confirmed, booking {} created", booking.id);
                Ok(booking)
            }
            Err(err) => {
                warn!("Payment for session {} not completed: {}", session.id(), err);
                Err(PaymentError::HoldExpired)
            }
        }
    }

    fn check_references(&self, pending: &PendingBooking, session: &Session) -> Result<(), PaymentError> {
        let catalog = session.catalog();
        let missing = if catalog.movie(&pending.movie_id).is_none() {
            Some(format!("movie {}", pending.movie_id))
        } else if catalog.theater(&pending.theater_id).is_none() {
            Some(format!("theater {}", pending.theater_id))
        } else if catalog.showtime(&pending.showtime_id).is_none() {
            Some(format!("showtime {}", pending.showtime_id))
        } else {
            None
        };

        match missing {
            Some(what) => {
                warn!("Dropping stale pending booking: unknown {}", what);
                Err(PaymentError::StaleBooking(what))
            }
            None => Ok(()),
        }
    }

    /// Удержание живо, пока в корзине лежат места этого сеанса.
    async fn check_hold(&self, session: &Session, pending: &PendingBooking) -> Result<(), PaymentError> {
        match session.store.cart().await {
            Some(cart) if cart.showtime_id == pending.showtime_id && !cart.seats.is_empty() => Ok(()),
            _ => {
                warn!("Seat hold for session {} is gone, dropping pending booking", session.id());
                Err(PaymentError::HoldExpired)
            }
        }
    }
}

/// `VCN` + миллисекунды в base36 + короткий случайный хвост.
fn generate_booking_id() -> String {
    let mut millis = Utc::now().timestamp_millis().max(0) as u64;
    let mut digits = Vec::new();
    loop {
        let digit = (millis % 36) as u32;
        digits.push(std::char::from_digit(digit, 36).unwrap_or('0').to_ascii_uppercase());
        millis /= 36;
        if millis == 0 {
            break;
        }
    }
    let stamp: String = digits.into_iter().rev().collect();
    let suffix = Uuid::new_v4().simple().to_string()[..4].to_ascii_uppercase();
    format!("VCN{}{}", stamp, suffix)
}
