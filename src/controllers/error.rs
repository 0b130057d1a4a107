use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::debug;

use crate::services::{
    booking_flow::FlowError,
    booking_store::StoreError,
    payment::PaymentError,
    session::SessionError,
};

/// Ошибка обработчика. Тело всегда `{"error": ...}`, плюс подсказки там,
/// где клиенту есть что показать.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Flow(#[from] FlowError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Payment(#[from] PaymentError),
    #[error("no booking in progress")]
    NoActiveFlow,
    #[error("{0}")]
    BadRequest(String),
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::NoActiveFlow => ApiError::NoActiveFlow,
            SessionError::Flow(err) => ApiError::Flow(err),
            SessionError::Store(err) => ApiError::Store(err),
        }
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Flow(err) => match err {
                FlowError::MovieNotFound(_) | FlowError::TheaterNotFound(_) => StatusCode::NOT_FOUND,
                FlowError::InvalidStep { .. } => StatusCode::CONFLICT,
                FlowError::ShowtimeUnavailable(_)
                | FlowError::DateOutOfRange(_)
                | FlowError::UnknownSeat(_)
                | FlowError::NothingSelected => StatusCode::UNPROCESSABLE_ENTITY,
            },
            ApiError::Store(err) => match err {
                StoreError::BookingNotFound(_) | StoreError::ShowtimeNotFound(_) => StatusCode::NOT_FOUND,
                StoreError::InvalidTransition(_) | StoreError::SeatUnavailable(_) => StatusCode::CONFLICT,
                StoreError::TooManySeats { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                StoreError::HoldExpired => StatusCode::GONE,
            },
            ApiError::Payment(err) => match err {
                PaymentError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
                PaymentError::NoPendingBooking => StatusCode::NOT_FOUND,
                PaymentError::StaleBooking(_) => StatusCode::CONFLICT,
                PaymentError::HoldExpired => StatusCode::GONE,
            },
            ApiError::NoActiveFlow => StatusCode::CONFLICT,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    fn body(&self) -> Value {
        match self {
            // страница "фильм не найден" с единственной кнопкой "на главную"
            ApiError::Flow(FlowError::MovieNotFound(_)) => {
                json!({ "error": self.to_string(), "action": "home" })
            }
            ApiError::Payment(PaymentError::Validation(errors)) => {
                let fields: BTreeMap<String, Vec<String>> = errors
                    .field_errors()
                    .into_iter()
                    .map(|(field, errs)| {
                        let messages = errs
                            .iter()
                            .map(|e| {
                                e.message
                                    .as_ref()
                                    .map(|m| m.to_string())
                                    .unwrap_or_else(|| e.code.to_string())
                            })
                            .collect();
                        (camel_case(&field), messages)
                    })
                    .collect();
                json!({ "error": "invalid payment form", "fields": fields })
            }
            _ => json!({ "error": self.to_string() }),
        }
    }
}

/// Имя поля формы так, как его прислал клиент: `accepted_terms` -> `acceptedTerms`.
fn camel_case(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    let mut upper = false;
    for c in field.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            out.push(c.to_ascii_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        debug!("Request failed with {}: {}", status, self);
        (status, Json(self.body())).into_response()
    }
}
