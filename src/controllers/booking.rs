use axum::{
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::ApiError;
use crate::middleware::CurrentSession;
use crate::models::{seat::SeatRow, Movie, PendingBooking, SeatId, Showtime, Theater};
use crate::services::{
    booking_flow::{BackOutcome, BookingFlow, BookingStep, DateOption, SeatToggle},
    session::Session,
};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/booking", get(current_flow))
        .route("/booking/theater", post(select_theater))
        .route("/booking/date", post(select_date))
        .route("/booking/showtime", post(select_showtime))
        .route("/booking/seats/toggle", post(toggle_seat))
        .route("/booking/back", post(go_back))
        .route("/booking/checkout", post(checkout))
}

/* ---------- view ---------- */

/// Снимок мастера для отрисовки текущего шага.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowView {
    pub step: BookingStep,
    pub step_number: u8,
    pub movie: Option<Movie>,
    pub theaters: Vec<Theater>,
    pub theater: Option<Theater>,
    pub dates: Vec<DateOption>,
    pub date: Option<NaiveDate>,
    pub showtimes: Vec<Showtime>,
    pub showtime: Option<Showtime>,
    pub seat_map: Vec<SeatRow>,
    pub selected: Vec<SeatId>,
    pub total_price: u64,
    pub can_checkout: bool,
}

impl FlowView {
    fn from_flow(flow: &BookingFlow) -> Self {
        let step = flow.step();
        // Карта мест нужна только на третьем шаге
        let seat_map = match (step, flow.showtime()) {
            (BookingStep::SelectingSeats, Some(_)) => flow
                .catalog()
                .seat_config()
                .layout(flow.sold_seats(), flow.selected_seats()),
            _ => Vec::new(),
        };

        FlowView {
            step,
            step_number: step.number(),
            movie: flow.movie().cloned(),
            theaters: flow.catalog().theaters().to_vec(),
            theater: flow.theater().cloned(),
            dates: flow.available_dates(),
            date: flow.date(),
            showtimes: flow.available_showtimes().into_iter().cloned().collect(),
            showtime: flow.showtime().cloned(),
            seat_map,
            selected: flow.selected_seats().iter().copied().collect(),
            total_price: flow.total_price(),
            can_checkout: flow.can_checkout(),
        }
    }

    pub async fn current(session: &Session) -> Result<Self, ApiError> {
        Ok(session.with_flow(|flow| Ok(FlowView::from_flow(flow))).await?)
    }
}

/* ---------- steps ---------- */

// GET /api/booking
async fn current_flow(session: CurrentSession) -> Result<Json<FlowView>, ApiError> {
    FlowView::current(&session).await.map(Json)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SelectTheaterRequest {
    theater_id: String,
}

// POST /api/booking/theater
async fn select_theater(
    session: CurrentSession,
    Json(req): Json<SelectTheaterRequest>,
) -> Result<Json<FlowView>, ApiError> {
    session.with_flow(|flow| flow.select_theater(&req.theater_id)).await?;
    FlowView::current(&session).await.map(Json)
}

#[derive(Debug, Deserialize)]
struct SelectDateRequest {
    date: NaiveDate,
}

// POST /api/booking/date
async fn select_date(
    session: CurrentSession,
    Json(req): Json<SelectDateRequest>,
) -> Result<Json<FlowView>, ApiError> {
    session.with_flow(|flow| flow.select_date(req.date)).await?;
    FlowView::current(&session).await.map(Json)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SelectShowtimeRequest {
    showtime_id: String,
}

// POST /api/booking/showtime
async fn select_showtime(
    session: CurrentSession,
    Json(req): Json<SelectShowtimeRequest>,
) -> Result<Json<FlowView>, ApiError> {
    session.with_flow(|flow| flow.select_showtime(&req.showtime_id)).await?;
    FlowView::current(&session).await.map(Json)
}

#[derive(Debug, Deserialize)]
pub(crate) struct SeatRequest {
    pub seat: String,
}

impl SeatRequest {
    pub(crate) fn seat_id(&self) -> Result<SeatId, ApiError> {
        self.seat
            .parse()
            .map_err(|e: crate::models::seat::ParseSeatIdError| ApiError::BadRequest(e.to_string()))
    }
}

#[derive(Debug, Serialize)]
struct ToggleResponse {
    toggle: SeatToggle,
    booking: FlowView,
}

// POST /api/booking/seats/toggle
async fn toggle_seat(
    session: CurrentSession,
    Json(req): Json<SeatRequest>,
) -> Result<Json<ToggleResponse>, ApiError> {
    let seat = req.seat_id()?;
    let toggle = session.with_flow(|flow| flow.toggle_seat(seat)).await?;
    Ok(Json(ToggleResponse {
        toggle,
        booking: FlowView::current(&session).await?,
    }))
}

#[derive(Debug, Serialize)]
struct BackResponse {
    back: BackOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    booking: Option<FlowView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    next: Option<&'static str>,
}

// POST /api/booking/back
async fn go_back(session: CurrentSession) -> Result<Json<BackResponse>, ApiError> {
    let back = session.back().await?;
    let response = match back {
        BackOutcome::Exit => BackResponse { back, booking: None, next: Some("/api/movies") },
        BackOutcome::Step(_) => BackResponse {
            back,
            booking: Some(FlowView::current(&session).await?),
            next: None,
        },
    };
    Ok(Json(response))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CheckoutResponse {
    pending: PendingBooking,
    hold_seconds: u64,
    next: &'static str,
}

// POST /api/booking/checkout
async fn checkout(
    session: CurrentSession,
) -> Result<(StatusCode, Json<CheckoutResponse>), ApiError> {
    let pending = session.checkout().await?;
    Ok((
        StatusCode::CREATED,
        Json(CheckoutResponse {
            pending,
            hold_seconds: session.store.time_remaining(),
            next: "/api/payment",
        }),
    ))
}
