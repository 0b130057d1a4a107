//! Общая обвязка интеграционных тестов: роутер поверх состояния в памяти
//! и запросы через `oneshot` от имени одной сессии.

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::NaiveDate;
use http_body_util::BodyExt;
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

use cinema_booking::{
    config::Config, router, services::catalog::Clock, storage::Storage, AppState,
};

pub const SHOWTIME: &str = "sht_mov_001_tht_001_scr_001_0_0";

pub fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, 10).unwrap()
}

pub struct TestApp {
    pub router: Router,
    pub state: Arc<AppState>,
    pub clock: Clock,
    pub session_id: Uuid,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(Config::for_tests()).await
    }

    /// Приложение с заданной конфигурацией и ручными часами на `today()`.
    pub async fn with_config(config: Config) -> Self {
        let clock = Clock::manual(today());
        let state = AppState::with_clock(config, Storage::in_memory(), clock.clone()).await;
        Self {
            router: router(state.clone()),
            state,
            clock,
            session_id: Uuid::new_v4(),
        }
    }

    /// Ещё один клиент того же приложения.
    pub fn other_session(&self) -> Self {
        Self {
            router: self.router.clone(),
            state: self.state.clone(),
            clock: self.clock.clone(),
            session_id: Uuid::new_v4(),
        }
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.send("GET", uri, None).await
    }

    pub async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.send("POST", uri, Some(body)).await
    }

    pub async fn post_empty(&self, uri: &str) -> (StatusCode, Value) {
        self.send("POST", uri, None).await
    }

    pub async fn delete(&self, uri: &str) -> (StatusCode, Value) {
        self.send("DELETE", uri, None).await
    }

    /// Запрос без заголовка сессии.
    pub async fn anonymous_get(&self, uri: &str) -> StatusCode {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        self.router.clone().oneshot(request).await.unwrap().status()
    }

    async fn send(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("x-session-id", self.session_id.to_string());
        let request = match body {
            Some(json) => builder
                .header("Content-Type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        (status, value)
    }

    /// Выбирает места на карте и оформляет заказ.
    pub async fn checkout(&self, seats: &[&str]) -> Value {
        self.open_seat_map().await;
        for seat in seats {
            self.post("/api/booking/seats/toggle", serde_json::json!({ "seat": seat }))
                .await;
        }
        let (status, body) = self.post_empty("/api/booking/checkout").await;
        assert_eq!(status, StatusCode::CREATED);
        body
    }

    /// Проходит мастер до карты мест выбранного сеанса.
    pub async fn open_seat_map(&self) {
        let (status, _) = self.get("/api/movies/mov_001/booking?theater=tht_001").await;
        assert_eq!(status, StatusCode::OK);
        let (status, view) = self
            .post("/api/booking/showtime", serde_json::json!({ "showtimeId": SHOWTIME }))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(view["step"], "selecting_seats");
    }
}
