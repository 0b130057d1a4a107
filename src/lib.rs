pub mod config;
pub mod controllers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod storage;

use axum::{routing::get, Router};
use chrono::NaiveDate;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use services::{
    catalog::{CatalogSource, Clock, CustomEntries},
    payment::PaymentService,
    session::SessionRegistry,
};
use storage::{Storage, StorageError};

// Shared state для всего приложения
pub struct AppState {
    pub config: config::Config,
    pub catalog: Arc<CatalogSource>,
    pub storage: Storage,
    pub sessions: SessionRegistry,
    pub payment: PaymentService,
}

impl AppState {
    pub async fn new(config: config::Config) -> Result<Arc<Self>, StorageError> {
        let storage = storage::build_storage(&config.storage).await?;
        info!("Storage backend: {:?}", config.storage.backend);
        Ok(Self::with_clock(config, storage, Clock::System).await)
    }

    /// Состояние с заданными часами и хранилищем. Эпоха каталога - дата
    /// на часах в момент сборки.
    pub async fn with_clock(config: config::Config, storage: Storage, clock: Clock) -> Arc<Self> {
        let custom = CustomEntries::load(&storage).await;
        let catalog = Arc::new(CatalogSource::new(clock, config.booking.booking_days, custom));

        let sessions = SessionRegistry::new(storage.clone(), catalog.clone(), config.booking.clone());
        let payment = PaymentService::from_config(&config.payment);

        Arc::new(Self {
            config,
            catalog,
            storage,
            sessions,
            payment,
        })
    }

    pub fn today(&self) -> NaiveDate {
        self.catalog.today()
    }
}

/// Корневой роутер: служебные маршруты плюс API под `/api`.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(|| async { "Cinema Booking API v1.0" }))
        .route("/health", get(|| async { "OK" }))
        .nest("/api", controllers::routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
