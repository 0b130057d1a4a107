//! Сессия клиента: то, что в браузере было бы одной вкладкой с её
//! localStorage. Держит мастер бронирования, слот передачи на оплату и
//! стор корзины/бронирований со своим пространством ключей.

use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::info;
use uuid::Uuid;

use crate::config::BookingConfig;
use crate::models::PendingBooking;
use crate::services::{
    booking_flow::{BackOutcome, BookingFlow, FlowError},
    booking_store::{BookingStore, StoreError},
    catalog::{Catalog, CatalogSource},
};
use crate::storage::Storage;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("no booking in progress")]
    NoActiveFlow,
    #[error(transparent)]
    Flow(#[from] FlowError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Короткоживущий слот "мастер -> оплата". Только в памяти.
#[derive(Debug, Default)]
pub struct HandoffSlot {
    slot: Mutex<Option<PendingBooking>>,
}

impl HandoffSlot {
    pub fn put(&self, pending: PendingBooking) {
        *self.slot.lock() = Some(pending);
    }

    pub fn peek(&self) -> Option<PendingBooking> {
        self.slot.lock().clone()
    }

    pub fn take(&self) -> Option<PendingBooking> {
        self.slot.lock().take()
    }

    /// Убирает заказ, только если в слоте всё ещё он.
    pub fn remove(&self, pending: &PendingBooking) {
        let mut slot = self.slot.lock();
        if slot.as_ref() == Some(pending) {
            *slot = None;
        }
    }

    /// Возвращает забранный заказ, если за это время не появился новый.
    pub fn restore(&self, pending: PendingBooking) {
        let mut slot = self.slot.lock();
        if slot.is_none() {
            *slot = Some(pending);
        }
    }
}

pub struct Session {
    id: Uuid,
    flow: tokio::sync::Mutex<Option<BookingFlow>>,
    pub handoff: HandoffSlot,
    pub store: BookingStore,
    catalog: Arc<CatalogSource>,
    rules: BookingConfig,
    last_seen: Mutex<Instant>,
}

impl Session {
    pub async fn open(
        id: Uuid,
        storage: Storage,
        catalog: Arc<CatalogSource>,
        rules: BookingConfig,
    ) -> Self {
        let store = BookingStore::open(storage, catalog.clone(), rules.clone()).await;
        Self {
            id,
            flow: tokio::sync::Mutex::new(None),
            handoff: HandoffSlot::default(),
            store,
            catalog,
            rules,
            last_seen: Mutex::new(Instant::now()),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Каталог на сегодня.
    pub fn catalog(&self) -> Arc<Catalog> {
        self.catalog.current()
    }

    pub fn touch(&self) {
        *self.last_seen.lock() = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last_seen.lock().elapsed()
    }

    /// Открывает мастер заново на текущем окне продаж. Если фильм не найден,
    /// предыдущий мастер тоже сбрасывается: страница показывает только
    /// "не найдено".
    pub async fn start_booking(
        &self,
        movie_id: &str,
        theater_id: Option<&str>,
    ) -> Result<(), SessionError> {
        let catalog = self.catalog.current();
        let today = catalog.opens_on();

        let mut flow = self.flow.lock().await;
        *flow = None;
        *flow = Some(BookingFlow::start(
            catalog,
            self.rules.clone(),
            movie_id,
            theater_id,
            today,
        )?);
        info!("Session {} started booking for {}", self.id, movie_id);
        Ok(())
    }

    pub async fn has_flow(&self) -> bool {
        self.flow.lock().await.is_some()
    }

    /// Выполняет действие над текущим мастером.
    pub async fn with_flow<R>(
        &self,
        action: impl FnOnce(&mut BookingFlow) -> Result<R, FlowError>,
    ) -> Result<R, SessionError> {
        let mut flow = self.flow.lock().await;
        let flow = flow.as_mut().ok_or(SessionError::NoActiveFlow)?;
        Ok(action(flow)?)
    }

    /// Шаг назад; с первого шага мастер закрывается.
    pub async fn back(&self) -> Result<BackOutcome, SessionError> {
        let mut guard = self.flow.lock().await;
        let flow = guard.as_mut().ok_or(SessionError::NoActiveFlow)?;
        let outcome = flow.back();
        if outcome == BackOutcome::Exit {
            *guard = None;
        }
        Ok(outcome)
    }

    /// Фиксирует выбор: кладёт его в слот оплаты, в корзину (с этого момента
    /// идёт удержание) и закрывает мастер.
    pub async fn checkout(&self) -> Result<PendingBooking, SessionError> {
        let mut guard = self.flow.lock().await;
        let flow = guard.as_ref().ok_or(SessionError::NoActiveFlow)?;
        let pending = flow.checkout()?;

        self.store.set_cart(Some(pending.clone().into())).await?;
        self.handoff.put(pending.clone());
        *guard = None;

        info!(
            "Session {} checked out {} seats for {}",
            self.id,
            pending.seats.len(),
            pending.showtime_id
        );
        Ok(pending)
    }
}

/// Все сессии процесса. Сессия создаётся при первом обращении с новым id
/// и выселяется после долгого простоя.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<Uuid, Arc<Session>>>,
    storage: Storage,
    catalog: Arc<CatalogSource>,
    rules: BookingConfig,
}

impl SessionRegistry {
    pub fn new(storage: Storage, catalog: Arc<CatalogSource>, rules: BookingConfig) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            storage,
            catalog,
            rules,
        }
    }

    pub async fn get_or_create(&self, id: Uuid) -> Arc<Session> {
        let existing = self.sessions.read().get(&id).cloned();
        let session = match existing {
            Some(session) => session,
            None => {
                // Загрузка из хранилища идёт без лока реестра
                let fresh = Arc::new(
                    Session::open(
                        id,
                        self.storage.scoped(&id.to_string()),
                        self.catalog.clone(),
                        self.rules.clone(),
                    )
                    .await,
                );
                self.sessions
                    .write()
                    .entry(id)
                    .or_insert_with(|| {
                        info!("Opening session {}", id);
                        fresh
                    })
                    .clone()
            }
        };
        session.touch();
        session
    }

    /// Выселяет сессии, простаивающие дольше `max_idle`. Сессия, которую
    /// прямо сейчас держит запрос, остаётся. Возвращает число выселенных.
    pub fn evict_idle(&self, max_idle: Duration) -> usize {
        let mut sessions = self.sessions.write();
        let before = sessions.len();
        sessions.retain(|_, session| {
            session.idle_for() < max_idle || Arc::strong_count(session) > 1
        });
        before - sessions.len()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
