//! Корзина и список бронирований одной сессии.
//!
//! Каждая мутация меняет состояние в памяти под коротким `parking_lot`
//! локом, отпускает его и только потом пишет снимок в хранилище (`cart`,
//! `bookings`). Порядок записей держит отдельный асинхронный лок `persist`:
//! мутации одной сессии выполняются строго по очереди. Ошибки хранилища не
//! всплывают: их логирует [`Storage`].
//!
//! Непустая корзина держится таймером [`HoldTimer`]; по истечении корзина
//! очищается так же, как через [`BookingStore::clear_cart`].

use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::info;

use crate::config::BookingConfig;
use crate::models::{booking::InvalidTransition, Booking, CartItem, SeatId};
use crate::services::{
    catalog::{Catalog, CatalogSource},
    hold_timer::{HoldHandle, HoldTimer},
    sold_seats::generate_sold_seats,
};
use crate::storage::{Storage, StorageKey};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("booking {0} not found")]
    BookingNotFound(String),
    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),
    #[error("a cart holds at most {max} seats")]
    TooManySeats { max: usize },
    #[error("seat {0} is not available")]
    SeatUnavailable(SeatId),
    #[error("showtime {0} not found")]
    ShowtimeNotFound(String),
    #[error("seat hold expired")]
    HoldExpired,
}

struct ActiveHold {
    generation: u64,
    handle: HoldHandle,
}

#[derive(Default)]
struct StoreState {
    cart: Option<CartItem>,
    bookings: Vec<Booking>,
    hold: Option<ActiveHold>,
    generation: u64,
}

type PersistLock = Arc<tokio::sync::Mutex<()>>;

#[derive(Clone)]
pub struct BookingStore {
    state: Arc<Mutex<StoreState>>,
    persist: PersistLock,
    storage: Storage,
    catalog: Arc<CatalogSource>,
    rules: BookingConfig,
    timer: HoldTimer,
}

impl BookingStore {
    /// Создаёт стор и подтягивает сохранённые бронирования.
    pub async fn open(storage: Storage, catalog: Arc<CatalogSource>, rules: BookingConfig) -> Self {
        let bookings = storage
            .get::<Vec<Booking>>(StorageKey::Bookings)
            .await
            .unwrap_or_default();
        let timer = HoldTimer::new(Duration::from_secs(rules.hold_seconds));
        Self {
            state: Arc::new(Mutex::new(StoreState { bookings, ..Default::default() })),
            persist: Arc::default(),
            storage,
            catalog,
            rules,
            timer,
        }
    }

    pub async fn cart(&self) -> Option<CartItem> {
        let _order = self.persist.lock().await;
        let (cart, expired) = {
            let mut state = self.state.lock();
            let expired = self.expire_if_due(&mut state);
            (state.cart.clone(), expired)
        };
        if expired {
            self.storage.remove(StorageKey::Cart).await;
        }
        cart
    }

    pub fn bookings(&self) -> Vec<Booking> {
        self.state.lock().bookings.clone()
    }

    pub fn booking(&self, id: &str) -> Option<Booking> {
        self.state.lock().bookings.iter().find(|b| b.id == id).cloned()
    }

    /// Секунды до истечения удержания; без живого удержания - полный срок.
    pub fn time_remaining(&self) -> u64 {
        self.state
            .lock()
            .hold
            .as_ref()
            .filter(|hold| !hold.handle.is_expired())
            .map(|hold| hold.handle.remaining())
            .unwrap_or(self.rules.hold_seconds)
    }

    /// Заменяет корзину целиком. Непустая корзина перезапускает таймер.
    pub async fn set_cart(&self, cart: Option<CartItem>) -> Result<(), StoreError> {
        let cart = match cart {
            Some(cart) => Some(self.validate_cart(cart)?),
            None => None,
        };

        let _order = self.persist.lock().await;
        {
            let mut state = self.state.lock();
            self.stop_hold(&mut state);
            let has_seats = cart.as_ref().is_some_and(|c| !c.seats.is_empty());
            state.cart = cart.clone();
            if has_seats {
                self.start_hold(&mut state);
            }
        }
        self.persist_cart(cart).await;
        Ok(())
    }

    /// Добавляет место в существующую корзину. Возвращает `false`, если ничего
    /// не изменилось: корзины нет, место уже есть, лимит или место продано.
    pub async fn add_seat(&self, seat: SeatId) -> bool {
        let _order = self.persist.lock().await;
        let catalog = self.catalog.current();
        let (added, write) = {
            let mut state = self.state.lock();
            let expired = self.expire_if_due(&mut state);
            let added = self.insert_seat(&mut state, &catalog, seat);
            (added, (expired || added).then(|| state.cart.clone()))
        };
        if let Some(cart) = write {
            self.persist_cart(cart).await;
        }
        added
    }

    pub async fn remove_seat(&self, seat: SeatId) -> bool {
        let _order = self.persist.lock().await;
        let catalog = self.catalog.current();
        let (removed, write) = {
            let mut state = self.state.lock();
            let expired = self.expire_if_due(&mut state);
            let removed = self.take_seat(&mut state, &catalog, seat);
            (removed, (expired || removed).then(|| state.cart.clone()))
        };
        if let Some(cart) = write {
            self.persist_cart(cart).await;
        }
        removed
    }

    pub async fn clear_cart(&self) {
        let _order = self.persist.lock().await;
        {
            let mut state = self.state.lock();
            self.stop_hold(&mut state);
            state.cart = None;
        }
        self.storage.remove(StorageKey::Cart).await;
    }

    /// Новое бронирование встаёт в начало списка.
    pub async fn add_booking(&self, booking: Booking) {
        let _order = self.persist.lock().await;
        let bookings = {
            let mut state = self.state.lock();
            info!("Booking {} added with {} seats", booking.id, booking.seats.len());
            state.bookings.insert(0, booking);
            state.bookings.clone()
        };
        self.storage.set(StorageKey::Bookings, &bookings).await;
    }

    /// Превращает удерживаемую корзину в бронирование одним шагом: корзина
    /// должна быть жива и относиться к `showtime_id`. Бронирование собирает
    /// `build` из текущего содержимого корзины.
    pub async fn complete_purchase(
        &self,
        showtime_id: &str,
        build: impl FnOnce(&CartItem) -> Booking + Send,
    ) -> Result<Booking, StoreError> {
        let _order = self.persist.lock().await;
        let (booking, bookings) = {
            let mut state = self.state.lock();
            self.expire_if_due(&mut state);
            let cart = state
                .cart
                .as_ref()
                .filter(|cart| cart.showtime_id == showtime_id && !cart.seats.is_empty())
                .ok_or(StoreError::HoldExpired)?;
            let booking = build(cart);

            self.stop_hold(&mut state);
            state.cart = None;
            state.bookings.insert(0, booking.clone());
            (booking, state.bookings.clone())
        };

        info!("Booking {} added with {} seats", booking.id, booking.seats.len());
        self.storage.set(StorageKey::Bookings, &bookings).await;
        self.storage.remove(StorageKey::Cart).await;
        Ok(booking)
    }

    /// Меняет только статус `confirmed -> cancelled`, запись не удаляется.
    pub async fn cancel_booking(&self, booking_id: &str) -> Result<Booking, StoreError> {
        let _order = self.persist.lock().await;
        let (cancelled, bookings) = {
            let mut state = self.state.lock();
            let booking = state
                .bookings
                .iter_mut()
                .find(|b| b.id == booking_id)
                .ok_or_else(|| StoreError::BookingNotFound(booking_id.to_string()))?;
            booking.cancel()?;
            let cancelled = booking.clone();
            (cancelled, state.bookings.clone())
        };

        self.storage.set(StorageKey::Bookings, &bookings).await;
        info!("Booking {} cancelled", booking_id);
        Ok(cancelled)
    }

    pub async fn refresh_bookings(&self) {
        let _order = self.persist.lock().await;
        let bookings = self
            .storage
            .get::<Vec<Booking>>(StorageKey::Bookings)
            .await
            .unwrap_or_default();
        self.state.lock().bookings = bookings;
    }

    fn validate_cart(&self, mut cart: CartItem) -> Result<CartItem, StoreError> {
        if cart.seats.len() > self.rules.max_seats {
            return Err(StoreError::TooManySeats { max: self.rules.max_seats });
        }
        let catalog = self.catalog.current();
        let showtime = catalog
            .showtime(&cart.showtime_id)
            .ok_or_else(|| StoreError::ShowtimeNotFound(cart.showtime_id.clone()))?;
        let config = catalog.seat_config();
        if let Some(seat) = cart
            .seats
            .iter()
            .find(|seat| !config.contains(seat) || self.is_sold(&catalog, &cart.showtime_id, seat))
        {
            return Err(StoreError::SeatUnavailable(*seat));
        }

        cart.total_price = showtime.total_price(config, &cart.seats);
        Ok(cart)
    }

    fn insert_seat(&self, state: &mut StoreState, catalog: &Catalog, seat: SeatId) -> bool {
        let Some(cart) = state.cart.as_mut() else {
            return false;
        };
        if cart.seats.contains(&seat) || cart.seats.len() >= self.rules.max_seats {
            return false;
        }
        let Some(showtime) = catalog.showtime(&cart.showtime_id) else {
            return false;
        };
        let config = catalog.seat_config();
        if !config.contains(&seat) || self.is_sold(catalog, &cart.showtime_id, &seat) {
            return false;
        }

        let was_empty = cart.seats.is_empty();
        cart.seats.insert(seat);
        cart.total_price = showtime.total_price(config, &cart.seats);

        if was_empty {
            self.start_hold(state);
        }
        true
    }

    fn take_seat(&self, state: &mut StoreState, catalog: &Catalog, seat: SeatId) -> bool {
        let Some(cart) = state.cart.as_mut() else {
            return false;
        };
        if !cart.seats.remove(&seat) {
            return false;
        }
        cart.total_price = catalog
            .showtime(&cart.showtime_id)
            .map(|s| s.total_price(catalog.seat_config(), &cart.seats))
            .unwrap_or(0);

        // Пустой корзине удерживать нечего
        if cart.seats.is_empty() {
            self.stop_hold(state);
        }
        true
    }

    fn is_sold(&self, catalog: &Catalog, showtime_id: &str, seat: &SeatId) -> bool {
        generate_sold_seats(showtime_id, catalog.seat_config(), self.rules.sold_seat_attempts)
            .contains(seat)
    }

    fn start_hold(&self, state: &mut StoreState) {
        state.generation += 1;
        let generation = state.generation;
        let weak = Arc::downgrade(&self.state);
        let persist = self.persist.clone();
        let storage = self.storage.clone();

        let handle = self
            .timer
            .start(move || expire_hold(weak, persist, storage, generation));
        // Старый таймер, если был, отменяется при drop
        state.hold = Some(ActiveHold { generation, handle });
    }

    fn stop_hold(&self, state: &mut StoreState) {
        if let Some(hold) = state.hold.take() {
            hold.handle.cancel();
        }
    }

    /// Очищает корзину, если удержание истекло, а таймер ещё не успел.
    /// Запись в хранилище остаётся вызывающему.
    fn expire_if_due(&self, state: &mut StoreState) -> bool {
        if !state.hold.as_ref().is_some_and(|hold| hold.handle.is_expired()) {
            return false;
        }
        info!("Seat hold expired, clearing cart");
        self.stop_hold(state);
        state.cart = None;
        true
    }

    async fn persist_cart(&self, cart: Option<CartItem>) {
        match cart {
            Some(cart) => self.storage.set(StorageKey::Cart, &cart).await,
            None => self.storage.remove(StorageKey::Cart).await,
        }
    }
}

/// Колбэк таймера. Очищает корзину, только если удержание не сменилось,
/// пока задача ждала своей очереди.
async fn expire_hold(
    state: Weak<Mutex<StoreState>>,
    persist: PersistLock,
    storage: Storage,
    generation: u64,
) {
    let _order = persist.lock().await;
    let Some(state) = state.upgrade() else {
        return;
    };
    {
        let mut state = state.lock();
        if state.hold.as_ref().map(|h| h.generation) != Some(generation) {
            return;
        }
        if let Some(hold) = state.hold.take() {
            hold.handle.detach();
        }
        state.cart = None;
    }

    info!("Seat hold expired, clearing cart");
    storage.remove(StorageKey::Cart).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BookingStatus;
    use crate::services::catalog::{Clock, CustomEntries};
    use crate::storage::tests::FailingStore;
    use chrono::{NaiveDate, Utc};
    use std::collections::BTreeSet;

    const SHOWTIME: &str = "sht_mov_001_tht_001_scr_001_0_0";

    fn source() -> Arc<CatalogSource> {
        let today = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
        Arc::new(CatalogSource::new(Clock::manual(today), 7, CustomEntries::default()))
    }

    async fn store_with(storage: Storage) -> BookingStore {
        BookingStore::open(storage, source(), BookingConfig::default()).await
    }

    fn sold() -> BTreeSet<SeatId> {
        generate_sold_seats(SHOWTIME, source().current().seat_config(), 15)
    }

    fn free_seats() -> Vec<SeatId> {
        let sold = sold();
        source()
            .current()
            .seat_config()
            .seat_ids()
            .filter(|s| !sold.contains(s))
            .collect()
    }

    fn cart(seats: &[SeatId]) -> CartItem {
        CartItem {
            movie_id: "mov_001".to_string(),
            theater_id: "tht_001".to_string(),
            showtime_id: SHOWTIME.to_string(),
            seats: seats.iter().copied().collect(),
            total_price: 0,
        }
    }

    fn booking(id: &str, status: BookingStatus) -> Booking {
        Booking {
            id: id.to_string(),
            user_id: "usr_001".to_string(),
            movie_id: "mov_001".to_string(),
            theater_id: "tht_001".to_string(),
            showtime_id: SHOWTIME.to_string(),
            seats: [SeatId::new('A', 1)].into_iter().collect(),
            total_price: 90_000,
            customer_name: "Nguyen Van A".to_string(),
            customer_email: "user@vietcinema.vn".to_string(),
            customer_phone: "0901234567".to_string(),
            payment_method: None,
            status,
            created_at: Utc::now(),
        }
    }

    fn from_cart(id: &str) -> impl FnOnce(&CartItem) -> Booking + Send {
        let id = id.to_string();
        move |cart| Booking {
            seats: cart.seats.clone(),
            total_price: cart.total_price,
            ..booking(&id, BookingStatus::Confirmed)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn set_cart_recomputes_price_and_persists() {
        let storage = Storage::in_memory();
        let store = store_with(storage.clone()).await;
        let standard = free_seats().into_iter().find(|s| s.row < 'G').unwrap();
        let vip = free_seats().into_iter().find(|s| s.row >= 'G').unwrap();

        store.set_cart(Some(cart(&[standard, vip]))).await.unwrap();

        let current = store.cart().await.unwrap();
        assert_eq!(current.total_price, 210_000);
        assert_eq!(storage.get::<CartItem>(StorageKey::Cart).await, Some(current));
        assert_eq!(store.time_remaining(), 300);
    }

    #[tokio::test(start_paused = true)]
    async fn set_cart_rejects_sold_and_oversized_carts() {
        let store = store_with(Storage::in_memory()).await;
        let sold_seat = *sold().iter().next().unwrap();
        assert_eq!(
            store.set_cart(Some(cart(&[sold_seat]))).await,
            Err(StoreError::SeatUnavailable(sold_seat))
        );

        let nine: Vec<_> = free_seats().into_iter().take(9).collect();
        assert_eq!(
            store.set_cart(Some(cart(&nine))).await,
            Err(StoreError::TooManySeats { max: 8 })
        );
        assert!(store.cart().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn add_seat_respects_limit_duplicates_and_sold() {
        let store = store_with(Storage::in_memory()).await;
        let free = free_seats();
        assert!(!store.add_seat(free[0]).await, "no cart yet");

        store.set_cart(Some(cart(&[free[0]]))).await.unwrap();
        assert!(!store.add_seat(free[0]).await);
        assert!(!store.add_seat(*sold().iter().next().unwrap()).await);
        for seat in &free[1..8] {
            assert!(store.add_seat(*seat).await);
        }
        assert!(!store.add_seat(free[8]).await);
        assert_eq!(store.cart().await.unwrap().seats.len(), 8);
    }

    #[tokio::test(start_paused = true)]
    async fn removing_last_seat_stops_the_hold() {
        let store = store_with(Storage::in_memory()).await;
        let seat = free_seats()[0];
        store.set_cart(Some(cart(&[seat]))).await.unwrap();

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(store.time_remaining(), 290);

        assert!(store.remove_seat(seat).await);
        assert_eq!(store.time_remaining(), 300);
        assert_eq!(store.cart().await.unwrap().total_price, 0);

        tokio::time::sleep(Duration::from_secs(400)).await;
        assert!(
            store.cart().await.is_some(),
            "empty cart is not held, so it does not expire"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn cart_expires_after_hold() {
        let storage = Storage::in_memory();
        let store = store_with(storage.clone()).await;
        store.set_cart(Some(cart(&[SeatId::new('A', 1)]))).await.unwrap();

        tokio::time::sleep(Duration::from_secs(299)).await;
        assert_eq!(store.time_remaining(), 1);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(store.time_remaining(), 300, "timer resets for the next cart");
        assert!(store.cart().await.is_none());
        assert_eq!(storage.get::<CartItem>(StorageKey::Cart).await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn replacing_cart_restarts_the_hold() {
        let store = store_with(Storage::in_memory()).await;
        let free = free_seats();
        store.set_cart(Some(cart(&[free[0]]))).await.unwrap();

        tokio::time::sleep(Duration::from_secs(200)).await;
        store.set_cart(Some(cart(&[free[1]]))).await.unwrap();

        tokio::time::sleep(Duration::from_secs(200)).await;
        let current = store.cart().await.expect("second cart is still held");
        assert!(current.seats.contains(&free[1]));
        assert_eq!(store.time_remaining(), 100);
    }

    #[tokio::test(start_paused = true)]
    async fn explicit_clear_cancels_the_hold() {
        let store = store_with(Storage::in_memory()).await;
        store.set_cart(Some(cart(&[free_seats()[0]]))).await.unwrap();
        store.clear_cart().await;
        assert!(store.cart().await.is_none());
        assert_eq!(store.time_remaining(), 300);
    }

    #[tokio::test(start_paused = true)]
    async fn purchase_turns_the_held_cart_into_a_booking() {
        let storage = Storage::in_memory();
        let store = store_with(storage.clone()).await;
        let free = free_seats();
        store.set_cart(Some(cart(&[free[0], free[1]]))).await.unwrap();

        let booking = store.complete_purchase(SHOWTIME, from_cart("VCN1")).await.unwrap();
        assert_eq!(booking.seats, [free[0], free[1]].into_iter().collect());
        assert_eq!(store.bookings(), vec![booking.clone()]);
        assert!(store.cart().await.is_none());
        assert_eq!(storage.get::<CartItem>(StorageKey::Cart).await, None);
        assert_eq!(
            storage.get::<Vec<Booking>>(StorageKey::Bookings).await,
            Some(vec![booking])
        );

        // Корзина уже израсходована: вторая покупка не проходит
        assert_eq!(
            store.complete_purchase(SHOWTIME, from_cart("VCN2")).await,
            Err(StoreError::HoldExpired)
        );
        assert_eq!(store.bookings().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn purchase_after_expiry_or_for_another_showtime_fails() {
        let store = store_with(Storage::in_memory()).await;
        store.set_cart(Some(cart(&[free_seats()[0]]))).await.unwrap();

        assert_eq!(
            store
                .complete_purchase("sht_mov_002_tht_001_scr_001_0_0", from_cart("VCN1"))
                .await,
            Err(StoreError::HoldExpired)
        );

        tokio::time::sleep(Duration::from_secs(301)).await;
        assert_eq!(
            store.complete_purchase(SHOWTIME, from_cart("VCN1")).await,
            Err(StoreError::HoldExpired)
        );
        assert!(store.bookings().is_empty());
    }

    #[tokio::test]
    async fn bookings_are_prepended_and_loaded_back() {
        let storage = Storage::in_memory();
        let store = store_with(storage.clone()).await;
        store.add_booking(booking("VCN1", BookingStatus::Confirmed)).await;
        store.add_booking(booking("VCN2", BookingStatus::Confirmed)).await;

        let ids: Vec<_> = store.bookings().into_iter().map(|b| b.id).collect();
        assert_eq!(ids, vec!["VCN2", "VCN1"]);

        let reopened = store_with(storage).await;
        assert_eq!(reopened.bookings().len(), 2);
    }

    #[tokio::test]
    async fn cancel_flips_only_the_status() {
        let store = store_with(Storage::in_memory()).await;
        store.add_booking(booking("VCN1", BookingStatus::Confirmed)).await;
        store.add_booking(booking("VCN2", BookingStatus::Confirmed)).await;
        let before = store.booking("VCN1").unwrap();

        let cancelled = store.cancel_booking("VCN1").await.unwrap();
        assert_eq!(cancelled.status, BookingStatus::Cancelled);
        assert_eq!(store.bookings().len(), 2);

        let after = store.booking("VCN1").unwrap();
        assert_eq!(Booking { status: before.status, ..after }, before);
    }

    #[tokio::test]
    async fn cancellation_is_terminal() {
        let store = store_with(Storage::in_memory()).await;
        store.add_booking(booking("VCN1", BookingStatus::Confirmed)).await;
        store.add_booking(booking("VCN2", BookingStatus::Pending)).await;
        store.cancel_booking("VCN1").await.unwrap();

        assert!(matches!(
            store.cancel_booking("VCN1").await,
            Err(StoreError::InvalidTransition(_))
        ));
        assert!(matches!(
            store.cancel_booking("VCN2").await,
            Err(StoreError::InvalidTransition(_))
        ));
        assert_eq!(
            store.cancel_booking("VCN404").await,
            Err(StoreError::BookingNotFound("VCN404".to_string()))
        );
    }

    #[tokio::test]
    async fn refresh_picks_up_external_writes() {
        let storage = Storage::in_memory();
        let store = store_with(storage.clone()).await;
        storage
            .set(StorageKey::Bookings, &vec![booking("VCN9", BookingStatus::Confirmed)])
            .await;

        assert!(store.bookings().is_empty());
        store.refresh_bookings().await;
        assert_eq!(store.bookings()[0].id, "VCN9");
    }

    #[tokio::test(start_paused = true)]
    async fn storage_failures_keep_memory_state() {
        let store = store_with(Storage::new(Arc::new(FailingStore))).await;
        store.add_booking(booking("VCN1", BookingStatus::Confirmed)).await;
        store.set_cart(Some(cart(&[free_seats()[0]]))).await.unwrap();

        assert_eq!(store.bookings().len(), 1);
        assert!(store.cart().await.is_some());
        store.cancel_booking("VCN1").await.unwrap();
        assert_eq!(store.bookings()[0].status, BookingStatus::Cancelled);
    }
}
