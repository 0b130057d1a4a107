//! booking_flow.rs
//!
//! Мастер бронирования из трёх шагов:
//! 1. **SelectingTheater**: выбор кинотеатра.
//! 2. **SelectingShowtime**: выбор даты (7 дней вперёд) и сеанса.
//! 3. **SelectingSeats**: выбор мест на схеме зала.
//!
//! Из шага 3 выбранные места уходят на оплату через [`BookingFlow::checkout`].
//! Проданные места генерируются детерминированно по id сеанса, цена
//! пересчитывается при каждом чтении.

use chrono::{Days, NaiveDate};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

use crate::config::BookingConfig;
use crate::models::{Movie, PendingBooking, SeatId, Showtime, Theater};
use crate::services::{catalog::Catalog, sold_seats::generate_sold_seats};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStep {
    SelectingTheater,
    SelectingShowtime,
    SelectingSeats,
}

impl BookingStep {
    /// Номер шага для индикатора 1/3, 2/3, 3/3
    pub fn number(self) -> u8 {
        match self {
            BookingStep::SelectingTheater => 1,
            BookingStep::SelectingShowtime => 2,
            BookingStep::SelectingSeats => 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FlowError {
    #[error("movie {0} not found")]
    MovieNotFound(String),
    #[error("theater {0} not found")]
    TheaterNotFound(String),
    #[error("showtime {0} is not available for the selected theater and date")]
    ShowtimeUnavailable(String),
    #[error("date {0} is outside the booking window")]
    DateOutOfRange(NaiveDate),
    #[error("cannot {action} while at step {}", .step.number())]
    InvalidStep { action: &'static str, step: BookingStep },
    #[error("seat {0} is not on this seat map")]
    UnknownSeat(SeatId),
    #[error("select at least one seat before checkout")]
    NothingSelected,
}

/// Результат клика по месту. Проданное место и превышение лимита -
/// не ошибки, клик просто игнорируется.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "result", content = "reason")]
pub enum SeatToggle {
    Selected,
    Deselected,
    Ignored(IgnoreReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IgnoreReason {
    Sold,
    LimitReached,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome", content = "step")]
pub enum BackOutcome {
    Step(BookingStep),
    /// С первого шага "назад" уводит из мастера
    Exit,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DateOption {
    pub date: NaiveDate,
    pub label: String,
}

pub struct BookingFlow {
    catalog: Arc<Catalog>,
    rules: BookingConfig,
    movie_id: String,
    today: NaiveDate,
    step: BookingStep,
    theater_id: Option<String>,
    date: Option<NaiveDate>,
    showtime_id: Option<String>,
    sold: BTreeSet<SeatId>,
    selected: BTreeSet<SeatId>,
}

impl BookingFlow {
    /// Открывает мастер для фильма. Неизвестный фильм - фатально для страницы:
    /// мастер не создаётся.
    ///
    /// Кинотеатр из query-параметра сразу выбирается, если он существует;
    /// неизвестный id молча игнорируется.
    pub fn start(
        catalog: Arc<Catalog>,
        rules: BookingConfig,
        movie_id: &str,
        theater_id: Option<&str>,
        today: NaiveDate,
    ) -> Result<Self, FlowError> {
        if catalog.movie(movie_id).is_none() {
            return Err(FlowError::MovieNotFound(movie_id.to_string()));
        }

        let mut flow = Self {
            catalog,
            rules,
            movie_id: movie_id.to_string(),
            today,
            step: BookingStep::SelectingTheater,
            theater_id: None,
            date: None,
            showtime_id: None,
            sold: BTreeSet::new(),
            selected: BTreeSet::new(),
        };

        if let Some(theater_id) = theater_id {
            if flow.select_theater(theater_id).is_err() {
                debug!("Ignoring unknown preselected theater {}", theater_id);
            }
        }

        Ok(flow)
    }

    pub fn step(&self) -> BookingStep {
        self.step
    }

    pub fn today(&self) -> NaiveDate {
        self.today
    }

    pub fn movie(&self) -> Option<&Movie> {
        self.catalog.movie(&self.movie_id)
    }

    pub fn movie_id(&self) -> &str {
        &self.movie_id
    }

    pub fn theater(&self) -> Option<&Theater> {
        self.theater_id.as_deref().and_then(|id| self.catalog.theater(id))
    }

    pub fn date(&self) -> Option<NaiveDate> {
        self.date
    }

    pub fn showtime(&self) -> Option<&Showtime> {
        self.showtime_id.as_deref().and_then(|id| self.catalog.showtime(id))
    }

    pub fn sold_seats(&self) -> &BTreeSet<SeatId> {
        &self.sold
    }

    pub fn selected_seats(&self) -> &BTreeSet<SeatId> {
        &self.selected
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Дни, на которые можно купить билет. Нулевой день подписан "Today".
    pub fn available_dates(&self) -> Vec<DateOption> {
        (0..self.rules.booking_days)
            .filter_map(|offset| {
                let date = self.today.checked_add_days(Days::new(u64::from(offset)))?;
                let label = if offset == 0 {
                    "Today".to_string()
                } else {
                    date.format("%a %d/%m").to_string()
                };
                Some(DateOption { date, label })
            })
            .collect()
    }

    pub fn select_theater(&mut self, theater_id: &str) -> Result<(), FlowError> {
        self.expect_step(BookingStep::SelectingTheater, "select a theater")?;
        if self.catalog.theater(theater_id).is_none() {
            return Err(FlowError::TheaterNotFound(theater_id.to_string()));
        }

        self.theater_id = Some(theater_id.to_string());
        self.date = self.available_dates().first().map(|d| d.date);
        self.clear_showtime();
        self.step = BookingStep::SelectingShowtime;
        Ok(())
    }

    pub fn select_date(&mut self, date: NaiveDate) -> Result<(), FlowError> {
        self.expect_step(BookingStep::SelectingShowtime, "select a date")?;
        if !self.available_dates().iter().any(|d| d.date == date) {
            return Err(FlowError::DateOutOfRange(date));
        }

        self.date = Some(date);
        self.clear_showtime();
        Ok(())
    }

    /// Сеансы выбранного фильма в выбранном кинотеатре на выбранную дату.
    pub fn available_showtimes(&self) -> Vec<&Showtime> {
        match (self.theater_id.as_deref(), self.date) {
            (Some(theater_id), Some(date)) => {
                self.catalog.showtimes_for(&self.movie_id, theater_id, date)
            }
            _ => Vec::new(),
        }
    }

    pub fn select_showtime(&mut self, showtime_id: &str) -> Result<(), FlowError> {
        self.expect_step(BookingStep::SelectingShowtime, "select a showtime")?;
        if !self.available_showtimes().iter().any(|s| s.id == showtime_id) {
            return Err(FlowError::ShowtimeUnavailable(showtime_id.to_string()));
        }

        self.sold = generate_sold_seats(
            showtime_id,
            self.catalog.seat_config(),
            self.rules.sold_seat_attempts,
        );
        self.showtime_id = Some(showtime_id.to_string());
        self.selected.clear();
        self.step = BookingStep::SelectingSeats;
        Ok(())
    }

    pub fn toggle_seat(&mut self, seat: SeatId) -> Result<SeatToggle, FlowError> {
        self.expect_step(BookingStep::SelectingSeats, "pick seats")?;
        if !self.catalog.seat_config().contains(&seat) {
            return Err(FlowError::UnknownSeat(seat));
        }

        if self.sold.contains(&seat) {
            return Ok(SeatToggle::Ignored(IgnoreReason::Sold));
        }
        if self.selected.remove(&seat) {
            return Ok(SeatToggle::Deselected);
        }
        if self.selected.len() >= self.rules.max_seats {
            return Ok(SeatToggle::Ignored(IgnoreReason::LimitReached));
        }
        self.selected.insert(seat);
        Ok(SeatToggle::Selected)
    }

    /// Шаг назад. Выбор на текущем шаге сохраняется, как и в интерфейсе.
    pub fn back(&mut self) -> BackOutcome {
        self.step = match self.step {
            BookingStep::SelectingTheater => return BackOutcome::Exit,
            BookingStep::SelectingShowtime => BookingStep::SelectingTheater,
            BookingStep::SelectingSeats => BookingStep::SelectingShowtime,
        };
        BackOutcome::Step(self.step)
    }

    pub fn total_price(&self) -> u64 {
        self.showtime()
            .map(|s| s.total_price(self.catalog.seat_config(), &self.selected))
            .unwrap_or(0)
    }

    pub fn can_checkout(&self) -> bool {
        self.step == BookingStep::SelectingSeats && !self.selected.is_empty()
    }

    /// Данные для оплаты. Запись в слот передачи и выход из мастера
    /// делает вызывающая сторона.
    pub fn checkout(&self) -> Result<PendingBooking, FlowError> {
        self.expect_step(BookingStep::SelectingSeats, "check out")?;
        if self.selected.is_empty() {
            return Err(FlowError::NothingSelected);
        }
        let (Some(theater_id), Some(showtime_id)) = (&self.theater_id, &self.showtime_id) else {
            return Err(FlowError::InvalidStep { action: "check out", step: self.step });
        };

        Ok(PendingBooking {
            movie_id: self.movie_id.clone(),
            theater_id: theater_id.clone(),
            showtime_id: showtime_id.clone(),
            seats: self.selected.clone(),
            total_price: self.total_price(),
        })
    }

    fn clear_showtime(&mut self) {
        self.showtime_id = None;
        self.sold.clear();
        self.selected.clear();
    }

    fn expect_step(&self, expected: BookingStep, action: &'static str) -> Result<(), FlowError> {
        if self.step == expected {
            Ok(())
        } else {
            Err(FlowError::InvalidStep { action, step: self.step })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 10).unwrap()
    }

    fn catalog() -> Arc<Catalog> {
        Arc::new(Catalog::mock(today(), 7))
    }

    fn start(movie_id: &str) -> Result<BookingFlow, FlowError> {
        BookingFlow::start(catalog(), BookingConfig::default(), movie_id, None, today())
    }

    /// Мастер на шаге 3 для первого сеанса Dune в Vincom Center сегодня.
    fn at_seat_step() -> BookingFlow {
        let mut flow = start("mov_001").unwrap();
        flow.select_theater("tht_001").unwrap();
        let showtime_id = flow.available_showtimes()[0].id.clone();
        flow.select_showtime(&showtime_id).unwrap();
        flow
    }

    fn free_seats(flow: &BookingFlow) -> Vec<SeatId> {
        flow.catalog()
            .seat_config()
            .seat_ids()
            .filter(|s| !flow.sold_seats().contains(s))
            .collect()
    }

    #[test]
    fn unknown_movie_does_not_start_a_flow() {
        assert_eq!(
            start("mov_999").err(),
            Some(FlowError::MovieNotFound("mov_999".to_string()))
        );
    }

    #[test]
    fn selecting_theater_advances_with_today_preselected() {
        let mut flow = start("mov_001").unwrap();
        assert_eq!(flow.step(), BookingStep::SelectingTheater);

        flow.select_theater("tht_001").unwrap();
        assert_eq!(flow.step(), BookingStep::SelectingShowtime);
        assert_eq!(flow.date(), Some(today()));
        assert_eq!(flow.theater().unwrap().id, "tht_001");
        assert!(flow.showtime().is_none());
    }

    #[test]
    fn unknown_theater_is_rejected() {
        let mut flow = start("mov_001").unwrap();
        assert_eq!(
            flow.select_theater("tht_404"),
            Err(FlowError::TheaterNotFound("tht_404".to_string()))
        );
        assert_eq!(flow.step(), BookingStep::SelectingTheater);
    }

    #[test]
    fn preselected_theater_skips_first_step() {
        let flow = BookingFlow::start(catalog(), BookingConfig::default(), "mov_001", Some("tht_002"), today())
            .unwrap();
        assert_eq!(flow.step(), BookingStep::SelectingShowtime);

        let ignored = BookingFlow::start(catalog(), BookingConfig::default(), "mov_001", Some("nope"), today())
            .unwrap();
        assert_eq!(ignored.step(), BookingStep::SelectingTheater);
    }

    #[test]
    fn seven_dates_with_today_first() {
        let flow = start("mov_001").unwrap();
        let dates = flow.available_dates();
        assert_eq!(dates.len(), 7);
        assert_eq!(dates[0].label, "Today");
        assert_eq!(dates[0].date, today());
        assert_eq!(dates[1].label, "Mon 11/03");
        assert_eq!(dates[6].date, NaiveDate::from_ymd_opt(2024, 3, 16).unwrap());
    }

    #[test]
    fn showtimes_are_filtered_by_theater_and_date() {
        let mut flow = start("mov_001").unwrap();
        flow.select_theater("tht_001").unwrap();

        let showtimes = flow.available_showtimes();
        assert!(!showtimes.is_empty());
        for showtime in showtimes {
            assert_eq!(showtime.theater_id, "tht_001");
            assert_eq!(showtime.movie_id, "mov_001");
            assert!(showtime
                .date_time
                .format("%Y-%m-%dT%H:%M:%S")
                .to_string()
                .starts_with("2024-03-10"));
        }

        let tomorrow = today().succ_opt().unwrap();
        flow.select_date(tomorrow).unwrap();
        assert!(flow.available_showtimes().iter().all(|s| s.date() == tomorrow));
    }

    #[test]
    fn date_outside_window_is_rejected() {
        let mut flow = start("mov_001").unwrap();
        flow.select_theater("tht_001").unwrap();
        let late = today() + Days::new(7);
        assert_eq!(flow.select_date(late), Err(FlowError::DateOutOfRange(late)));
    }

    #[test]
    fn showtime_from_other_theater_is_rejected() {
        let mut flow = start("mov_001").unwrap();
        flow.select_theater("tht_001").unwrap();
        let foreign = "sht_mov_001_tht_002_scr_004_0_0";
        assert_eq!(
            flow.select_showtime(foreign),
            Err(FlowError::ShowtimeUnavailable(foreign.to_string()))
        );
    }

    #[test]
    fn selecting_showtime_generates_sold_seats_and_clears_selection() {
        let flow = at_seat_step();
        assert_eq!(flow.step(), BookingStep::SelectingSeats);
        assert!(!flow.sold_seats().is_empty());
        assert!(flow.selected_seats().is_empty());

        let expected = generate_sold_seats(
            &flow.showtime().unwrap().id,
            flow.catalog().seat_config(),
            15,
        );
        assert_eq!(flow.sold_seats(), &expected);
    }

    #[test]
    fn toggle_selects_and_deselects() {
        let mut flow = at_seat_step();
        let seat = free_seats(&flow)[0];

        assert_eq!(flow.toggle_seat(seat), Ok(SeatToggle::Selected));
        assert!(flow.selected_seats().contains(&seat));
        assert_eq!(flow.toggle_seat(seat), Ok(SeatToggle::Deselected));
        assert!(flow.selected_seats().is_empty());
    }

    #[test]
    fn sold_seat_click_is_ignored() {
        let mut flow = at_seat_step();
        let sold = *flow.sold_seats().iter().next().unwrap();
        assert_eq!(flow.toggle_seat(sold), Ok(SeatToggle::Ignored(IgnoreReason::Sold)));
        assert!(flow.selected_seats().is_empty());
    }

    #[test]
    fn ninth_seat_is_ignored() {
        let mut flow = at_seat_step();
        let free = free_seats(&flow);
        for seat in &free[..8] {
            assert_eq!(flow.toggle_seat(*seat), Ok(SeatToggle::Selected));
        }
        assert_eq!(
            flow.toggle_seat(free[8]),
            Ok(SeatToggle::Ignored(IgnoreReason::LimitReached))
        );
        assert_eq!(flow.selected_seats().len(), 8);
    }

    #[test]
    fn seat_outside_map_is_an_error() {
        let mut flow = at_seat_step();
        let seat = SeatId::new('Z', 1);
        assert_eq!(flow.toggle_seat(seat), Err(FlowError::UnknownSeat(seat)));
    }

    #[test]
    fn toggling_before_seat_step_is_invalid() {
        let mut flow = start("mov_001").unwrap();
        assert!(matches!(
            flow.toggle_seat(SeatId::new('A', 1)),
            Err(FlowError::InvalidStep { step: BookingStep::SelectingTheater, .. })
        ));
    }

    #[test]
    fn total_price_splits_vip_and_standard() {
        let mut flow = start("mov_001").unwrap();
        flow.select_theater("tht_001").unwrap();
        // Обычный зал: 90 000 / 120 000
        flow.select_showtime("sht_mov_001_tht_001_scr_001_0_0").unwrap();

        let standard = free_seats(&flow).into_iter().find(|s| s.row < 'G').unwrap();
        let vip = free_seats(&flow).into_iter().find(|s| s.row >= 'G').unwrap();
        flow.toggle_seat(standard).unwrap();
        flow.toggle_seat(vip).unwrap();

        assert_eq!(flow.total_price(), 90_000 + 120_000);
    }

    #[test]
    fn back_walks_down_then_exits() {
        let mut flow = at_seat_step();
        assert_eq!(flow.back(), BackOutcome::Step(BookingStep::SelectingShowtime));
        assert_eq!(flow.back(), BackOutcome::Step(BookingStep::SelectingTheater));
        assert_eq!(flow.back(), BackOutcome::Exit);
        assert_eq!(flow.step(), BookingStep::SelectingTheater);
    }

    #[test]
    fn reselecting_theater_resets_everything() {
        let mut flow = at_seat_step();
        let seat = free_seats(&flow)[0];
        flow.toggle_seat(seat).unwrap();

        flow.back();
        flow.back();
        flow.select_theater("tht_003").unwrap();
        assert!(flow.showtime().is_none());
        assert!(flow.selected_seats().is_empty());
        assert_eq!(flow.total_price(), 0);
    }

    #[test]
    fn checkout_requires_seats_at_last_step() {
        let mut flow = start("mov_001").unwrap();
        assert!(!flow.can_checkout());
        assert!(flow.checkout().is_err());

        flow.select_theater("tht_001").unwrap();
        let showtime_id = flow.available_showtimes()[0].id.clone();
        flow.select_showtime(&showtime_id).unwrap();
        assert_eq!(flow.checkout(), Err(FlowError::NothingSelected));

        let seat = free_seats(&flow)[0];
        flow.toggle_seat(seat).unwrap();
        assert!(flow.can_checkout());

        let pending = flow.checkout().unwrap();
        assert_eq!(pending.movie_id, "mov_001");
        assert_eq!(pending.theater_id, "tht_001");
        assert_eq!(pending.showtime_id, showtime_id);
        assert_eq!(pending.seats.iter().copied().collect::<Vec<_>>(), vec![seat]);
        assert_eq!(pending.total_price, flow.total_price());
    }

    #[derive(Debug, Clone)]
    enum Click {
        Seat(usize),
        Back,
        Forward,
    }

    fn click() -> impl Strategy<Value = Click> {
        prop_oneof![
            8 => (0usize..120).prop_map(Click::Seat),
            1 => Just(Click::Back),
            1 => Just(Click::Forward),
        ]
    }

    proptest! {
        #[test]
        fn selection_never_exceeds_limit_or_touches_sold(clicks in prop::collection::vec(click(), 0..80)) {
            let mut flow = at_seat_step();
            let all: Vec<SeatId> = flow.catalog().seat_config().seat_ids().collect();
            let showtime_id = flow.showtime().unwrap().id.clone();

            for click in clicks {
                match click {
                    Click::Seat(i) => {
                        let _ = flow.toggle_seat(all[i]);
                    }
                    Click::Back => {
                        flow.back();
                    }
                    Click::Forward => {
                        if flow.step() == BookingStep::SelectingShowtime {
                            flow.select_showtime(&showtime_id).unwrap();
                        }
                    }
                }
                prop_assert!(flow.selected_seats().len() <= 8);
                prop_assert!(flow.selected_seats().is_disjoint(flow.sold_seats()));
            }
        }
    }
}
