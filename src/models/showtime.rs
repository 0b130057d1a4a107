use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use super::seat::{SeatConfig, SeatId};

/// Сеанс: фильм в конкретном зале в конкретное время, со своими ценами.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Showtime {
    pub id: String,
    pub movie_id: String,
    pub theater_id: String,
    pub screen_id: String,
    /// Сериализуется как `2024-03-01T09:00:00`
    pub date_time: NaiveDateTime,
    pub price: u64,
    pub price_vip: u64,
    pub available_seats: u32,
}

impl Showtime {
    pub fn date(&self) -> NaiveDate {
        self.date_time.date()
    }

    pub fn seat_price(&self, config: &SeatConfig, seat: &SeatId) -> u64 {
        if config.is_vip(seat) {
            self.price_vip
        } else {
            self.price
        }
    }

    /// Сумма по местам: VIP-ряды по `price_vip`, остальные по `price`.
    pub fn total_price<'a>(
        &self,
        config: &SeatConfig,
        seats: impl IntoIterator<Item = &'a SeatId>,
    ) -> u64 {
        seats.into_iter().map(|seat| self.seat_price(config, seat)).sum()
    }
}
