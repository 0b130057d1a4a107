//! Детерминированная генерация уже проданных мест для сеанса.
//!
//! Сид - сумма UTF-16 кодов символов id сеанса. На шаге `i` берётся ряд
//! `(seed + 7i) mod rows` и место `(seed + 11i) mod seats_per_row + 1`.
//! Совпадения просто пропускаются, поэтому мест может получиться меньше `attempts`.

use std::collections::BTreeSet;

use crate::models::{SeatConfig, SeatId};

const ROW_STRIDE: u64 = 7;
const SEAT_STRIDE: u64 = 11;

pub fn showtime_seed(showtime_id: &str) -> u64 {
    showtime_id.encode_utf16().map(u64::from).sum()
}

pub fn generate_sold_seats(showtime_id: &str, config: &SeatConfig, attempts: u32) -> BTreeSet<SeatId> {
    let mut sold = BTreeSet::new();
    if config.rows.is_empty() || config.seats_per_row == 0 {
        return sold;
    }

    let seed = showtime_seed(showtime_id);
    let rows = config.rows.len() as u64;
    let seats_per_row = u64::from(config.seats_per_row);

    for i in 0..u64::from(attempts) {
        let row = config.rows[((seed + i * ROW_STRIDE) % rows) as usize];
        // seats_per_row <= u8::MAX, значит и номер помещается в u8
        let number = ((seed + i * SEAT_STRIDE) % seats_per_row + 1) as u8;
        sold.insert(SeatId::new(row, number));
    }

    sold
}
