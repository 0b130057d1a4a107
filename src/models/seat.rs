use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Место в зале: буква ряда + номер, например `G7`.
///
/// Порядок: сначала ряд, потом номер, поэтому `BTreeSet<SeatId>`
/// выдаёт места в том порядке, в котором их читают на схеме зала.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SeatId {
    pub row: char,
    pub number: u8,
}

impl SeatId {
    pub fn new(row: char, number: u8) -> Self {
        Self { row: row.to_ascii_uppercase(), number }
    }
}

impl fmt::Display for SeatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.row, self.number)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid seat id '{0}'")]
pub struct ParseSeatIdError(pub String);

impl FromStr for SeatId {
    type Err = ParseSeatIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let mut chars = s.chars();
        let row = chars
            .next()
            .filter(|c| c.is_ascii_alphabetic())
            .ok_or_else(|| ParseSeatIdError(s.to_string()))?;
        let number: u8 = chars
            .as_str()
            .parse()
            .map_err(|_| ParseSeatIdError(s.to_string()))?;
        if number == 0 {
            return Err(ParseSeatIdError(s.to_string()));
        }
        Ok(SeatId::new(row, number))
    }
}

// В JSON место хранится строкой "G7", как и в хранилище браузера
impl Serialize for SeatId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SeatId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Геометрия зала. Создаётся один раз при старте.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatConfig {
    pub rows: Vec<char>,
    pub seats_per_row: u8,
    pub vip_rows: BTreeSet<char>,
    /// Номера мест, после которых на схеме идёт проход.
    pub aisles: BTreeSet<u8>,
}

impl Default for SeatConfig {
    fn default() -> Self {
        Self {
            rows: ('A'..='J').collect(),
            seats_per_row: 12,
            vip_rows: ['G', 'H', 'I', 'J'].into_iter().collect(),
            aisles: [3, 9].into_iter().collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SeatStatus {
    Available,
    Selected,
    Sold,
}

#[derive(Debug, Clone, Serialize)]
pub struct SeatCell {
    pub seat: SeatId,
    pub vip: bool,
    pub aisle_after: bool,
    pub status: SeatStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct SeatRow {
    pub row: char,
    pub seats: Vec<SeatCell>,
}

impl SeatConfig {
    pub fn capacity(&self) -> usize {
        self.rows.len() * self.seats_per_row as usize
    }

    pub fn contains(&self, seat: &SeatId) -> bool {
        self.rows.contains(&seat.row) && (1..=self.seats_per_row).contains(&seat.number)
    }

    pub fn is_vip(&self, seat: &SeatId) -> bool {
        self.vip_rows.contains(&seat.row)
    }

    pub fn has_aisle_after(&self, number: u8) -> bool {
        self.aisles.contains(&number)
    }

    /// Все места зала по рядам, слева направо.
    pub fn seat_ids(&self) -> impl Iterator<Item = SeatId> + '_ {
        self.rows
            .iter()
            .flat_map(move |&row| (1..=self.seats_per_row).map(move |n| SeatId::new(row, n)))
    }

    /// Схема зала для отрисовки с учётом проданных и выбранных мест.
    pub fn layout(&self, sold: &BTreeSet<SeatId>, selected: &BTreeSet<SeatId>) -> Vec<SeatRow> {
        self.rows
            .iter()
            .map(|&row| SeatRow {
                row,
                seats: (1..=self.seats_per_row)
                    .map(|number| {
                        let seat = SeatId::new(row, number);
                        let status = if sold.contains(&seat) {
                            SeatStatus::Sold
                        } else if selected.contains(&seat) {
                            SeatStatus::Selected
                        } else {
                            SeatStatus::Available
                        };
                        SeatCell {
                            seat,
                            vip: self.is_vip(&seat),
                            aisle_after: self.has_aisle_after(number),
                            status,
                        }
                    })
                    .collect(),
            })
            .collect()
    }
}
