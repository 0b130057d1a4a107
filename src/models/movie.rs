use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovieStatus {
    NowShowing,
    ComingSoon,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Movie {
    pub id: String,
    pub title: String,
    pub title_en: String,
    pub genre: Vec<String>,
    /// Длительность в минутах
    pub duration: u32,
    pub release_date: NaiveDate,
    pub director: String,
    pub rating: f32,
    pub age_rating: String,
    pub status: MovieStatus,
}

impl Movie {
    pub fn is_now_showing(&self) -> bool {
        self.status == MovieStatus::NowShowing
    }
}
