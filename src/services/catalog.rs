//! Каталог: фильмы, кинотеатры и сеансы.
//!
//! Данные моковые и живут в памяти. Сеансы генерируются детерминированно
//! на `days` дней вперёд; номер дня в id сеанса считается от фиксированной
//! эпохи, поэтому одна и та же дата всегда даёт те же сеансы с теми же id.
//! [`CatalogSource`] пересобирает окно, когда по часам наступает новый день.
//! Пользовательские фильмы и сеансы из хранилища (`movies_custom`,
//! `showtimes_custom`) подмешиваются поверх сгенерированных.

use chrono::{Local, NaiveDate, NaiveTime};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::info;

use crate::models::{
    movie::MovieStatus, theater::Location, Movie, Screen, ScreenKind, SeatConfig, Showtime, Theater,
};
use crate::storage::{Storage, StorageKey};

const SLOT_TIMES: [(u32, u32); 6] = [(9, 0), (11, 30), (14, 0), (16, 30), (19, 0), (21, 30)];

#[derive(Debug, Clone)]
pub struct Catalog {
    movies: Vec<Movie>,
    theaters: Vec<Theater>,
    showtimes: Vec<Showtime>,
    seat_config: SeatConfig,
    opens_on: NaiveDate,
}

impl Catalog {
    /// Моковый каталог с сеансами на `days` дней начиная с `today`.
    pub fn mock(today: NaiveDate, days: u32) -> Self {
        Self::mock_window(today, today, days)
    }

    /// Моковый каталог на `days` дней начиная с `from`; номера дней
    /// отсчитываются от `epoch`.
    pub fn mock_window(epoch: NaiveDate, from: NaiveDate, days: u32) -> Self {
        let movies = mock_movies();
        let theaters = mock_theaters();
        let showtimes = generate_showtimes(&movies, &theaters, epoch, from, days);
        Self {
            movies,
            theaters,
            showtimes,
            seat_config: SeatConfig::default(),
            opens_on: from,
        }
    }

    /// Первый день окна продаж.
    pub fn opens_on(&self) -> NaiveDate {
        self.opens_on
    }

    pub fn seat_config(&self) -> &SeatConfig {
        &self.seat_config
    }

    pub fn movies(&self) -> &[Movie] {
        &self.movies
    }

    pub fn movies_now_showing(&self) -> Vec<&Movie> {
        self.movies.iter().filter(|m| m.is_now_showing()).collect()
    }

    pub fn theaters(&self) -> &[Theater] {
        &self.theaters
    }

    pub fn showtimes(&self) -> &[Showtime] {
        &self.showtimes
    }

    pub fn movie(&self, id: &str) -> Option<&Movie> {
        self.movies.iter().find(|m| m.id == id)
    }

    pub fn theater(&self, id: &str) -> Option<&Theater> {
        self.theaters.iter().find(|t| t.id == id)
    }

    pub fn showtime(&self, id: &str) -> Option<&Showtime> {
        self.showtimes.iter().find(|s| s.id == id)
    }

    /// Сеансы фильма в кинотеатре на дату, по времени начала.
    pub fn showtimes_for(&self, movie_id: &str, theater_id: &str, date: NaiveDate) -> Vec<&Showtime> {
        let mut found: Vec<&Showtime> = self
            .showtimes
            .iter()
            .filter(|s| s.movie_id == movie_id && s.theater_id == theater_id && s.date() == date)
            .collect();
        found.sort_by_key(|s| s.date_time);
        found
    }
}

/// Фильмы и сеансы, сохранённые из админки. Читаются один раз при старте
/// и накладываются на каждое пересобранное окно.
#[derive(Debug, Clone, Default)]
pub struct CustomEntries {
    pub movies: Vec<Movie>,
    pub showtimes: Vec<Showtime>,
}

impl CustomEntries {
    pub async fn load(storage: &Storage) -> Self {
        let movies = storage
            .get::<Vec<Movie>>(StorageKey::MoviesCustom)
            .await
            .unwrap_or_default();
        let showtimes = storage
            .get::<Vec<Showtime>>(StorageKey::ShowtimesCustom)
            .await
            .unwrap_or_default();
        if !movies.is_empty() || !showtimes.is_empty() {
            info!("Loaded {} custom movies and {} custom showtimes", movies.len(), showtimes.len());
        }
        Self { movies, showtimes }
    }

    /// Одноимённые записи заменяются, новые добавляются в конец.
    pub fn apply(&self, mut catalog: Catalog) -> Catalog {
        for movie in &self.movies {
            match catalog.movies.iter_mut().find(|m| m.id == movie.id) {
                Some(existing) => *existing = movie.clone(),
                None => catalog.movies.push(movie.clone()),
            }
        }
        for showtime in &self.showtimes {
            match catalog.showtimes.iter_mut().find(|s| s.id == showtime.id) {
                Some(existing) => *existing = showtime.clone(),
                None => catalog.showtimes.push(showtime.clone()),
            }
        }
        catalog
    }
}

/// Откуда берётся "сегодня".
#[derive(Debug, Clone)]
pub enum Clock {
    System,
    /// Дата, которую двигают вручную (тесты, демо).
    Manual(Arc<RwLock<NaiveDate>>),
}

impl Clock {
    pub fn manual(today: NaiveDate) -> Self {
        Clock::Manual(Arc::new(RwLock::new(today)))
    }

    pub fn today(&self) -> NaiveDate {
        match self {
            Clock::System => Local::now().date_naive(),
            Clock::Manual(date) => *date.read(),
        }
    }

    /// Переводит ручные часы на `date`; системные не меняются.
    pub fn set(&self, date: NaiveDate) {
        if let Clock::Manual(current) = self {
            *current.write() = date;
        }
    }
}

/// Текущий каталог с окном продаж от сегодняшней даты.
pub struct CatalogSource {
    epoch: NaiveDate,
    days: u32,
    clock: Clock,
    custom: CustomEntries,
    current: RwLock<Arc<Catalog>>,
}

impl CatalogSource {
    pub fn new(clock: Clock, days: u32, custom: CustomEntries) -> Self {
        let epoch = clock.today();
        Self::with_epoch(epoch, clock, days, custom)
    }

    pub fn with_epoch(epoch: NaiveDate, clock: Clock, days: u32, custom: CustomEntries) -> Self {
        let initial = Arc::new(Self::build(epoch, clock.today(), days, &custom));
        info!(
            "Catalog ready: {} movies, {} theaters, {} showtimes from {}",
            initial.movies().len(),
            initial.theaters().len(),
            initial.showtimes().len(),
            initial.opens_on()
        );
        Self { epoch, days, clock, custom, current: RwLock::new(initial) }
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    /// Каталог на сегодня. Со сменой даты окно сдвигается.
    pub fn current(&self) -> Arc<Catalog> {
        let today = self.clock.today();
        let snapshot = self.current.read().clone();
        if snapshot.opens_on() == today {
            return snapshot;
        }

        let mut slot = self.current.write();
        if slot.opens_on() != today {
            *slot = Arc::new(Self::build(self.epoch, today, self.days, &self.custom));
            info!("Catalog window moved to {} ({} showtimes)", today, slot.showtimes().len());
        }
        slot.clone()
    }

    fn build(epoch: NaiveDate, from: NaiveDate, days: u32, custom: &CustomEntries) -> Catalog {
        custom.apply(Catalog::mock_window(epoch, from, days))
    }
}

fn generate_showtimes(
    movies: &[Movie],
    theaters: &[Theater],
    epoch: NaiveDate,
    from: NaiveDate,
    days: u32,
) -> Vec<Showtime> {
    let mut showtimes = Vec::new();

    for (mi, movie) in movies.iter().filter(|m| m.is_now_showing()).enumerate() {
        for (ti, theater) in theaters.iter().enumerate() {
            for (si, screen) in theater.screens.iter().take(2).enumerate() {
                let (price, price_vip) = match screen.kind {
                    ScreenKind::Imax => (150_000, 200_000),
                    ScreenKind::FourDx => (180_000, 230_000),
                    _ => (90_000, 120_000),
                };

                for offset in 0..days {
                    let Some(date) = from.checked_add_days(chrono::Days::new(u64::from(offset))) else {
                        continue;
                    };
                    // Номер дня от эпохи: одинаковая дата даёт одинаковые сеансы
                    let day = (date - epoch).num_days().unsigned_abs() as usize;
                    // 3-4 сеанса в день на зал
                    let slots = 3 + (mi + ti + si + day) % 2;

                    for (idx, &(hour, minute)) in SLOT_TIMES.iter().take(slots).enumerate() {
                        let Some(time) = NaiveTime::from_hms_opt(hour, minute, 0) else {
                            continue;
                        };
                        let spread = (mi * 7 + ti * 11 + si * 13 + day * 17 + idx * 19) % 50;
                        showtimes.push(Showtime {
                            id: format!("sht_{}_{}_{}_{}_{}", movie.id, theater.id, screen.id, day, idx),
                            movie_id: movie.id.clone(),
                            theater_id: theater.id.clone(),
                            screen_id: screen.id.clone(),
                            date_time: date.and_time(time),
                            price,
                            price_vip,
                            available_seats: 70 + spread as u32,
                        });
                    }
                }
            }
        }
    }

    showtimes
}

fn movie(
    id: &str,
    title: &str,
    genre: &[&str],
    duration: u32,
    release: (i32, u32, u32),
    director: &str,
    rating: f32,
    age_rating: &str,
    status: MovieStatus,
) -> Movie {
    Movie {
        id: id.to_string(),
        title: title.to_string(),
        title_en: title.to_string(),
        genre: genre.iter().map(|g| g.to_string()).collect(),
        duration,
        release_date: NaiveDate::from_ymd_opt(release.0, release.1, release.2).unwrap_or_default(),
        director: director.to_string(),
        rating,
        age_rating: age_rating.to_string(),
        status,
    }
}

fn mock_movies() -> Vec<Movie> {
    use MovieStatus::*;
    vec![
        movie("mov_001", "Dune: Part Two", &["Action", "Sci-Fi"], 166, (2024, 3, 1), "Denis Villeneuve", 9.5, "C16", NowShowing),
        movie("mov_002", "Mai", &["Drama", "Romance"], 131, (2024, 2, 10), "Tran Thanh", 8.9, "T18", NowShowing),
        movie("mov_003", "Kung Fu Panda 4", &["Animation", "Comedy", "Family"], 94, (2024, 3, 8), "Mike Mitchell", 9.2, "P", NowShowing),
        movie("mov_004", "Godzilla x Kong: The New Empire", &["Action", "Sci-Fi"], 115, (2024, 3, 29), "Adam Wingard", 8.5, "C13", NowShowing),
        movie("mov_005", "Exhuma", &["Horror", "Mystery"], 134, (2024, 2, 22), "Jang Jae-hyun", 9.1, "C18", NowShowing),
        movie("mov_006", "Face Off 7: A Wish", &["Action", "Family"], 138, (2024, 4, 26), "Ly Hai", 8.7, "C13", ComingSoon),
        movie("mov_011", "Deadpool & Wolverine", &["Action", "Comedy"], 127, (2024, 7, 26), "Shawn Levy", 9.3, "C18", ComingSoon),
    ]
}

fn screen(id: &str, name: &str, total_seats: u32, kind: ScreenKind) -> Screen {
    Screen { id: id.to_string(), name: name.to_string(), total_seats, kind }
}

fn theater(
    id: &str,
    name: &str,
    (address, city, district): (&str, &str, &str),
    distance: &str,
    screens: Vec<Screen>,
) -> Theater {
    Theater {
        id: id.to_string(),
        name: name.to_string(),
        location: Location {
            address: address.to_string(),
            city: city.to_string(),
            district: district.to_string(),
        },
        screens,
        distance: Some(distance.to_string()),
    }
}

fn mock_theaters() -> Vec<Theater> {
    use ScreenKind::*;
    vec![
        theater(
            "tht_001",
            "VietCinema Vincom Center",
            ("72 Le Thanh Ton", "Ho Chi Minh City", "District 1"),
            "0.5 km",
            vec![
                screen("scr_001", "Screen 1", 120, TwoD),
                screen("scr_002", "Screen 2 IMAX", 200, Imax),
                screen("scr_003", "Screen 3", 100, TwoD),
            ],
        ),
        theater(
            "tht_002",
            "VietCinema Landmark 81",
            ("208 Nguyen Huu Canh", "Ho Chi Minh City", "Binh Thanh"),
            "3.2 km",
            vec![
                screen("scr_004", "Screen 1 4DX", 80, FourDx),
                screen("scr_005", "Screen 2", 150, ThreeD),
                screen("scr_006", "Screen 3 IMAX", 250, Imax),
            ],
        ),
        theater(
            "tht_003",
            "VietCinema Aeon Mall Tan Phu",
            ("30 Bo Bao Tan Thang", "Ho Chi Minh City", "Tan Phu"),
            "8.5 km",
            vec![
                screen("scr_007", "Screen 1", 120, TwoD),
                screen("scr_008", "Screen 2", 120, ThreeD),
            ],
        ),
        theater(
            "tht_004",
            "VietCinema Times City",
            ("458 Minh Khai", "Ha Noi", "Hai Ba Trung"),
            "12 km",
            vec![
                screen("scr_009", "Screen 1 IMAX", 220, Imax),
                screen("scr_010", "Screen 2", 140, TwoD),
                screen("scr_011", "Screen 3", 100, ThreeD),
            ],
        ),
        theater(
            "tht_005",
            "VietCinema Royal City",
            ("72A Nguyen Trai", "Ha Noi", "Thanh Xuan"),
            "15 km",
            vec![
                screen("scr_012", "Screen 1 Gold Class", 40, TwoD),
                screen("scr_013", "Screen 2 4DX", 80, FourDx),
            ],
        ),
    ]
}
