use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

// Главная структура конфигурации - контейнер для всех настроек
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub storage: StorageConfig,
    pub booking: BookingConfig,
    pub payment: PaymentConfig,
    pub session: SessionConfig,
}

// Настройки приложения
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub environment: String,
    pub rust_log: String,
}

// Где хранить корзину и бронирования
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    File,
    Redis,
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(StorageBackend::Memory),
            "file" => Ok(StorageBackend::File),
            "redis" => Ok(StorageBackend::Redis),
            other => Err(format!("unknown storage backend '{}'", other)),
        }
    }
}

// Настройки хранилища
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub dir: PathBuf,
    pub redis_url: Option<String>,
}

// Правила бронирования
#[derive(Debug, Clone, Deserialize)]
pub struct BookingConfig {
    pub hold_seconds: u64,
    pub max_seats: usize,
    pub sold_seat_attempts: u32,
    pub booking_days: u32,
}

// Настройки имитации платежа
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentConfig {
    pub processing_delay_ms: u64,
}

// Сколько живёт простаивающая сессия и как часто их убирать
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    pub idle_seconds: u64,
    pub sweep_seconds: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { idle_seconds: 1800, sweep_seconds: 60 }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} must be a valid value, got '{value}'")]
    Invalid { name: &'static str, value: String },
    #[error("{0} must be set when STORAGE_BACKEND=redis")]
    Missing(&'static str),
}

impl Default for BookingConfig {
    fn default() -> Self {
        Self {
            hold_seconds: 300,
            max_seats: 8,
            sold_seat_attempts: 15,
            booking_days: 7,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let storage_backend = parse_var("STORAGE_BACKEND", "memory")?;
        let redis_url = env::var("REDIS_URL").ok();
        if storage_backend == StorageBackend::Redis && redis_url.is_none() {
            return Err(ConfigError::Missing("REDIS_URL"));
        }

        Ok(Config {
            app: AppConfig {
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: parse_var("PORT", "8000")?,
                environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
                rust_log: env::var("RUST_LOG")
                    .unwrap_or_else(|_| "cinema_booking=debug,tower_http=debug".to_string()),
            },
            storage: StorageConfig {
                backend: storage_backend,
                dir: env::var("STORAGE_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from("./data")),
                redis_url,
            },
            booking: BookingConfig {
                hold_seconds: parse_var("SEAT_HOLD_SECONDS", "300")?,
                max_seats: parse_var("MAX_SEATS_PER_BOOKING", "8")?,
                sold_seat_attempts: parse_var("SOLD_SEAT_ATTEMPTS", "15")?,
                booking_days: parse_var("BOOKING_DAYS", "7")?,
            },
            payment: PaymentConfig {
                processing_delay_ms: parse_var("PAYMENT_DELAY_MS", "2000")?,
            },
            session: SessionConfig {
                idle_seconds: parse_var("SESSION_IDLE_SECONDS", "1800")?,
                sweep_seconds: parse_var("SESSION_SWEEP_SECONDS", "60")?,
            },
        })
    }

    /// Конфигурация для тестов: память вместо диска, без задержки платежа.
    pub fn for_tests() -> Self {
        Config {
            app: AppConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
                environment: "test".to_string(),
                rust_log: "cinema_booking=debug".to_string(),
            },
            storage: StorageConfig {
                backend: StorageBackend::Memory,
                dir: PathBuf::from("./data"),
                redis_url: None,
            },
            booking: BookingConfig::default(),
            payment: PaymentConfig { processing_delay_ms: 0 },
            session: SessionConfig::default(),
        }
    }
}

fn parse_var<T: FromStr>(name: &'static str, default: &str) -> Result<T, ConfigError> {
    let value = env::var(name).unwrap_or_else(|_| default.to_string());
    value
        .parse()
        .map_err(|_| ConfigError::Invalid { name, value })
}
