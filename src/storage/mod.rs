//! Долговременное key-value хранилище (аналог localStorage браузера).
//!
//! Все операции через [`Storage`] best-effort: ошибка записи или чтения
//! логируется и проглатывается, источником правды остаётся состояние в памяти.

mod file;
mod memory;
#[cfg(feature = "redis-storage")]
mod redis;

pub use file::FileStore;
pub use memory::MemoryStore;
#[cfg(feature = "redis-storage")]
pub use self::redis::RedisStore;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use tracing::{error, warn};

use crate::config::{StorageBackend, StorageConfig};

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[cfg(feature = "redis-storage")]
    #[error("redis error: {0}")]
    Redis(#[from] ::redis::RedisError),
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
}

/// Сырой доступ к хранилищу: строка по ключу.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    async fn remove(&self, key: &str) -> Result<(), StorageError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKey {
    Bookings,
    MoviesCustom,
    ShowtimesCustom,
    Cart,
}

impl StorageKey {
    pub fn as_str(self) -> &'static str {
        match self {
            StorageKey::Bookings => "bookings",
            StorageKey::MoviesCustom => "movies_custom",
            StorageKey::ShowtimesCustom => "showtimes_custom",
            StorageKey::Cart => "cart",
        }
    }
}

/// Типизированная обёртка над [`KeyValueStore`] с JSON-значениями.
#[derive(Clone)]
pub struct Storage {
    backend: Arc<dyn KeyValueStore>,
    namespace: String,
}

impl Storage {
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self { backend, namespace: String::new() }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::default()))
    }

    /// Отдельное пространство ключей на тот же бэкенд (одна сессия = один "браузер").
    pub fn scoped(&self, namespace: &str) -> Self {
        let namespace = if self.namespace.is_empty() {
            namespace.to_string()
        } else {
            format!("{}:{}", self.namespace, namespace)
        };
        Self { backend: self.backend.clone(), namespace }
    }

    fn full_key(&self, key: StorageKey) -> String {
        if self.namespace.is_empty() {
            key.as_str().to_string()
        } else {
            format!("{}:{}", self.namespace, key.as_str())
        }
    }

    pub async fn get<T: DeserializeOwned>(&self, key: StorageKey) -> Option<T> {
        let full_key = self.full_key(key);
        let raw = match self.backend.get(&full_key).await {
            Ok(raw) => raw?,
            Err(e) => {
                error!("Failed to read {} from storage: {}", full_key, e);
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Discarding unreadable value under {}: {}", full_key, e);
                None
            }
        }
    }

    pub async fn set<T: Serialize + Sync + ?Sized>(&self, key: StorageKey, value: &T) {
        let full_key = self.full_key(key);
        let result = match serde_json::to_string(value) {
            Ok(raw) => self.backend.set(&full_key, &raw).await,
            Err(e) => Err(e.into()),
        };
        if let Err(e) = result {
            error!("Failed to save {} to storage: {}", full_key, e);
        }
    }

    pub async fn remove(&self, key: StorageKey) {
        let full_key = self.full_key(key);
        if let Err(e) = self.backend.remove(&full_key).await {
            error!("Failed to remove {} from storage: {}", full_key, e);
        }
    }
}

/// Собирает хранилище по конфигурации.
pub async fn build_storage(config: &StorageConfig) -> Result<Storage, StorageError> {
    match config.backend {
        StorageBackend::Memory => Ok(Storage::in_memory()),
        StorageBackend::File => Ok(Storage::new(Arc::new(FileStore::open(&config.dir).await?))),
        StorageBackend::Redis => connect_redis(config).await,
    }
}

#[cfg(feature = "redis-storage")]
async fn connect_redis(config: &StorageConfig) -> Result<Storage, StorageError> {
    let url = config
        .redis_url
        .as_deref()
        .ok_or_else(|| StorageError::Unavailable("REDIS_URL is not set".to_string()))?;
    Ok(Storage::new(Arc::new(RedisStore::connect(url).await?)))
}

#[cfg(not(feature = "redis-storage"))]
async fn connect_redis(_config: &StorageConfig) -> Result<Storage, StorageError> {
    Err(StorageError::Unavailable(
        "built without the redis-storage feature".to_string(),
    ))
}
