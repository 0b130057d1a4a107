use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::AppState;

/// Периодическая уборка: выселяет простаивающие сессии из реестра.
/// Бронирования остаются в хранилище и подтянутся при следующем визите.
pub struct CleanupService {
    state: Arc<AppState>,
}

impl CleanupService {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    /// Один проход уборки. Возвращает число выселенных сессий.
    pub fn run_full_cleanup(&self) -> usize {
        let max_idle = Duration::from_secs(self.state.config.session.idle_seconds);
        let evicted = self.state.sessions.evict_idle(max_idle);
        if evicted > 0 {
            info!(
                "🧹 Evicted {} idle sessions, {} still open",
                evicted,
                self.state.sessions.len()
            );
        } else {
            debug!("🧹 No idle sessions to evict");
        }
        evicted
    }

    /// Фоновая задача: уборка раз в `sweep_seconds`.
    pub fn spawn(self) -> JoinHandle<()> {
        let period = Duration::from_secs(self.state.config.session.sweep_seconds.max(1));
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(period).await;
                self.run_full_cleanup();
            }
        })
    }
}
