//! Таймер удержания мест.
//!
//! Запускается, когда корзина становится непустой. Каждую секунду задача
//! заново читает часы и сравнивает с сохранённым моментом старта (без
//! накопления дрейфа), а на нуле дожидается `on_expire` и завершается.
//! [`HoldHandle`] при drop отменяет задачу.

use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy)]
pub struct HoldTimer {
    hold: Duration,
    tick: Duration,
}

/// Оставшиеся целые секунды удержания: `max(0, hold - elapsed)`.
pub fn remaining_secs(started_at: Instant, hold: Duration, now: Instant) -> u64 {
    let elapsed = now.saturating_duration_since(started_at).as_secs();
    hold.as_secs().saturating_sub(elapsed)
}

impl HoldTimer {
    pub fn new(hold: Duration) -> Self {
        Self { hold, tick: Duration::from_secs(1) }
    }

    pub fn hold(&self) -> Duration {
        self.hold
    }

    /// Запускает отсчёт с текущего момента.
    ///
    /// Вне tokio-рантайма задача не создаётся: истечение тогда проверяется
    /// только при чтении через [`HoldHandle::is_expired`].
    pub fn start<F, Fut>(&self, on_expire: F) -> HoldHandle
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let started_at = Instant::now();
        let hold = self.hold;
        let tick = self.tick;

        let task = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => Some(runtime.spawn(async move {
                let mut ticker = tokio::time::interval(tick);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    ticker.tick().await;
                    let remaining = remaining_secs(started_at, hold, Instant::now());
                    if remaining == 0 {
                        debug!("Seat hold expired after {}s", hold.as_secs());
                        on_expire().await;
                        break;
                    }
                }
            })),
            Err(_) => {
                warn!("No async runtime, seat hold will only expire on read");
                None
            }
        };

        HoldHandle { started_at, hold, task }
    }
}

pub struct HoldHandle {
    started_at: Instant,
    hold: Duration,
    task: Option<JoinHandle<()>>,
}

impl HoldHandle {
    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    pub fn remaining(&self) -> u64 {
        remaining_secs(self.started_at, self.hold, Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        self.remaining() == 0
    }

    pub fn cancel(mut self) {
        self.abort();
    }

    /// Отпускает хэндл, не трогая задачу. Нужен самому `on_expire`:
    /// обычный drop оборвал бы его на ближайшем `.await`.
    pub fn detach(mut self) {
        self.task.take();
    }

    fn abort(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for HoldHandle {
    fn drop(&mut self) {
        self.abort();
    }
}
