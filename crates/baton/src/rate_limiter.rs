//! A fixed-window limiter shared by every generation call in a process.
//!
//! The window is one minute long. A call takes a slot before it starts, so concurrent
//! callers can never begin more than `rpm_limit` calls inside one window. A call that
//! fails hands its slot back if its window is still current.

use anyhow::Result;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

use crate::errors::ConfigError;
use crate::models::message::Message;
use crate::providers::base::{GenerateConfig, Generation, Provider};

pub const DEFAULT_RPM_LIMIT: u32 = 10;
pub const WINDOW: Duration = Duration::from_secs(60);

struct Window {
    start: Instant,
    calls: u32,
}

pub struct RateLimiter {
    rpm_limit: u32,
    window: Mutex<Window>,
}

impl RateLimiter {
    pub fn new(rpm_limit: u32) -> Result<Self, ConfigError> {
        if rpm_limit == 0 {
            return Err(ConfigError::InvalidRpmLimit(rpm_limit));
        }
        Ok(Self {
            rpm_limit,
            window: Mutex::new(Window {
                start: Instant::now(),
                calls: 0,
            }),
        })
    }

    pub fn rpm_limit(&self) -> u32 {
        self.rpm_limit
    }

    /// Wait until a slot is free in the current window and claim it. Returns the start of
    /// the window the slot belongs to.
    async fn acquire(&self) -> Instant {
        let mut window = self.window.lock().await;

        let elapsed = window.start.elapsed();
        if elapsed >= WINDOW {
            tracing::debug!("rate limit window reset");
            window.start = Instant::now();
            window.calls = 0;
        }

        if window.calls >= self.rpm_limit {
            let elapsed = window.start.elapsed();
            if let Some(wait) = WINDOW.checked_sub(elapsed).filter(|w| !w.is_zero()) {
                tracing::warn!(
                    rpm_limit = self.rpm_limit,
                    wait_secs = wait.as_secs_f64(),
                    "rate limit reached, waiting for the next window"
                );
                // Hold the lock while sleeping so later callers queue behind this one
                sleep(wait).await;
            }
            window.start = Instant::now();
            window.calls = 0;
        }

        window.calls += 1;
        window.start
    }

    async fn release(&self, window_start: Instant) {
        let mut window = self.window.lock().await;
        if window.start == window_start && window.calls > 0 {
            window.calls -= 1;
        }
    }

    /// Run `f` once a slot is available. Errors from `f` are returned unchanged and do
    /// not use up the slot.
    pub async fn guarded_call<F, Fut, T, E>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let window_start = self.acquire().await;
        let result = f().await;
        if result.is_err() {
            self.release(window_start).await;
        }
        result
    }
}

/// Sends every generation request of the wrapped provider through a shared limiter
pub struct RateLimitedProvider {
    inner: Arc<dyn Provider>,
    limiter: Arc<RateLimiter>,
}

impl RateLimitedProvider {
    pub fn new(inner: Arc<dyn Provider>, limiter: Arc<RateLimiter>) -> Self {
        Self { inner, limiter }
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }
}

#[async_trait]
impl Provider for RateLimitedProvider {
    async fn generate(
        &self,
        model: &str,
        contents: &[Message],
        config: &GenerateConfig,
    ) -> Result<Generation> {
        self.limiter
            .guarded_call(|| self.inner.generate(model, contents, config))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::mock::MockProvider;
    use anyhow::anyhow;

    #[test]
    fn test_zero_limit_is_rejected() {
        let result = RateLimiter::new(0);
        assert!(matches!(result, Err(ConfigError::InvalidRpmLimit(0))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_calls_under_limit_do_not_wait() {
        let limiter = RateLimiter::new(3).unwrap();
        let start = Instant::now();
        for _ in 0..3 {
            limiter
                .guarded_call(|| async { Ok::<_, anyhow::Error>(()) })
                .await
                .unwrap();
        }
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_kth_call_waits_for_its_window() {
        let limiter = RateLimiter::new(2).unwrap();
        let first = Instant::now();
        let mut started = Vec::new();
        for _ in 0..5 {
            let at = limiter
                .guarded_call(|| async { Ok::<_, anyhow::Error>(first.elapsed()) })
                .await
                .unwrap();
            started.push(at);
        }

        assert_eq!(started[0], Duration::ZERO);
        assert_eq!(started[1], Duration::ZERO);
        assert!(started[2] >= Duration::from_secs(60));
        assert!(started[3] >= Duration::from_secs(60));
        assert!(started[4] >= Duration::from_secs(120));
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_resets_after_idle_minute() {
        let limiter = RateLimiter::new(1).unwrap();
        limiter
            .guarded_call(|| async { Ok::<_, anyhow::Error>(()) })
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(61)).await;
        let before = Instant::now();
        limiter
            .guarded_call(|| async { Ok::<_, anyhow::Error>(()) })
            .await
            .unwrap();
        assert_eq!(before.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_calls_give_their_slot_back() {
        let limiter = RateLimiter::new(1).unwrap();
        let err = limiter
            .guarded_call(|| async { Err::<(), _>(anyhow!("boom")) })
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "boom");

        let before = Instant::now();
        limiter
            .guarded_call(|| async { Ok::<_, anyhow::Error>(()) })
            .await
            .unwrap();
        assert_eq!(before.elapsed(), Duration::ZERO);

        // a successful call keeps its slot
        limiter
            .guarded_call(|| async { Ok::<_, anyhow::Error>(()) })
            .await
            .unwrap();
        assert!(before.elapsed() >= Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_provider_forwards_calls() {
        let mock = Arc::new(MockProvider::with_messages(vec![
            Message::model().with_text("one"),
            Message::model().with_text("two"),
        ]));
        let limiter = Arc::new(RateLimiter::new(1).unwrap());
        let provider = RateLimitedProvider::new(mock.clone(), limiter);

        let start = Instant::now();
        let messages = vec![Message::user().with_text("hi")];
        let first = provider
            .generate("m", &messages, &GenerateConfig::default())
            .await
            .unwrap();
        let second = provider
            .generate("m", &messages, &GenerateConfig::default())
            .await
            .unwrap();

        assert_eq!(first.message.unwrap().texts(), vec!["one"]);
        assert_eq!(second.message.unwrap().texts(), vec!["two"]);
        assert!(start.elapsed() >= Duration::from_secs(60));
        assert_eq!(mock.call_count(), 2);
    }
}
