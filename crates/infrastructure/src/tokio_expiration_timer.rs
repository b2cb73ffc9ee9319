//! Tokio-based expiration timer.
//!
//! One spawned sleep task per armed request. Each fire runs on its own task,
//! so a slow settlement for one request never delays fires for others. The
//! fire handler is gated by the decision token's single consumption, which
//! makes best-effort cancellation safe.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::warn;

use greenlight_application::{ExpirationHandler, ExpirationTimer};
use greenlight_core::{AppError, AppResult, RequestId};

struct TimerInner {
    handler: OnceLock<Arc<dyn ExpirationHandler>>,
    armed: Mutex<HashMap<RequestId, JoinHandle<()>>>,
}

/// Tokio implementation of the expiration timer port.
#[derive(Clone)]
pub struct TokioExpirationTimer {
    inner: Arc<TimerInner>,
}

impl TokioExpirationTimer {
    /// Creates a timer with no handler bound yet.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(TimerInner {
                handler: OnceLock::new(),
                armed: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Binds the handler invoked on fire. The handler is typically the
    /// approval service, which also holds this timer, so binding happens
    /// once at composition time rather than at construction.
    pub fn bind_handler(&self, handler: Arc<dyn ExpirationHandler>) -> AppResult<()> {
        self.inner
            .handler
            .set(handler)
            .map_err(|_| AppError::Internal("expiration handler is already bound".to_owned()))
    }
}

impl Default for TokioExpirationTimer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExpirationTimer for TokioExpirationTimer {
    async fn arm(&self, request_id: RequestId, deadline: DateTime<Utc>) -> AppResult<()> {
        let mut armed = self.inner.armed.lock().await;

        if armed.contains_key(&request_id) {
            return Err(AppError::Conflict(format!(
                "timer already armed for request '{request_id}'"
            )));
        }

        let delay = (deadline - Utc::now())
            .to_std()
            .unwrap_or(StdDuration::ZERO);
        let inner = self.inner.clone();

        // The entry is inserted while this lock is held, so the spawned task
        // cannot observe the map before its own handle is registered.
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            inner.armed.lock().await.remove(&request_id);

            let Some(handler) = inner.handler.get() else {
                warn!(
                    request_id = %request_id,
                    "expiration deadline fired with no handler bound"
                );
                return;
            };

            handler.request_expired(request_id).await;
        });

        armed.insert(request_id, handle);
        Ok(())
    }

    async fn cancel(&self, request_id: RequestId) -> AppResult<bool> {
        match self.inner.armed.lock().await.remove(&request_id) {
            Some(handle) => {
                handle.abort();
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration as StdDuration;

    use async_trait::async_trait;
    use chrono::{Duration, Utc};
    use tokio::sync::Mutex;

    use greenlight_application::{ExpirationHandler, ExpirationTimer};
    use greenlight_core::RequestId;

    use super::TokioExpirationTimer;

    #[derive(Default)]
    struct RecordingHandler {
        fired: Mutex<Vec<RequestId>>,
    }

    #[async_trait]
    impl ExpirationHandler for RecordingHandler {
        async fn request_expired(&self, request_id: RequestId) {
            self.fired.lock().await.push(request_id);
        }
    }

    fn timer_with_handler() -> (TokioExpirationTimer, Arc<RecordingHandler>) {
        let timer = TokioExpirationTimer::new();
        let handler = Arc::new(RecordingHandler::default());
        assert!(timer.bind_handler(handler.clone()).is_ok());
        (timer, handler)
    }

    #[tokio::test]
    async fn fires_once_after_deadline() {
        let (timer, handler) = timer_with_handler();
        let request_id = RequestId::new();

        let armed = timer
            .arm(request_id, Utc::now() + Duration::milliseconds(20))
            .await;
        assert!(armed.is_ok());

        tokio::time::sleep(StdDuration::from_millis(150)).await;
        assert_eq!(handler.fired.lock().await.as_slice(), &[request_id]);
    }

    #[tokio::test]
    async fn cancel_before_deadline_prevents_fire() {
        let (timer, handler) = timer_with_handler();
        let request_id = RequestId::new();

        let armed = timer
            .arm(request_id, Utc::now() + Duration::milliseconds(100))
            .await;
        assert!(armed.is_ok());

        let cancelled = timer.cancel(request_id).await;
        assert_eq!(cancelled.ok(), Some(true));

        tokio::time::sleep(StdDuration::from_millis(200)).await;
        assert!(handler.fired.lock().await.is_empty());
    }

    #[tokio::test]
    async fn rearming_an_armed_request_conflicts() {
        let (timer, _handler) = timer_with_handler();
        let request_id = RequestId::new();
        let deadline = Utc::now() + Duration::hours(1);

        assert!(timer.arm(request_id, deadline).await.is_ok());
        assert!(timer.arm(request_id, deadline).await.is_err());
    }

    #[tokio::test]
    async fn cancel_after_fire_is_a_noop() {
        let (timer, handler) = timer_with_handler();
        let request_id = RequestId::new();

        let armed = timer
            .arm(request_id, Utc::now() + Duration::milliseconds(10))
            .await;
        assert!(armed.is_ok());

        tokio::time::sleep(StdDuration::from_millis(100)).await;

        let cancelled = timer.cancel(request_id).await;
        assert_eq!(cancelled.ok(), Some(false));
        assert_eq!(handler.fired.lock().await.len(), 1);
    }
}
