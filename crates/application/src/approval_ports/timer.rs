use async_trait::async_trait;
use chrono::{DateTime, Utc};
use greenlight_core::{AppResult, RequestId};

/// Port for the per-request expiration deadline.
#[async_trait]
pub trait ExpirationTimer: Send + Sync {
    /// Schedules a single fire event at `deadline`.
    ///
    /// Fails with `Conflict` if a timer is already armed for the request.
    async fn arm(&self, request_id: RequestId, deadline: DateTime<Utc>) -> AppResult<()>;

    /// Prevents the pending fire if it has not yet occurred.
    ///
    /// Returns whether a fire was still pending. Cancellation is best-effort:
    /// a cancel that loses the race is harmless because the fire handler is
    /// gated by the decision token's single consumption.
    async fn cancel(&self, request_id: RequestId) -> AppResult<bool>;
}

/// Callback invoked when an armed deadline fires.
#[async_trait]
pub trait ExpirationHandler: Send + Sync {
    /// Drives the expiration settlement for one request.
    async fn request_expired(&self, request_id: RequestId);
}
