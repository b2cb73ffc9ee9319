use async_trait::async_trait;
use chrono::{DateTime, Utc};
use greenlight_core::{AppError, AppResult, RequestId};

/// How a decision token was consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenDisposition {
    /// Consumed by an explicit approval.
    Approved,
    /// Consumed by an explicit rejection.
    Rejected,
    /// Consumed by the expiration path.
    Expired,
}

impl TokenDisposition {
    /// Returns stable storage value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
            Self::Expired => "EXPIRED",
        }
    }

    /// Parses storage value.
    pub fn parse(value: &str) -> AppResult<Self> {
        match value {
            "APPROVED" => Ok(Self::Approved),
            "REJECTED" => Ok(Self::Rejected),
            "EXPIRED" => Ok(Self::Expired),
            _ => Err(AppError::Validation(format!(
                "unknown token disposition '{value}'"
            ))),
        }
    }
}

/// A token row returned by a successful conditional consume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumedToken {
    /// Request the token was bound to.
    pub request_id: RequestId,
    /// Recorded consumption outcome.
    pub disposition: TokenDisposition,
    /// Consumption timestamp.
    pub consumed_at: DateTime<Utc>,
}

/// Result of one conditional consume attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenConsumeOutcome {
    /// This caller won: the token is now consumed.
    Consumed(ConsumedToken),
    /// The token was already consumed by a competing caller.
    AlreadyConsumed,
    /// No live token matches (never issued, expired, or voided).
    Unknown,
}

/// Persistence port for single-use decision tokens.
///
/// Only SHA-256 hashes of token values are ever stored. The consume
/// operations are conditional writes on the per-token consumed flag; exactly
/// one caller observes `Consumed` for any token under any interleaving.
#[async_trait]
pub trait DecisionTokenStore: Send + Sync {
    /// Persists a live token hash bound to a request.
    ///
    /// Fails with `Conflict` if a live token already exists for the request.
    async fn create_token(
        &self,
        request_id: RequestId,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> AppResult<()>;

    /// Atomically consumes the live, unexpired token matching `token_hash`.
    ///
    /// A token past its deadline is reported as `Unknown`: late-arriving
    /// decisions lose even when the expiration fire has not landed yet.
    async fn consume_by_hash(
        &self,
        token_hash: &str,
        disposition: TokenDisposition,
    ) -> AppResult<TokenConsumeOutcome>;

    /// Atomically consumes the live token bound to `request_id`, regardless
    /// of its deadline. This is the expiration path's internal resolve.
    async fn consume_by_request(
        &self,
        request_id: RequestId,
        disposition: TokenDisposition,
    ) -> AppResult<TokenConsumeOutcome>;

    /// Removes any token bound to `request_id`. Used only as compensating
    /// cleanup when a submission fails after token issuance.
    async fn delete_for_request(&self, request_id: RequestId) -> AppResult<()>;
}
