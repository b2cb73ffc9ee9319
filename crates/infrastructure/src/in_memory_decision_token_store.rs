//! In-memory decision token store for tests and development.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use greenlight_application::{
    ConsumedToken, DecisionTokenStore, TokenConsumeOutcome, TokenDisposition,
};
use greenlight_core::{AppError, AppResult, RequestId};

#[derive(Debug, Clone)]
struct StoredToken {
    request_id: RequestId,
    expires_at: DateTime<Utc>,
    consumed: Option<(TokenDisposition, DateTime<Utc>)>,
}

/// In-memory decision token store implementation.
///
/// The compare-and-set on the per-token consumed flag happens under one write
/// lock, matching the conditional-update semantics of the Postgres adapter.
#[derive(Debug, Default)]
pub struct InMemoryDecisionTokenStore {
    tokens: RwLock<HashMap<String, StoredToken>>,
}

impl InMemoryDecisionTokenStore {
    /// Creates an empty in-memory token store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tokens: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl DecisionTokenStore for InMemoryDecisionTokenStore {
    async fn create_token(
        &self,
        request_id: RequestId,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> AppResult<()> {
        let mut tokens = self.tokens.write().await;

        if tokens
            .values()
            .any(|token| token.request_id == request_id && token.consumed.is_none())
        {
            return Err(AppError::Conflict(format!(
                "a live decision token already exists for request '{request_id}'"
            )));
        }

        tokens.insert(
            token_hash.to_owned(),
            StoredToken {
                request_id,
                expires_at,
                consumed: None,
            },
        );
        Ok(())
    }

    async fn consume_by_hash(
        &self,
        token_hash: &str,
        disposition: TokenDisposition,
    ) -> AppResult<TokenConsumeOutcome> {
        let mut tokens = self.tokens.write().await;
        let Some(token) = tokens.get_mut(token_hash) else {
            return Ok(TokenConsumeOutcome::Unknown);
        };

        if token.consumed.is_some() {
            return Ok(TokenConsumeOutcome::AlreadyConsumed);
        }

        if token.expires_at <= Utc::now() {
            return Ok(TokenConsumeOutcome::Unknown);
        }

        let consumed_at = Utc::now();
        token.consumed = Some((disposition, consumed_at));
        Ok(TokenConsumeOutcome::Consumed(ConsumedToken {
            request_id: token.request_id,
            disposition,
            consumed_at,
        }))
    }

    async fn consume_by_request(
        &self,
        request_id: RequestId,
        disposition: TokenDisposition,
    ) -> AppResult<TokenConsumeOutcome> {
        let mut tokens = self.tokens.write().await;
        let Some(token) = tokens
            .values_mut()
            .find(|token| token.request_id == request_id)
        else {
            return Ok(TokenConsumeOutcome::Unknown);
        };

        if token.consumed.is_some() {
            return Ok(TokenConsumeOutcome::AlreadyConsumed);
        }

        let consumed_at = Utc::now();
        token.consumed = Some((disposition, consumed_at));
        Ok(TokenConsumeOutcome::Consumed(ConsumedToken {
            request_id,
            disposition,
            consumed_at,
        }))
    }

    async fn delete_for_request(&self, request_id: RequestId) -> AppResult<()> {
        self.tokens
            .write()
            .await
            .retain(|_, token| token.request_id != request_id);
        Ok(())
    }
}
