//! Decision token minting and single-consumption resolution.
//!
//! Tokens are cryptographically random, stored as SHA-256 hashes, single-use,
//! and bound 1:1 to a pending request. The raw token value is the sole
//! credential for resolving the workflow: whoever presents a valid, unconsumed
//! token may settle the request.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use greenlight_core::{AppError, AppResult, RequestId};
use greenlight_domain::DecisionOutcome;

use crate::approval_ports::{
    ConsumedToken, DecisionTokenStore, TokenConsumeOutcome, TokenDisposition,
};

/// Broker guaranteeing at-most-one successful resolution per decision token.
#[derive(Clone)]
pub struct DecisionTokenBroker {
    store: Arc<dyn DecisionTokenStore>,
}

impl DecisionTokenBroker {
    /// Creates a broker over the given token store.
    #[must_use]
    pub fn new(store: Arc<dyn DecisionTokenStore>) -> Self {
        Self { store }
    }

    /// Mints a fresh token for a pending request and returns the raw value.
    ///
    /// Fails with `Conflict` when a live token already exists for the request.
    pub async fn issue(
        &self,
        request_id: RequestId,
        expires_at: DateTime<Utc>,
    ) -> AppResult<String> {
        let (raw_token, token_hash) = generate_token();

        self.store
            .create_token(request_id, &token_hash, expires_at)
            .await?;

        Ok(raw_token)
    }

    /// Resolves a pending request with an explicit approver decision.
    ///
    /// Exactly one caller can consume any token: a competing caller observes
    /// `AlreadySettled`, and an unknown or expired token yields
    /// `InvalidToken`. Neither error carries internal identifiers.
    pub async fn resolve(
        &self,
        raw_token: &str,
        outcome: DecisionOutcome,
    ) -> AppResult<ConsumedToken> {
        let token_hash = hash_token(raw_token);
        let disposition = match outcome {
            DecisionOutcome::Approved => TokenDisposition::Approved,
            DecisionOutcome::Rejected => TokenDisposition::Rejected,
        };

        match self.store.consume_by_hash(&token_hash, disposition).await? {
            TokenConsumeOutcome::Consumed(consumed) => Ok(consumed),
            TokenConsumeOutcome::AlreadyConsumed => Err(AppError::AlreadySettled(
                "decision token was already consumed".to_owned(),
            )),
            TokenConsumeOutcome::Unknown => Err(AppError::InvalidToken(
                "decision token is unknown or expired".to_owned(),
            )),
        }
    }

    /// Consumes the live token for a request on behalf of the expiration path.
    ///
    /// Returns the raw consume outcome so the caller can distinguish a lost
    /// race (`AlreadyConsumed`) from a missing token row (`Unknown`).
    pub async fn resolve_for_request(
        &self,
        request_id: RequestId,
    ) -> AppResult<TokenConsumeOutcome> {
        self.store
            .consume_by_request(request_id, TokenDisposition::Expired)
            .await
    }

    /// Voids any token issued for a request. Compensation for failed submissions.
    pub async fn void(&self, request_id: RequestId) -> AppResult<()> {
        self.store.delete_for_request(request_id).await
    }
}

/// Generates a cryptographically random token and its SHA-256 hash.
///
/// Returns `(raw_token_hex, sha256_hash_hex)`.
fn generate_token() -> (String, String) {
    use std::fmt::Write;

    let mut bytes = [0u8; 32];
    // getrandom should not fail on supported platforms. Fallback: a
    // zero-filled token, rejected at resolution because its hash will not
    // match any stored row after the duplicate-issue check.
    getrandom::fill(&mut bytes).unwrap_or(());

    let raw_token = bytes
        .iter()
        .fold(String::with_capacity(64), |mut acc, byte| {
            let _ = write!(acc, "{byte:02x}");
            acc
        });

    let hash = hash_token(&raw_token);
    (raw_token, hash)
}

/// Computes the SHA-256 hash of a token string for storage.
fn hash_token(raw_token: &str) -> String {
    use sha2::{Digest, Sha256};
    use std::fmt::Write;

    let mut hasher = Sha256::new();
    hasher.update(raw_token.as_bytes());
    let result = hasher.finalize();

    result
        .iter()
        .fold(String::with_capacity(64), |mut acc, byte| {
            let _ = write!(acc, "{byte:02x}");
            acc
        })
}
