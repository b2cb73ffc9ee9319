//! PostgreSQL-backed decision token store.
//!
//! Single consumption is a conditional `UPDATE ... WHERE consumed_at IS NULL`
//! on the token row, so exactly one caller observes the consumed row under
//! any interleaving of decision callbacks and timer fires.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use greenlight_application::{
    ConsumedToken, DecisionTokenStore, TokenConsumeOutcome, TokenDisposition,
};
use greenlight_core::{AppError, AppResult, RequestId};

/// PostgreSQL implementation of the decision token store port.
#[derive(Clone)]
pub struct PostgresDecisionTokenStore {
    pool: PgPool,
}

impl PostgresDecisionTokenStore {
    /// Creates a token store with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct ConsumedRow {
    request_id: Uuid,
    disposition: Option<String>,
    consumed_at: Option<DateTime<Utc>>,
}

impl ConsumedRow {
    fn into_consumed_token(self) -> AppResult<ConsumedToken> {
        let disposition = self.disposition.ok_or_else(|| {
            AppError::Internal("consumed token row is missing its disposition".to_owned())
        })?;
        let consumed_at = self.consumed_at.ok_or_else(|| {
            AppError::Internal("consumed token row is missing its timestamp".to_owned())
        })?;

        Ok(ConsumedToken {
            request_id: RequestId::from_uuid(self.request_id),
            disposition: TokenDisposition::parse(disposition.as_str())?,
            consumed_at,
        })
    }
}

#[async_trait]
impl DecisionTokenStore for PostgresDecisionTokenStore {
    async fn create_token(
        &self,
        request_id: RequestId,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO decision_tokens (token_hash, request_id, expires_at)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(token_hash)
        .bind(request_id.as_uuid())
        .bind(expires_at)
        .execute(&self.pool)
        .await
        .map_err(|error| {
            if error
                .as_database_error()
                .is_some_and(|db_error| db_error.is_unique_violation())
            {
                AppError::Conflict(format!(
                    "a live decision token already exists for request '{request_id}'"
                ))
            } else {
                AppError::Internal(format!("failed to create decision token: {error}"))
            }
        })?;

        Ok(())
    }

    async fn consume_by_hash(
        &self,
        token_hash: &str,
        disposition: TokenDisposition,
    ) -> AppResult<TokenConsumeOutcome> {
        let row = sqlx::query_as::<_, ConsumedRow>(
            r#"
            UPDATE decision_tokens
            SET consumed_at = now(), disposition = $2
            WHERE token_hash = $1
              AND consumed_at IS NULL
              AND expires_at > now()
            RETURNING request_id, disposition, consumed_at
            "#,
        )
        .bind(token_hash)
        .bind(disposition.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to consume decision token: {error}")))?;

        if let Some(row) = row {
            return Ok(TokenConsumeOutcome::Consumed(row.into_consumed_token()?));
        }

        // Nothing matched: a consumed row means a lost race; a live-but-late
        // or absent row is indistinguishable from never-issued on purpose.
        let already_consumed = sqlx::query_scalar::<_, bool>(
            "SELECT consumed_at IS NOT NULL FROM decision_tokens WHERE token_hash = $1",
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to inspect decision token: {error}")))?;

        match already_consumed {
            Some(true) => Ok(TokenConsumeOutcome::AlreadyConsumed),
            Some(false) | None => Ok(TokenConsumeOutcome::Unknown),
        }
    }

    async fn consume_by_request(
        &self,
        request_id: RequestId,
        disposition: TokenDisposition,
    ) -> AppResult<TokenConsumeOutcome> {
        let row = sqlx::query_as::<_, ConsumedRow>(
            r#"
            UPDATE decision_tokens
            SET consumed_at = now(), disposition = $2
            WHERE request_id = $1
              AND consumed_at IS NULL
            RETURNING request_id, disposition, consumed_at
            "#,
        )
        .bind(request_id.as_uuid())
        .bind(disposition.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to consume decision token: {error}")))?;

        if let Some(row) = row {
            return Ok(TokenConsumeOutcome::Consumed(row.into_consumed_token()?));
        }

        let existing = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM decision_tokens WHERE request_id = $1",
        )
        .bind(request_id.as_uuid())
        .fetch_one(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to inspect decision token: {error}")))?;

        if existing > 0 {
            Ok(TokenConsumeOutcome::AlreadyConsumed)
        } else {
            Ok(TokenConsumeOutcome::Unknown)
        }
    }

    async fn delete_for_request(&self, request_id: RequestId) -> AppResult<()> {
        sqlx::query("DELETE FROM decision_tokens WHERE request_id = $1")
            .bind(request_id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to delete decision token: {error}"))
            })?;

        Ok(())
    }
}
