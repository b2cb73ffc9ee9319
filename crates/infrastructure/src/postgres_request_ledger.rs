//! PostgreSQL-backed request ledger.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use greenlight_application::{RequestLedger, RequestListQuery, StatusUpdate};
use greenlight_core::{AppError, AppResult, RequestId};
use greenlight_domain::{
    ApprovalRequest, ApprovalRequestParts, EmailAddress, ProvisioningSpec, RequestStatus,
    Resolution,
};

const SELECT_COLUMNS: &str = "request_id, requester_email, approver_email, provisioning_spec, \
     submitted_at, expires_at, status, decided_at, decided_by, resource_id, \
     resolved_attributes, failure_reason";

/// PostgreSQL implementation of the request ledger port.
#[derive(Clone)]
pub struct PostgresRequestLedger {
    pool: PgPool,
}

impl PostgresRequestLedger {
    /// Creates a ledger with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct RequestRow {
    request_id: Uuid,
    requester_email: String,
    approver_email: String,
    provisioning_spec: serde_json::Value,
    submitted_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    status: String,
    decided_at: Option<DateTime<Utc>>,
    decided_by: Option<String>,
    resource_id: Option<String>,
    resolved_attributes: Option<serde_json::Value>,
    failure_reason: Option<String>,
}

impl RequestRow {
    fn into_request(self) -> AppResult<ApprovalRequest> {
        Ok(ApprovalRequest::from_parts(ApprovalRequestParts {
            request_id: RequestId::from_uuid(self.request_id),
            requester_email: EmailAddress::new(self.requester_email)?,
            approver_email: EmailAddress::new(self.approver_email)?,
            provisioning_spec: ProvisioningSpec::new(self.provisioning_spec)?,
            submitted_at: self.submitted_at,
            expires_at: self.expires_at,
            status: RequestStatus::parse(self.status.as_str())?,
            resolution: Resolution {
                decided_at: self.decided_at,
                decided_by: self.decided_by,
                resource_id: self.resource_id,
                resolved_attributes: self.resolved_attributes,
                failure_reason: self.failure_reason,
            },
        }))
    }
}

#[async_trait]
impl RequestLedger for PostgresRequestLedger {
    async fn put(&self, request: ApprovalRequest) -> AppResult<()> {
        let parts = request.into_parts();

        sqlx::query(
            r#"
            INSERT INTO approval_requests (
                request_id, requester_email, approver_email, provisioning_spec,
                submitted_at, expires_at, status
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(parts.request_id.as_uuid())
        .bind(parts.requester_email.as_str())
        .bind(parts.approver_email.as_str())
        .bind(parts.provisioning_spec.as_value())
        .bind(parts.submitted_at)
        .bind(parts.expires_at)
        .bind(parts.status.as_str())
        .execute(&self.pool)
        .await
        .map_err(|error| {
            if error
                .as_database_error()
                .is_some_and(|db_error| db_error.is_unique_violation())
            {
                AppError::Conflict(format!(
                    "request '{}' already exists",
                    parts.request_id
                ))
            } else {
                AppError::Internal(format!("failed to store approval request: {error}"))
            }
        })?;

        Ok(())
    }

    async fn update_status(
        &self,
        request_id: RequestId,
        expected_status: RequestStatus,
        update: StatusUpdate,
    ) -> AppResult<ApprovalRequest> {
        let row = sqlx::query_as::<_, RequestRow>(&format!(
            r#"
            UPDATE approval_requests
            SET status = $3,
                decided_at = COALESCE($4, decided_at),
                decided_by = COALESCE($5, decided_by),
                resource_id = COALESCE($6, resource_id),
                resolved_attributes = COALESCE($7, resolved_attributes),
                failure_reason = COALESCE($8, failure_reason)
            WHERE request_id = $1
              AND status = $2
            RETURNING {SELECT_COLUMNS}
            "#
        ))
        .bind(request_id.as_uuid())
        .bind(expected_status.as_str())
        .bind(update.new_status.as_str())
        .bind(update.resolution.decided_at)
        .bind(update.resolution.decided_by.as_deref())
        .bind(update.resolution.resource_id.as_deref())
        .bind(update.resolution.resolved_attributes.as_ref())
        .bind(update.resolution.failure_reason.as_deref())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to update approval request status: {error}"))
        })?;

        match row {
            Some(row) => row.into_request(),
            // The conditional update matched nothing: distinguish an absent
            // row from a lost status race.
            None => {
                let current = sqlx::query_scalar::<_, String>(
                    "SELECT status FROM approval_requests WHERE request_id = $1",
                )
                .bind(request_id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(|error| {
                    AppError::Internal(format!("failed to read approval request status: {error}"))
                })?;

                match current {
                    Some(current) => Err(AppError::Conflict(format!(
                        "request '{request_id}' is {current}, expected {}",
                        expected_status.as_str()
                    ))),
                    None => Err(AppError::NotFound(format!(
                        "request '{request_id}' not found"
                    ))),
                }
            }
        }
    }

    async fn delete(&self, request_id: RequestId) -> AppResult<()> {
        sqlx::query("DELETE FROM approval_requests WHERE request_id = $1")
            .bind(request_id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to delete approval request: {error}"))
            })?;

        Ok(())
    }

    async fn find_request(&self, request_id: RequestId) -> AppResult<Option<ApprovalRequest>> {
        let row = sqlx::query_as::<_, RequestRow>(&format!(
            "SELECT {SELECT_COLUMNS} FROM approval_requests WHERE request_id = $1"
        ))
        .bind(request_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to load approval request: {error}"))
        })?;

        row.map(RequestRow::into_request).transpose()
    }

    async fn list_requests(&self, query: RequestListQuery) -> AppResult<Vec<ApprovalRequest>> {
        let limit = i64::try_from(query.limit).unwrap_or(i64::MAX);
        let offset = i64::try_from(query.offset).unwrap_or(i64::MAX);

        let rows = sqlx::query_as::<_, RequestRow>(&format!(
            r#"
            SELECT {SELECT_COLUMNS}
            FROM approval_requests
            WHERE ($1::TEXT IS NULL OR status = $1)
            ORDER BY submitted_at DESC
            LIMIT $2 OFFSET $3
            "#
        ))
        .bind(query.status.map(|status| status.as_str()))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to list approval requests: {error}"))
        })?;

        rows.into_iter().map(RequestRow::into_request).collect()
    }

    async fn list_due_requests(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> AppResult<Vec<ApprovalRequest>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        let rows = sqlx::query_as::<_, RequestRow>(&format!(
            r#"
            SELECT {SELECT_COLUMNS}
            FROM approval_requests
            WHERE status = 'PENDING'
              AND expires_at <= $1
            ORDER BY expires_at
            LIMIT $2
            "#
        ))
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to list due approval requests: {error}"))
        })?;

        rows.into_iter().map(RequestRow::into_request).collect()
    }
}
