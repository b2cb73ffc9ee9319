use async_trait::async_trait;
use chrono::{DateTime, Utc};
use greenlight_core::{AppResult, RequestId};
use greenlight_domain::{ApprovalRequest, ApprovalRequestParts, RequestStatus, Resolution};

/// Query options for the operational request listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestListQuery {
    /// Optional status filter.
    pub status: Option<RequestStatus>,
    /// Page size.
    pub limit: usize,
    /// Row offset.
    pub offset: usize,
}

/// One status transition applied through the ledger.
///
/// Resolution fields that are `Some` overwrite the stored values; `None`
/// fields are left unchanged.
#[derive(Debug, Clone)]
pub struct StatusUpdate {
    /// Status the request moves to.
    pub new_status: RequestStatus,
    /// Resolution fields recorded with the transition.
    pub resolution: Resolution,
}

impl StatusUpdate {
    /// Applies the transition to stored request parts, merging `Some`
    /// resolution fields over the existing values.
    pub fn apply_to(&self, parts: &mut ApprovalRequestParts) {
        parts.status = self.new_status;

        if let Some(decided_at) = self.resolution.decided_at {
            parts.resolution.decided_at = Some(decided_at);
        }
        if let Some(decided_by) = self.resolution.decided_by.clone() {
            parts.resolution.decided_by = Some(decided_by);
        }
        if let Some(resource_id) = self.resolution.resource_id.clone() {
            parts.resolution.resource_id = Some(resource_id);
        }
        if let Some(resolved_attributes) = self.resolution.resolved_attributes.clone() {
            parts.resolution.resolved_attributes = Some(resolved_attributes);
        }
        if let Some(failure_reason) = self.resolution.failure_reason.clone() {
            parts.resolution.failure_reason = Some(failure_reason);
        }
    }
}

/// Durable record of request attributes and current status.
///
/// `update_status` is a conditional write: it succeeds only while the stored
/// status equals `expected_status`, which serializes competing transitions on
/// one request without any lock spanning the ledger.
///
/// Resolution fields carried by a later transition (for example `APPROVED`
/// to `PROVISIONED`) merge over the stored values, so decision metadata
/// recorded earlier survives.
#[async_trait]
pub trait RequestLedger: Send + Sync {
    /// Creates the initial record. Fails with `Conflict` if the id exists.
    async fn put(&self, request: ApprovalRequest) -> AppResult<()>;

    /// Conditionally moves a request to a new status.
    ///
    /// Fails with `NotFound` if the id is absent and `Conflict` if the stored
    /// status no longer equals `expected_status`.
    async fn update_status(
        &self,
        request_id: RequestId,
        expected_status: RequestStatus,
        update: StatusUpdate,
    ) -> AppResult<ApprovalRequest>;

    /// Removes a record. Used only as compensating cleanup when a submission
    /// fails after the initial write.
    async fn delete(&self, request_id: RequestId) -> AppResult<()>;

    /// Returns one request by id.
    async fn find_request(&self, request_id: RequestId) -> AppResult<Option<ApprovalRequest>>;

    /// Lists requests for audit tooling, newest first.
    async fn list_requests(&self, query: RequestListQuery) -> AppResult<Vec<ApprovalRequest>>;

    /// Lists `PENDING` requests whose deadline is at or before `now`.
    async fn list_due_requests(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> AppResult<Vec<ApprovalRequest>>;
}
