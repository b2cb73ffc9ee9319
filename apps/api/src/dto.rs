use greenlight_domain::ApprovalRequest;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use ts_rs::TS;

/// Incoming payload for request submission.
#[derive(Debug, Deserialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/submit-request.ts"
)]
pub struct SubmitRequestRequest {
    pub requester_email: String,
    pub approver_email: String,
    #[ts(type = "Record<string, unknown>")]
    pub provisioning_spec: Value,
}

/// Response returned for an accepted submission.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/submit-response.ts"
)]
pub struct SubmitRequestResponse {
    pub request_id: String,
    pub status: String,
    pub expires_at: String,
}

/// API representation of one approval request.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/approval-request-response.ts"
)]
pub struct ApprovalRequestResponse {
    pub request_id: String,
    pub requester_email: String,
    pub approver_email: String,
    #[ts(type = "Record<string, unknown>")]
    pub provisioning_spec: Value,
    pub submitted_at: String,
    pub expires_at: String,
    pub status: String,
    pub decided_at: Option<String>,
    pub decided_by: Option<String>,
    pub resource_id: Option<String>,
    #[ts(type = "unknown | null")]
    pub resolved_attributes: Option<Value>,
    pub failure_reason: Option<String>,
}

impl From<ApprovalRequest> for ApprovalRequestResponse {
    fn from(request: ApprovalRequest) -> Self {
        let parts = request.into_parts();

        Self {
            request_id: parts.request_id.to_string(),
            requester_email: parts.requester_email.into(),
            approver_email: parts.approver_email.into(),
            provisioning_spec: parts.provisioning_spec.into(),
            submitted_at: parts.submitted_at.to_rfc3339(),
            expires_at: parts.expires_at.to_rfc3339(),
            status: parts.status.as_str().to_owned(),
            decided_at: parts
                .resolution
                .decided_at
                .map(|timestamp| timestamp.to_rfc3339()),
            decided_by: parts.resolution.decided_by,
            resource_id: parts.resolution.resource_id,
            resolved_attributes: parts.resolution.resolved_attributes,
            failure_reason: parts.resolution.failure_reason,
        }
    }
}

impl From<ApprovalRequest> for SubmitRequestResponse {
    fn from(request: ApprovalRequest) -> Self {
        Self {
            request_id: request.request_id().to_string(),
            status: request.status().as_str().to_owned(),
            expires_at: request.expires_at().to_rfc3339(),
        }
    }
}

/// Response for the internal expiration sweep.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/sweep-response.ts"
)]
pub struct SweepResponse {
    pub expired_count: u32,
}

/// Health probe payload.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/health-response.ts"
)]
pub struct HealthResponse {
    pub status: &'static str,
}
