use chrono::{DateTime, Utc};
use greenlight_core::{AppError, AppResult, RequestId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::contact::EmailAddress;
use crate::provisioning::ProvisioningSpec;

/// Lifecycle status of one approval request.
///
/// Exactly one status holds at any time and transitions are monotonic: once a
/// status is left it is never revisited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestStatus {
    /// Awaiting the approver's decision or the expiration deadline.
    Pending,
    /// Approved by the approver; provisioning not yet settled.
    Approved,
    /// Rejected by the approver.
    Rejected,
    /// Deadline elapsed without a decision.
    Expired,
    /// Provisioning succeeded.
    Provisioned,
    /// Provisioning was attempted once and failed.
    ProvisionFailed,
}

impl RequestStatus {
    /// Returns stable storage value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
            Self::Expired => "EXPIRED",
            Self::Provisioned => "PROVISIONED",
            Self::ProvisionFailed => "PROVISION_FAILED",
        }
    }

    /// Parses storage value.
    pub fn parse(value: &str) -> AppResult<Self> {
        match value {
            "PENDING" => Ok(Self::Pending),
            "APPROVED" => Ok(Self::Approved),
            "REJECTED" => Ok(Self::Rejected),
            "EXPIRED" => Ok(Self::Expired),
            "PROVISIONED" => Ok(Self::Provisioned),
            "PROVISION_FAILED" => Ok(Self::ProvisionFailed),
            _ => Err(AppError::Validation(format!(
                "unknown request status '{value}'"
            ))),
        }
    }

    /// Returns whether no further transition may leave this status.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Rejected | Self::Expired | Self::Provisioned | Self::ProvisionFailed
        )
    }

    /// Returns whether the transition graph permits moving to `next`.
    ///
    /// `PENDING` settles to `APPROVED`, `REJECTED`, or `EXPIRED`; `APPROVED`
    /// resolves to `PROVISIONED` or `PROVISION_FAILED`; everything else is
    /// terminal.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        match self {
            Self::Pending => matches!(next, Self::Approved | Self::Rejected | Self::Expired),
            Self::Approved => matches!(next, Self::Provisioned | Self::ProvisionFailed),
            Self::Rejected | Self::Expired | Self::Provisioned | Self::ProvisionFailed => false,
        }
    }
}

/// Outcome of an explicit approver decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecisionOutcome {
    /// The approver approved the request.
    Approved,
    /// The approver rejected the request.
    Rejected,
}

impl DecisionOutcome {
    /// Returns stable storage value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
        }
    }

    /// Returns the request status this decision settles to.
    #[must_use]
    pub fn settled_status(&self) -> RequestStatus {
        match self {
            Self::Approved => RequestStatus::Approved,
            Self::Rejected => RequestStatus::Rejected,
        }
    }
}

/// Resolution metadata, meaningful once status leaves `PENDING`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    /// When the request was settled.
    pub decided_at: Option<DateTime<Utc>>,
    /// Actor that settled the request (`system` for expiration).
    pub decided_by: Option<String>,
    /// Identifier returned by the provisioning collaborator.
    pub resource_id: Option<String>,
    /// Attributes resolved by the provisioning collaborator.
    pub resolved_attributes: Option<Value>,
    /// Reason recorded when provisioning failed.
    pub failure_reason: Option<String>,
}

/// Input payload used to construct a validated, freshly submitted request.
#[derive(Debug, Clone)]
pub struct NewApprovalRequest {
    /// Identifier generated at submission.
    pub request_id: RequestId,
    /// Contact notified of the final outcome.
    pub requester_email: String,
    /// Contact asked to approve or reject.
    pub approver_email: String,
    /// Opaque provisioning specification payload.
    pub provisioning_spec: Value,
    /// Submission timestamp.
    pub submitted_at: DateTime<Utc>,
    /// Expiration deadline.
    pub expires_at: DateTime<Utc>,
}

/// Field-by-field representation used to rehydrate a stored request.
#[derive(Debug, Clone)]
pub struct ApprovalRequestParts {
    /// Request identifier.
    pub request_id: RequestId,
    /// Requester contact.
    pub requester_email: EmailAddress,
    /// Approver contact.
    pub approver_email: EmailAddress,
    /// Provisioning specification.
    pub provisioning_spec: ProvisioningSpec,
    /// Submission timestamp.
    pub submitted_at: DateTime<Utc>,
    /// Expiration deadline.
    pub expires_at: DateTime<Utc>,
    /// Current lifecycle status.
    pub status: RequestStatus,
    /// Resolution metadata.
    pub resolution: Resolution,
}

/// One provisioning request gated behind a human approval decision.
#[derive(Debug, Clone, PartialEq)]
pub struct ApprovalRequest {
    request_id: RequestId,
    requester_email: EmailAddress,
    approver_email: EmailAddress,
    provisioning_spec: ProvisioningSpec,
    submitted_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    status: RequestStatus,
    resolution: Resolution,
}

impl ApprovalRequest {
    /// Creates a validated, freshly submitted request in `PENDING` status.
    pub fn new(input: NewApprovalRequest) -> AppResult<Self> {
        let NewApprovalRequest {
            request_id,
            requester_email,
            approver_email,
            provisioning_spec,
            submitted_at,
            expires_at,
        } = input;

        if expires_at <= submitted_at {
            return Err(AppError::Validation(
                "expiration deadline must be after the submission time".to_owned(),
            ));
        }

        Ok(Self {
            request_id,
            requester_email: EmailAddress::new(requester_email)?,
            approver_email: EmailAddress::new(approver_email)?,
            provisioning_spec: ProvisioningSpec::new(provisioning_spec)?,
            submitted_at,
            expires_at,
            status: RequestStatus::Pending,
            resolution: Resolution::default(),
        })
    }

    /// Rehydrates a request from already-validated stored parts.
    #[must_use]
    pub fn from_parts(parts: ApprovalRequestParts) -> Self {
        let ApprovalRequestParts {
            request_id,
            requester_email,
            approver_email,
            provisioning_spec,
            submitted_at,
            expires_at,
            status,
            resolution,
        } = parts;

        Self {
            request_id,
            requester_email,
            approver_email,
            provisioning_spec,
            submitted_at,
            expires_at,
            status,
            resolution,
        }
    }

    /// Decomposes the request into its stored parts.
    #[must_use]
    pub fn into_parts(self) -> ApprovalRequestParts {
        ApprovalRequestParts {
            request_id: self.request_id,
            requester_email: self.requester_email,
            approver_email: self.approver_email,
            provisioning_spec: self.provisioning_spec,
            submitted_at: self.submitted_at,
            expires_at: self.expires_at,
            status: self.status,
            resolution: self.resolution,
        }
    }

    /// Returns the request identifier.
    #[must_use]
    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Returns the requester contact.
    #[must_use]
    pub fn requester_email(&self) -> &EmailAddress {
        &self.requester_email
    }

    /// Returns the approver contact.
    #[must_use]
    pub fn approver_email(&self) -> &EmailAddress {
        &self.approver_email
    }

    /// Returns the provisioning specification.
    #[must_use]
    pub fn provisioning_spec(&self) -> &ProvisioningSpec {
        &self.provisioning_spec
    }

    /// Returns the submission timestamp.
    #[must_use]
    pub fn submitted_at(&self) -> DateTime<Utc> {
        self.submitted_at
    }

    /// Returns the expiration deadline.
    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Returns the current lifecycle status.
    #[must_use]
    pub fn status(&self) -> RequestStatus {
        self.status
    }

    /// Returns the resolution metadata.
    #[must_use]
    pub fn resolution(&self) -> &Resolution {
        &self.resolution
    }

    /// Returns whether the request is still pending past the given instant.
    #[must_use]
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == RequestStatus::Pending && self.expires_at <= now
    }
}
