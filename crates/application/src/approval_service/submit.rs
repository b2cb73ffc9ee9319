use chrono::Utc;
use greenlight_core::{AppResult, RequestId};
use greenlight_domain::{ApprovalRequest, NewApprovalRequest};
use serde_json::Value;
use tracing::{info, warn};

use super::{ApprovalService, notifications};

/// Submission payload accepted from the HTTP boundary.
#[derive(Debug, Clone)]
pub struct SubmitRequestInput {
    /// Contact notified of the final outcome.
    pub requester_email: String,
    /// Contact asked to approve or reject.
    pub approver_email: String,
    /// Opaque provisioning specification, passed through to the collaborator.
    pub provisioning_spec: Value,
}

impl ApprovalService {
    /// Submits a provisioning request and suspends it awaiting a decision.
    ///
    /// Persists the initial `PENDING` record, issues the decision token, arms
    /// the expiration timer, and emails the approver. Token issuance or timer
    /// arming failures fail the whole submission and delete the partial
    /// ledger record, so no partial state is left visible. The approval email
    /// is best-effort: a delivery failure is logged and the request still
    /// expires on schedule.
    pub async fn submit(&self, input: SubmitRequestInput) -> AppResult<ApprovalRequest> {
        let submitted_at = Utc::now();
        let request = ApprovalRequest::new(NewApprovalRequest {
            request_id: RequestId::new(),
            requester_email: input.requester_email,
            approver_email: input.approver_email,
            provisioning_spec: input.provisioning_spec,
            submitted_at,
            expires_at: submitted_at + self.config.approval_window(),
        })?;
        let request_id = request.request_id();

        self.ledger.put(request.clone()).await?;

        let raw_token = match self.broker.issue(request_id, request.expires_at()).await {
            Ok(raw_token) => raw_token,
            Err(error) => {
                self.compensate_submission(request_id, false).await;
                return Err(error);
            }
        };

        if let Err(error) = self.timer.arm(request_id, request.expires_at()).await {
            self.compensate_submission(request_id, true).await;
            return Err(error);
        }

        let (subject, body) = notifications::approval_request_email(
            &request,
            self.config.approval_base_url(),
            &raw_token,
        );
        if let Err(error) = self
            .email_service
            .send_email(request.approver_email().as_str(), &subject, &body, None)
            .await
        {
            warn!(
                request_id = %request_id,
                error = %error,
                "failed to send approval request email"
            );
        }

        info!(
            request_id = %request_id,
            expires_at = %request.expires_at(),
            "approval request submitted"
        );
        Ok(request)
    }

    /// Rolls back a partially submitted request so no partial state is visible.
    async fn compensate_submission(&self, request_id: RequestId, void_token: bool) {
        if void_token
            && let Err(error) = self.broker.void(request_id).await
        {
            warn!(
                request_id = %request_id,
                error = %error,
                "failed to void decision token during submission cleanup"
            );
        }

        if let Err(error) = self.ledger.delete(request_id).await {
            warn!(
                request_id = %request_id,
                error = %error,
                "failed to delete partial ledger record during submission cleanup"
            );
        }
    }
}
