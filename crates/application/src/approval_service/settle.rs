use chrono::Utc;
use greenlight_core::{AppError, AppResult, RequestId};
use greenlight_domain::{ApprovalRequest, DecisionOutcome, RequestStatus, Resolution};
use tracing::{info, warn};

use super::{ApprovalService, notifications};
use crate::approval_ports::{StatusUpdate, TokenConsumeOutcome};

const SWEEP_BATCH_LIMIT: usize = 100;

impl ApprovalService {
    /// Applies an explicit approver decision carried by a raw token.
    ///
    /// The broker's conditional consume is the arbitration point: a duplicate
    /// or late call observes `AlreadySettled`, a never-issued token
    /// `InvalidToken`, and neither changes any state. On the winning call the
    /// new status is written to the ledger before any externally visible side
    /// effect (provisioning, notification).
    pub async fn decide(
        &self,
        raw_token: &str,
        outcome: DecisionOutcome,
    ) -> AppResult<ApprovalRequest> {
        let consumed = self.broker.resolve(raw_token, outcome).await?;
        let request_id = consumed.request_id;

        // Best-effort: a cancel that loses to the fire is harmless because
        // the fire handler observes the consumed token and does nothing.
        if let Err(error) = self.timer.cancel(request_id).await {
            warn!(
                request_id = %request_id,
                error = %error,
                "failed to cancel expiration timer"
            );
        }

        let pending = self
            .ledger
            .find_request(request_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("request '{request_id}' not found")))?;
        let decided_by = pending.approver_email().as_str().to_owned();

        let settled = self
            .ledger
            .update_status(
                request_id,
                RequestStatus::Pending,
                StatusUpdate {
                    new_status: outcome.settled_status(),
                    resolution: Resolution {
                        decided_at: Some(consumed.consumed_at),
                        decided_by: Some(decided_by),
                        ..Resolution::default()
                    },
                },
            )
            .await
            .map_err(|error| match error {
                AppError::Conflict(message) => AppError::AlreadySettled(message),
                other => other,
            })?;

        let settled = match outcome {
            DecisionOutcome::Approved => self.provision(settled).await?,
            DecisionOutcome::Rejected => settled,
        };

        self.notify_requester(&settled).await;
        info!(
            request_id = %request_id,
            status = settled.status().as_str(),
            "approval request settled"
        );
        Ok(settled)
    }

    /// Calls the provisioning collaborator exactly once for an approved request.
    ///
    /// Only the caller that won the `PENDING` to `APPROVED` transition reaches
    /// this point, and a collaborator failure is terminal: the request moves
    /// to `PROVISION_FAILED` and is never retried automatically.
    async fn provision(&self, approved: ApprovalRequest) -> AppResult<ApprovalRequest> {
        let request_id = approved.request_id();

        match self
            .provisioner
            .provision(request_id, approved.provisioning_spec())
            .await
        {
            Ok(resource) => {
                self.ledger
                    .update_status(
                        request_id,
                        RequestStatus::Approved,
                        StatusUpdate {
                            new_status: RequestStatus::Provisioned,
                            resolution: Resolution {
                                resource_id: Some(resource.resource_id),
                                resolved_attributes: Some(resource.resolved_attributes),
                                ..Resolution::default()
                            },
                        },
                    )
                    .await
            }
            Err(error) => {
                warn!(
                    request_id = %request_id,
                    error = %error,
                    "provisioning collaborator failed"
                );
                self.ledger
                    .update_status(
                        request_id,
                        RequestStatus::Approved,
                        StatusUpdate {
                            new_status: RequestStatus::ProvisionFailed,
                            resolution: Resolution {
                                failure_reason: Some(error.to_string()),
                                ..Resolution::default()
                            },
                        },
                    )
                    .await
            }
        }
    }

    /// Settles a request as expired. Returns `None` when a competing decision
    /// won the race, which is not an error.
    pub async fn expire(&self, request_id: RequestId) -> AppResult<Option<ApprovalRequest>> {
        match self.broker.resolve_for_request(request_id).await? {
            TokenConsumeOutcome::AlreadyConsumed => return Ok(None),
            // `Unknown` means the token row is gone (compensated submission
            // or a store that lost state); the conditional status update
            // below is the remaining fence.
            TokenConsumeOutcome::Consumed(_) | TokenConsumeOutcome::Unknown => {}
        }

        let update = StatusUpdate {
            new_status: RequestStatus::Expired,
            resolution: Resolution {
                decided_at: Some(Utc::now()),
                decided_by: Some("system".to_owned()),
                ..Resolution::default()
            },
        };

        let expired = match self
            .ledger
            .update_status(request_id, RequestStatus::Pending, update)
            .await
        {
            Ok(expired) => expired,
            Err(AppError::NotFound(_) | AppError::Conflict(_)) => return Ok(None),
            Err(error) => return Err(error),
        };

        self.notify_requester(&expired).await;
        info!(request_id = %request_id, "approval request expired");
        Ok(Some(expired))
    }

    /// Expires every pending request whose deadline has elapsed.
    ///
    /// Drives each due request through the same broker-gated settlement as
    /// the in-process timer, so the sweep is safe to run concurrently with
    /// live timers and decision callbacks.
    pub async fn sweep_expired(&self) -> AppResult<u32> {
        let due = self
            .ledger
            .list_due_requests(Utc::now(), SWEEP_BATCH_LIMIT)
            .await?;
        let mut expired_count = 0_u32;

        for request in due {
            match self.expire(request.request_id()).await {
                Ok(Some(_)) => expired_count = expired_count.saturating_add(1),
                Ok(None) => {}
                Err(error) => {
                    warn!(
                        request_id = %request.request_id(),
                        error = %error,
                        "failed to expire due request"
                    );
                }
            }
        }

        Ok(expired_count)
    }

    /// Sends the outcome notification to the requester, best-effort.
    async fn notify_requester(&self, request: &ApprovalRequest) {
        let (subject, body) = notifications::outcome_email(request);
        if let Err(error) = self
            .email_service
            .send_email(request.requester_email().as_str(), &subject, &body, None)
            .await
        {
            warn!(
                request_id = %request.request_id(),
                error = %error,
                "failed to send requester notification"
            );
        }
    }
}
