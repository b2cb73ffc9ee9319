use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use greenlight_core::{AppError, AppResult, RequestId};
use greenlight_domain::ApprovalRequest;
use tracing::warn;

use crate::approval_ports::{
    ComputeProvisioner, EmailService, ExpirationHandler, ExpirationTimer, RequestLedger,
    RequestListQuery,
};
use crate::token_broker::DecisionTokenBroker;

mod notifications;
mod settle;
mod submit;

pub use submit::SubmitRequestInput;

#[cfg(test)]
mod tests;

/// Static configuration for the approval workflow.
#[derive(Debug, Clone)]
pub struct ApprovalConfig {
    approval_base_url: String,
    approval_window: Duration,
}

impl ApprovalConfig {
    /// Creates a validated workflow configuration.
    ///
    /// `approval_base_url` is the public base for the decision links embedded
    /// in approver emails; `approval_window` is the bounded wait before a
    /// pending request expires.
    pub fn new(approval_base_url: impl Into<String>, approval_window: Duration) -> AppResult<Self> {
        let approval_base_url = approval_base_url.into().trim_end_matches('/').to_owned();

        if approval_base_url.trim().is_empty() {
            return Err(AppError::Validation(
                "approval base URL must not be empty".to_owned(),
            ));
        }

        if approval_window <= Duration::zero() {
            return Err(AppError::Validation(
                "approval window must be positive".to_owned(),
            ));
        }

        Ok(Self {
            approval_base_url,
            approval_window,
        })
    }

    /// Returns the public base URL for decision links.
    #[must_use]
    pub fn approval_base_url(&self) -> &str {
        self.approval_base_url.as_str()
    }

    /// Returns the bounded wait before expiration.
    #[must_use]
    pub fn approval_window(&self) -> Duration {
        self.approval_window
    }
}

/// Workflow state machine coordinating one human approval per request.
///
/// Owns the per-request lifecycle: persists the initial record, obtains a
/// decision token, arms the expiration timer, and settles whichever of
/// {explicit decision, deadline} wins the race on the shared token.
#[derive(Clone)]
pub struct ApprovalService {
    ledger: Arc<dyn RequestLedger>,
    broker: DecisionTokenBroker,
    provisioner: Arc<dyn ComputeProvisioner>,
    email_service: Arc<dyn EmailService>,
    timer: Arc<dyn ExpirationTimer>,
    config: ApprovalConfig,
}

impl ApprovalService {
    /// Creates an approval service over its collaborator ports.
    #[must_use]
    pub fn new(
        ledger: Arc<dyn RequestLedger>,
        broker: DecisionTokenBroker,
        provisioner: Arc<dyn ComputeProvisioner>,
        email_service: Arc<dyn EmailService>,
        timer: Arc<dyn ExpirationTimer>,
        config: ApprovalConfig,
    ) -> Self {
        Self {
            ledger,
            broker,
            provisioner,
            email_service,
            timer,
            config,
        }
    }

    /// Returns one request by id for the audit/read surface.
    pub async fn get_request(&self, request_id: RequestId) -> AppResult<ApprovalRequest> {
        self.ledger
            .find_request(request_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("request '{request_id}' not found")))
    }

    /// Lists requests for the audit/read surface, newest first.
    pub async fn list_requests(&self, query: RequestListQuery) -> AppResult<Vec<ApprovalRequest>> {
        self.ledger.list_requests(query).await
    }
}

#[async_trait]
impl ExpirationHandler for ApprovalService {
    async fn request_expired(&self, request_id: RequestId) {
        match self.expire(request_id).await {
            Ok(_) => {}
            Err(error) => {
                warn!(
                    request_id = %request_id,
                    error = %error,
                    "expiration settlement failed"
                );
            }
        }
    }
}
