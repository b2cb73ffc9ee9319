use async_trait::async_trait;
use greenlight_core::{AppResult, RequestId};
use greenlight_domain::ProvisioningSpec;
use serde_json::Value;

/// Resource returned by the provisioning collaborator on success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionedResource {
    /// Identifier of the launched resource.
    pub resource_id: String,
    /// Attributes resolved by the collaborator (placement, addresses, image).
    pub resolved_attributes: Value,
}

/// Port for the resource-provisioning collaborator.
#[async_trait]
pub trait ComputeProvisioner: Send + Sync {
    /// Launches the resource described by `spec`.
    ///
    /// Invoked at most once per request; `request_id` doubles as the
    /// idempotency key where the collaborator supports one.
    async fn provision(
        &self,
        request_id: RequestId,
        spec: &ProvisioningSpec,
    ) -> AppResult<ProvisionedResource>;
}

/// Port for sending emails. Infrastructure provides SMTP or console implementations.
#[async_trait]
pub trait EmailService: Send + Sync {
    /// Sends a plain-text or HTML email.
    async fn send_email(
        &self,
        to: &str,
        subject: &str,
        text_body: &str,
        html_body: Option<&str>,
    ) -> AppResult<()>;
}
