//! HTTP-based implementation of the provisioning collaborator port.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use greenlight_application::{ComputeProvisioner, ProvisionedResource};
use greenlight_core::{AppError, AppResult, RequestId};
use greenlight_domain::ProvisioningSpec;

/// HTTP client for the compute provisioning service.
///
/// Sends one JSON launch call per approved request. There is no retry loop:
/// provisioning failures are terminal by contract, so any non-success
/// response maps straight to a collaborator failure.
pub struct HttpProvisioner {
    http_client: reqwest::Client,
    endpoint: String,
}

impl HttpProvisioner {
    /// Creates a provisioner targeting `base_url`.
    #[must_use]
    pub fn new(http_client: reqwest::Client, base_url: &str) -> Self {
        Self {
            http_client,
            endpoint: format!("{}/instances", base_url.trim_end_matches('/')),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProvisionResponse {
    resource_id: String,
    #[serde(default)]
    resolved_attributes: Option<Value>,
}

#[async_trait]
impl ComputeProvisioner for HttpProvisioner {
    async fn provision(
        &self,
        request_id: RequestId,
        spec: &ProvisioningSpec,
    ) -> AppResult<ProvisionedResource> {
        let response = self
            .http_client
            .post(&self.endpoint)
            .header("Idempotency-Key", request_id.to_string())
            .json(&serde_json::json!({
                "requestId": request_id.to_string(),
                "spec": spec.as_value(),
            }))
            .send()
            .await
            .map_err(|error| {
                AppError::Collaborator(format!("failed to call provisioning service: {error}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_owned());
            return Err(AppError::Collaborator(format!(
                "provisioning service returned status {}: {body}",
                status.as_u16()
            )));
        }

        let payload = response.json::<ProvisionResponse>().await.map_err(|error| {
            AppError::Collaborator(format!(
                "failed to parse provisioning service response body: {error}"
            ))
        })?;

        Ok(ProvisionedResource {
            resource_id: payload.resource_id,
            resolved_attributes: payload.resolved_attributes.unwrap_or(Value::Null),
        })
    }
}
