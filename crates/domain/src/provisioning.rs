use greenlight_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Provisioning specification attached to an approval request.
///
/// The specification is opaque to the coordinator: instance type, network
/// placement, image reference, and storage parameters are validated by the
/// provisioning collaborator, not here. The only structural requirement is
/// that the payload is a JSON object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisioningSpec(Value);

impl ProvisioningSpec {
    /// Wraps a JSON object payload as a provisioning specification.
    pub fn new(value: Value) -> AppResult<Self> {
        if !value.is_object() {
            return Err(AppError::Validation(
                "provisioning spec must be a JSON object".to_owned(),
            ));
        }

        Ok(Self(value))
    }

    /// Returns the raw JSON payload.
    #[must_use]
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Returns the display name requested for the instance, when present.
    #[must_use]
    pub fn instance_name(&self) -> Option<&str> {
        self.0.get("instanceName").and_then(Value::as_str)
    }

    /// Returns the requested instance type, when present.
    #[must_use]
    pub fn instance_type(&self) -> Option<&str> {
        self.0.get("instanceType").and_then(Value::as_str)
    }
}

impl From<ProvisioningSpec> for Value {
    fn from(value: ProvisioningSpec) -> Self {
        value.0
    }
}
