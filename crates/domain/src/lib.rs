//! Domain entities and invariants.

#![forbid(unsafe_code)]

mod contact;
mod provisioning;
mod request;

pub use contact::EmailAddress;
pub use provisioning::ProvisioningSpec;
pub use request::{
    ApprovalRequest, ApprovalRequestParts, DecisionOutcome, NewApprovalRequest, RequestStatus,
    Resolution,
};
