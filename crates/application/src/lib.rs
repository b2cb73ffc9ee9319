//! Application services and ports for the approval workflow coordinator.

#![forbid(unsafe_code)]

mod approval_ports;
mod approval_service;
mod token_broker;

pub use approval_ports::{
    ComputeProvisioner, ConsumedToken, DecisionTokenStore, EmailService, ExpirationHandler,
    ExpirationTimer, ProvisionedResource, RequestLedger, RequestListQuery, StatusUpdate,
    TokenConsumeOutcome, TokenDisposition,
};
pub use approval_service::{ApprovalConfig, ApprovalService, SubmitRequestInput};
pub use token_broker::DecisionTokenBroker;
