//! Infrastructure adapters for application ports.

#![forbid(unsafe_code)]

mod console_email_service;
mod http_provisioner;
mod in_memory_decision_token_store;
mod in_memory_request_ledger;
mod postgres_decision_token_store;
mod postgres_request_ledger;
mod smtp_email_service;
mod tokio_expiration_timer;

pub use console_email_service::ConsoleEmailService;
pub use http_provisioner::HttpProvisioner;
pub use in_memory_decision_token_store::InMemoryDecisionTokenStore;
pub use in_memory_request_ledger::InMemoryRequestLedger;
pub use postgres_decision_token_store::PostgresDecisionTokenStore;
pub use postgres_request_ledger::PostgresRequestLedger;
pub use smtp_email_service::{SmtpEmailConfig, SmtpEmailService};
pub use tokio_expiration_timer::TokioExpirationTimer;
