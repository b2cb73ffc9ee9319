mod collaborators;
mod ledger;
mod timer;
mod tokens;

pub use collaborators::{ComputeProvisioner, EmailService, ProvisionedResource};
pub use ledger::{RequestLedger, RequestListQuery, StatusUpdate};
pub use timer::{ExpirationHandler, ExpirationTimer};
pub use tokens::{ConsumedToken, DecisionTokenStore, TokenConsumeOutcome, TokenDisposition};
