//! Console email service for development. Emails land in the log instead of
//! an inbox, which keeps the approval links reachable during local testing.

use async_trait::async_trait;
use greenlight_application::EmailService;
use greenlight_core::AppResult;
use tracing::info;

/// Development email service that writes messages to tracing output.
#[derive(Clone, Default)]
pub struct ConsoleEmailService;

impl ConsoleEmailService {
    /// Creates a new console email service.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl EmailService for ConsoleEmailService {
    async fn send_email(
        &self,
        to: &str,
        subject: &str,
        text_body: &str,
        _html_body: Option<&str>,
    ) -> AppResult<()> {
        info!(
            to = to,
            subject = subject,
            "delivering email to console\n{text_body}"
        );

        Ok(())
    }
}
