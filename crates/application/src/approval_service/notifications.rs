//! Human-readable email bodies for the approver and requester.

use greenlight_domain::{ApprovalRequest, RequestStatus};

/// Builds the approval request email sent to the approver, with the
/// approve/reject decision links embedding the raw token.
///
/// Token values are lowercase hex, so they are safe to embed in a query
/// string without further encoding.
pub(super) fn approval_request_email(
    request: &ApprovalRequest,
    approval_base_url: &str,
    raw_token: &str,
) -> (String, String) {
    let approve_url = format!("{approval_base_url}/approval?action=approve&token={raw_token}");
    let reject_url = format!("{approval_base_url}/approval?action=reject&token={raw_token}");

    let spec = request.provisioning_spec();
    let subject = format!(
        "[Approval Required] Instance launch: {} ({})",
        spec.instance_name().unwrap_or("unnamed instance"),
        spec.instance_type().unwrap_or("unspecified type"),
    );

    let spec_text = serde_json::to_string_pretty(spec.as_value())
        .unwrap_or_else(|_| "<unrenderable specification>".to_owned());

    let body = format!(
        "Hi,\n\n\
         An instance launch request is pending your approval.\n\n\
         Requester: {requester}\n\
         Submitted: {submitted}\n\n\
         === Provisioning Specification ===\n\
         {spec_text}\n\n\
         === Actions ===\n\
         Approve: {approve_url}\n\
         Reject:  {reject_url}\n\n\
         This request expires at {expires}.",
        requester = request.requester_email().as_str(),
        submitted = request.submitted_at().format("%Y-%m-%d %H:%M:%S UTC"),
        expires = request.expires_at().format("%Y-%m-%d %H:%M:%S UTC"),
    );

    (subject, body)
}

/// Builds the outcome notification sent to the requester once settled.
pub(super) fn outcome_email(request: &ApprovalRequest) -> (String, String) {
    let decision = decision_label(request.status());
    let spec = request.provisioning_spec();
    let resolution = request.resolution();

    let subject = format!(
        "[Request {decision}] {}",
        spec.instance_name().unwrap_or("Instance provisioning")
    );

    let mut lines = vec![format!("Decision: {decision}")];

    match request.status() {
        RequestStatus::Expired => {
            lines.push("The request expired before a decision was made.".to_owned());
        }
        RequestStatus::Provisioned => {
            lines.push(String::new());
            lines.push("=== Instance Details ===".to_owned());
            if let Some(name) = spec.instance_name() {
                lines.push(format!("Instance Name: {name}"));
            }
            if let Some(instance_type) = spec.instance_type() {
                lines.push(format!("Instance Type: {instance_type}"));
            }
            if let Some(resource_id) = resolution.resource_id.as_deref() {
                lines.push(format!("Instance ID: {resource_id}"));
            }
        }
        RequestStatus::ProvisionFailed => {
            lines.push(format!(
                "Provisioning failed: {}",
                resolution
                    .failure_reason
                    .as_deref()
                    .unwrap_or("unknown error")
            ));
        }
        RequestStatus::Pending | RequestStatus::Approved | RequestStatus::Rejected => {}
    }

    (subject, lines.join("\n"))
}

/// Maps a settled status to the decision wording shown to the requester.
fn decision_label(status: RequestStatus) -> &'static str {
    match status {
        RequestStatus::Provisioned | RequestStatus::ProvisionFailed => "APPROVED",
        RequestStatus::Rejected => "REJECTED",
        RequestStatus::Expired => "EXPIRED",
        RequestStatus::Pending | RequestStatus::Approved => status.as_str(),
    }
}
