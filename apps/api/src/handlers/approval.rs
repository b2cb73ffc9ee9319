use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::Html;
use greenlight_core::AppError;
use greenlight_domain::DecisionOutcome;
use tracing::warn;

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, serde::Deserialize)]
pub struct ApprovalQueryRequest {
    pub action: Option<String>,
    pub token: Option<String>,
}

/// Handles the approve/reject links delivered in the approval email.
///
/// The three decision outcomes (settled, already settled, invalid token) all
/// map to a human-readable acknowledgment page; the latter two never reveal
/// whether a workflow exists behind the token.
pub async fn decide_handler(
    State(state): State<AppState>,
    Query(query): Query<ApprovalQueryRequest>,
) -> ApiResult<(StatusCode, Html<String>)> {
    let outcome = match query.action.as_deref() {
        Some("approve") => Some(DecisionOutcome::Approved),
        Some("reject") => Some(DecisionOutcome::Rejected),
        _ => None,
    };
    let token = query.token.filter(|token| !token.trim().is_empty());

    let (Some(outcome), Some(token)) = (outcome, token) else {
        return Ok((
            StatusCode::BAD_REQUEST,
            ack_page("Missing or invalid parameters."),
        ));
    };

    match state.approval_service.decide(&token, outcome).await {
        Ok(_) => {
            let message = match outcome {
                DecisionOutcome::Approved => "Request approved. You may close this page.",
                DecisionOutcome::Rejected => "Request rejected. You may close this page.",
            };
            Ok((StatusCode::OK, ack_page(message)))
        }
        Err(AppError::AlreadySettled(_)) => Ok((
            StatusCode::OK,
            ack_page("This request has already been processed. You may close this page."),
        )),
        Err(AppError::InvalidToken(_)) => {
            warn!("decision attempted with an unknown or expired token");
            Ok((
                StatusCode::OK,
                ack_page("This approval link is invalid or has expired."),
            ))
        }
        Err(error) => Err(error.into()),
    }
}

fn ack_page(message: &str) -> Html<String> {
    Html(format!(
        "<!DOCTYPE html>\n<html>\n<head><title>Greenlight</title></head>\n\
         <body><p>{message}</p></body>\n</html>"
    ))
}
