use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::Response;
use greenlight_core::AppError;

use crate::error::ApiResult;
use crate::state::AppState;

/// Identity attached to authenticated internal worker calls.
#[derive(Debug, Clone)]
pub struct WorkerIdentity {
    pub worker_id: String,
}

/// Requires the worker shared secret on internal routes.
pub async fn require_worker_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> ApiResult<Response> {
    let bearer = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .unwrap_or_default();

    if bearer.is_empty() || bearer != state.worker_shared_secret {
        return Err(AppError::Unauthorized("worker authentication required".to_owned()).into());
    }

    let worker_id = request
        .headers()
        .get("x-greenlight-worker-id")
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.trim().is_empty())
        .unwrap_or("unidentified-worker")
        .to_owned();

    request.extensions_mut().insert(WorkerIdentity { worker_id });
    Ok(next.run(request).await)
}
