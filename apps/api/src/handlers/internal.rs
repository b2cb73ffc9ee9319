use axum::Json;
use axum::extract::{Extension, State};
use tracing::info;

use crate::dto::SweepResponse;
use crate::error::ApiResult;
use crate::middleware::WorkerIdentity;
use crate::state::AppState;

/// Expires every pending request whose deadline has elapsed.
///
/// Called by the sweeper worker so the bounded wait holds even when the API
/// process restarted and lost its in-process timers.
pub async fn sweep_expirations_handler(
    State(state): State<AppState>,
    Extension(worker): Extension<WorkerIdentity>,
) -> ApiResult<Json<SweepResponse>> {
    let expired_count = state.approval_service.sweep_expired().await?;

    if expired_count > 0 {
        info!(
            worker_id = %worker.worker_id,
            expired_count,
            "expiration sweep settled requests"
        );
    }

    Ok(Json(SweepResponse { expired_count }))
}
