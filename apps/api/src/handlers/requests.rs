use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use greenlight_application::{RequestListQuery, SubmitRequestInput};
use greenlight_core::RequestId;
use greenlight_domain::RequestStatus;

use crate::dto::{ApprovalRequestResponse, SubmitRequestRequest, SubmitRequestResponse};
use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, serde::Deserialize)]
pub struct RequestListQueryRequest {
    pub status: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

pub async fn submit_request_handler(
    State(state): State<AppState>,
    Json(payload): Json<SubmitRequestRequest>,
) -> ApiResult<(StatusCode, Json<SubmitRequestResponse>)> {
    let request = state
        .approval_service
        .submit(SubmitRequestInput {
            requester_email: payload.requester_email,
            approver_email: payload.approver_email,
            provisioning_spec: payload.provisioning_spec,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(SubmitRequestResponse::from(request))))
}

pub async fn list_requests_handler(
    State(state): State<AppState>,
    Query(query): Query<RequestListQueryRequest>,
) -> ApiResult<Json<Vec<ApprovalRequestResponse>>> {
    let status = query
        .status
        .as_deref()
        .map(RequestStatus::parse)
        .transpose()?;

    let requests = state
        .approval_service
        .list_requests(RequestListQuery {
            status,
            limit: query.limit.unwrap_or(50),
            offset: query.offset.unwrap_or(0),
        })
        .await?
        .into_iter()
        .map(ApprovalRequestResponse::from)
        .collect();

    Ok(Json(requests))
}

pub async fn get_request_handler(
    State(state): State<AppState>,
    Path(request_id): Path<String>,
) -> ApiResult<Json<ApprovalRequestResponse>> {
    let request_id = RequestId::parse(request_id.as_str())?;
    let request = state.approval_service.get_request(request_id).await?;

    Ok(Json(ApprovalRequestResponse::from(request)))
}
