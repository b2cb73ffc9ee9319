//! In-memory request ledger for tests and development.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use greenlight_application::{RequestLedger, RequestListQuery, StatusUpdate};
use greenlight_core::{AppError, AppResult, RequestId};
use greenlight_domain::{ApprovalRequest, RequestStatus};

/// In-memory request ledger implementation.
#[derive(Debug, Default)]
pub struct InMemoryRequestLedger {
    requests: RwLock<HashMap<RequestId, ApprovalRequest>>,
}

impl InMemoryRequestLedger {
    /// Creates an empty in-memory ledger.
    #[must_use]
    pub fn new() -> Self {
        Self {
            requests: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl RequestLedger for InMemoryRequestLedger {
    async fn put(&self, request: ApprovalRequest) -> AppResult<()> {
        let mut requests = self.requests.write().await;

        if requests.contains_key(&request.request_id()) {
            return Err(AppError::Conflict(format!(
                "request '{}' already exists",
                request.request_id()
            )));
        }

        requests.insert(request.request_id(), request);
        Ok(())
    }

    async fn update_status(
        &self,
        request_id: RequestId,
        expected_status: RequestStatus,
        update: StatusUpdate,
    ) -> AppResult<ApprovalRequest> {
        let mut requests = self.requests.write().await;
        let request = requests
            .get_mut(&request_id)
            .ok_or_else(|| AppError::NotFound(format!("request '{request_id}' not found")))?;

        if request.status() != expected_status {
            return Err(AppError::Conflict(format!(
                "request '{request_id}' is {}, expected {}",
                request.status().as_str(),
                expected_status.as_str()
            )));
        }

        let mut parts = request.clone().into_parts();
        update.apply_to(&mut parts);
        *request = ApprovalRequest::from_parts(parts);
        Ok(request.clone())
    }

    async fn delete(&self, request_id: RequestId) -> AppResult<()> {
        self.requests.write().await.remove(&request_id);
        Ok(())
    }

    async fn find_request(&self, request_id: RequestId) -> AppResult<Option<ApprovalRequest>> {
        Ok(self.requests.read().await.get(&request_id).cloned())
    }

    async fn list_requests(&self, query: RequestListQuery) -> AppResult<Vec<ApprovalRequest>> {
        let requests = self.requests.read().await;

        let mut listed: Vec<ApprovalRequest> = requests
            .values()
            .filter(|request| {
                query
                    .status
                    .is_none_or(|status| request.status() == status)
            })
            .cloned()
            .collect();
        listed.sort_by_key(|request| std::cmp::Reverse(request.submitted_at()));

        Ok(listed
            .into_iter()
            .skip(query.offset)
            .take(query.limit)
            .collect())
    }

    async fn list_due_requests(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> AppResult<Vec<ApprovalRequest>> {
        let requests = self.requests.read().await;

        let mut due: Vec<ApprovalRequest> = requests
            .values()
            .filter(|request| request.is_due(now))
            .cloned()
            .collect();
        due.sort_by_key(ApprovalRequest::expires_at);

        Ok(due.into_iter().take(limit).collect())
    }
}
