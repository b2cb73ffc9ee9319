use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use tokio::sync::Mutex;

use greenlight_core::{AppError, AppResult, RequestId};
use greenlight_domain::{ApprovalRequest, DecisionOutcome, ProvisioningSpec, RequestStatus};

use super::{ApprovalConfig, ApprovalService, SubmitRequestInput};
use crate::approval_ports::{
    ComputeProvisioner, ConsumedToken, DecisionTokenStore, EmailService, ExpirationTimer,
    ProvisionedResource, RequestLedger, RequestListQuery, StatusUpdate, TokenConsumeOutcome,
    TokenDisposition,
};
use crate::token_broker::DecisionTokenBroker;

#[derive(Default)]
struct FakeLedger {
    requests: Mutex<HashMap<RequestId, ApprovalRequest>>,
    deleted: Mutex<Vec<RequestId>>,
}

#[async_trait]
impl RequestLedger for FakeLedger {
    async fn put(&self, request: ApprovalRequest) -> AppResult<()> {
        let mut requests = self.requests.lock().await;

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
        let mut requests = self.requests.lock().await;
        let request = requests
            .get_mut(&request_id)
            .ok_or_else(|| AppError::NotFound(format!("request '{request_id}' not found")))?;

        if request.status() != expected_status {
            return Err(AppError::Conflict(format!(
                "request '{request_id}' is no longer {}",
                expected_status.as_str()
            )));
        }

        let mut parts = request.clone().into_parts();
        update.apply_to(&mut parts);
        *request = ApprovalRequest::from_parts(parts);
        Ok(request.clone())
    }

    async fn delete(&self, request_id: RequestId) -> AppResult<()> {
        self.requests.lock().await.remove(&request_id);
        self.deleted.lock().await.push(request_id);
        Ok(())
    }

    async fn find_request(&self, request_id: RequestId) -> AppResult<Option<ApprovalRequest>> {
        Ok(self.requests.lock().await.get(&request_id).cloned())
    }

    async fn list_requests(&self, query: RequestListQuery) -> AppResult<Vec<ApprovalRequest>> {
        let requests = self.requests.lock().await;
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
        Ok(listed.into_iter().skip(query.offset).take(query.limit).collect())
    }

    async fn list_due_requests(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> AppResult<Vec<ApprovalRequest>> {
        let requests = self.requests.lock().await;
        Ok(requests
            .values()
            .filter(|request| request.is_due(now))
            .take(limit)
            .cloned()
            .collect())
    }
}

struct StoredToken {
    request_id: RequestId,
    expires_at: DateTime<Utc>,
    consumed: Option<TokenDisposition>,
}

#[derive(Default)]
struct FakeTokenStore {
    tokens: Mutex<HashMap<String, StoredToken>>,
}

impl FakeTokenStore {
    async fn live_token_count(&self) -> usize {
        self.tokens
            .lock()
            .await
            .values()
            .filter(|token| token.consumed.is_none())
            .count()
    }
}

#[async_trait]
impl DecisionTokenStore for FakeTokenStore {
    async fn create_token(
        &self,
        request_id: RequestId,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> AppResult<()> {
        let mut tokens = self.tokens.lock().await;

        if tokens
            .values()
            .any(|token| token.request_id == request_id && token.consumed.is_none())
        {
            return Err(AppError::Conflict(format!(
                "a live decision token already exists for request '{request_id}'"
            )));
        }

        tokens.insert(
            token_hash.to_owned(),
            StoredToken {
                request_id,
                expires_at,
                consumed: None,
            },
        );
        Ok(())
    }

    async fn consume_by_hash(
        &self,
        token_hash: &str,
        disposition: TokenDisposition,
    ) -> AppResult<TokenConsumeOutcome> {
        let mut tokens = self.tokens.lock().await;
        let Some(token) = tokens.get_mut(token_hash) else {
            return Ok(TokenConsumeOutcome::Unknown);
        };

        if token.consumed.is_some() {
            return Ok(TokenConsumeOutcome::AlreadyConsumed);
        }

        if token.expires_at <= Utc::now() {
            return Ok(TokenConsumeOutcome::Unknown);
        }

        token.consumed = Some(disposition);
        Ok(TokenConsumeOutcome::Consumed(ConsumedToken {
            request_id: token.request_id,
            disposition,
            consumed_at: Utc::now(),
        }))
    }

    async fn consume_by_request(
        &self,
        request_id: RequestId,
        disposition: TokenDisposition,
    ) -> AppResult<TokenConsumeOutcome> {
        let mut tokens = self.tokens.lock().await;
        let Some(token) = tokens
            .values_mut()
            .find(|token| token.request_id == request_id)
        else {
            return Ok(TokenConsumeOutcome::Unknown);
        };

        if token.consumed.is_some() {
            return Ok(TokenConsumeOutcome::AlreadyConsumed);
        }

        token.consumed = Some(disposition);
        Ok(TokenConsumeOutcome::Consumed(ConsumedToken {
            request_id,
            disposition,
            consumed_at: Utc::now(),
        }))
    }

    async fn delete_for_request(&self, request_id: RequestId) -> AppResult<()> {
        self.tokens
            .lock()
            .await
            .retain(|_, token| token.request_id != request_id);
        Ok(())
    }
}

struct CountingProvisioner {
    calls: Mutex<u32>,
    fail: bool,
}

impl CountingProvisioner {
    fn new(fail: bool) -> Self {
        Self {
            calls: Mutex::new(0),
            fail,
        }
    }

    async fn call_count(&self) -> u32 {
        *self.calls.lock().await
    }
}

#[async_trait]
impl ComputeProvisioner for CountingProvisioner {
    async fn provision(
        &self,
        request_id: RequestId,
        _spec: &ProvisioningSpec,
    ) -> AppResult<ProvisionedResource> {
        let mut calls = self.calls.lock().await;
        *calls = calls.saturating_add(1);

        if self.fail {
            return Err(AppError::Collaborator(
                "compute collaborator returned status 500".to_owned(),
            ));
        }

        Ok(ProvisionedResource {
            resource_id: "i-0abc123".to_owned(),
            resolved_attributes: serde_json::json!({
                "requestId": request_id.to_string(),
                "privateIpAddress": "10.0.1.17",
            }),
        })
    }
}

#[derive(Debug, Clone)]
struct SentEmail {
    to: String,
    subject: String,
    body: String,
}

struct RecordingEmailService {
    sent: Mutex<Vec<SentEmail>>,
    fail: bool,
}

impl RecordingEmailService {
    fn new(fail: bool) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail,
        }
    }

    async fn sent_to(&self, recipient: &str) -> Vec<SentEmail> {
        self.sent
            .lock()
            .await
            .iter()
            .filter(|email| email.to == recipient)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl EmailService for RecordingEmailService {
    async fn send_email(
        &self,
        to: &str,
        subject: &str,
        text_body: &str,
        _html_body: Option<&str>,
    ) -> AppResult<()> {
        if self.fail {
            return Err(AppError::Collaborator(
                "smtp relay refused the message".to_owned(),
            ));
        }

        self.sent.lock().await.push(SentEmail {
            to: to.to_owned(),
            subject: subject.to_owned(),
            body: text_body.to_owned(),
        });
        Ok(())
    }
}

struct FakeTimer {
    armed: Mutex<HashMap<RequestId, DateTime<Utc>>>,
    cancelled: Mutex<Vec<RequestId>>,
    fail_arm: bool,
}

impl FakeTimer {
    fn new(fail_arm: bool) -> Self {
        Self {
            armed: Mutex::new(HashMap::new()),
            cancelled: Mutex::new(Vec::new()),
            fail_arm,
        }
    }

    async fn armed_deadline(&self, request_id: RequestId) -> Option<DateTime<Utc>> {
        self.armed.lock().await.get(&request_id).copied()
    }
}

#[async_trait]
impl ExpirationTimer for FakeTimer {
    async fn arm(&self, request_id: RequestId, deadline: DateTime<Utc>) -> AppResult<()> {
        if self.fail_arm {
            return Err(AppError::Internal("timer runtime unavailable".to_owned()));
        }

        let mut armed = self.armed.lock().await;
        if armed.contains_key(&request_id) {
            return Err(AppError::Conflict(format!(
                "timer already armed for request '{request_id}'"
            )));
        }

        armed.insert(request_id, deadline);
        Ok(())
    }

    async fn cancel(&self, request_id: RequestId) -> AppResult<bool> {
        let was_pending = self.armed.lock().await.remove(&request_id).is_some();
        self.cancelled.lock().await.push(request_id);
        Ok(was_pending)
    }
}

struct Harness {
    service: ApprovalService,
    ledger: Arc<FakeLedger>,
    tokens: Arc<FakeTokenStore>,
    provisioner: Arc<CountingProvisioner>,
    email: Arc<RecordingEmailService>,
    timer: Arc<FakeTimer>,
}

fn harness(window: Duration) -> Harness {
    harness_with(window, false, false, false)
}

fn harness_with(
    window: Duration,
    provisioner_fails: bool,
    email_fails: bool,
    timer_arm_fails: bool,
) -> Harness {
    let ledger = Arc::new(FakeLedger::default());
    let tokens = Arc::new(FakeTokenStore::default());
    let provisioner = Arc::new(CountingProvisioner::new(provisioner_fails));
    let email = Arc::new(RecordingEmailService::new(email_fails));
    let timer = Arc::new(FakeTimer::new(timer_arm_fails));

    let config = match ApprovalConfig::new("http://localhost:3001", window) {
        Ok(config) => config,
        Err(error) => panic!("config should be valid: {error}"),
    };

    let service = ApprovalService::new(
        ledger.clone(),
        DecisionTokenBroker::new(tokens.clone()),
        provisioner.clone(),
        email.clone(),
        timer.clone(),
        config,
    );

    Harness {
        service,
        ledger,
        tokens,
        provisioner,
        email,
        timer,
    }
}

fn submit_input() -> SubmitRequestInput {
    SubmitRequestInput {
        requester_email: "requester@example.com".to_owned(),
        approver_email: "approver@example.com".to_owned(),
        provisioning_spec: serde_json::json!({
            "instanceName": "build-agent",
            "instanceType": "t3.large",
            "subnetId": "subnet-0a1b",
            "securityGroupIds": ["sg-1"],
        }),
    }
}

async fn submit(harness: &Harness) -> ApprovalRequest {
    match harness.service.submit(submit_input()).await {
        Ok(request) => request,
        Err(error) => panic!("submission should succeed: {error}"),
    }
}

/// Extracts the raw decision token from the approver email's approve link.
async fn issued_token(harness: &Harness) -> String {
    let approver_emails = harness.email.sent_to("approver@example.com").await;
    let Some(email) = approver_emails.last() else {
        panic!("an approval request email should have been sent");
    };

    let Some(token) = email
        .body
        .lines()
        .find_map(|line| line.trim().strip_prefix("Approve: "))
        .and_then(|url| url.split("token=").nth(1))
    else {
        panic!("approval email should contain an approve link with a token");
    };

    token.to_owned()
}

#[tokio::test]
async fn submit_persists_pending_record_arms_timer_and_emails_approver() {
    let harness = harness(Duration::hours(4));

    let request = submit(&harness).await;
    let request_id = request.request_id();

    assert_eq!(request.status(), RequestStatus::Pending);
    assert_eq!(
        harness.timer.armed_deadline(request_id).await,
        Some(request.expires_at())
    );
    assert_eq!(harness.tokens.live_token_count().await, 1);

    let approver_emails = harness.email.sent_to("approver@example.com").await;
    assert_eq!(approver_emails.len(), 1);
    assert!(approver_emails[0].body.contains("action=approve"));
    assert!(approver_emails[0].body.contains("action=reject"));
}

#[tokio::test]
async fn approve_provisions_once_and_notifies_requester() {
    let harness = harness(Duration::hours(4));
    let request = submit(&harness).await;
    let token = issued_token(&harness).await;

    let settled = harness.service.decide(&token, DecisionOutcome::Approved).await;
    assert_eq!(
        settled.ok().map(|request| request.status()),
        Some(RequestStatus::Provisioned)
    );

    assert_eq!(harness.provisioner.call_count().await, 1);

    let stored = harness.ledger.find_request(request.request_id()).await;
    let stored = match stored {
        Ok(Some(stored)) => stored,
        other => panic!("stored request should exist: {other:?}"),
    };
    assert_eq!(stored.status(), RequestStatus::Provisioned);
    assert_eq!(stored.resolution().resource_id.as_deref(), Some("i-0abc123"));
    assert_eq!(
        stored.resolution().decided_by.as_deref(),
        Some("approver@example.com")
    );

    let requester_emails = harness.email.sent_to("requester@example.com").await;
    assert_eq!(requester_emails.len(), 1);
    assert!(requester_emails[0].body.contains("Decision: APPROVED"));
    assert!(requester_emails[0].body.contains("i-0abc123"));
}

#[tokio::test]
async fn reject_then_approve_with_same_token_reports_already_settled() {
    let harness = harness(Duration::hours(4));
    let request = submit(&harness).await;
    let token = issued_token(&harness).await;

    let rejected = harness.service.decide(&token, DecisionOutcome::Rejected).await;
    assert_eq!(
        rejected.ok().map(|request| request.status()),
        Some(RequestStatus::Rejected)
    );

    let second = harness.service.decide(&token, DecisionOutcome::Approved).await;
    assert!(matches!(second, Err(AppError::AlreadySettled(_))));

    let stored = harness.ledger.find_request(request.request_id()).await;
    assert_eq!(
        stored.ok().flatten().map(|request| request.status()),
        Some(RequestStatus::Rejected)
    );
    assert_eq!(harness.provisioner.call_count().await, 0);
}

#[tokio::test]
async fn decide_with_never_issued_token_leaves_ledger_untouched() {
    let harness = harness(Duration::hours(4));
    let request = submit(&harness).await;

    let result = harness
        .service
        .decide(&"ef".repeat(32), DecisionOutcome::Approved)
        .await;
    assert!(matches!(result, Err(AppError::InvalidToken(_))));

    let stored = harness.ledger.find_request(request.request_id()).await;
    assert_eq!(
        stored.ok().flatten().map(|request| request.status()),
        Some(RequestStatus::Pending)
    );
}

#[tokio::test]
async fn expiration_prevents_late_decision() {
    let harness = harness(Duration::hours(4));
    let request = submit(&harness).await;
    let token = issued_token(&harness).await;

    let expired = harness.service.expire(request.request_id()).await;
    assert_eq!(
        expired.ok().flatten().map(|request| request.status()),
        Some(RequestStatus::Expired)
    );

    let late = harness.service.decide(&token, DecisionOutcome::Approved).await;
    assert!(matches!(late, Err(AppError::AlreadySettled(_))));

    let stored = harness.ledger.find_request(request.request_id()).await;
    assert_eq!(
        stored.ok().flatten().map(|request| request.status()),
        Some(RequestStatus::Expired)
    );
    assert_eq!(harness.provisioner.call_count().await, 0);

    let requester_emails = harness.email.sent_to("requester@example.com").await;
    assert_eq!(requester_emails.len(), 1);
    assert!(requester_emails[0].body.contains("Decision: EXPIRED"));
}

#[tokio::test]
async fn decision_prevents_later_expiration() {
    let harness = harness(Duration::hours(4));
    let request = submit(&harness).await;
    let token = issued_token(&harness).await;

    let settled = harness.service.decide(&token, DecisionOutcome::Approved).await;
    assert!(settled.is_ok());

    let expired = harness.service.expire(request.request_id()).await;
    assert_eq!(expired.ok(), Some(None));

    let stored = harness.ledger.find_request(request.request_id()).await;
    assert_eq!(
        stored.ok().flatten().map(|request| request.status()),
        Some(RequestStatus::Provisioned)
    );

    // Settlement notification only; expiration must not add a second one.
    let requester_emails = harness.email.sent_to("requester@example.com").await;
    assert_eq!(requester_emails.len(), 1);
}

#[tokio::test]
async fn provisioning_failure_is_terminal_and_surfaced() {
    let harness = harness_with(Duration::hours(4), true, false, false);
    let request = submit(&harness).await;
    let token = issued_token(&harness).await;

    let settled = harness.service.decide(&token, DecisionOutcome::Approved).await;
    assert_eq!(
        settled.ok().map(|request| request.status()),
        Some(RequestStatus::ProvisionFailed)
    );
    assert_eq!(harness.provisioner.call_count().await, 1);

    let stored = harness.ledger.find_request(request.request_id()).await;
    let stored = match stored {
        Ok(Some(stored)) => stored,
        other => panic!("stored request should exist: {other:?}"),
    };
    assert_eq!(stored.status(), RequestStatus::ProvisionFailed);
    assert!(
        stored
            .resolution()
            .failure_reason
            .as_deref()
            .is_some_and(|reason| reason.contains("status 500"))
    );

    let requester_emails = harness.email.sent_to("requester@example.com").await;
    assert_eq!(requester_emails.len(), 1);
    assert!(requester_emails[0].body.contains("Provisioning failed"));
}

#[tokio::test]
async fn notification_failure_does_not_block_settlement() {
    let harness = harness_with(Duration::hours(4), false, true, false);
    let request = submit(&harness).await;

    // The approver email also failed, so resolve through the broker by id.
    let expired = harness.service.expire(request.request_id()).await;
    assert_eq!(
        expired.ok().flatten().map(|request| request.status()),
        Some(RequestStatus::Expired)
    );
}

#[tokio::test]
async fn timer_arm_failure_rolls_back_submission() {
    let harness = harness_with(Duration::hours(4), false, false, true);

    let result = harness.service.submit(submit_input()).await;
    assert!(result.is_err());

    let deleted = harness.ledger.deleted.lock().await.clone();
    assert_eq!(deleted.len(), 1);

    let listed = harness
        .service
        .list_requests(RequestListQuery {
            status: None,
            limit: 10,
            offset: 0,
        })
        .await;
    assert_eq!(listed.ok().map(|requests| requests.len()), Some(0));
    assert_eq!(harness.tokens.live_token_count().await, 0);
}

#[tokio::test]
async fn concurrent_decisions_settle_exactly_once() {
    let harness = harness(Duration::hours(4));
    submit(&harness).await;
    let token = issued_token(&harness).await;

    let (first, second) = tokio::join!(
        harness.service.decide(&token, DecisionOutcome::Approved),
        harness.service.decide(&token, DecisionOutcome::Approved),
    );

    let winners = [&first, &second]
        .iter()
        .filter(|result| result.is_ok())
        .count();
    assert_eq!(winners, 1);
    assert!(
        [first, second]
            .into_iter()
            .filter_map(Result::err)
            .all(|error| matches!(error, AppError::AlreadySettled(_)))
    );
    assert_eq!(harness.provisioner.call_count().await, 1);
}

#[tokio::test]
async fn late_decision_after_deadline_is_invalid_token() {
    let harness = harness(Duration::milliseconds(5));
    submit(&harness).await;
    let token = issued_token(&harness).await;

    tokio::time::sleep(std::time::Duration::from_millis(25)).await;

    let late = harness.service.decide(&token, DecisionOutcome::Approved).await;
    assert!(matches!(late, Err(AppError::InvalidToken(_))));
}

#[tokio::test]
async fn sweep_expires_due_requests_without_provisioning() {
    let harness = harness(Duration::milliseconds(5));
    let first = submit(&harness).await;
    let second = submit(&harness).await;

    tokio::time::sleep(std::time::Duration::from_millis(25)).await;

    let expired_count = harness.service.sweep_expired().await;
    assert_eq!(expired_count.ok(), Some(2));
    assert_eq!(harness.provisioner.call_count().await, 0);

    for request in [first, second] {
        let stored = harness.ledger.find_request(request.request_id()).await;
        assert_eq!(
            stored.ok().flatten().map(|request| request.status()),
            Some(RequestStatus::Expired)
        );
    }

    // A second sweep finds nothing left to expire.
    let rerun = harness.service.sweep_expired().await;
    assert_eq!(rerun.ok(), Some(0));
}

#[tokio::test]
async fn list_requests_filters_by_status() {
    let harness = harness(Duration::hours(4));
    submit(&harness).await;
    let decided = submit(&harness).await;
    let token = issued_token(&harness).await;

    let settled = harness.service.decide(&token, DecisionOutcome::Rejected).await;
    assert!(settled.is_ok());
    assert_eq!(settled.ok().map(|r| r.request_id()), Some(decided.request_id()));

    let pending = harness
        .service
        .list_requests(RequestListQuery {
            status: Some(RequestStatus::Pending),
            limit: 10,
            offset: 0,
        })
        .await;
    assert_eq!(pending.ok().map(|requests| requests.len()), Some(1));
}

#[tokio::test]
async fn spec_payload_must_be_an_object() {
    let harness = harness(Duration::hours(4));

    let result = harness
        .service
        .submit(SubmitRequestInput {
            requester_email: "requester@example.com".to_owned(),
            approver_email: "approver@example.com".to_owned(),
            provisioning_spec: Value::String("t3.micro".to_owned()),
        })
        .await;

    assert!(matches!(result, Err(AppError::Validation(_))));
}
