use greenlight_application::ApprovalService;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub approval_service: ApprovalService,
    pub worker_shared_secret: String,
}
