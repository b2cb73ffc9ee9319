//! Greenlight API composition root.

#![forbid(unsafe_code)]

mod dto;
mod error;
mod handlers;
mod middleware;
mod state;

use std::env;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use axum::Router;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderValue, Method};
use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use chrono::Duration;
use greenlight_application::{
    ApprovalConfig, ApprovalService, DecisionTokenBroker, EmailService,
};
use greenlight_core::AppError;
use greenlight_infrastructure::{
    ConsoleEmailService, HttpProvisioner, PostgresDecisionTokenStore, PostgresRequestLedger,
    SmtpEmailConfig, SmtpEmailService, TokioExpirationTimer,
};
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;
use url::Url;

use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let migrate_only = env::args().nth(1).as_deref() == Some("migrate");

    let database_url = required_env("DATABASE_URL")?;
    let approval_base_url = required_env("APPROVAL_BASE_URL")?;
    let provisioner_url = required_env("PROVISIONER_URL")?;
    let worker_shared_secret = required_env("WORKER_SHARED_SECRET")?;
    let frontend_url =
        env::var("FRONTEND_URL").unwrap_or_else(|_| "http://localhost:3000".to_owned());
    let email_provider = env::var("EMAIL_PROVIDER").unwrap_or_else(|_| "console".to_owned());

    Url::parse(&approval_base_url)
        .map_err(|error| AppError::Validation(format!("invalid APPROVAL_BASE_URL: {error}")))?;
    Url::parse(&provisioner_url)
        .map_err(|error| AppError::Validation(format!("invalid PROVISIONER_URL: {error}")))?;

    let approval_window_hours = parse_env_i64("APPROVAL_WINDOW_HOURS", 4)?;
    if approval_window_hours <= 0 {
        return Err(AppError::Validation(
            "APPROVAL_WINDOW_HOURS must be greater than zero".to_owned(),
        ));
    }

    let api_host = env::var("API_HOST").unwrap_or_else(|_| "127.0.0.1".to_owned());
    let api_port = env::var("API_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(3001);

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&database_url)
        .await
        .map_err(|error| AppError::Internal(format!("failed to connect to database: {error}")))?;

    sqlx::migrate!("../../crates/infrastructure/migrations")
        .run(&pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to run migrations: {error}")))?;

    if migrate_only {
        info!("database migrations applied successfully");
        return Ok(());
    }

    let ledger = Arc::new(PostgresRequestLedger::new(pool.clone()));
    let token_store = Arc::new(PostgresDecisionTokenStore::new(pool));
    let broker = DecisionTokenBroker::new(token_store);

    let email_service: Arc<dyn EmailService> = match email_provider.as_str() {
        "smtp" => {
            let smtp_port = required_non_empty_env("SMTP_PORT")?
                .parse::<u16>()
                .map_err(|error| AppError::Validation(format!("invalid SMTP_PORT: {error}")))?;

            let smtp_config = SmtpEmailConfig {
                host: required_non_empty_env("SMTP_HOST")?,
                port: smtp_port,
                username: required_non_empty_env("SMTP_USERNAME")?,
                password: required_non_empty_env("SMTP_PASSWORD")?,
                from_address: required_non_empty_env("SMTP_FROM_ADDRESS")?,
            };
            Arc::new(SmtpEmailService::new(smtp_config)?)
        }
        "console" => Arc::new(ConsoleEmailService::new()),
        _ => {
            return Err(AppError::Validation(format!(
                "EMAIL_PROVIDER must be either 'console' or 'smtp', got '{email_provider}'"
            )));
        }
    };

    let http_client = reqwest::Client::builder()
        .timeout(StdDuration::from_secs(15))
        .build()
        .map_err(|error| AppError::Internal(format!("failed to build HTTP client: {error}")))?;
    let provisioner = Arc::new(HttpProvisioner::new(http_client, &provisioner_url));

    let timer = Arc::new(TokioExpirationTimer::new());

    let approval_service = ApprovalService::new(
        ledger,
        broker,
        provisioner,
        email_service,
        timer.clone(),
        ApprovalConfig::new(
            approval_base_url.clone(),
            Duration::hours(approval_window_hours),
        )?,
    );

    // The timer fires back into the service; bind after construction.
    timer.bind_handler(Arc::new(approval_service.clone()))?;

    let app_state = AppState {
        approval_service,
        worker_shared_secret,
    };

    let internal_routes = Router::new()
        .route(
            "/api/internal/expirations/sweep",
            post(handlers::internal::sweep_expirations_handler),
        )
        .route_layer(from_fn_with_state(
            app_state.clone(),
            middleware::require_worker_auth,
        ));

    let cors_layer = CorsLayer::new()
        .allow_origin(
            HeaderValue::from_str(&frontend_url)
                .map_err(|error| AppError::Internal(format!("invalid FRONTEND_URL: {error}")))?,
        )
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE]);

    let app = Router::new()
        .route("/health", get(handlers::health::health_handler))
        .route(
            "/api/requests",
            get(handlers::requests::list_requests_handler)
                .post(handlers::requests::submit_request_handler),
        )
        .route(
            "/api/requests/{request_id}",
            get(handlers::requests::get_request_handler),
        )
        .route("/approval", get(handlers::approval::decide_handler))
        .merge(internal_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer)
        .with_state(app_state);

    let host = IpAddr::from_str(&api_host)
        .map_err(|error| AppError::Internal(format!("invalid API_HOST '{api_host}': {error}")))?;
    let address = SocketAddr::from((host, api_port));

    let listener = tokio::net::TcpListener::bind(address)
        .await
        .map_err(|error| AppError::Internal(format!("failed to bind listener: {error}")))?;

    info!(%address, approval_base_url = %approval_base_url, "greenlight-api listening");

    axum::serve(listener, app)
        .await
        .map_err(|error| AppError::Internal(format!("api server error: {error}")))
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

fn required_env(name: &str) -> Result<String, AppError> {
    env::var(name).map_err(|_| AppError::Validation(format!("{name} is required")))
}

fn required_non_empty_env(name: &str) -> Result<String, AppError> {
    let value = required_env(name)?;
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("{name} must not be empty")));
    }

    Ok(value)
}

fn parse_env_i64(name: &str, default: i64) -> Result<i64, AppError> {
    match env::var(name) {
        Ok(value) => value.parse::<i64>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        Err(_) => Ok(default),
    }
}
