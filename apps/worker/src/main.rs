//! Greenlight expiration sweeper runtime.
//!
//! The API process arms an in-process timer per pending request, but those
//! timers do not survive a restart. This worker periodically drives the
//! internal sweep endpoint, which expires overdue requests through the same
//! single-consumption token arbitration as live timer fires, so the bounded
//! wait holds across API restarts.

#![forbid(unsafe_code)]

use std::env;
use std::time::Duration;

use greenlight_core::{AppError, AppResult};
use reqwest::header;
use serde::Deserialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone)]
struct WorkerConfig {
    api_base_url: String,
    worker_shared_secret: String,
    worker_id: String,
    sweep_interval_ms: u64,
}

#[derive(Debug, Deserialize)]
struct SweepResponse {
    expired_count: u32,
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = WorkerConfig::load()?;
    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(15))
        .build()
        .map_err(|error| AppError::Internal(format!("failed to build HTTP client: {error}")))?;

    info!(
        worker_id = %config.worker_id,
        api_base_url = %config.api_base_url,
        sweep_interval_ms = config.sweep_interval_ms,
        "greenlight-worker started"
    );

    loop {
        match sweep_expirations(&http_client, &config).await {
            Ok(expired_count) => {
                if expired_count > 0 {
                    info!(
                        worker_id = %config.worker_id,
                        expired_count,
                        "expired overdue approval requests"
                    );
                }
            }
            Err(error) => {
                warn!(
                    worker_id = %config.worker_id,
                    error = %error,
                    "expiration sweep failed"
                );
            }
        }

        tokio::time::sleep(Duration::from_millis(config.sweep_interval_ms)).await;
    }
}

async fn sweep_expirations(
    http_client: &reqwest::Client,
    config: &WorkerConfig,
) -> AppResult<u32> {
    let endpoint = format!("{}/api/internal/expirations/sweep", config.api_base_url);
    let response = http_client
        .post(endpoint)
        .header(
            header::AUTHORIZATION,
            format!("Bearer {}", config.worker_shared_secret),
        )
        .header("x-greenlight-worker-id", config.worker_id.as_str())
        .send()
        .await
        .map_err(|error| AppError::Internal(format!("failed to call sweep endpoint: {error}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<body unavailable>".to_owned());
        return Err(AppError::Internal(format!(
            "sweep endpoint returned status {}: {body}",
            status.as_u16()
        )));
    }

    let response_body = response.json::<SweepResponse>().await.map_err(|error| {
        AppError::Internal(format!("failed to parse sweep endpoint response body: {error}"))
    })?;

    Ok(response_body.expired_count)
}

impl WorkerConfig {
    fn load() -> AppResult<Self> {
        let api_base_url = env::var("WORKER_API_BASE_URL")
            .unwrap_or_else(|_| "http://127.0.0.1:3001".to_owned())
            .trim_end_matches('/')
            .to_owned();
        let worker_shared_secret = required_env("WORKER_SHARED_SECRET")?;
        let worker_id = env::var("WORKER_ID")
            .ok()
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| format!("worker-{}", std::process::id()));
        let sweep_interval_ms = parse_env_u64("WORKER_SWEEP_INTERVAL_MS", 30_000)?;

        if sweep_interval_ms == 0 {
            return Err(AppError::Validation(
                "WORKER_SWEEP_INTERVAL_MS must be greater than zero".to_owned(),
            ));
        }

        Ok(Self {
            api_base_url,
            worker_shared_secret,
            worker_id,
            sweep_interval_ms,
        })
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

fn required_env(name: &str) -> AppResult<String> {
    env::var(name).map_err(|_| AppError::Validation(format!("{name} is required")))
}

fn parse_env_u64(name: &str, default: u64) -> AppResult<u64> {
    match env::var(name) {
        Ok(value) => value.parse::<u64>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        Err(_) => Ok(default),
    }
}
