//! Liveness and readiness endpoints.
//!
//! - `/health` reports that the process is up, with its version
//! - `/health/ready` pings the database and answers 503 when it is unreachable

use crate::{db, AppState};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::OnceLock;
use std::time::Instant;
use tracing::{debug, error};

/// Basic health status
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Up,
    Down,
}

/// Health check detail
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct HealthDetail {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub latency_ms: u64,
}

/// Overall health information
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct HealthInfo {
    pub status: HealthStatus,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub uptime_seconds: u64,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub details: HashMap<String, HealthDetail>,
}

static STARTED: OnceLock<Instant> = OnceLock::new();

fn uptime_seconds() -> u64 {
    STARTED.get_or_init(Instant::now).elapsed().as_secs()
}

fn status_code(status: &HealthStatus) -> StatusCode {
    match status {
        HealthStatus::Up => StatusCode::OK,
        HealthStatus::Down => StatusCode::SERVICE_UNAVAILABLE,
    }
}

/// Liveness: answers as long as the process can serve requests
pub async fn health_check() -> impl IntoResponse {
    debug!("Health check endpoint called");
    Json(HealthInfo {
        status: HealthStatus::Up,
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
        uptime_seconds: uptime_seconds(),
        details: HashMap::new(),
    })
}

/// Readiness: the database must answer a ping
pub async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    let started = Instant::now();
    let database = match db::check_connection(&state.db).await {
        Ok(()) => HealthDetail {
            status: HealthStatus::Up,
            message: None,
            latency_ms: started.elapsed().as_millis() as u64,
        },
        Err(e) => {
            error!(error = %e, "Readiness check failed");
            HealthDetail {
                status: HealthStatus::Down,
                message: Some(e.response_message()),
                latency_ms: started.elapsed().as_millis() as u64,
            }
        }
    };

    let status = database.status.clone();
    let info = HealthInfo {
        status: status.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
        uptime_seconds: uptime_seconds(),
        details: HashMap::from([("database".to_string(), database)]),
    };

    (status_code(&status), Json(info))
}

pub fn health_routes() -> Router<AppState> {
    // Start the uptime clock with the router rather than the first probe.
    let _ = STARTED.get_or_init(Instant::now);

    Router::new()
        .route("/health", get(health_check))
        .route("/health/ready", get(readiness_check))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn down_maps_to_service_unavailable() {
        assert_eq!(status_code(&HealthStatus::Up), StatusCode::OK);
        assert_eq!(
            status_code(&HealthStatus::Down),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn status_serialises_lowercase() {
        assert_eq!(serde_json::to_string(&HealthStatus::Up).unwrap(), "\"up\"");
    }
}
