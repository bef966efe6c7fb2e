/*!
 * # Health Check Module
 *
 * - Liveness (`/`) - plain text, no dependencies touched
 * - Health (`/health`) - database round-trip plus uptime
 * - Payment provider check (`/test-stripe`) - retrieves the account balance
 */

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use tracing::{error, info};

use crate::{db, AppState};

pub const LIVENESS_TEXT: &str = "API Working";

/// Basic health status
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
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
}

/// Overall health information
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct HealthInfo {
    pub status: HealthStatus,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub uptime_seconds: u64,
    pub details: BTreeMap<String, HealthDetail>,
}

impl HealthInfo {
    fn from_details(details: BTreeMap<String, HealthDetail>, uptime_seconds: u64) -> Self {
        let status = if details.values().any(|d| d.status == HealthStatus::Down) {
            HealthStatus::Down
        } else {
            HealthStatus::Up
        };
        Self {
            status,
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: Utc::now(),
            uptime_seconds,
            details,
        }
    }
}

/// Liveness endpoint
pub async fn liveness() -> &'static str {
    LIVENESS_TEXT
}

/// Database connectivity check
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let database = match db::ping(&state.db).await {
        Ok(()) => HealthDetail {
            status: HealthStatus::Up,
            message: None,
        },
        Err(e) => {
            error!("Database health check failed: {}", e);
            HealthDetail {
                status: HealthStatus::Down,
                message: Some("database unreachable".to_string()),
            }
        }
    };

    let mut details = BTreeMap::new();
    details.insert("database".to_string(), database);
    let health = HealthInfo::from_details(details, state.uptime().as_secs());

    let status_code = match health.status {
        HealthStatus::Up => StatusCode::OK,
        HealthStatus::Down => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(health))
}

/// Verifies the payment provider credentials by reading the account balance
pub async fn payment_provider_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.services.provider.balance().await {
        Ok(balance) => {
            info!("Payment provider reachable");
            (
                StatusCode::OK,
                Json(json!({
                    "success": true,
                    "message": "Stripe connection successful",
                    "balance": balance,
                })),
            )
        }
        Err(e) => {
            error!(error = %e, "Payment provider check failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "success": false,
                    "message": format!("Stripe connection failed: {}", e.response_message()),
                })),
            )
        }
    }
}

/// Creates router with health check endpoints
pub fn health_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(liveness))
        .route("/health", get(health_check))
        .route("/test-stripe", get(payment_provider_check))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn any_down_component_marks_service_down() {
        let mut details = BTreeMap::new();
        details.insert(
            "database".to_string(),
            HealthDetail {
                status: HealthStatus::Down,
                message: None,
            },
        );
        let info = HealthInfo::from_details(details, 5);
        assert_eq!(info.status, HealthStatus::Down);
        assert_eq!(info.uptime_seconds, 5);
    }

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(serde_json::to_value(HealthStatus::Up).unwrap(), json!("up"));
    }
}
