//! Food Order API Library
//!
//! Order placement with hosted checkout sessions, payment verification,
//! per-user carts and the HTTP surface over them.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod handlers;
pub mod health;
pub mod middleware_helpers;
pub mod migrator;
pub mod openapi;
pub mod repositories;
pub mod services;
pub mod tracing;

use axum::{
    extract::FromRef,
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::Utc;
use sea_orm::DatabaseConnection;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::limit::RequestBodyLimitLayer;
use utoipa::ToSchema;

use crate::auth::AuthService;

/// Upper bound on request bodies; orders and webhook events are small.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub services: handlers::AppServices,
    pub auth: Arc<AuthService>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: config::AppConfig,
        services: handlers::AppServices,
        auth: Arc<AuthService>,
    ) -> Self {
        Self {
            db,
            config,
            services,
            auth,
            started_at: Instant::now(),
        }
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }
}

impl FromRef<AppState> for Arc<AuthService> {
    fn from_ref(state: &AppState) -> Self {
        state.auth.clone()
    }
}

// Common response wrappers
#[derive(Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

#[derive(Serialize, ToSchema)]
pub struct ResponseMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: String,
}

impl ResponseMeta {
    fn capture() -> Self {
        Self {
            request_id: crate::tracing::current_request_id().map(|rid| rid.as_str().to_string()),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

/// Body of responses that carry only an outcome and a message
#[derive(Serialize, ToSchema)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            meta: Some(ResponseMeta::capture()),
        }
    }

    pub fn message(success: bool, message: impl Into<String>) -> Self {
        Self {
            success,
            data: None,
            message: Some(message.into()),
            meta: Some(ResponseMeta::capture()),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::message(false, message)
    }
}

/// Standard API result type for JSON responses
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, errors::ServiceError>;

pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/place", post(handlers::orders::place_order))
        .route("/verify", post(handlers::orders::verify_order))
        .route("/userOrders", post(handlers::orders::user_orders))
        .route("/list", get(handlers::orders::list_orders))
        .route(
            "/status",
            axum::routing::put(handlers::orders::update_status)
                .post(handlers::orders::update_status),
        )
        .route("/webhook", post(handlers::orders::stripe_webhook))
}

pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/add", post(handlers::cart::add_to_cart))
        .route("/remove", post(handlers::cart::remove_from_cart))
        .route("/get", post(handlers::cart::get_cart))
}

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(handlers::users::register))
        .route("/login", post(handlers::users::login))
}

/// Full application router with request-id and tracing layers applied.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(health::health_routes())
        .nest("/api/order", order_routes())
        .nest("/api/cart", cart_routes())
        .nest("/api/user", user_routes())
        .merge(openapi::swagger_ui())
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        // HTTP tracing layer for consistent request/response telemetry
        .layer(crate::tracing::configure_http_tracing())
        // Ensure every request carries a request id for traceability
        .layer(axum::middleware::from_fn(
            middleware_helpers::request_id::request_id_middleware,
        ))
        .with_state(state)
}
