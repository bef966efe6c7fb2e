use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};

use crate::{
    errors::ServiceError,
    services::users::{AuthResponse, LoginRequest, RegisterRequest},
    AppState,
};

/// Register a new customer account
#[utoipa::path(
    post,
    path = "/api/user/register",
    request_body = RegisterRequest,
    responses(
        (status = 200, description = "Account created", body = AuthResponse),
        (status = 400, description = "Invalid input", body = crate::errors::ErrorResponse),
        (status = 409, description = "Email already registered", body = crate::errors::ErrorResponse),
    ),
    tag = "Users"
)]
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<Json<AuthResponse>, ServiceError> {
    let Json(request) = payload?;
    Ok(Json(state.services.users.register(request).await?))
}

/// Exchange credentials for a token
#[utoipa::path(
    post,
    path = "/api/user/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in", body = AuthResponse),
        (status = 401, description = "Invalid credentials", body = crate::errors::ErrorResponse),
    ),
    tag = "Users"
)]
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<AuthResponse>, ServiceError> {
    let Json(request) = payload?;
    Ok(Json(state.services.users.login(request).await?))
}
