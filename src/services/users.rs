use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::{hash_password, verify_password, AuthError, AuthService},
    entities::user::{Model as UserModel, ROLE_USER},
    errors::ServiceError,
    repositories::{NewUser, UserStore},
};

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct RegisterRequest {
    #[validate(length(min = 1, message = "name is required"))]
    pub name: String,
    #[validate(email(message = "Please enter a valid email"))]
    pub email: String,
    #[validate(length(min = 8, message = "Please enter a strong password"))]
    pub password: String,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "email is required"))]
    pub email: String,
    #[validate(length(min = 1, message = "password is required"))]
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserSummary {
    pub id: Uuid,
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuthResponse {
    pub success: bool,
    pub token: String,
    pub user: UserSummary,
}

#[derive(Clone)]
pub struct UserService {
    users: Arc<dyn UserStore>,
    auth: Arc<AuthService>,
}

impl UserService {
    pub fn new(users: Arc<dyn UserStore>, auth: Arc<AuthService>) -> Self {
        Self { users, auth }
    }

    fn respond(&self, user: UserModel) -> Result<AuthResponse, ServiceError> {
        let token = self.auth.generate_token(&user)?;
        Ok(AuthResponse {
            success: true,
            token,
            user: UserSummary {
                id: user.id,
                name: user.name,
                email: user.email,
            },
        })
    }

    #[instrument(skip(self, request), fields(email = %request.email))]
    pub async fn register(&self, request: RegisterRequest) -> Result<AuthResponse, ServiceError> {
        request.validate()?;
        let email = request.email.trim().to_ascii_lowercase();

        if self.users.find_by_email(&email).await?.is_some() {
            return Err(ServiceError::Conflict("User already exists".into()));
        }

        let password_hash = hash_password(&request.password)?;
        let user = self
            .users
            .create(NewUser {
                name: request.name.trim().to_string(),
                email,
                password_hash,
                role: ROLE_USER.to_string(),
            })
            .await?;

        info!(user_id = %user.id, "User registered");
        self.respond(user)
    }

    #[instrument(skip(self, request), fields(email = %request.email))]
    pub async fn login(&self, request: LoginRequest) -> Result<AuthResponse, ServiceError> {
        request.validate()?;
        let email = request.email.trim().to_ascii_lowercase();

        let Some(user) = self.users.find_by_email(&email).await? else {
            warn!("Login for unknown email");
            return Err(AuthError::InvalidCredentials.into());
        };
        if !verify_password(&request.password, &user.password_hash) {
            warn!(user_id = %user.id, "Login with wrong password");
            return Err(AuthError::InvalidCredentials.into());
        }

        self.respond(user)
    }
}
