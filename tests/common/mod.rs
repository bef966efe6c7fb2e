#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::{self, Body},
    http::{Method, Request},
    response::Response,
    Router,
};
use food_order_api::{
    auth::{AuthConfig, AuthService},
    config::AppConfig,
    db,
    entities::user::{Model as UserModel, ROLE_ADMIN, ROLE_USER},
    errors::ServiceError,
    handlers::AppServices,
    repositories::{NewUser, UserRepository, UserStore},
    services::stripe::{Balance, BalanceAmount, CheckoutSession, CheckoutSessionRequest, PaymentProvider},
    AppState,
};
use rust_decimal::Decimal;
use serde_json::Value;
use tower::ServiceExt;

pub const TEST_JWT_SECRET: &str = "test_secret_key_for_testing_purposes_only_32chars";
pub const TEST_WEBHOOK_SECRET: &str = "whsec_test_secret";

/// In-process payment provider that records every session request.
#[derive(Default)]
pub struct FakeProvider {
    pub requests: Mutex<Vec<CheckoutSessionRequest>>,
    /// `payment_status` reported when a session is retrieved
    pub payment_status: Mutex<String>,
    pub fail_create: Mutex<bool>,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self {
            payment_status: Mutex::new("unpaid".to_string()),
            ..Default::default()
        }
    }

    pub fn set_payment_status(&self, status: &str) {
        *self.payment_status.lock().unwrap() = status.to_string();
    }

    pub fn fail_next_sessions(&self) {
        *self.fail_create.lock().unwrap() = true;
    }

    pub fn recorded(&self) -> Vec<CheckoutSessionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl PaymentProvider for FakeProvider {
    async fn create_checkout_session(
        &self,
        request: CheckoutSessionRequest,
    ) -> Result<CheckoutSession, ServiceError> {
        if *self.fail_create.lock().unwrap() {
            return Err(ServiceError::PaymentSessionError(
                "provider rejected with status 402: card declined".into(),
            ));
        }
        let order_id = request.client_reference_id.clone();
        self.requests.lock().unwrap().push(request);
        Ok(CheckoutSession {
            id: format!("cs_test_{}", order_id),
            url: Some(format!("https://checkout.stripe.test/pay/{}", order_id)),
            payment_status: Some("unpaid".into()),
            client_reference_id: Some(order_id),
        })
    }

    async fn retrieve_checkout_session(
        &self,
        session_id: &str,
    ) -> Result<CheckoutSession, ServiceError> {
        Ok(CheckoutSession {
            id: session_id.to_string(),
            url: None,
            payment_status: Some(self.payment_status.lock().unwrap().clone()),
            client_reference_id: session_id.strip_prefix("cs_test_").map(str::to_string),
        })
    }

    async fn balance(&self) -> Result<Balance, ServiceError> {
        Ok(Balance {
            available: vec![BalanceAmount {
                amount: 0,
                currency: "inr".into(),
            }],
            pending: vec![],
        })
    }
}

/// Helper harness for spinning up the full router over an in-memory SQLite database.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub provider: Arc<FakeProvider>,
    pub auth: Arc<AuthService>,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Construct a test application after letting the caller adjust the config.
    pub async fn with_config(adjust: impl FnOnce(&mut AppConfig)) -> Self {
        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            TEST_JWT_SECRET.to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        // one connection keeps every query on the same in-memory database
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        cfg.delivery_fee = Decimal::from(20);
        cfg.stripe_webhook_secret = Some(TEST_WEBHOOK_SECRET.to_string());
        adjust(&mut cfg);

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");
        let db_arc = Arc::new(pool);

        let auth = Arc::new(AuthService::new(AuthConfig::from(&cfg)));
        let provider = Arc::new(FakeProvider::new());
        let services = AppServices::new(db_arc.clone(), &cfg, provider.clone(), auth.clone());
        let state = AppState::new(db_arc, cfg, services, auth.clone());
        let router = food_order_api::build_router(state.clone());

        Self {
            router,
            state,
            provider,
            auth,
        }
    }

    async fn create_user(&self, email: &str, role: &str) -> UserModel {
        UserRepository::new(self.state.db.clone())
            .create(NewUser {
                name: "Test User".to_string(),
                email: email.to_string(),
                password_hash: String::new(),
                role: role.to_string(),
            })
            .await
            .expect("seed user")
    }

    /// Seeds a customer and returns it with a valid token.
    pub async fn customer(&self, email: &str) -> (UserModel, String) {
        let user = self.create_user(email, ROLE_USER).await;
        let token = self.auth.generate_token(&user).expect("issue token");
        (user, token)
    }

    pub async fn admin(&self) -> (UserModel, String) {
        let user = self.create_user("admin@example.com", ROLE_ADMIN).await;
        let token = self.auth.generate_token(&user).expect("issue token");
        (user, token)
    }

    /// Send a request against the router with an optional bearer token.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);

        if let Some(tok) = token {
            builder = builder.header("authorization", format!("Bearer {}", tok));
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    /// Posts a raw body with extra headers, as a provider webhook would.
    pub async fn post_raw(&self, uri: &str, body: Vec<u8>, headers: &[(&str, &str)]) -> Response {
        let mut builder = Request::builder().method(Method::POST).uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let request = builder.body(Body::from(body)).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }
}

pub async fn response_json(response: Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}
