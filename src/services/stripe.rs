//! Stripe integration over the REST API.
//!
//! Only the three calls the ordering flow needs are modelled: checkout session
//! creation, checkout session retrieval and balance retrieval (health probe).

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::{Client, RequestBuilder};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sha2::Sha256;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, instrument};

#[cfg(test)]
use mockall::automock;

use crate::config::AppConfig;
use crate::errors::ServiceError;

type HmacSha256 = Hmac<Sha256>;

/// A priced unit sent to the provider. Amounts are integer minor units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineItem {
    pub currency: String,
    pub name: String,
    pub unit_amount: i64,
    pub quantity: i64,
}

impl LineItem {
    pub fn total(&self) -> Option<i64> {
        self.unit_amount.checked_mul(self.quantity)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSessionRequest {
    pub line_items: Vec<LineItem>,
    pub success_url: String,
    pub cancel_url: String,
    /// Our order id; echoed back on the session and in webhook events.
    pub client_reference_id: String,
}

/// Subset of the Stripe checkout session object.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct CheckoutSession {
    pub id: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub payment_status: Option<String>,
    #[serde(default)]
    pub client_reference_id: Option<String>,
}

impl CheckoutSession {
    /// `paid` or `no_payment_required` settle the session.
    pub fn is_paid(&self) -> bool {
        matches!(
            self.payment_status.as_deref(),
            Some("paid") | Some("no_payment_required")
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct BalanceAmount {
    pub amount: i64,
    pub currency: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Balance {
    #[serde(default)]
    pub available: Vec<BalanceAmount>,
    #[serde(default)]
    pub pending: Vec<BalanceAmount>,
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetail {
    #[serde(default)]
    message: Option<String>,
}

/// Payment provider seam used by the ordering services.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    async fn create_checkout_session(
        &self,
        request: CheckoutSessionRequest,
    ) -> Result<CheckoutSession, ServiceError>;

    async fn retrieve_checkout_session(
        &self,
        session_id: &str,
    ) -> Result<CheckoutSession, ServiceError>;

    async fn balance(&self) -> Result<Balance, ServiceError>;
}

#[derive(Debug, Clone)]
pub struct StripeClient {
    http: Client,
    api_base: String,
    secret_key: Option<String>,
}

impl StripeClient {
    pub fn new(
        api_base: impl Into<String>,
        secret_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ServiceError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ServiceError::InternalError(format!("HTTP client build failed: {}", e)))?;

        Ok(Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            secret_key: secret_key.filter(|k| !k.trim().is_empty()),
        })
    }

    pub fn from_config(cfg: &AppConfig) -> Result<Self, ServiceError> {
        Self::new(
            cfg.stripe_api_base.clone(),
            cfg.stripe_secret_key.clone(),
            cfg.payment_timeout(),
        )
    }

    pub fn is_configured(&self) -> bool {
        self.secret_key.is_some()
    }

    fn secret(&self) -> Result<&str, ServiceError> {
        self.secret_key.as_deref().ok_or_else(|| {
            ServiceError::PaymentSessionError("Stripe secret key is not configured".into())
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/v1/{}", self.api_base, path)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        operation: &str,
    ) -> Result<T, ServiceError> {
        let response = request.send().await.map_err(|e| {
            let reason = if e.is_timeout() { "timed out" } else { "request failed" };
            error!(error = %e, operation, "Stripe {}", reason);
            ServiceError::PaymentSessionError(format!("{} {}: {}", operation, reason, e))
        })?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<StripeErrorBody>()
                .await
                .ok()
                .and_then(|body| body.error.message)
                .unwrap_or_else(|| "no error message".to_string());
            error!(status = status.as_u16(), operation, %message, "Stripe rejected request");
            return Err(ServiceError::PaymentSessionError(format!(
                "{} rejected with {}: {}",
                operation, status, message
            )));
        }

        response.json::<T>().await.map_err(|e| {
            ServiceError::PaymentSessionError(format!("{} returned an unreadable body: {}", operation, e))
        })
    }
}

/// Form fields for `POST /v1/checkout/sessions`.
pub fn checkout_form(request: &CheckoutSessionRequest) -> Vec<(String, String)> {
    let mut form = Vec::with_capacity(request.line_items.len() * 4 + 5);
    for (i, item) in request.line_items.iter().enumerate() {
        let prefix = format!("line_items[{}]", i);
        form.push((format!("{}[price_data][currency]", prefix), item.currency.clone()));
        form.push((format!("{}[price_data][product_data][name]", prefix), item.name.clone()));
        form.push((format!("{}[price_data][unit_amount]", prefix), item.unit_amount.to_string()));
        form.push((format!("{}[quantity]", prefix), item.quantity.to_string()));
    }
    form.push(("mode".into(), "payment".into()));
    form.push(("success_url".into(), request.success_url.clone()));
    form.push(("cancel_url".into(), request.cancel_url.clone()));
    form.push(("client_reference_id".into(), request.client_reference_id.clone()));
    form.push(("metadata[order_id]".into(), request.client_reference_id.clone()));
    form
}

#[async_trait]
impl PaymentProvider for StripeClient {
    #[instrument(skip(self, request), fields(order_id = %request.client_reference_id, line_items = request.line_items.len()))]
    async fn create_checkout_session(
        &self,
        request: CheckoutSessionRequest,
    ) -> Result<CheckoutSession, ServiceError> {
        let secret = self.secret()?;
        let builder = self
            .http
            .post(self.endpoint("checkout/sessions"))
            .bearer_auth(secret)
            .form(&checkout_form(&request));

        let session: CheckoutSession = self.send(builder, "create checkout session").await?;
        debug!(session_id = %session.id, "Stripe checkout session created");
        Ok(session)
    }

    #[instrument(skip(self))]
    async fn retrieve_checkout_session(
        &self,
        session_id: &str,
    ) -> Result<CheckoutSession, ServiceError> {
        let secret = self.secret()?;
        let builder = self
            .http
            .get(self.endpoint(&format!("checkout/sessions/{}", session_id)))
            .bearer_auth(secret);
        self.send(builder, "retrieve checkout session").await
    }

    async fn balance(&self) -> Result<Balance, ServiceError> {
        let secret = self.secret()?;
        let builder = self.http.get(self.endpoint("balance")).bearer_auth(secret);
        self.send(builder, "retrieve balance").await
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WebhookSignatureError {
    #[error("invalid Stripe-Signature header")]
    MalformedHeader,
    #[error("webhook signature mismatch")]
    Mismatch,
    #[error("webhook timestamp outside tolerance")]
    Expired,
}

/// Verifies a `Stripe-Signature: t=..,v1=..` header against the raw payload.
///
/// Any of several `v1` entries may match (Stripe sends one per active secret).
pub fn verify_webhook_signature(
    payload: &[u8],
    sig_header: &str,
    secret: &str,
    tolerance_secs: u64,
    now: i64,
) -> Result<(), WebhookSignatureError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in sig_header.split(',') {
        let part = part.trim();
        if let Some(t) = part.strip_prefix("t=") {
            timestamp = Some(t);
        } else if let Some(v) = part.strip_prefix("v1=") {
            signatures.push(v);
        }
    }

    let timestamp = timestamp.ok_or(WebhookSignatureError::MalformedHeader)?;
    if signatures.is_empty() {
        return Err(WebhookSignatureError::MalformedHeader);
    }
    let ts: i64 = timestamp
        .parse()
        .map_err(|_| WebhookSignatureError::MalformedHeader)?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| WebhookSignatureError::MalformedHeader)?;
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload);

    let matched = signatures.iter().any(|sig| {
        hex::decode(sig)
            .map(|bytes| mac.clone().verify_slice(&bytes).is_ok())
            .unwrap_or(false)
    });
    if !matched {
        return Err(WebhookSignatureError::Mismatch);
    }

    if (now - ts).unsigned_abs() > tolerance_secs {
        return Err(WebhookSignatureError::Expired);
    }

    Ok(())
}

/// Computes the `v1` signature for a payload; used to sign test fixtures.
pub fn sign_webhook_payload(payload: &[u8], secret: &str, timestamp: i64) -> String {
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
}
