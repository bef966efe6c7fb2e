use chrono::Utc;
use metrics::counter;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    config::AppConfig,
    errors::ServiceError,
    repositories::{OrderLedger, OrderUpdate},
    services::stripe::{verify_webhook_signature, CheckoutSession, PaymentProvider},
};

/// Body of `POST /api/order/verify`.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VerifyPaymentRequest {
    #[serde(default)]
    pub order_id: Option<String>,
    /// `true`/`false` or the strings `"true"`/`"false"`.
    #[serde(default, deserialize_with = "deserialize_flag")]
    #[schema(value_type = Option<bool>)]
    pub success: Option<bool>,
}

fn deserialize_flag<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Text(String),
    }

    match Option::<Flag>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Flag::Bool(b)) => Ok(Some(b)),
        Some(Flag::Text(s)) => match s.as_str() {
            "true" => Ok(Some(true)),
            "false" => Ok(Some(false)),
            other => Err(serde::de::Error::custom(format!(
                "success must be true or false, got {:?}",
                other
            ))),
        },
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum VerificationOutcome {
    Paid,
    Deleted,
    Unconfirmed,
    NotFound,
}

impl VerificationOutcome {
    pub fn success(self) -> bool {
        matches!(self, Self::Paid)
    }

    pub fn message(self) -> &'static str {
        match self {
            Self::Paid => "Paid",
            Self::Deleted => "Not Paid",
            Self::Unconfirmed => "Payment not confirmed",
            Self::NotFound => "Order not found",
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Paid => "paid",
            Self::Deleted => "deleted",
            Self::Unconfirmed => "unconfirmed",
            Self::NotFound => "not_found",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: StripeEventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeEventData {
    pub object: Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    MarkedPaid(Uuid),
    Deleted(Uuid),
    Ignored,
}

/// Reconciles payment callbacks and provider events against the order ledger.
#[derive(Clone)]
pub struct PaymentService {
    ledger: Arc<dyn OrderLedger>,
    provider: Arc<dyn PaymentProvider>,
    verify_with_provider: bool,
    timeout: Duration,
    webhook_secret: Option<String>,
    webhook_tolerance_secs: u64,
}

impl PaymentService {
    pub fn new(
        ledger: Arc<dyn OrderLedger>,
        provider: Arc<dyn PaymentProvider>,
        verify_with_provider: bool,
        timeout: Duration,
    ) -> Self {
        Self {
            ledger,
            provider,
            verify_with_provider,
            timeout,
            webhook_secret: None,
            webhook_tolerance_secs: 300,
        }
    }

    pub fn from_config(
        ledger: Arc<dyn OrderLedger>,
        provider: Arc<dyn PaymentProvider>,
        cfg: &AppConfig,
    ) -> Self {
        Self::new(
            ledger,
            provider,
            cfg.verify_payment_with_provider,
            cfg.payment_timeout(),
        )
        .with_webhook_secret(
            cfg.stripe_webhook_secret.clone(),
            cfg.stripe_webhook_tolerance_secs,
        )
    }

    pub fn with_webhook_secret(mut self, secret: Option<String>, tolerance_secs: u64) -> Self {
        self.webhook_secret = secret.filter(|s| !s.is_empty());
        self.webhook_tolerance_secs = tolerance_secs;
        self
    }

    /// Validates the raw callback body and resolves it to `(order_id, hint)`.
    pub fn parse_request(request: VerifyPaymentRequest) -> Result<(Uuid, bool), ServiceError> {
        let raw_id = request
            .order_id
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| ServiceError::ValidationError("orderId is required".into()))?;
        let order_id = Uuid::parse_str(raw_id.trim())
            .map_err(|_| ServiceError::ValidationError("orderId must be a valid id".into()))?;
        let hint = request
            .success
            .ok_or_else(|| ServiceError::ValidationError("success is required".into()))?;
        Ok((order_id, hint))
    }

    /// Applies a payment callback to the order.
    ///
    /// With provider verification enabled the provider session decides whether
    /// the order is paid and `hint` only chooses between deleting an unpaid
    /// order and leaving it pending. Repeating a call is harmless.
    #[instrument(skip(self))]
    pub async fn verify(&self, order_id: Uuid, hint: bool) -> Result<VerificationOutcome, ServiceError> {
        let outcome = self.resolve(order_id, hint).await?;
        counter!("food_order.payments.verified", 1, "outcome" => outcome.label());
        info!(outcome = outcome.label(), "Payment verification applied");
        Ok(outcome)
    }

    async fn resolve(&self, order_id: Uuid, hint: bool) -> Result<VerificationOutcome, ServiceError> {
        let Some(order) = self.ledger.find_by_id(order_id).await? else {
            return Ok(VerificationOutcome::NotFound);
        };

        let paid = if order.payment {
            true
        } else if self.verify_with_provider {
            match order.payment_session_id.as_deref() {
                Some(session_id) => self.fetch_session(session_id).await?.is_paid(),
                None => {
                    warn!("Order has no checkout session; payment unconfirmed");
                    false
                }
            }
        } else {
            hint
        };

        if paid {
            return match self.ledger.update(order_id, OrderUpdate::paid()).await {
                Ok(()) => Ok(VerificationOutcome::Paid),
                Err(ServiceError::NotFound(_)) => Ok(VerificationOutcome::NotFound),
                Err(e) => Err(e),
            };
        }

        if hint {
            return Ok(VerificationOutcome::Unconfirmed);
        }

        self.ledger.delete_by_id(order_id).await?;
        Ok(VerificationOutcome::Deleted)
    }

    async fn fetch_session(&self, session_id: &str) -> Result<CheckoutSession, ServiceError> {
        tokio::time::timeout(self.timeout, self.provider.retrieve_checkout_session(session_id))
            .await
            .map_err(|_| {
                error!(session_id, "Checkout session lookup timed out");
                ServiceError::PaymentSessionError("checkout session lookup timed out".into())
            })?
    }

    /// Checks the `Stripe-Signature` header and decodes the event.
    pub fn parse_webhook(
        &self,
        payload: &[u8],
        signature: Option<&str>,
    ) -> Result<StripeEvent, ServiceError> {
        let secret = self.webhook_secret.as_deref().ok_or_else(|| {
            ServiceError::ServiceUnavailable("webhook secret is not configured".into())
        })?;
        let signature = signature
            .ok_or_else(|| ServiceError::Unauthorized("missing Stripe-Signature header".into()))?;

        verify_webhook_signature(
            payload,
            signature,
            secret,
            self.webhook_tolerance_secs,
            Utc::now().timestamp(),
        )
        .map_err(|e| {
            warn!(error = %e, "Rejected webhook");
            ServiceError::Unauthorized(e.to_string())
        })?;

        serde_json::from_slice(payload)
            .map_err(|e| ServiceError::ValidationError(format!("malformed event: {}", e)))
    }

    #[instrument(skip(self, event), fields(event_id = %event.id, event_type = %event.event_type))]
    pub async fn handle_event(&self, event: StripeEvent) -> Result<WebhookOutcome, ServiceError> {
        let settles = matches!(
            event.event_type.as_str(),
            "checkout.session.completed" | "checkout.session.async_payment_succeeded"
        );
        let fails = matches!(
            event.event_type.as_str(),
            "checkout.session.expired" | "checkout.session.async_payment_failed"
        );
        if !settles && !fails {
            return Ok(WebhookOutcome::Ignored);
        }

        let session: CheckoutSession = serde_json::from_value(event.data.object)
            .map_err(|e| ServiceError::ValidationError(format!("malformed session: {}", e)))?;
        let Some(order_id) = session
            .client_reference_id
            .as_deref()
            .and_then(|id| Uuid::parse_str(id).ok())
        else {
            warn!(session_id = %session.id, "Session carries no order reference");
            return Ok(WebhookOutcome::Ignored);
        };

        if settles {
            if !session.is_paid() {
                return Ok(WebhookOutcome::Ignored);
            }
            return match self.ledger.update(order_id, OrderUpdate::paid()).await {
                Ok(()) => {
                    info!(order_id = %order_id, "Order marked paid from webhook");
                    Ok(WebhookOutcome::MarkedPaid(order_id))
                }
                Err(ServiceError::NotFound(_)) => Ok(WebhookOutcome::Ignored),
                Err(e) => Err(e),
            };
        }

        match self.ledger.find_by_id(order_id).await? {
            Some(order) if !order.payment => {
                self.ledger.delete_by_id(order_id).await?;
                info!(order_id = %order_id, "Unpaid order removed after failed checkout");
                Ok(WebhookOutcome::Deleted(order_id))
            }
            _ => Ok(WebhookOutcome::Ignored),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::order::Model as OrderModel;
    use crate::repositories::order_repository::MockOrderLedger;
    use crate::services::stripe::{sign_webhook_payload, MockPaymentProvider};
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn order(id: Uuid, payment: bool, session: Option<&str>) -> OrderModel {
        OrderModel {
            id,
            user_id: Uuid::new_v4(),
            items: json!([{"name": "Pizza", "price": 10.0, "quantity": 1}]),
            amount: dec!(30),
            address: json!({"street": "1 Main St"}),
            status: "Food Processing".into(),
            payment,
            payment_session_id: session.map(str::to_string),
            date: Utc::now(),
        }
    }

    fn session(status: &str) -> CheckoutSession {
        CheckoutSession {
            id: "cs_1".into(),
            url: None,
            payment_status: Some(status.into()),
            client_reference_id: None,
        }
    }

    fn service(ledger: MockOrderLedger, provider: MockPaymentProvider, verify: bool) -> PaymentService {
        PaymentService::new(Arc::new(ledger), Arc::new(provider), verify, Duration::from_secs(1))
    }

    #[test]
    fn request_accepts_string_and_bool_flags() {
        let req: VerifyPaymentRequest =
            serde_json::from_value(json!({"orderId": Uuid::nil().to_string(), "success": "true"}))
                .unwrap();
        assert_eq!(req.success, Some(true));

        let req: VerifyPaymentRequest =
            serde_json::from_value(json!({"orderId": "x", "success": false})).unwrap();
        assert_eq!(req.success, Some(false));

        assert!(serde_json::from_value::<VerifyPaymentRequest>(json!({"success": "yes"})).is_err());
    }

    #[test]
    fn request_requires_valid_order_id() {
        let err = PaymentService::parse_request(VerifyPaymentRequest {
            order_id: Some("not-a-uuid".into()),
            success: Some(true),
        })
        .unwrap_err();
        assert!(matches!(err, ServiceError::ValidationError(_)));
    }

    #[tokio::test]
    async fn trusted_hint_marks_paid_and_is_idempotent() {
        let id = Uuid::new_v4();
        let mut ledger = MockOrderLedger::new();
        ledger
            .expect_find_by_id()
            .times(2)
            .returning(move |_| Ok(Some(order(id, false, None))));
        ledger
            .expect_update()
            .withf(|_, c| c.payment == Some(true))
            .times(2)
            .returning(|_, _| Ok(()));

        let svc = service(ledger, MockPaymentProvider::new(), false);
        assert_eq!(svc.verify(id, true).await.unwrap(), VerificationOutcome::Paid);
        assert_eq!(svc.verify(id, true).await.unwrap(), VerificationOutcome::Paid);
    }

    #[tokio::test]
    async fn failure_signal_deletes_unpaid_order() {
        let id = Uuid::new_v4();
        let mut ledger = MockOrderLedger::new();
        ledger
            .expect_find_by_id()
            .returning(move |_| Ok(Some(order(id, false, Some("cs_1")))));
        ledger.expect_delete_by_id().times(1).returning(|_| Ok(()));

        let mut provider = MockPaymentProvider::new();
        provider
            .expect_retrieve_checkout_session()
            .returning(|_| Ok(session("unpaid")));

        let svc = service(ledger, provider, true);
        assert_eq!(svc.verify(id, false).await.unwrap(), VerificationOutcome::Deleted);
    }

    #[tokio::test]
    async fn missing_order_is_reported_not_raised() {
        let mut ledger = MockOrderLedger::new();
        ledger.expect_find_by_id().returning(|_| Ok(None));
        ledger.expect_delete_by_id().times(0);

        let svc = service(ledger, MockPaymentProvider::new(), true);
        let outcome = svc.verify(Uuid::new_v4(), false).await.unwrap();
        assert_eq!(outcome, VerificationOutcome::NotFound);
        assert!(!outcome.success());
    }

    #[tokio::test]
    async fn provider_overrides_optimistic_client_flag() {
        let id = Uuid::new_v4();
        let mut ledger = MockOrderLedger::new();
        ledger
            .expect_find_by_id()
            .returning(move |_| Ok(Some(order(id, false, Some("cs_1")))));
        ledger.expect_update().times(0);
        ledger.expect_delete_by_id().times(0);

        let mut provider = MockPaymentProvider::new();
        provider
            .expect_retrieve_checkout_session()
            .withf(|id| id == "cs_1")
            .returning(|_| Ok(session("unpaid")));

        let svc = service(ledger, provider, true);
        assert_eq!(svc.verify(id, true).await.unwrap(), VerificationOutcome::Unconfirmed);
    }

    #[tokio::test]
    async fn provider_paid_wins_over_failure_flag() {
        let id = Uuid::new_v4();
        let mut ledger = MockOrderLedger::new();
        ledger
            .expect_find_by_id()
            .returning(move |_| Ok(Some(order(id, false, Some("cs_1")))));
        ledger.expect_update().times(1).returning(|_, _| Ok(()));
        ledger.expect_delete_by_id().times(0);

        let mut provider = MockPaymentProvider::new();
        provider
            .expect_retrieve_checkout_session()
            .returning(|_| Ok(session("paid")));

        let svc = service(ledger, provider, true);
        assert_eq!(svc.verify(id, false).await.unwrap(), VerificationOutcome::Paid);
    }

    #[tokio::test]
    async fn paid_order_is_never_deleted() {
        let id = Uuid::new_v4();
        let mut ledger = MockOrderLedger::new();
        ledger
            .expect_find_by_id()
            .returning(move |_| Ok(Some(order(id, true, None))));
        ledger.expect_update().returning(|_, _| Ok(()));
        ledger.expect_delete_by_id().times(0);

        let svc = service(ledger, MockPaymentProvider::new(), false);
        assert_eq!(svc.verify(id, false).await.unwrap(), VerificationOutcome::Paid);
    }

    #[tokio::test]
    async fn provider_lookup_failure_is_payment_session_error() {
        let id = Uuid::new_v4();
        let mut ledger = MockOrderLedger::new();
        ledger
            .expect_find_by_id()
            .returning(move |_| Ok(Some(order(id, false, Some("cs_1")))));

        let mut provider = MockPaymentProvider::new();
        provider
            .expect_retrieve_checkout_session()
            .returning(|_| Err(ServiceError::PaymentSessionError("down".into())));

        let svc = service(ledger, provider, true);
        assert!(matches!(
            svc.verify(id, true).await,
            Err(ServiceError::PaymentSessionError(_))
        ));
    }

    #[test]
    fn webhook_requires_configured_secret_and_valid_signature() {
        let svc = service(MockOrderLedger::new(), MockPaymentProvider::new(), true);
        assert!(matches!(
            svc.parse_webhook(b"{}", Some("t=1,v1=00")),
            Err(ServiceError::ServiceUnavailable(_))
        ));

        let svc = svc.with_webhook_secret(Some("whsec_test".into()), 300);
        assert!(matches!(
            svc.parse_webhook(b"{}", None),
            Err(ServiceError::Unauthorized(_))
        ));
        assert!(matches!(
            svc.parse_webhook(b"{}", Some("t=1,v1=00")),
            Err(ServiceError::Unauthorized(_))
        ));

        let payload = br#"{"id":"evt_1","type":"ping","data":{"object":{}}}"#;
        let header = sign_webhook_payload(payload, "whsec_test", Utc::now().timestamp());
        let event = svc.parse_webhook(payload, Some(&header)).unwrap();
        assert_eq!(event.event_type, "ping");
    }

    #[tokio::test]
    async fn completed_session_marks_referenced_order_paid() {
        let id = Uuid::new_v4();
        let mut ledger = MockOrderLedger::new();
        ledger
            .expect_update()
            .withf(move |oid, c| *oid == id && c.payment == Some(true))
            .times(1)
            .returning(|_, _| Ok(()));

        let svc = service(ledger, MockPaymentProvider::new(), true);
        let event = StripeEvent {
            id: "evt_1".into(),
            event_type: "checkout.session.completed".into(),
            data: StripeEventData {
                object: json!({
                    "id": "cs_1",
                    "payment_status": "paid",
                    "client_reference_id": id.to_string()
                }),
            },
        };
        assert_eq!(svc.handle_event(event).await.unwrap(), WebhookOutcome::MarkedPaid(id));
    }

    #[tokio::test]
    async fn expired_session_removes_unpaid_order() {
        let id = Uuid::new_v4();
        let mut ledger = MockOrderLedger::new();
        ledger
            .expect_find_by_id()
            .returning(move |_| Ok(Some(order(id, false, Some("cs_1")))));
        ledger.expect_delete_by_id().times(1).returning(|_| Ok(()));

        let svc = service(ledger, MockPaymentProvider::new(), true);
        let event = StripeEvent {
            id: "evt_2".into(),
            event_type: "checkout.session.expired".into(),
            data: StripeEventData {
                object: json!({"id": "cs_1", "client_reference_id": id.to_string()}),
            },
        };
        assert_eq!(svc.handle_event(event).await.unwrap(), WebhookOutcome::Deleted(id));
    }
}
