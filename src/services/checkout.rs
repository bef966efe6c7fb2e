use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, instrument};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::entities::order::OrderLine;
use crate::errors::ServiceError;
use crate::services::stripe::{CheckoutSession, CheckoutSessionRequest, LineItem, PaymentProvider};

pub const DELIVERY_LINE_NAME: &str = "Delivery Charges";

/// Converts a major-unit amount into integer minor units (x100).
///
/// Amounts with sub-minor precision, negative amounts and values that do not
/// fit in an `i64` are rejected.
pub fn to_minor_units(amount: Decimal) -> Result<i64, ServiceError> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(ServiceError::ItemDataError(format!(
            "negative amount {}",
            amount
        )));
    }
    let scaled = amount
        .checked_mul(Decimal::ONE_HUNDRED)
        .ok_or_else(|| ServiceError::ItemDataError(format!("amount {} overflows", amount)))?;
    if !scaled.fract().is_zero() {
        return Err(ServiceError::ItemDataError(format!(
            "amount {} has more than two decimal places",
            amount
        )));
    }
    scaled
        .to_i64()
        .ok_or_else(|| ServiceError::ItemDataError(format!("amount {} overflows", amount)))
}

/// Translates priced order lines into a provider checkout session.
#[derive(Clone)]
pub struct CheckoutSessionBuilder {
    provider: Arc<dyn PaymentProvider>,
    currency: String,
    delivery_fee: Decimal,
    frontend_url: String,
    timeout: Duration,
}

impl CheckoutSessionBuilder {
    pub fn new(
        provider: Arc<dyn PaymentProvider>,
        currency: impl Into<String>,
        delivery_fee: Decimal,
        frontend_url: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            provider,
            currency: currency.into().to_ascii_lowercase(),
            delivery_fee,
            frontend_url: frontend_url.into().trim_end_matches('/').to_string(),
            timeout,
        }
    }

    pub fn from_config(provider: Arc<dyn PaymentProvider>, cfg: &AppConfig) -> Self {
        Self::new(
            provider,
            cfg.payment_currency.clone(),
            cfg.delivery_fee,
            cfg.frontend_url.clone(),
            cfg.payment_timeout(),
        )
    }

    pub fn delivery_fee(&self) -> Decimal {
        self.delivery_fee
    }

    /// One line per item at unit price, plus the flat delivery line.
    pub fn line_items(&self, lines: &[OrderLine]) -> Result<Vec<LineItem>, ServiceError> {
        let mut items = Vec::with_capacity(lines.len() + 1);
        for line in lines {
            if line.name.trim().is_empty() {
                return Err(ServiceError::ItemDataError("item without a name".into()));
            }
            items.push(LineItem {
                currency: self.currency.clone(),
                name: line.name.clone(),
                unit_amount: to_minor_units(line.price)?,
                quantity: line.quantity.max(1),
            });
        }
        items.push(LineItem {
            currency: self.currency.clone(),
            name: DELIVERY_LINE_NAME.to_string(),
            unit_amount: to_minor_units(self.delivery_fee)?,
            quantity: 1,
        });
        Ok(items)
    }

    /// Success and cancel redirect targets carrying the order id.
    pub fn callback_urls(&self, order_id: Uuid) -> (String, String) {
        (
            format!("{}/verify?success=true&orderId={}", self.frontend_url, order_id),
            format!("{}/verify?success=false&orderId={}", self.frontend_url, order_id),
        )
    }

    /// Requests a session and returns it once it carries a redirect URL.
    #[instrument(skip(self, line_items), fields(order_id = %order_id))]
    pub async fn create_session(
        &self,
        order_id: Uuid,
        line_items: Vec<LineItem>,
    ) -> Result<CheckoutSession, ServiceError> {
        let (success_url, cancel_url) = self.callback_urls(order_id);
        let request = CheckoutSessionRequest {
            line_items,
            success_url,
            cancel_url,
            client_reference_id: order_id.to_string(),
        };

        let session = tokio::time::timeout(self.timeout, self.provider.create_checkout_session(request))
            .await
            .map_err(|_| {
                error!(timeout_secs = self.timeout.as_secs(), "Checkout session creation timed out");
                ServiceError::PaymentSessionError("checkout session creation timed out".into())
            })??;

        match session.url.as_deref() {
            Some(url) if !url.is_empty() => Ok(session),
            _ => Err(ServiceError::PaymentSessionError(format!(
                "session {} has no redirect url",
                session.id
            ))),
        }
    }
}
