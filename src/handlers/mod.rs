pub mod cart;
pub mod orders;
pub mod users;

use crate::{
    auth::AuthService,
    config::AppConfig,
    errors::ServiceError,
    repositories::{OrderLedger, OrderRepository, UserRepository, UserStore},
    services::{
        cart::CartService,
        checkout::CheckoutSessionBuilder,
        orders::OrderService,
        payments::PaymentService,
        stripe::{PaymentProvider, StripeClient},
        users::UserService,
    },
};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tracing::warn;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub orders: Arc<OrderService>,
    pub payments: Arc<PaymentService>,
    pub cart: Arc<CartService>,
    pub users: Arc<UserService>,
    pub provider: Arc<dyn PaymentProvider>,
}

impl AppServices {
    /// Wires services over the sea-orm repositories and the given provider.
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: &AppConfig,
        provider: Arc<dyn PaymentProvider>,
        auth: Arc<AuthService>,
    ) -> Self {
        let ledger: Arc<dyn OrderLedger> = Arc::new(OrderRepository::new(db.clone()));
        let users: Arc<dyn UserStore> = Arc::new(UserRepository::new(db));
        let checkout = CheckoutSessionBuilder::from_config(provider.clone(), config);

        Self {
            orders: Arc::new(OrderService::new(
                ledger.clone(),
                users.clone(),
                checkout,
                config.default_order_status.clone(),
            )),
            payments: Arc::new(PaymentService::from_config(ledger, provider.clone(), config)),
            cart: Arc::new(CartService::new(users.clone())),
            users: Arc::new(UserService::new(users, auth)),
            provider,
        }
    }

    /// Same as [`AppServices::new`] with the Stripe REST client built from config.
    pub fn with_stripe(
        db: Arc<DatabaseConnection>,
        config: &AppConfig,
        auth: Arc<AuthService>,
    ) -> Result<Self, ServiceError> {
        let client = StripeClient::from_config(config)?;
        if !client.is_configured() {
            warn!("Stripe secret key is not configured; checkout sessions will fail until it is set");
        }
        let provider: Arc<dyn PaymentProvider> = Arc::new(client);
        Ok(Self::new(db, config, provider, auth))
    }
}
