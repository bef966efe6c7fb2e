use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::env;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError, ValidationErrors};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 4000;
const CONFIG_DIR: &str = "config";
const DEFAULT_CURRENCY: &str = "inr";
const DEFAULT_DELIVERY_FEE: i64 = 80;
const DEFAULT_ORDER_STATUS: &str = "Food Processing";
const DEFAULT_STRIPE_API_BASE: &str = "https://api.stripe.com";
const MIN_JWT_SECRET_LEN: usize = 32;

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// Server host address
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    /// DB pool: max connections
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    /// DB pool: min connections
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    /// DB timeouts (seconds)
    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,
    #[serde(default = "default_db_idle_timeout_secs")]
    pub db_idle_timeout_secs: u64,
    #[serde(default = "default_db_acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,

    /// CORS: comma-separated list of allowed origins (production)
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,

    /// Allow permissive CORS fallback
    #[serde(default)]
    pub cors_allow_any_origin: bool,

    /// CORS: allow credentials
    #[serde(default)]
    pub cors_allow_credentials: bool,

    /// JWT signing secret
    #[validate(length(min = 32), custom = "validate_jwt_secret")]
    pub jwt_secret: String,

    /// JWT expiration time in seconds
    #[serde(default = "default_jwt_expiration")]
    pub jwt_expiration: u64,

    #[serde(default = "default_auth_issuer")]
    pub auth_issuer: String,

    #[serde(default = "default_auth_audience")]
    pub auth_audience: String,

    /// Stripe secret key; when absent every provider call fails
    #[serde(default)]
    pub stripe_secret_key: Option<String>,

    /// Stripe REST base URL (overridable for tests and proxies)
    #[serde(default = "default_stripe_api_base")]
    pub stripe_api_base: String,

    /// Secret for verifying `Stripe-Signature` on provider webhooks
    #[serde(default)]
    pub stripe_webhook_secret: Option<String>,

    /// Webhook timestamp tolerance (seconds)
    #[serde(default = "default_webhook_tolerance_secs")]
    pub stripe_webhook_tolerance_secs: u64,

    /// ISO currency code sent with every line item (lowercase)
    #[serde(default = "default_currency")]
    #[validate(length(min = 3, max = 3, message = "Currency must be 3 characters"))]
    pub payment_currency: String,

    /// Flat delivery charge added to every order, in major units
    #[serde(default = "default_delivery_fee")]
    #[validate(custom = "validate_delivery_fee")]
    pub delivery_fee: Decimal,

    /// Frontend base URL used to build checkout success/cancel redirects
    #[serde(default = "default_frontend_url")]
    #[validate(url)]
    pub frontend_url: String,

    /// Upper bound on a single payment provider call (seconds)
    #[serde(default = "default_payment_timeout_secs")]
    #[validate(range(min = 1, max = 120))]
    pub payment_timeout_secs: u64,

    /// Confirm payment state with the provider instead of trusting the client flag
    #[serde(default = "default_true_bool")]
    pub verify_payment_with_provider: bool,

    /// Status assigned to freshly placed orders
    #[serde(default = "default_order_status")]
    #[validate(length(min = 1))]
    pub default_order_status: String,
}

impl AppConfig {
    /// Construct a configuration with defaults for everything but the essentials.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        database_url: String,
        jwt_secret: String,
        host: String,
        port: u16,
        environment: String,
    ) -> Self {
        Self {
            database_url,
            host,
            port,
            environment,
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: false,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            db_idle_timeout_secs: default_db_idle_timeout_secs(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
            cors_allowed_origins: None,
            cors_allow_any_origin: false,
            cors_allow_credentials: false,
            jwt_secret,
            jwt_expiration: default_jwt_expiration(),
            auth_issuer: default_auth_issuer(),
            auth_audience: default_auth_audience(),
            stripe_secret_key: None,
            stripe_api_base: default_stripe_api_base(),
            stripe_webhook_secret: None,
            stripe_webhook_tolerance_secs: default_webhook_tolerance_secs(),
            payment_currency: default_currency(),
            delivery_fee: default_delivery_fee(),
            frontend_url: default_frontend_url(),
            payment_timeout_secs: default_payment_timeout_secs(),
            verify_payment_with_provider: true,
            default_order_status: default_order_status(),
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }

    pub fn has_cors_allowed_origins(&self) -> bool {
        self.cors_allowed_origins
            .as_ref()
            .map(|raw| raw.split(',').any(|origin| !origin.trim().is_empty()))
            .unwrap_or(false)
    }

    /// Permissive CORS is only used when no origins are configured and either
    /// we are in development or the override flag is set.
    pub fn should_allow_permissive_cors(&self) -> bool {
        !self.has_cors_allowed_origins() && (self.is_development() || self.cors_allow_any_origin)
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    pub fn payment_timeout(&self) -> Duration {
        Duration::from_secs(self.payment_timeout_secs)
    }

    fn validate_additional_constraints(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if self.is_production() && self.stripe_secret_key.is_none() {
            let mut err = ValidationError::new("stripe_secret_key_required");
            err.message = Some("stripe_secret_key must be set in production".into());
            errors.add("stripe_secret_key", err);
        }

        if self.db_min_connections > self.db_max_connections {
            let mut err = ValidationError::new("db_pool_bounds");
            err.message = Some("db_min_connections cannot exceed db_max_connections".into());
            errors.add("db_min_connections", err);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] ConfigError),
    #[error("Configuration validation failed: {0}")]
    Validation(#[from] ValidationErrors),
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_db_max_connections() -> u32 {
    10
}
fn default_db_min_connections() -> u32 {
    1
}
fn default_db_connect_timeout_secs() -> u64 {
    30
}
fn default_db_idle_timeout_secs() -> u64 {
    600
}
fn default_db_acquire_timeout_secs() -> u64 {
    8
}

fn default_jwt_expiration() -> u64 {
    7 * 24 * 3600
}

fn default_auth_issuer() -> String {
    "food-order-api".to_string()
}

fn default_auth_audience() -> String {
    "food-order-clients".to_string()
}

fn default_stripe_api_base() -> String {
    DEFAULT_STRIPE_API_BASE.to_string()
}

fn default_webhook_tolerance_secs() -> u64 {
    300
}

fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}

fn default_delivery_fee() -> Decimal {
    Decimal::from(DEFAULT_DELIVERY_FEE)
}

fn default_frontend_url() -> String {
    "http://localhost:5173".to_string()
}

fn default_payment_timeout_secs() -> u64 {
    10
}

fn default_true_bool() -> bool {
    true
}

fn default_order_status() -> String {
    DEFAULT_ORDER_STATUS.to_string()
}

fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    match level.to_ascii_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => {
            let mut err = ValidationError::new("invalid_log_level");
            err.message = Some("log_level must be one of trace, debug, info, warn, error".into());
            Err(err)
        }
    }
}

fn validate_jwt_secret(secret: &str) -> Result<(), ValidationError> {
    if secret.len() < MIN_JWT_SECRET_LEN || secret.chars().all(|c| c == secret.chars().next().unwrap_or(c)) {
        let mut err = ValidationError::new("weak_jwt_secret");
        err.message = Some("jwt_secret must be at least 32 characters and not a repeated character".into());
        return Err(err);
    }
    Ok(())
}

fn validate_delivery_fee(fee: &Decimal) -> Result<(), ValidationError> {
    if fee.is_sign_negative() {
        let mut err = ValidationError::new("negative_delivery_fee");
        err.message = Some("delivery_fee cannot be negative".into());
        return Err(err);
    }
    Ok(())
}

pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("food_order_api={},tower_http=debug", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    if json {
        let _ = fmt()
            .with_env_filter(EnvFilter::new(filter_directive))
            .json()
            .try_init();
    } else {
        let _ = fmt()
            .with_env_filter(EnvFilter::new(filter_directive))
            .try_init();
    }
}

pub fn load_config() -> Result<AppConfig, AppConfigError> {
    // Support both RUN_ENV and APP_ENV for selecting config profile
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !Path::new(CONFIG_DIR).exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            CONFIG_DIR
        );
    }

    // jwt_secret has no default and must come from a file or APP__JWT_SECRET
    let config = Config::builder()
        .set_default("database_url", "sqlite://food_order.db?mode=rwc")?
        .set_default("host", "0.0.0.0")?
        .set_default("port", i64::from(DEFAULT_PORT))?
        .set_default("environment", run_env.as_str())?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    if config.get_string("jwt_secret").is_err() {
        error!("JWT secret is not configured. Set APP__JWT_SECRET (minimum 32 characters).");
        return Err(AppConfigError::Load(ConfigError::NotFound(
            "jwt_secret is required but not configured. Set APP__JWT_SECRET environment variable."
                .into(),
        )));
    }

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    app_config.validate_additional_constraints().map_err(|e| {
        error!("Configuration security validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}
