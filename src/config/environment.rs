//! Environment configuration
//!
//! Reads the process environment (optionally seeded from `.env`) into a typed
//! configuration. Missing required values are reported, never defaulted.

use anyhow::{bail, Context, Result};
use std::env;

use super::store::StoreConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Redis,
    Memory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessorBackend {
    Stripe,
    Mock,
}

/// Payment processor settings
#[derive(Debug, Clone)]
pub struct PaymentConfig {
    pub backend: ProcessorBackend,
    pub stripe_secret_key: String,
    pub stripe_api_base: String,
    pub webhook_secret: String,
    pub webhook_tolerance_secs: u64,
    pub currency: String,
}

/// Environment configuration
#[derive(Debug, Clone)]
pub struct EnvironmentConfig {
    pub environment: String,
    pub port: u16,
    pub host: String,
    pub jwt_secret: String,
    pub cors_origins: Vec<String>,
    pub store_backend: StoreBackend,
    pub store: StoreConfig,
    pub payments: PaymentConfig,
}

impl EnvironmentConfig {
    pub fn from_env() -> Result<Self> {
        let store_backend = match env_or("STORE_BACKEND", "redis").as_str() {
            "redis" => StoreBackend::Redis,
            "memory" => StoreBackend::Memory,
            other => bail!("STORE_BACKEND must be 'redis' or 'memory', got '{}'", other),
        };

        let processor_backend = match env_or("PAYMENT_PROCESSOR", "stripe").as_str() {
            "stripe" => ProcessorBackend::Stripe,
            "mock" => ProcessorBackend::Mock,
            other => bail!("PAYMENT_PROCESSOR must be 'stripe' or 'mock', got '{}'", other),
        };

        let stripe_secret_key = match processor_backend {
            ProcessorBackend::Stripe => required("STRIPE_SECRET_KEY")?,
            ProcessorBackend::Mock => env_or("STRIPE_SECRET_KEY", ""),
        };

        let defaults = StoreConfig::default();
        let store = StoreConfig {
            redis_url: env_or("REDIS_URL", &defaults.redis_url),
            key_prefix: env_or("REDIS_KEY_PREFIX", &defaults.key_prefix),
            booking_lock_ttl_ms: parsed_or("BOOKING_LOCK_TTL_MS", defaults.booking_lock_ttl_ms)?,
            processed_event_ttl_secs: parsed_or("PROCESSED_EVENT_TTL_SECS", defaults.processed_event_ttl_secs)?,
        };

        Ok(Self {
            environment: env_or("ENVIRONMENT", "development"),
            port: parsed_or("PORT", 3000)?,
            host: env_or("HOST", "0.0.0.0"),
            jwt_secret: required("JWT_SECRET")?,
            cors_origins: env_or("CORS_ORIGINS", "")
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            store_backend,
            store,
            payments: PaymentConfig {
                backend: processor_backend,
                stripe_secret_key,
                stripe_api_base: env_or("STRIPE_API_BASE", "https://api.stripe.com/v1"),
                webhook_secret: required("STRIPE_WEBHOOK_SECRET")?,
                webhook_tolerance_secs: parsed_or("WEBHOOK_TOLERANCE_SECS", 300)?,
                currency: env_or("PAYMENT_CURRENCY", "usd"),
            },
        })
    }

    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    pub fn server_url(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn required(key: &str) -> Result<String> {
    env::var(key).with_context(|| format!("{} must be set", key))
}

fn parsed_or<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .with_context(|| format!("{} must be a valid number, got '{}'", key, raw)),
        Err(_) => Ok(default),
    }
}
