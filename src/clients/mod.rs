//! Clients - payment processor integration
//!
//! The booking core only talks to the processor through [`PaymentProcessor`].
//! Amounts cross this boundary in minor units (cents).

pub mod mock_processor;
pub mod stripe_client;

pub use mock_processor::{MockCardBehavior, MockProcessor};
pub use stripe_client::StripeClient;

use async_trait::async_trait;
use num_traits::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProcessorError {
    #[error("card declined: {message}")]
    CardDeclined { code: Option<String>, message: String },

    /// Off-session attempt needs the customer to authenticate (3-D Secure)
    #[error("authentication required for payment intent {payment_intent_id}")]
    AuthenticationRequired {
        payment_intent_id: String,
        client_secret: Option<String>,
    },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("processor unavailable: {0}")]
    Unavailable(String),

    #[error("processor misconfigured: {0}")]
    Configuration(String),
}

pub type ProcessorResult<T> = Result<T, ProcessorError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureMethod {
    Automatic,
    Manual,
}

impl CaptureMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaptureMethod::Automatic => "automatic",
            CaptureMethod::Manual => "manual",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentStatus {
    RequiresPaymentMethod,
    RequiresConfirmation,
    RequiresAction,
    Processing,
    RequiresCapture,
    Canceled,
    Succeeded,
}

impl IntentStatus {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "requires_payment_method" => Some(Self::RequiresPaymentMethod),
            "requires_confirmation" => Some(Self::RequiresConfirmation),
            "requires_action" => Some(Self::RequiresAction),
            "processing" => Some(Self::Processing),
            "requires_capture" => Some(Self::RequiresCapture),
            "canceled" => Some(Self::Canceled),
            "succeeded" => Some(Self::Succeeded),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RequiresPaymentMethod => "requires_payment_method",
            Self::RequiresConfirmation => "requires_confirmation",
            Self::RequiresAction => "requires_action",
            Self::Processing => "processing",
            Self::RequiresCapture => "requires_capture",
            Self::Canceled => "canceled",
            Self::Succeeded => "succeeded",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CreateIntentParams {
    pub amount_cents: i64,
    pub currency: String,
    pub customer_id: Option<String>,
    pub payment_method_id: Option<String>,
    pub capture_method: CaptureMethod,
    pub confirm: bool,
    pub off_session: bool,
    /// Keep the card on the customer for later off-session charges
    pub save_payment_method: bool,
    pub description: Option<String>,
    pub metadata: HashMap<String, String>,
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PaymentIntent {
    pub id: String,
    pub status: IntentStatus,
    pub amount_cents: i64,
    pub amount_received_cents: i64,
    pub client_secret: Option<String>,
    pub customer_id: Option<String>,
    pub payment_method_id: Option<String>,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Customer {
    pub id: String,
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PaymentMethodSummary {
    pub id: String,
    pub brand: Option<String>,
    pub last4: Option<String>,
    pub created: i64,
}

#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    async fn create_customer(&self, email: &str, name: &str, phone: Option<&str>) -> ProcessorResult<Customer>;

    async fn retrieve_customer(&self, customer_id: &str) -> ProcessorResult<Customer>;

    async fn find_customer_by_email(&self, email: &str) -> ProcessorResult<Option<Customer>>;

    /// Saved cards for a customer, most recent first
    async fn list_payment_methods(&self, customer_id: &str) -> ProcessorResult<Vec<PaymentMethodSummary>>;

    async fn create_payment_intent(&self, params: CreateIntentParams) -> ProcessorResult<PaymentIntent>;

    async fn capture_payment_intent(
        &self,
        intent_id: &str,
        amount_cents: Option<i64>,
    ) -> ProcessorResult<PaymentIntent>;

    async fn cancel_payment_intent(&self, intent_id: &str) -> ProcessorResult<PaymentIntent>;
}

/// Convert a major-unit amount into integer cents
pub fn to_minor_units(amount: Decimal) -> ProcessorResult<i64> {
    (amount * Decimal::from(100))
        .round()
        .to_i64()
        .ok_or_else(|| ProcessorError::InvalidRequest(format!("amount {} out of range", amount)))
}

pub fn from_minor_units(cents: i64) -> Decimal {
    Decimal::new(cents, 2)
}
