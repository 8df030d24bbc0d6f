//! Stripe REST client
//!
//! Form-encoded requests against the Stripe v1 API. Provider errors are
//! translated into [`ProcessorError`] here so nothing Stripe-specific leaks
//! past this module.

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize};
use std::time::Duration;
use tracing::{debug, warn};

use super::{
    CreateIntentParams, Customer, IntentStatus, PaymentIntent, PaymentMethodSummary, PaymentProcessor,
    ProcessorError, ProcessorResult,
};

#[derive(Clone)]
pub struct StripeClient {
    http: Client,
    api_base: String,
    secret_key: String,
}

impl StripeClient {
    pub fn new(api_base: &str, secret_key: &str) -> ProcessorResult<Self> {
        if secret_key.is_empty() {
            return Err(ProcessorError::Configuration("Stripe secret key not configured".to_string()));
        }

        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ProcessorError::Configuration(format!("HTTP client: {}", e)))?;

        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            secret_key: secret_key.to_string(),
        })
    }

    async fn post_form<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(String, String)],
        idempotency_key: Option<&str>,
    ) -> ProcessorResult<T> {
        let mut request = self
            .http
            .post(format!("{}{}", self.api_base, path))
            .bearer_auth(&self.secret_key)
            .form(params);

        if let Some(key) = idempotency_key {
            request = request.header("Idempotency-Key", key);
        }

        debug!("➡️ Stripe POST {}", path);
        let response = request.send().await.map_err(network_error)?;
        parse_response(response).await
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> ProcessorResult<T> {
        debug!("➡️ Stripe GET {}", path);
        let response = self
            .http
            .get(format!("{}{}", self.api_base, path))
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(network_error)?;
        parse_response(response).await
    }
}

#[async_trait]
impl PaymentProcessor for StripeClient {
    async fn create_customer(&self, email: &str, name: &str, phone: Option<&str>) -> ProcessorResult<Customer> {
        let mut params = vec![
            ("email".to_string(), email.to_string()),
            ("name".to_string(), name.to_string()),
        ];
        if let Some(phone) = phone {
            params.push(("phone".to_string(), phone.to_string()));
        }

        let customer: StripeCustomer = self.post_form("/customers", &params, None).await?;
        Ok(customer.into())
    }

    async fn retrieve_customer(&self, customer_id: &str) -> ProcessorResult<Customer> {
        let customer: StripeCustomer = self
            .get(&format!("/customers/{}", urlencoding::encode(customer_id)))
            .await?;
        Ok(customer.into())
    }

    async fn find_customer_by_email(&self, email: &str) -> ProcessorResult<Option<Customer>> {
        let list: StripeList<StripeCustomer> = self
            .get(&format!("/customers?email={}&limit=1", urlencoding::encode(email)))
            .await?;
        Ok(list.data.into_iter().next().map(Into::into))
    }

    async fn list_payment_methods(&self, customer_id: &str) -> ProcessorResult<Vec<PaymentMethodSummary>> {
        let list: StripeList<StripePaymentMethod> = self
            .get(&format!(
                "/payment_methods?customer={}&type=card",
                urlencoding::encode(customer_id)
            ))
            .await?;

        let mut methods: Vec<PaymentMethodSummary> = list.data.into_iter().map(Into::into).collect();
        methods.sort_by(|a, b| b.created.cmp(&a.created));
        Ok(methods)
    }

    async fn create_payment_intent(&self, params: CreateIntentParams) -> ProcessorResult<PaymentIntent> {
        let mut form = vec![
            ("amount".to_string(), params.amount_cents.to_string()),
            ("currency".to_string(), params.currency.to_lowercase()),
            ("capture_method".to_string(), params.capture_method.as_str().to_string()),
            ("payment_method_types[]".to_string(), "card".to_string()),
        ];

        if let Some(customer) = &params.customer_id {
            form.push(("customer".to_string(), customer.clone()));
        }
        if let Some(method) = &params.payment_method_id {
            form.push(("payment_method".to_string(), method.clone()));
        }
        if params.confirm {
            form.push(("confirm".to_string(), "true".to_string()));
        }
        if params.off_session {
            form.push(("off_session".to_string(), "true".to_string()));
        } else if params.save_payment_method {
            form.push(("setup_future_usage".to_string(), "off_session".to_string()));
        }
        if let Some(description) = &params.description {
            form.push(("description".to_string(), description.clone()));
        }
        for (key, value) in &params.metadata {
            form.push((format!("metadata[{}]", key), value.clone()));
        }

        let intent: StripePaymentIntent = self
            .post_form("/payment_intents", &form, params.idempotency_key.as_deref())
            .await?;
        intent.try_into()
    }

    async fn capture_payment_intent(
        &self,
        intent_id: &str,
        amount_cents: Option<i64>,
    ) -> ProcessorResult<PaymentIntent> {
        let mut form = Vec::new();
        if let Some(amount) = amount_cents {
            form.push(("amount_to_capture".to_string(), amount.to_string()));
        }

        let intent: StripePaymentIntent = self
            .post_form(&format!("/payment_intents/{}/capture", intent_id), &form, None)
            .await?;
        intent.try_into()
    }

    async fn cancel_payment_intent(&self, intent_id: &str) -> ProcessorResult<PaymentIntent> {
        let intent: StripePaymentIntent = self
            .post_form(&format!("/payment_intents/{}/cancel", intent_id), &[], None)
            .await?;
        intent.try_into()
    }
}

fn network_error(e: reqwest::Error) -> ProcessorError {
    warn!("⚠️ Stripe network error: {}", e);
    ProcessorError::Unavailable(e.to_string())
}

async fn parse_response<T: DeserializeOwned>(response: Response) -> ProcessorResult<T> {
    let status = response.status();

    if status.is_success() {
        return response
            .json::<T>()
            .await
            .map_err(|e| ProcessorError::Unavailable(format!("unreadable Stripe response: {}", e)));
    }

    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        return Err(ProcessorError::Unavailable(format!("Stripe responded {}", status)));
    }

    let body: StripeErrorBody = response
        .json()
        .await
        .map_err(|e| ProcessorError::Unavailable(format!("unreadable Stripe error ({}): {}", status, e)))?;

    Err(body.error.into())
}

// Stripe API types

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetail {
    #[serde(rename = "type")]
    error_type: Option<String>,
    code: Option<String>,
    decline_code: Option<String>,
    message: Option<String>,
    payment_intent: Option<StripePaymentIntent>,
}

impl From<StripeErrorDetail> for ProcessorError {
    fn from(detail: StripeErrorDetail) -> Self {
        let message = detail
            .message
            .clone()
            .unwrap_or_else(|| "unknown Stripe error".to_string());

        let needs_auth = detail.code.as_deref() == Some("authentication_required")
            || detail.decline_code.as_deref() == Some("authentication_required");

        if needs_auth {
            if let Some(intent) = detail.payment_intent {
                return ProcessorError::AuthenticationRequired {
                    payment_intent_id: intent.id,
                    client_secret: intent.client_secret,
                };
            }
        }

        match detail.error_type.as_deref() {
            Some("card_error") => ProcessorError::CardDeclined {
                code: detail.decline_code.or(detail.code),
                message,
            },
            Some("api_connection_error") | Some("api_error") | Some("rate_limit_error") => {
                ProcessorError::Unavailable(message)
            }
            Some("authentication_error") => ProcessorError::Configuration(message),
            _ => ProcessorError::InvalidRequest(message),
        }
    }
}

#[derive(Debug, Deserialize)]
struct StripeList<T> {
    data: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct StripeCustomer {
    id: String,
    email: Option<String>,
}

impl From<StripeCustomer> for Customer {
    fn from(c: StripeCustomer) -> Self {
        Customer { id: c.id, email: c.email }
    }
}

#[derive(Debug, Deserialize)]
struct StripeCard {
    brand: Option<String>,
    last4: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StripePaymentMethod {
    id: String,
    created: i64,
    card: Option<StripeCard>,
}

impl From<StripePaymentMethod> for PaymentMethodSummary {
    fn from(pm: StripePaymentMethod) -> Self {
        let (brand, last4) = pm.card.map(|c| (c.brand, c.last4)).unwrap_or((None, None));
        PaymentMethodSummary {
            id: pm.id,
            brand,
            last4,
            created: pm.created,
        }
    }
}

#[derive(Debug, Deserialize)]
struct StripeLastError {
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StripePaymentIntent {
    id: String,
    status: String,
    #[serde(default)]
    amount: i64,
    #[serde(default)]
    amount_received: i64,
    client_secret: Option<String>,
    customer: Option<String>,
    payment_method: Option<String>,
    last_payment_error: Option<StripeLastError>,
}

impl TryFrom<StripePaymentIntent> for PaymentIntent {
    type Error = ProcessorError;

    fn try_from(pi: StripePaymentIntent) -> Result<Self, Self::Error> {
        let status = IntentStatus::parse(&pi.status)
            .ok_or_else(|| ProcessorError::Unavailable(format!("unknown intent status '{}'", pi.status)))?;

        Ok(PaymentIntent {
            id: pi.id,
            status,
            amount_cents: pi.amount,
            amount_received_cents: pi.amount_received,
            client_secret: pi.client_secret,
            customer_id: pi.customer,
            payment_method_id: pi.payment_method,
            last_error: pi.last_payment_error.and_then(|e| e.message),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_card_error_maps_to_declined() {
        let body: StripeErrorBody = serde_json::from_str(
            r#"{"error":{"type":"card_error","code":"card_declined","decline_code":"insufficient_funds","message":"Your card has insufficient funds."}}"#,
        )
        .unwrap();

        match ProcessorError::from(body.error) {
            ProcessorError::CardDeclined { code, .. } => assert_eq!(code.as_deref(), Some("insufficient_funds")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_authentication_required_keeps_intent() {
        let body: StripeErrorBody = serde_json::from_str(
            r#"{"error":{"type":"card_error","code":"authentication_required","message":"auth","payment_intent":{"id":"pi_123","status":"requires_payment_method","client_secret":"pi_123_secret"}}}"#,
        )
        .unwrap();

        assert_eq!(
            ProcessorError::from(body.error),
            ProcessorError::AuthenticationRequired {
                payment_intent_id: "pi_123".into(),
                client_secret: Some("pi_123_secret".into()),
            }
        );
    }

    #[test]
    fn test_missing_key_is_configuration_error() {
        assert!(matches!(
            StripeClient::new("https://api.stripe.com/v1", ""),
            Err(ProcessorError::Configuration(_))
        ));
    }
}
