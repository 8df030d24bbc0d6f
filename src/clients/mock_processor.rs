//! In-memory payment processor
//!
//! Behaves like the processor's test mode: well-known payment method ids
//! succeed, decline or demand authentication. Used by `PAYMENT_PROCESSOR=mock`
//! and by the test suites.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::{
    CaptureMethod, CreateIntentParams, Customer, IntentStatus, PaymentIntent, PaymentMethodSummary, PaymentProcessor,
    ProcessorError, ProcessorResult,
};

pub const CARD_SUCCEEDS: &str = "pm_card_visa";
pub const CARD_DECLINED: &str = "pm_card_declined";
pub const CARD_REQUIRES_AUTH: &str = "pm_card_authentication_required";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockCardBehavior {
    Succeed,
    Decline,
    RequireAuthentication,
}

#[derive(Default)]
struct State {
    next_id: u64,
    customers: HashMap<String, Customer>,
    customer_methods: HashMap<String, Vec<PaymentMethodSummary>>,
    card_behaviors: HashMap<String, MockCardBehavior>,
    intents: HashMap<String, PaymentIntent>,
    idempotency: HashMap<String, StoredReply>,
    unavailable: bool,
    lose_next_response: bool,
    create_calls: u64,
}

/// What the processor remembers per idempotency key: the request's shape and
/// its answer, declines included
struct StoredReply {
    fingerprint: (i64, Option<String>, bool),
    result: ProcessorResult<String>,
}

fn fingerprint(params: &CreateIntentParams) -> (i64, Option<String>, bool) {
    (params.amount_cents, params.payment_method_id.clone(), params.off_session)
}

impl State {
    fn next(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}_mock_{}", prefix, self.next_id)
    }

    fn behavior(&self, payment_method: &str) -> MockCardBehavior {
        if let Some(behavior) = self.card_behaviors.get(payment_method) {
            return *behavior;
        }
        match payment_method {
            CARD_DECLINED => MockCardBehavior::Decline,
            CARD_REQUIRES_AUTH => MockCardBehavior::RequireAuthentication,
            _ => MockCardBehavior::Succeed,
        }
    }

    fn attach(&mut self, customer_id: &str, payment_method: &str) {
        self.next_id += 1;
        let created = self.next_id as i64;
        let methods = self.customer_methods.entry(customer_id.to_string()).or_default();
        if methods.iter().any(|m| m.id == payment_method) {
            return;
        }
        methods.insert(
            0,
            PaymentMethodSummary {
                id: payment_method.to_string(),
                brand: Some("visa".to_string()),
                last4: Some("4242".to_string()),
                created,
            },
        );
    }
}

#[derive(Clone, Default)]
pub struct MockProcessor {
    state: Arc<Mutex<State>>,
}

impl MockProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        // a poisoned lock only means another test thread panicked
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set_card_behavior(&self, payment_method: &str, behavior: MockCardBehavior) {
        self.state().card_behaviors.insert(payment_method.to_string(), behavior);
    }

    /// Simulate an outage: every call fails with `Unavailable`
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state().unavailable = unavailable;
    }

    /// The next create-intent call goes through but its response is lost,
    /// as with a timeout after the processor committed
    pub fn lose_next_response(&self) {
        self.state().lose_next_response = true;
    }

    pub fn attach_payment_method(&self, customer_id: &str, payment_method: &str) {
        self.state().attach(customer_id, payment_method);
    }

    pub fn intent(&self, intent_id: &str) -> Option<PaymentIntent> {
        self.state().intents.get(intent_id).cloned()
    }

    /// Number of create-intent calls that reached the processor
    pub fn create_calls(&self) -> u64 {
        self.state().create_calls
    }

    fn confirm_intent(state: &mut State, params: &CreateIntentParams) -> ProcessorResult<PaymentIntent> {
        if params.amount_cents <= 0 {
            return Err(ProcessorError::InvalidRequest("amount must be positive".to_string()));
        }

        let id = state.next("pi");
        let mut intent = PaymentIntent {
            id: id.clone(),
            status: IntentStatus::RequiresPaymentMethod,
            amount_cents: params.amount_cents,
            amount_received_cents: 0,
            client_secret: Some(format!("{}_secret", id)),
            customer_id: params.customer_id.clone(),
            payment_method_id: params.payment_method_id.clone(),
            last_error: None,
        };

        if params.confirm {
            let method = params
                .payment_method_id
                .clone()
                .ok_or_else(|| ProcessorError::InvalidRequest("confirm requires a payment method".to_string()))?;

            match state.behavior(&method) {
                MockCardBehavior::Decline => {
                    return Err(ProcessorError::CardDeclined {
                        code: Some("card_declined".to_string()),
                        message: "Your card was declined.".to_string(),
                    });
                }
                MockCardBehavior::RequireAuthentication if params.off_session => {
                    intent.last_error = Some("authentication_required".to_string());
                    state.intents.insert(id.clone(), intent.clone());
                    return Err(ProcessorError::AuthenticationRequired {
                        payment_intent_id: id,
                        client_secret: intent.client_secret,
                    });
                }
                MockCardBehavior::RequireAuthentication => {
                    intent.status = IntentStatus::RequiresAction;
                }
                MockCardBehavior::Succeed => {
                    intent.status = match params.capture_method {
                        CaptureMethod::Manual => IntentStatus::RequiresCapture,
                        CaptureMethod::Automatic => {
                            intent.amount_received_cents = params.amount_cents;
                            IntentStatus::Succeeded
                        }
                    };
                }
            }

            if params.save_payment_method || params.off_session {
                if let Some(customer) = &params.customer_id {
                    state.attach(customer, &method);
                }
            }
        }

        state.intents.insert(id, intent.clone());
        Ok(intent)
    }

    fn check_available(state: &State) -> ProcessorResult<()> {
        if state.unavailable {
            Err(ProcessorError::Unavailable("mock processor offline".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl PaymentProcessor for MockProcessor {
    async fn create_customer(&self, email: &str, _name: &str, _phone: Option<&str>) -> ProcessorResult<Customer> {
        let mut state = self.state();
        Self::check_available(&state)?;
        let customer = Customer {
            id: state.next("cus"),
            email: Some(email.to_string()),
        };
        state.customers.insert(customer.id.clone(), customer.clone());
        Ok(customer)
    }

    async fn retrieve_customer(&self, customer_id: &str) -> ProcessorResult<Customer> {
        let state = self.state();
        Self::check_available(&state)?;
        state
            .customers
            .get(customer_id)
            .cloned()
            .ok_or_else(|| ProcessorError::InvalidRequest(format!("No such customer: {}", customer_id)))
    }

    async fn find_customer_by_email(&self, email: &str) -> ProcessorResult<Option<Customer>> {
        let state = self.state();
        Self::check_available(&state)?;
        Ok(state
            .customers
            .values()
            .find(|c| c.email.as_deref() == Some(email))
            .cloned())
    }

    async fn list_payment_methods(&self, customer_id: &str) -> ProcessorResult<Vec<PaymentMethodSummary>> {
        let state = self.state();
        Self::check_available(&state)?;
        Ok(state.customer_methods.get(customer_id).cloned().unwrap_or_default())
    }

    async fn create_payment_intent(&self, params: CreateIntentParams) -> ProcessorResult<PaymentIntent> {
        let mut state = self.state();
        Self::check_available(&state)?;

        if let Some(key) = &params.idempotency_key {
            if let Some(stored) = state.idempotency.get(key) {
                if stored.fingerprint != fingerprint(&params) {
                    return Err(ProcessorError::InvalidRequest(format!(
                        "idempotency key {} was already used with different parameters",
                        key
                    )));
                }
                return match &stored.result {
                    Ok(id) => state
                        .intents
                        .get(id)
                        .cloned()
                        .ok_or_else(|| ProcessorError::InvalidRequest(format!("No such payment_intent: {}", id))),
                    Err(e) => Err(e.clone()),
                };
            }
        }

        state.create_calls += 1;
        let result = Self::confirm_intent(&mut state, &params);

        // validation errors are not stored against the key
        let stored = match &result {
            Ok(intent) => Some(Ok(intent.id.clone())),
            Err(e @ ProcessorError::CardDeclined { .. }) | Err(e @ ProcessorError::AuthenticationRequired { .. }) => {
                Some(Err(e.clone()))
            }
            Err(_) => None,
        };
        if let (Some(key), Some(result)) = (params.idempotency_key.clone(), stored) {
            let fingerprint = fingerprint(&params);
            state.idempotency.insert(key, StoredReply { fingerprint, result });
        }

        if std::mem::take(&mut state.lose_next_response) {
            return Err(ProcessorError::Unavailable("timed out waiting for the processor".to_string()));
        }
        result
    }

    async fn capture_payment_intent(
        &self,
        intent_id: &str,
        amount_cents: Option<i64>,
    ) -> ProcessorResult<PaymentIntent> {
        let mut state = self.state();
        Self::check_available(&state)?;

        let intent = state
            .intents
            .get_mut(intent_id)
            .ok_or_else(|| ProcessorError::InvalidRequest(format!("No such payment_intent: {}", intent_id)))?;

        if intent.status != IntentStatus::RequiresCapture {
            return Err(ProcessorError::InvalidRequest(format!(
                "payment intent is {}, cannot capture",
                intent.status.as_str()
            )));
        }

        let amount = amount_cents.unwrap_or(intent.amount_cents);
        if amount <= 0 || amount > intent.amount_cents {
            return Err(ProcessorError::InvalidRequest(
                "amount_to_capture exceeds the authorized amount".to_string(),
            ));
        }

        intent.status = IntentStatus::Succeeded;
        intent.amount_received_cents = amount;
        Ok(intent.clone())
    }

    async fn cancel_payment_intent(&self, intent_id: &str) -> ProcessorResult<PaymentIntent> {
        let mut state = self.state();
        Self::check_available(&state)?;

        let intent = state
            .intents
            .get_mut(intent_id)
            .ok_or_else(|| ProcessorError::InvalidRequest(format!("No such payment_intent: {}", intent_id)))?;

        if intent.status == IntentStatus::Succeeded {
            return Err(ProcessorError::InvalidRequest(
                "a succeeded payment intent cannot be canceled".to_string(),
            ));
        }

        intent.status = IntentStatus::Canceled;
        Ok(intent.clone())
    }
}
