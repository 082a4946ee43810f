mod store;
mod stripe;
mod webhook;

pub use store::{PaymentRecord, PaymentStore};
pub use stripe::StripePaymentProvider;
pub use webhook::{parse_event, verify_webhook_signature, Invoice, ParsedEvent, WebhookEvent};

#[cfg(test)]
pub(crate) use webhook::sign_payload;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::service::product::SubscriptionType;

/// Subscription status as reported by the payment provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderStatus {
    Trialing,
    Active,
    PastDue,
    Canceled,
    Unpaid,
    Incomplete,
    IncompleteExpired,
    Paused,
    #[serde(other)]
    Unknown,
}

impl ProviderStatus {
    /// Whether a freshly created subscription in this status can be handed to the user.
    pub fn is_usable(&self) -> bool {
        matches!(self, ProviderStatus::Trialing | ProviderStatus::Active)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderStatus::Trialing => "trialing",
            ProviderStatus::Active => "active",
            ProviderStatus::PastDue => "past_due",
            ProviderStatus::Canceled => "canceled",
            ProviderStatus::Unpaid => "unpaid",
            ProviderStatus::Incomplete => "incomplete",
            ProviderStatus::IncompleteExpired => "incomplete_expired",
            ProviderStatus::Paused => "paused",
            ProviderStatus::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProviderSubscription {
    pub id: String,
    pub customer_id: Option<String>,
    pub status: ProviderStatus,
    pub current_period_start: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub trial_start: Option<DateTime<Utc>>,
    pub trial_end: Option<DateTime<Utc>>,
    pub cancel_at_period_end: bool,
    pub ended_at: Option<DateTime<Utc>>,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct NewSubscription {
    pub customer_id: String,
    pub price_id: String,
    pub payment_method_id: Option<String>,
    pub trial_days: Option<i64>,
    pub user_id: String,
    pub product_id: String,
    pub subscription_type: SubscriptionType,
}

#[async_trait]
pub trait PaymentProvider: Send + Sync {
    async fn create_customer(&self, email: &str, user_id: &str) -> Result<String, PaymentError>;
    async fn attach_payment_method(&self, customer_id: &str, payment_method_id: &str) -> Result<(), PaymentError>;
    async fn create_subscription(&self, request: &NewSubscription) -> Result<ProviderSubscription, PaymentError>;
    async fn set_cancel_at_period_end(
        &self,
        subscription_id: &str,
        cancel: bool,
    ) -> Result<ProviderSubscription, PaymentError>;
    /// Cancels immediately, without waiting for the period to end.
    async fn cancel_subscription(&self, subscription_id: &str) -> Result<(), PaymentError>;
}

#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("Payment provider error: {0}")]
    ApiError(String),
    #[error("Invalid webhook signature")]
    InvalidWebhookSignature,
    #[error("Invalid webhook payload: {0}")]
    InvalidPayload(String),
}

impl From<reqwest::Error> for PaymentError {
    fn from(error: reqwest::Error) -> Self {
        PaymentError::ApiError(error.to_string())
    }
}
