use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::{Client, Response};
use serde::Deserialize;
use std::collections::HashMap;

use super::{NewSubscription, PaymentError, PaymentProvider, ProviderStatus, ProviderSubscription};
use crate::config::StripeConfig;

const API_BASE_URL: &str = "https://api.stripe.com/v1";

#[derive(Debug, Deserialize)]
struct Customer {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ItemPeriod {
    current_period_start: Option<i64>,
    current_period_end: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct ItemList {
    #[serde(default)]
    data: Vec<ItemPeriod>,
}

/// Subscription object as returned by the API and embedded in webhook events.
#[derive(Debug, Deserialize)]
pub(super) struct SubscriptionObject {
    id: String,
    #[serde(default)]
    customer: Option<String>,
    status: ProviderStatus,
    #[serde(default)]
    current_period_start: Option<i64>,
    #[serde(default)]
    current_period_end: Option<i64>,
    #[serde(default)]
    trial_start: Option<i64>,
    #[serde(default)]
    trial_end: Option<i64>,
    #[serde(default)]
    cancel_at_period_end: bool,
    #[serde(default)]
    ended_at: Option<i64>,
    #[serde(default)]
    metadata: HashMap<String, String>,
    #[serde(default)]
    items: Option<ItemList>,
}

pub(super) fn timestamp(secs: Option<i64>) -> Option<DateTime<Utc>> {
    secs.and_then(|s| Utc.timestamp_opt(s, 0).single())
}

impl From<SubscriptionObject> for ProviderSubscription {
    fn from(object: SubscriptionObject) -> Self {
        // Newer API versions report the billing period on the subscription items.
        let item = object.items.as_ref().and_then(|items| items.data.first());
        let period_start = object
            .current_period_start
            .or_else(|| item.and_then(|i| i.current_period_start));
        let period_end = object
            .current_period_end
            .or_else(|| item.and_then(|i| i.current_period_end));

        Self {
            id: object.id,
            customer_id: object.customer,
            status: object.status,
            current_period_start: timestamp(period_start),
            current_period_end: timestamp(period_end),
            trial_start: timestamp(object.trial_start),
            trial_end: timestamp(object.trial_end),
            cancel_at_period_end: object.cancel_at_period_end,
            ended_at: timestamp(object.ended_at),
            metadata: object.metadata,
        }
    }
}

pub struct StripePaymentProvider {
    client: Client,
    config: StripeConfig,
}

impl StripePaymentProvider {
    pub fn new(client: Client, config: StripeConfig) -> Self {
        Self { client, config }
    }

    async fn post_form(&self, path: &str, form: &[(String, String)]) -> Result<Response, PaymentError> {
        let response = self
            .client
            .post(format!("{}{}", API_BASE_URL, path))
            .bearer_auth(&self.config.secret_key)
            .form(form)
            .send()
            .await?;

        check_status(response).await
    }
}

async fn check_status(response: Response) -> Result<Response, PaymentError> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status();
    let message = response
        .json::<ApiErrorBody>()
        .await
        .ok()
        .and_then(|body| body.error.message)
        .unwrap_or_else(|| "unknown error".to_string());

    Err(PaymentError::ApiError(format!("Stripe returned {}: {}", status, message)))
}

fn pair(key: &str, value: impl ToString) -> (String, String) {
    (key.to_string(), value.to_string())
}

#[async_trait]
impl PaymentProvider for StripePaymentProvider {
    async fn create_customer(&self, email: &str, user_id: &str) -> Result<String, PaymentError> {
        let form = [pair("email", email), pair("metadata[userId]", user_id)];
        let customer: Customer = self.post_form("/customers", &form).await?.json().await?;
        info!("Created Stripe customer {} for user {}", customer.id, user_id);
        Ok(customer.id)
    }

    async fn attach_payment_method(&self, customer_id: &str, payment_method_id: &str) -> Result<(), PaymentError> {
        self.post_form(
            &format!("/payment_methods/{}/attach", payment_method_id),
            &[pair("customer", customer_id)],
        )
        .await?;

        self.post_form(
            &format!("/customers/{}", customer_id),
            &[pair("invoice_settings[default_payment_method]", payment_method_id)],
        )
        .await?;

        Ok(())
    }

    async fn create_subscription(&self, request: &NewSubscription) -> Result<ProviderSubscription, PaymentError> {
        let mut form = vec![
            pair("customer", &request.customer_id),
            pair("items[0][price]", &request.price_id),
            pair("metadata[userId]", &request.user_id),
            pair("metadata[productId]", &request.product_id),
            pair("metadata[subscriptionType]", request.subscription_type),
        ];

        if let Some(payment_method_id) = &request.payment_method_id {
            form.push(pair("default_payment_method", payment_method_id));
        }

        match request.trial_days {
            Some(days) => {
                form.push(pair("trial_period_days", days));
                form.push(pair("trial_settings[end_behavior][missing_payment_method]", "cancel"));
            }
            None => form.push(pair("payment_behavior", "error_if_incomplete")),
        }

        let object: SubscriptionObject = self.post_form("/subscriptions", &form).await?.json().await?;
        Ok(object.into())
    }

    async fn set_cancel_at_period_end(
        &self,
        subscription_id: &str,
        cancel: bool,
    ) -> Result<ProviderSubscription, PaymentError> {
        let object: SubscriptionObject = self
            .post_form(
                &format!("/subscriptions/{}", subscription_id),
                &[pair("cancel_at_period_end", cancel)],
            )
            .await?
            .json()
            .await?;
        Ok(object.into())
    }

    async fn cancel_subscription(&self, subscription_id: &str) -> Result<(), PaymentError> {
        let response = self
            .client
            .delete(format!("{}/subscriptions/{}", API_BASE_URL, subscription_id))
            .bearer_auth(&self.config.secret_key)
            .send()
            .await?;

        check_status(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_period_falls_back_to_items() {
        let raw = serde_json::json!({
            "id": "sub_123",
            "customer": "cus_1",
            "status": "trialing",
            "trial_end": 1_700_000_000,
            "items": { "data": [{ "current_period_start": 1_690_000_000, "current_period_end": 1_700_000_000 }] },
            "metadata": { "userId": "u1" }
        });
        let subscription: ProviderSubscription = serde_json::from_value::<SubscriptionObject>(raw).unwrap().into();

        assert_eq!(subscription.status, ProviderStatus::Trialing);
        assert_eq!(subscription.current_period_end.map(|d| d.timestamp()), Some(1_700_000_000));
        assert_eq!(subscription.metadata.get("userId").map(String::as_str), Some("u1"));
        assert!(!subscription.cancel_at_period_end);
    }

    #[test]
    fn test_unknown_status() {
        let raw = serde_json::json!({ "id": "sub_1", "status": "something_new" });
        let subscription: ProviderSubscription = serde_json::from_value::<SubscriptionObject>(raw).unwrap().into();
        assert_eq!(subscription.status, ProviderStatus::Unknown);
        assert!(!subscription.status.is_usable());
    }
}
