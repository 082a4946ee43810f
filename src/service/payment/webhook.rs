use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha256;
use std::collections::HashMap;

use super::{
    stripe::{timestamp, SubscriptionObject},
    PaymentError, ProviderSubscription,
};

type HmacSha256 = Hmac<Sha256>;

/// Verifies a `Stripe-Signature` header (`t=<timestamp>,v1=<signature>[,v1=...]`).
pub fn verify_webhook_signature(
    payload: &[u8],
    signature_header: &str,
    webhook_secret: &str,
    tolerance_secs: i64,
    now: DateTime<Utc>,
) -> Result<(), PaymentError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in signature_header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse::<i64>().ok(),
            Some(("v1", value)) => signatures.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(PaymentError::InvalidWebhookSignature)?;
    if signatures.is_empty() {
        return Err(PaymentError::InvalidWebhookSignature);
    }
    if now.timestamp().abs_diff(timestamp) > tolerance_secs.unsigned_abs() {
        warn!("Rejecting webhook with stale timestamp {}", timestamp);
        return Err(PaymentError::InvalidWebhookSignature);
    }

    let mut mac =
        HmacSha256::new_from_slice(webhook_secret.as_bytes()).map_err(|_| PaymentError::InvalidWebhookSignature)?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    let expected = hex::encode(mac.finalize().into_bytes());

    let matched = signatures
        .iter()
        .any(|candidate| bool::from(subtle::ConstantTimeEq::ct_eq(expected.as_bytes(), candidate.as_bytes())));

    if matched {
        Ok(())
    } else {
        Err(PaymentError::InvalidWebhookSignature)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Invoice {
    pub id: String,
    pub subscription_id: Option<String>,
    pub customer_id: Option<String>,
    pub amount_paid: i64,
    pub amount_due: i64,
    pub currency: String,
    pub period_end: Option<DateTime<Utc>>,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WebhookEvent {
    SubscriptionChanged(ProviderSubscription),
    SubscriptionDeleted(ProviderSubscription),
    InvoicePaid(Invoice),
    InvoicePaymentFailed(Invoice),
    Ignored,
}

#[derive(Debug, Clone)]
pub struct ParsedEvent {
    pub id: String,
    pub event_type: String,
    pub event: WebhookEvent,
}

#[derive(Debug, Deserialize)]
struct RawEvent {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    data: RawEventData,
}

#[derive(Debug, Deserialize)]
struct RawEventData {
    object: Value,
}

#[derive(Debug, Deserialize)]
struct SubscriptionDetails {
    #[serde(default)]
    subscription: Option<String>,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct InvoiceParent {
    #[serde(default)]
    subscription_details: Option<SubscriptionDetails>,
}

#[derive(Debug, Deserialize)]
struct LinePeriod {
    end: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct Line {
    period: Option<LinePeriod>,
}

#[derive(Debug, Deserialize)]
struct LineList {
    #[serde(default)]
    data: Vec<Line>,
}

#[derive(Debug, Deserialize)]
struct InvoiceObject {
    id: String,
    #[serde(default)]
    subscription: Option<String>,
    #[serde(default)]
    customer: Option<String>,
    #[serde(default)]
    amount_paid: i64,
    #[serde(default)]
    amount_due: i64,
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    subscription_details: Option<SubscriptionDetails>,
    #[serde(default)]
    parent: Option<InvoiceParent>,
    #[serde(default)]
    lines: Option<LineList>,
}

impl From<InvoiceObject> for Invoice {
    fn from(object: InvoiceObject) -> Self {
        // The subscription moved under `parent.subscription_details` in newer API versions.
        let details = object
            .parent
            .and_then(|parent| parent.subscription_details)
            .or(object.subscription_details);
        let subscription_id = object
            .subscription
            .or_else(|| details.as_ref().and_then(|d| d.subscription.clone()));
        let metadata = details.map(|d| d.metadata).unwrap_or_default();
        let period_end = object
            .lines
            .and_then(|lines| lines.data.into_iter().filter_map(|line| line.period?.end).max());

        Self {
            id: object.id,
            subscription_id,
            customer_id: object.customer,
            amount_paid: object.amount_paid,
            amount_due: object.amount_due,
            currency: object.currency.unwrap_or_else(|| "usd".to_string()),
            period_end: timestamp(period_end),
            metadata,
        }
    }
}

fn decode<T: serde::de::DeserializeOwned>(object: Value) -> Result<T, PaymentError> {
    serde_json::from_value(object).map_err(|e| PaymentError::InvalidPayload(e.to_string()))
}

/// Parses a verified webhook body into the events the billing flow cares about.
pub fn parse_event(payload: &[u8]) -> Result<ParsedEvent, PaymentError> {
    let raw: RawEvent = serde_json::from_slice(payload).map_err(|e| PaymentError::InvalidPayload(e.to_string()))?;

    let event = match raw.event_type.as_str() {
        "customer.subscription.created" | "customer.subscription.updated" => {
            WebhookEvent::SubscriptionChanged(decode::<SubscriptionObject>(raw.data.object)?.into())
        }
        "customer.subscription.deleted" => {
            WebhookEvent::SubscriptionDeleted(decode::<SubscriptionObject>(raw.data.object)?.into())
        }
        "invoice.payment_succeeded" | "invoice.paid" => {
            WebhookEvent::InvoicePaid(decode::<InvoiceObject>(raw.data.object)?.into())
        }
        "invoice.payment_failed" => WebhookEvent::InvoicePaymentFailed(decode::<InvoiceObject>(raw.data.object)?.into()),
        _ => WebhookEvent::Ignored,
    };

    Ok(ParsedEvent {
        id: raw.id,
        event_type: raw.event_type,
        event,
    })
}

#[cfg(test)]
pub(crate) fn sign_payload(payload: &[u8], secret: &str, timestamp: i64) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::payment::ProviderStatus;

    const SECRET: &str = "whsec_test_secret";

    #[test]
    fn test_verify_webhook_signature_valid() {
        let payload = br#"{"type":"test"}"#;
        let now = Utc::now();
        let header = sign_payload(payload, SECRET, now.timestamp());
        assert!(verify_webhook_signature(payload, &header, SECRET, 300, now).is_ok());
    }

    #[test]
    fn test_verify_webhook_signature_invalid() {
        let result = verify_webhook_signature(b"payload", "t=123,v1=invalidsig", SECRET, i64::MAX, Utc::now());
        assert!(matches!(result, Err(PaymentError::InvalidWebhookSignature)));
    }

    #[test]
    fn test_verify_webhook_signature_stale() {
        let payload = br#"{"type":"test"}"#;
        let now = Utc::now();
        let header = sign_payload(payload, SECRET, now.timestamp() - 301);
        assert!(verify_webhook_signature(payload, &header, SECRET, 300, now).is_err());
    }

    #[test]
    fn test_verify_webhook_signature_extreme_timestamp() {
        let now = Utc::now();
        for header in ["t=-9223372036854775808,v1=00", "t=9223372036854775807,v1=00"] {
            let result = verify_webhook_signature(b"{}", header, SECRET, 300, now);
            assert!(matches!(result, Err(PaymentError::InvalidWebhookSignature)));
        }
    }

    #[test]
    fn test_verify_webhook_signature_missing_parts() {
        assert!(verify_webhook_signature(b"{}", "v1=abc", SECRET, 300, Utc::now()).is_err());
        assert!(verify_webhook_signature(b"{}", "t=1", SECRET, i64::MAX, Utc::now()).is_err());
    }

    #[test]
    fn test_parse_subscription_deleted() {
        let payload = serde_json::json!({
            "id": "evt_1",
            "type": "customer.subscription.deleted",
            "data": { "object": {
                "id": "sub_1",
                "status": "canceled",
                "ended_at": 1_700_000_000,
                "current_period_end": 1_700_000_000
            }}
        });
        let parsed = parse_event(payload.to_string().as_bytes()).unwrap();
        assert_eq!(parsed.id, "evt_1");
        match parsed.event {
            WebhookEvent::SubscriptionDeleted(subscription) => {
                assert_eq!(subscription.id, "sub_1");
                assert_eq!(subscription.status, ProviderStatus::Canceled);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_parse_invoice_with_parent_details() {
        let payload = serde_json::json!({
            "id": "evt_2",
            "type": "invoice.paid",
            "data": { "object": {
                "id": "in_1",
                "customer": "cus_1",
                "amount_paid": 4900,
                "amount_due": 4900,
                "currency": "usd",
                "parent": { "subscription_details": {
                    "subscription": "sub_9",
                    "metadata": { "userId": "u1", "productId": "p1" }
                }},
                "lines": { "data": [ { "period": { "start": 1_690_000_000, "end": 1_700_000_000 } } ] }
            }}
        });
        let parsed = parse_event(payload.to_string().as_bytes()).unwrap();
        match parsed.event {
            WebhookEvent::InvoicePaid(invoice) => {
                assert_eq!(invoice.subscription_id.as_deref(), Some("sub_9"));
                assert_eq!(invoice.amount_paid, 4900);
                assert_eq!(invoice.metadata.get("productId").map(String::as_str), Some("p1"));
                assert_eq!(invoice.period_end.map(|d| d.timestamp()), Some(1_700_000_000));
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_parse_unhandled_event() {
        let payload = br#"{"id":"evt_3","type":"customer.created","data":{"object":{}}}"#;
        let parsed = parse_event(payload).unwrap();
        assert_eq!(parsed.event, WebhookEvent::Ignored);
        assert_eq!(parsed.event_type, "customer.created");
    }
}
