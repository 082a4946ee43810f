use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::service::product::{SubscriptionType, Tier};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    Trial,
    Active,
    Cancelled,
    Expired,
}

/// One element of the per-user JSON subscription array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionEntry {
    pub product_id: String,
    #[serde(default)]
    pub product_name: String,
    pub tier: Tier,
    #[serde(default)]
    pub stripe_subscription_id: Option<String>,
    pub subscription_status: SubscriptionStatus,
    pub subscription_type: SubscriptionType,
    #[serde(default)]
    pub trial_started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub trial_expires_at: Option<DateTime<Utc>>,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub licensee_number: Option<String>,
    #[serde(default)]
    pub license_number: Option<String>,
    #[serde(default = "default_auto_renewal")]
    pub auto_renewal: bool,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

fn default_auto_renewal() -> bool {
    true
}

/// An entry as returned to clients, with its status evaluated against the current time.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionView {
    #[serde(flatten)]
    pub entry: SubscriptionEntry,
    pub effective_status: SubscriptionStatus,
    pub has_access: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessSummary {
    pub has_basic_access: bool,
    pub has_premium_access: bool,
}

impl AccessSummary {
    pub fn allows(&self, tier: Tier) -> bool {
        match tier {
            Tier::Basic => self.has_basic_access,
            Tier::Premium => self.has_premium_access,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSubscriptionRequest {
    pub product_id: String,
    pub subscription_type: SubscriptionType,
    #[serde(default)]
    pub payment_method_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpgradeRequest {
    pub from_product_id: String,
    pub to_product_id: String,
    pub subscription_type: SubscriptionType,
    #[serde(default)]
    pub payment_method_id: Option<String>,
}
