use std::{collections::BTreeMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// Access level a product grants. Premium implies basic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Basic = 1,
    Premium = 2,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::Basic => write!(f, "basic"),
            Tier::Premium => write!(f, "premium"),
        }
    }
}

impl FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "basic" => Ok(Tier::Basic),
            "premium" => Ok(Tier::Premium),
            other => Err(format!("Unknown tier: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionType {
    Monthly,
    Annual,
}

impl fmt::Display for SubscriptionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubscriptionType::Monthly => write!(f, "monthly"),
            SubscriptionType::Annual => write!(f, "annual"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: String,
    /// NetLicensing product number.
    pub template_id: String,
    pub name: String,
    pub tier: Tier,
    pub trial_days: i64,
    /// Price in cents per billing interval.
    pub subscription_types: BTreeMap<SubscriptionType, i64>,
    #[serde(skip_serializing)]
    pub stripe_prices: BTreeMap<SubscriptionType, String>,
    /// License template number per billing interval.
    #[serde(skip_serializing)]
    pub product_license_template: BTreeMap<SubscriptionType, String>,
}

impl Product {
    pub fn price_cents(&self, subscription_type: SubscriptionType) -> Option<i64> {
        self.subscription_types.get(&subscription_type).copied()
    }

    pub fn stripe_price(&self, subscription_type: SubscriptionType) -> Option<&str> {
        self.stripe_prices.get(&subscription_type).map(String::as_str)
    }

    pub fn license_template(&self, subscription_type: SubscriptionType) -> Option<&str> {
        self.product_license_template.get(&subscription_type).map(String::as_str)
    }
}
