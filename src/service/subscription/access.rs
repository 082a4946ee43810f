use chrono::{DateTime, Utc};

use super::{AccessSummary, SubscriptionEntry, SubscriptionStatus};
use crate::service::product::Tier;

/// Whether the entry currently grants access to its tier.
pub fn grants_access(entry: &SubscriptionEntry, now: DateTime<Utc>) -> bool {
    match entry.subscription_status {
        SubscriptionStatus::Trial => entry.trial_expires_at.is_some_and(|end| end > now),
        SubscriptionStatus::Active | SubscriptionStatus::Cancelled => entry.expires_at.is_some_and(|end| end > now),
        SubscriptionStatus::Expired => false,
    }
}

/// Stored status, downgraded to `Expired` once the relevant date has passed.
pub fn effective_status(entry: &SubscriptionEntry, now: DateTime<Utc>) -> SubscriptionStatus {
    match entry.subscription_status {
        SubscriptionStatus::Trial | SubscriptionStatus::Active | SubscriptionStatus::Cancelled
            if !grants_access(entry, now) =>
        {
            SubscriptionStatus::Expired
        }
        status => status,
    }
}

/// Premium access implies basic access.
pub fn evaluate_subscription_access(entries: &[SubscriptionEntry], now: DateTime<Utc>) -> AccessSummary {
    let mut summary = AccessSummary::default();

    for entry in entries.iter().filter(|entry| grants_access(entry, now)) {
        match entry.tier {
            Tier::Premium => {
                summary.has_premium_access = true;
                summary.has_basic_access = true;
            }
            Tier::Basic => summary.has_basic_access = true,
        }
    }

    summary
}

/// A product may be trialed once: any earlier trial, cancelled or expired entry rules it out.
pub fn has_had_previous_trial(entries: &[SubscriptionEntry], product_id: &str) -> bool {
    entries.iter().any(|entry| {
        entry.product_id == product_id
            && matches!(
                entry.subscription_status,
                SubscriptionStatus::Trial | SubscriptionStatus::Cancelled | SubscriptionStatus::Expired
            )
    })
}

/// The live entry for a product: access granting and not already cancelled.
pub fn current_entry<'a>(
    entries: &'a [SubscriptionEntry],
    product_id: &str,
    now: DateTime<Utc>,
) -> Option<&'a SubscriptionEntry> {
    entries.iter().rev().find(|entry| {
        entry.product_id == product_id
            && matches!(
                entry.subscription_status,
                SubscriptionStatus::Trial | SubscriptionStatus::Active
            )
            && grants_access(entry, now)
    })
}
