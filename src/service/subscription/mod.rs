mod access;
mod error;
mod model;
mod store;

pub use access::{current_entry, effective_status, evaluate_subscription_access, grants_access, has_had_previous_trial};
pub use error::SubscriptionError;
pub use model::*;
pub use store::SubscriptionStore;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::{
    config::StripeConfig,
    service::{
        auth::{User, UserStore},
        email::EmailService,
        license::LicenseService,
        payment::{
            parse_event, verify_webhook_signature, Invoice, NewSubscription, PaymentProvider,
            PaymentRecord, PaymentStore, ProviderStatus, ProviderSubscription, WebhookEvent,
        },
        product::{Product, ProductService, SubscriptionType},
    },
    storage::StorageManager,
};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrialEligibility {
    pub product_id: String,
    pub eligible: bool,
    pub trial_days: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WebhookOutcome {
    Processed,
    Duplicate,
    Ignored,
}

/// Per-user locks serializing read-modify-write cycles on the subscription array.
type UserLocks = Arc<DashMap<String, Arc<Mutex<()>>>>;

/// Holds a user's lock and drops the map entry once nobody else is waiting on it.
struct UserGuard {
    guard: Option<OwnedMutexGuard<()>>,
    locks: UserLocks,
    user_id: String,
}

impl Drop for UserGuard {
    fn drop(&mut self) {
        self.guard.take();
        self.locks
            .remove_if(&self.user_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}

#[derive(Clone)]
pub struct SubscriptionService {
    store: SubscriptionStore,
    users: UserStore,
    products: ProductService,
    payments: PaymentStore,
    provider: Arc<dyn PaymentProvider>,
    licenses: LicenseService,
    email: EmailService,
    stripe: StripeConfig,
    locks: UserLocks,
}

impl SubscriptionService {
    pub fn new(
        storage: &StorageManager,
        provider: Arc<dyn PaymentProvider>,
        licenses: LicenseService,
        email: EmailService,
        stripe: StripeConfig,
    ) -> Self {
        let db = storage.turso().clone();
        Self {
            store: SubscriptionStore::new(db.clone()),
            users: UserStore::new(db.clone()),
            products: ProductService::new(db.clone()),
            payments: PaymentStore::new(db),
            provider,
            licenses,
            email,
            stripe,
            locks: Arc::new(DashMap::new()),
        }
    }

    async fn lock_user(&self, user_id: &str) -> UserGuard {
        let lock = self.locks.entry(user_id.to_string()).or_default().clone();
        UserGuard {
            guard: Some(lock.lock_owned().await),
            locks: Arc::clone(&self.locks),
            user_id: user_id.to_string(),
        }
    }

    /// Cancels a remote subscription whose local entry could not be persisted,
    /// so Stripe never bills for something the user cannot see.
    async fn abandon_remote(&self, user_id: &str, stripe_subscription_id: &str) {
        warn!(
            "Cancelling Stripe subscription {} for user {} after a local failure",
            stripe_subscription_id, user_id
        );
        if let Err(e) = self.provider.cancel_subscription(stripe_subscription_id).await {
            error!("Failed to cancel orphaned subscription {}: {}", stripe_subscription_id, e);
        }
    }

    pub async fn list(&self, user_id: &str) -> Result<Vec<SubscriptionView>, SubscriptionError> {
        let now = Utc::now();
        let entries = self.store.load(user_id).await?;
        Ok(entries.into_iter().map(|entry| view(entry, now)).collect())
    }

    pub async fn access(&self, user_id: &str) -> Result<AccessSummary, SubscriptionError> {
        let entries = self.store.load(user_id).await?;
        Ok(evaluate_subscription_access(&entries, Utc::now()))
    }

    pub async fn trial_eligibility(
        &self,
        user_id: &str,
        product_id: &str,
    ) -> Result<TrialEligibility, SubscriptionError> {
        let product = self.product(product_id).await?;
        let entries = self.store.load(user_id).await?;

        Ok(TrialEligibility {
            product_id: product.id.clone(),
            eligible: product.trial_days > 0 && !has_had_previous_trial(&entries, &product.id),
            trial_days: product.trial_days,
        })
    }

    /// Subscribes the user to a product, with a trial when the product offers one
    /// and the user has never trialed it.
    pub async fn create(
        &self,
        user_id: &str,
        request: CreateSubscriptionRequest,
    ) -> Result<SubscriptionView, SubscriptionError> {
        let product = self.product(&request.product_id).await?;
        if product.stripe_price(request.subscription_type).is_none() {
            return Err(SubscriptionError::UnsupportedSubscriptionType(request.subscription_type));
        }
        let user = self.user(user_id).await?;

        let _guard = self.lock_user(user_id).await;
        let mut entries = self.store.load(user_id).await?;
        let now = Utc::now();

        if current_entry(&entries, &product.id, now).is_some() {
            return Err(SubscriptionError::AlreadySubscribed);
        }

        let entry = self
            .start_subscription(
                &user,
                &product,
                request.subscription_type,
                request.payment_method_id.as_deref(),
                true,
                &entries,
                now,
            )
            .await?;
        entries.push(entry.clone());
        if let Err(e) = self.store.save(user_id, &entries).await {
            if let Some(stripe_id) = entry.stripe_subscription_id.as_deref() {
                self.abandon_remote(user_id, stripe_id).await;
            }
            return Err(e.into());
        }

        self.notify_started(&user, &product, &entry).await;
        Ok(view(entry, now))
    }

    /// Moves a user from a lower tier product to a higher tier one. The new
    /// subscription never gets a trial; the old one is cancelled immediately.
    pub async fn upgrade(&self, user_id: &str, request: UpgradeRequest) -> Result<SubscriptionView, SubscriptionError> {
        if request.from_product_id == request.to_product_id {
            return Err(SubscriptionError::NotUpgradeable(
                "source and target product are the same".into(),
            ));
        }

        let from_product = self.product(&request.from_product_id).await?;
        let to_product = self.product(&request.to_product_id).await?;
        if to_product.tier <= from_product.tier {
            return Err(SubscriptionError::NotUpgradeable(format!(
                "{} is not a higher tier than {}",
                to_product.name, from_product.name
            )));
        }
        if to_product.stripe_price(request.subscription_type).is_none() {
            return Err(SubscriptionError::UnsupportedSubscriptionType(request.subscription_type));
        }
        if request.payment_method_id.is_none() {
            return Err(SubscriptionError::PaymentMethodRequired);
        }
        let user = self.user(user_id).await?;

        let _guard = self.lock_user(user_id).await;
        let mut entries = self.store.load(user_id).await?;
        let now = Utc::now();

        let from_index = entries
            .iter()
            .rposition(|entry| {
                entry.product_id == from_product.id
                    && matches!(
                        entry.subscription_status,
                        SubscriptionStatus::Trial | SubscriptionStatus::Active
                    )
                    && grants_access(entry, now)
            })
            .ok_or_else(|| SubscriptionError::NotFound(from_product.id.clone()))?;

        if current_entry(&entries, &to_product.id, now).is_some() {
            return Err(SubscriptionError::AlreadySubscribed);
        }

        let new_entry = self
            .start_subscription(
                &user,
                &to_product,
                request.subscription_type,
                request.payment_method_id.as_deref(),
                false,
                &entries,
                now,
            )
            .await?;

        let old = &mut entries[from_index];
        let previous_status = old.subscription_status;
        let old_stripe_id = old.stripe_subscription_id.clone();
        old.subscription_status = SubscriptionStatus::Cancelled;
        old.auto_renewal = false;
        old.expires_at = Some(now);
        if old.trial_expires_at.is_some_and(|end| end > now) {
            old.trial_expires_at = Some(now);
        }
        old.updated_at = Some(now);

        let mut record = PaymentRecord::new(user_id, "subscription_upgraded", "cancelled");
        record.product_id = Some(from_product.id.clone());
        record.stripe_subscription_id = old_stripe_id.clone();

        entries.push(new_entry.clone());
        let persisted = match self.payments.record(&record).await {
            Ok(()) => self.store.save(user_id, &entries).await,
            failed => failed,
        };
        if let Err(e) = persisted {
            if let Some(stripe_id) = new_entry.stripe_subscription_id.as_deref() {
                self.abandon_remote(user_id, stripe_id).await;
            }
            return Err(e.into());
        }

        if let Some(stripe_id) = old_stripe_id.as_deref() {
            if let Err(e) = self.provider.cancel_subscription(stripe_id).await {
                error!(
                    "Upgraded user {} but failed to cancel {} subscription {}: {}",
                    user_id, from_product.id, stripe_id, e
                );
            }
        }
        info!(
            "User {} upgraded from {} ({:?}) to {}",
            user_id, from_product.id, previous_status, to_product.id
        );

        self.notify_started(&user, &to_product, &new_entry).await;
        Ok(view(new_entry, now))
    }

    /// Stops renewal at the end of the current period. Access is kept until then.
    pub async fn cancel(&self, user_id: &str, product_id: &str) -> Result<SubscriptionView, SubscriptionError> {
        let user = self.user(user_id).await?;
        let _guard = self.lock_user(user_id).await;
        let mut entries = self.store.load(user_id).await?;
        let now = Utc::now();

        let index = current_index(&entries, product_id, now)
            .ok_or_else(|| SubscriptionError::NotFound(product_id.to_string()))?;

        if !entries[index].auto_renewal {
            return Ok(view(entries[index].clone(), now));
        }

        let entry = &mut entries[index];
        if let Some(stripe_id) = entry.stripe_subscription_id.as_deref() {
            let remote = self.provider.set_cancel_at_period_end(stripe_id, true).await?;
            if let Some(end) = remote.current_period_end {
                entry.expires_at = Some(end);
            }
        }
        entry.auto_renewal = false;
        entry.updated_at = Some(now);
        let entry = entry.clone();

        let mut record = PaymentRecord::new(user_id, "cancel_requested", "pending_cancellation");
        record.product_id = Some(entry.product_id.clone());
        record.stripe_subscription_id = entry.stripe_subscription_id.clone();
        self.payments.record(&record).await?;
        self.store.save(user_id, &entries).await?;
        info!("User {} cancelled {} at period end", user_id, product_id);

        let access_until = access_end(&entry).map(|d| d.format("%Y-%m-%d").to_string()).unwrap_or_default();
        if let Err(e) = self
            .email
            .send_cancellation(&user.email, &entry.product_name, &access_until)
            .await
        {
            warn!("Failed to send cancellation email to {}: {}", user.email, e);
        }

        Ok(view(entry, now))
    }

    /// Undoes a pending cancellation before the period ends.
    pub async fn reactivate(&self, user_id: &str, product_id: &str) -> Result<SubscriptionView, SubscriptionError> {
        let _guard = self.lock_user(user_id).await;
        let mut entries = self.store.load(user_id).await?;
        let now = Utc::now();

        let index = current_index(&entries, product_id, now)
            .ok_or_else(|| SubscriptionError::NotFound(product_id.to_string()))?;

        let entry = &mut entries[index];
        if entry.auto_renewal {
            return Ok(view(entry.clone(), now));
        }

        if let Some(stripe_id) = entry.stripe_subscription_id.as_deref() {
            let remote = self.provider.set_cancel_at_period_end(stripe_id, false).await?;
            if let Some(end) = remote.current_period_end {
                entry.expires_at = Some(end);
            }
        }
        entry.auto_renewal = true;
        entry.updated_at = Some(now);
        let entry = entry.clone();

        self.store.save(user_id, &entries).await?;
        info!("User {} reactivated {}", user_id, product_id);
        Ok(view(entry, now))
    }

    /// Finds the owner and entry holding a licensee number.
    pub async fn find_by_licensee(
        &self,
        licensee_number: &str,
    ) -> Result<Option<(String, SubscriptionEntry)>, SubscriptionError> {
        let Some(user_id) = self.store.find_user_by_licensee(licensee_number).await? else {
            return Ok(None);
        };

        let entries = self.store.load(&user_id).await?;
        Ok(entries
            .into_iter()
            .rev()
            .find(|entry| entry.licensee_number.as_deref() == Some(licensee_number))
            .map(|entry| (user_id, entry)))
    }

    pub async fn payment_history(&self, user_id: &str) -> Result<Vec<PaymentRecord>, SubscriptionError> {
        Ok(self.payments.list_for_user(user_id).await?)
    }

    /// Verifies, deduplicates and applies a Stripe webhook to the local subscription state.
    pub async fn handle_webhook(&self, payload: &[u8], signature: &str) -> Result<WebhookOutcome, SubscriptionError> {
        verify_webhook_signature(
            payload,
            signature,
            &self.stripe.webhook_secret,
            self.stripe.webhook_tolerance_secs,
            Utc::now(),
        )?;
        let parsed = parse_event(payload)?;

        if self.payments.event_recorded(&parsed.id).await? {
            info!("Skipping duplicate webhook event {}", parsed.id);
            return Ok(WebhookOutcome::Duplicate);
        }

        debug!("Processing webhook event {} ({})", parsed.id, parsed.event_type);
        match parsed.event {
            WebhookEvent::SubscriptionChanged(subscription) => {
                self.sync_subscription(&parsed.id, &parsed.event_type, subscription, false)
                    .await
            }
            WebhookEvent::SubscriptionDeleted(subscription) => {
                self.sync_subscription(&parsed.id, &parsed.event_type, subscription, true)
                    .await
            }
            WebhookEvent::InvoicePaid(invoice) => self.apply_invoice(&parsed.id, &parsed.event_type, invoice, true).await,
            WebhookEvent::InvoicePaymentFailed(invoice) => {
                self.apply_invoice(&parsed.id, &parsed.event_type, invoice, false)
                    .await
            }
            WebhookEvent::Ignored => {
                debug!("Ignoring webhook event type {}", parsed.event_type);
                Ok(WebhookOutcome::Ignored)
            }
        }
    }

    async fn sync_subscription(
        &self,
        event_id: &str,
        event_type: &str,
        subscription: ProviderSubscription,
        deleted: bool,
    ) -> Result<WebhookOutcome, SubscriptionError> {
        let Some(user_id) = self
            .resolve_user(subscription.metadata.get("userId"), Some(&subscription.id))
            .await?
        else {
            warn!("No user found for Stripe subscription {}", subscription.id);
            return Ok(WebhookOutcome::Ignored);
        };

        let _guard = self.lock_user(&user_id).await;
        let mut entries = self.store.load(&user_id).await?;
        let Some(entry) = entries
            .iter_mut()
            .rev()
            .find(|entry| entry.stripe_subscription_id.as_deref() == Some(subscription.id.as_str()))
        else {
            warn!("User {} has no entry for Stripe subscription {}", user_id, subscription.id);
            return Ok(WebhookOutcome::Ignored);
        };

        let now = Utc::now();
        if deleted {
            let ended = subscription
                .ended_at
                .or(subscription.current_period_end)
                .unwrap_or(now);
            entry.subscription_status = SubscriptionStatus::Cancelled;
            entry.auto_renewal = false;
            entry.expires_at = Some(entry.expires_at.map_or(ended, |end| end.min(ended)));
            if let Some(trial_end) = entry.trial_expires_at {
                entry.trial_expires_at = Some(trial_end.min(ended));
            }
        } else {
            apply_remote_state(entry, &subscription);
        }
        entry.updated_at = Some(now);

        let mut record = PaymentRecord::new(&user_id, event_type, subscription.status.as_str());
        record.product_id = Some(entry.product_id.clone());
        record.stripe_event_id = Some(event_id.to_string());
        record.stripe_subscription_id = Some(subscription.id.clone());

        self.store.save(&user_id, &entries).await?;
        self.payments.record(&record).await?;
        Ok(WebhookOutcome::Processed)
    }

    async fn apply_invoice(
        &self,
        event_id: &str,
        event_type: &str,
        invoice: Invoice,
        paid: bool,
    ) -> Result<WebhookOutcome, SubscriptionError> {
        let Some(user_id) = self
            .resolve_user(invoice.metadata.get("userId"), invoice.subscription_id.as_ref())
            .await?
        else {
            warn!("No user found for invoice {}", invoice.id);
            return Ok(WebhookOutcome::Ignored);
        };

        let _guard = self.lock_user(&user_id).await;
        let mut entries = self.store.load(&user_id).await?;
        let now = Utc::now();

        let mut product_id = invoice.metadata.get("productId").cloned();
        if let Some(entry) = invoice.subscription_id.as_deref().and_then(|id| {
            entries
                .iter_mut()
                .rev()
                .find(|entry| entry.stripe_subscription_id.as_deref() == Some(id))
        }) {
            product_id = Some(entry.product_id.clone());
            if paid && invoice.amount_paid > 0 {
                if entry.subscription_status == SubscriptionStatus::Trial {
                    info!("Trial converted to paid for user {} on {}", user_id, entry.product_id);
                    entry.subscription_status = SubscriptionStatus::Active;
                }
                if entry.subscription_status == SubscriptionStatus::Expired {
                    entry.subscription_status = SubscriptionStatus::Active;
                }
                if let Some(period_end) = invoice.period_end {
                    entry.expires_at = Some(period_end);
                }
                entry.updated_at = Some(now);
            }
        }

        let (status, amount) = if paid {
            ("succeeded", invoice.amount_paid)
        } else {
            ("failed", invoice.amount_due)
        };
        let mut record = PaymentRecord::new(&user_id, event_type, status);
        record.product_id = product_id;
        record.stripe_event_id = Some(event_id.to_string());
        record.stripe_subscription_id = invoice.subscription_id.clone();
        record.amount_cents = amount;
        record.currency = invoice.currency.clone();

        self.store.save(&user_id, &entries).await?;
        self.payments.record(&record).await?;

        if !paid {
            warn!("Payment failed for user {} (invoice {})", user_id, invoice.id);
        }
        Ok(WebhookOutcome::Processed)
    }

    async fn resolve_user(
        &self,
        metadata_user: Option<&String>,
        stripe_subscription_id: Option<&String>,
    ) -> Result<Option<String>, SubscriptionError> {
        if let Some(user_id) = metadata_user {
            if self.users.find_by_id(user_id).await?.is_some() {
                return Ok(Some(user_id.clone()));
            }
        }
        match stripe_subscription_id {
            Some(id) => Ok(self.store.find_user_by_stripe_subscription(id).await?),
            None => Ok(None),
        }
    }

    /// Creates the remote subscription and builds the local entry. The license
    /// is minted on a best-effort basis; a licensing outage never blocks billing.
    #[allow(clippy::too_many_arguments)]
    async fn start_subscription(
        &self,
        user: &User,
        product: &Product,
        subscription_type: SubscriptionType,
        payment_method_id: Option<&str>,
        allow_trial: bool,
        entries: &[SubscriptionEntry],
        now: DateTime<Utc>,
    ) -> Result<SubscriptionEntry, SubscriptionError> {
        let price_id = product
            .stripe_price(subscription_type)
            .ok_or(SubscriptionError::UnsupportedSubscriptionType(subscription_type))?;

        let trial_days = (allow_trial && product.trial_days > 0 && !has_had_previous_trial(entries, &product.id))
            .then_some(product.trial_days);
        if trial_days.is_none() && payment_method_id.is_none() {
            return Err(SubscriptionError::PaymentMethodRequired);
        }

        let customer_id = self.ensure_customer(user).await?;
        if let Some(payment_method_id) = payment_method_id {
            self.provider
                .attach_payment_method(&customer_id, payment_method_id)
                .await?;
        }

        let remote = self
            .provider
            .create_subscription(&NewSubscription {
                customer_id,
                price_id: price_id.to_string(),
                payment_method_id: payment_method_id.map(str::to_string),
                trial_days,
                user_id: user.id.clone(),
                product_id: product.id.clone(),
                subscription_type,
            })
            .await?;

        if !remote.status.is_usable() {
            warn!(
                "Stripe subscription {} for user {} came back {:?}, cancelling",
                remote.id, user.id, remote.status
            );
            if let Err(e) = self.provider.cancel_subscription(&remote.id).await {
                error!("Failed to cancel unusable subscription {}: {}", remote.id, e);
            }
            return Err(SubscriptionError::PaymentIncomplete(format!(
                "subscription status is {:?}",
                remote.status
            )));
        }

        let license = match self.licenses.issue(product, subscription_type, &user.id).await {
            Ok(license) => Some(license),
            Err(e) => {
                warn!(
                    "License issuance failed for user {} on {}, continuing without license: {}",
                    user.id, product.id, e
                );
                None
            }
        };

        let is_trial = trial_days.is_some() && remote.status == ProviderStatus::Trialing;
        let trial_expires_at = if is_trial {
            remote
                .trial_end
                .or_else(|| trial_days.map(|days| now + Duration::days(days)))
        } else {
            None
        };

        let entry = SubscriptionEntry {
            product_id: product.id.clone(),
            product_name: product.name.clone(),
            tier: product.tier,
            stripe_subscription_id: Some(remote.id.clone()),
            subscription_status: if is_trial {
                SubscriptionStatus::Trial
            } else {
                SubscriptionStatus::Active
            },
            subscription_type,
            trial_started_at: is_trial.then(|| remote.trial_start.unwrap_or(now)),
            trial_expires_at,
            started_at: now,
            expires_at: remote
                .current_period_end
                .or(trial_expires_at)
                .or_else(|| Some(now + billing_interval(subscription_type))),
            licensee_number: license.as_ref().map(|l| l.licensee_number.clone()),
            license_number: license.map(|l| l.license_number),
            auto_renewal: !remote.cancel_at_period_end,
            updated_at: Some(now),
        };

        let mut record = if is_trial {
            PaymentRecord::new(&user.id, "trial_started", "trialing")
        } else {
            let mut record = PaymentRecord::new(&user.id, "subscription_created", "succeeded");
            record.amount_cents = product.price_cents(subscription_type).unwrap_or_default();
            record
        };
        record.product_id = Some(product.id.clone());
        record.stripe_subscription_id = Some(remote.id.clone());
        if let Err(e) = self.payments.record(&record).await {
            self.abandon_remote(&user.id, &remote.id).await;
            return Err(e.into());
        }

        info!(
            "User {} subscribed to {} ({}, {:?})",
            user.id, product.id, subscription_type, entry.subscription_status
        );
        Ok(entry)
    }

    async fn ensure_customer(&self, user: &User) -> Result<String, SubscriptionError> {
        if let Some(customer_id) = &user.stripe_customer_id {
            return Ok(customer_id.clone());
        }

        let customer_id = self.provider.create_customer(&user.email, &user.id).await?;
        self.users.set_stripe_customer_id(&user.id, &customer_id).await?;
        Ok(customer_id)
    }

    async fn notify_started(&self, user: &User, product: &Product, entry: &SubscriptionEntry) {
        let trial_days = (entry.subscription_status == SubscriptionStatus::Trial).then_some(product.trial_days);
        if let Err(e) = self
            .email
            .send_subscription_started(&user.email, &product.name, trial_days, entry.license_number.as_deref())
            .await
        {
            warn!("Failed to send subscription email to {}: {}", user.email, e);
        }
    }

    async fn product(&self, product_id: &str) -> Result<Product, SubscriptionError> {
        self.products
            .get(product_id)
            .await?
            .ok_or_else(|| SubscriptionError::ProductNotFound(product_id.to_string()))
    }

    async fn user(&self, user_id: &str) -> Result<User, SubscriptionError> {
        self.users.find_by_id(user_id).await?.ok_or(SubscriptionError::UserNotFound)
    }
}

fn view(entry: SubscriptionEntry, now: DateTime<Utc>) -> SubscriptionView {
    SubscriptionView {
        effective_status: effective_status(&entry, now),
        has_access: grants_access(&entry, now),
        entry,
    }
}

fn current_index(entries: &[SubscriptionEntry], product_id: &str, now: DateTime<Utc>) -> Option<usize> {
    entries.iter().rposition(|entry| {
        entry.product_id == product_id
            && matches!(
                entry.subscription_status,
                SubscriptionStatus::Trial | SubscriptionStatus::Active
            )
            && grants_access(entry, now)
    })
}

fn access_end(entry: &SubscriptionEntry) -> Option<DateTime<Utc>> {
    match entry.subscription_status {
        SubscriptionStatus::Trial => entry.trial_expires_at,
        _ => entry.expires_at,
    }
}

fn billing_interval(subscription_type: SubscriptionType) -> Duration {
    match subscription_type {
        SubscriptionType::Monthly => Duration::days(30),
        SubscriptionType::Annual => Duration::days(365),
    }
}

/// Mirrors Stripe's view of a live subscription onto the local entry.
fn apply_remote_state(entry: &mut SubscriptionEntry, remote: &ProviderSubscription) {
    // Cancellation is terminal: events arrive out of order, so a late update
    // must not move dates or renewal on an entry that is already cancelled.
    if entry.subscription_status == SubscriptionStatus::Cancelled {
        return;
    }

    entry.subscription_status = match remote.status {
        ProviderStatus::Trialing => SubscriptionStatus::Trial,
        ProviderStatus::Active => SubscriptionStatus::Active,
        ProviderStatus::Canceled => SubscriptionStatus::Cancelled,
        ProviderStatus::Unpaid | ProviderStatus::IncompleteExpired => SubscriptionStatus::Expired,
        ProviderStatus::PastDue | ProviderStatus::Incomplete | ProviderStatus::Paused | ProviderStatus::Unknown => {
            entry.subscription_status
        }
    };

    if let Some(end) = remote.current_period_end {
        entry.expires_at = Some(end);
    }
    if let Some(trial_end) = remote.trial_end {
        entry.trial_expires_at = Some(trial_end);
    }
    entry.auto_renewal = !remote.cancel_at_period_end;
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::{
        service::product::Tier,
        utils::test::{register_user, setup_test_state, BASIC_PRODUCT, PREMIUM_PRODUCT},
    };

    fn remote(status: ProviderStatus) -> ProviderSubscription {
        ProviderSubscription {
            id: "sub_1".into(),
            customer_id: Some("cus_1".into()),
            status,
            current_period_start: None,
            current_period_end: Some(Utc::now() + Duration::days(30)),
            trial_start: None,
            trial_end: None,
            cancel_at_period_end: false,
            ended_at: None,
            metadata: HashMap::new(),
        }
    }

    fn local(status: SubscriptionStatus) -> SubscriptionEntry {
        SubscriptionEntry {
            product_id: "basic".into(),
            product_name: "Basic".into(),
            tier: Tier::Basic,
            stripe_subscription_id: Some("sub_1".into()),
            subscription_status: status,
            subscription_type: SubscriptionType::Monthly,
            trial_started_at: None,
            trial_expires_at: None,
            started_at: Utc::now(),
            expires_at: None,
            licensee_number: None,
            license_number: None,
            auto_renewal: true,
            updated_at: None,
        }
    }

    #[test]
    fn test_remote_active_promotes_trial() {
        let mut entry = local(SubscriptionStatus::Trial);
        apply_remote_state(&mut entry, &remote(ProviderStatus::Active));
        assert_eq!(entry.subscription_status, SubscriptionStatus::Active);
        assert!(entry.expires_at.is_some());
    }

    #[test]
    fn test_remote_past_due_keeps_status() {
        let mut entry = local(SubscriptionStatus::Active);
        apply_remote_state(&mut entry, &remote(ProviderStatus::PastDue));
        assert_eq!(entry.subscription_status, SubscriptionStatus::Active);
    }

    #[test]
    fn test_remote_unpaid_expires() {
        let mut entry = local(SubscriptionStatus::Active);
        apply_remote_state(&mut entry, &remote(ProviderStatus::Unpaid));
        assert_eq!(entry.subscription_status, SubscriptionStatus::Expired);
    }

    #[test]
    fn test_locally_cancelled_is_not_revived() {
        let mut entry = local(SubscriptionStatus::Cancelled);
        apply_remote_state(&mut entry, &remote(ProviderStatus::Active));
        assert_eq!(entry.subscription_status, SubscriptionStatus::Cancelled);
    }

    #[test]
    fn test_late_update_keeps_cancelled_entry_closed() {
        let now = Utc::now();
        let mut entry = local(SubscriptionStatus::Cancelled);
        entry.auto_renewal = false;
        entry.expires_at = Some(now - Duration::seconds(1));
        entry.trial_expires_at = Some(now - Duration::seconds(1));

        let mut late = remote(ProviderStatus::Active);
        late.current_period_end = Some(now + Duration::days(27));
        late.trial_end = Some(now + Duration::days(7));
        apply_remote_state(&mut entry, &late);

        assert_eq!(entry.subscription_status, SubscriptionStatus::Cancelled);
        assert_eq!(entry.expires_at, Some(now - Duration::seconds(1)));
        assert_eq!(entry.trial_expires_at, Some(now - Duration::seconds(1)));
        assert!(!entry.auto_renewal);
        assert!(!grants_access(&entry, now));
    }

    #[test]
    fn test_cancel_at_period_end_mirrors_auto_renewal() {
        let mut entry = local(SubscriptionStatus::Active);
        let mut cancelled = remote(ProviderStatus::Active);
        cancelled.cancel_at_period_end = true;
        apply_remote_state(&mut entry, &cancelled);
        assert!(!entry.auto_renewal);
        assert_eq!(entry.subscription_status, SubscriptionStatus::Active);
    }

    #[tokio::test]
    async fn test_user_locks_are_released() {
        let ctx = setup_test_state().await;
        let (user_id, _) = register_user(&ctx.state, "trader@example.com").await;
        let service = &ctx.state.services.subscriptions;

        let request = |product_id: &str| CreateSubscriptionRequest {
            product_id: product_id.to_string(),
            subscription_type: SubscriptionType::Monthly,
            payment_method_id: None,
        };
        let (basic, premium) = tokio::join!(
            service.create(&user_id, request(BASIC_PRODUCT)),
            service.create(&user_id, request(PREMIUM_PRODUCT)),
        );
        basic.unwrap();
        premium.unwrap();

        assert!(service.locks.is_empty());
    }
}
