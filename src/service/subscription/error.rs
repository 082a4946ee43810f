use crate::{
    service::{payment::PaymentError, product::SubscriptionType},
    storage::StorageError,
};

#[derive(Debug, thiserror::Error)]
pub enum SubscriptionError {
    #[error("Product not found: {0}")]
    ProductNotFound(String),
    #[error("User not found")]
    UserNotFound,
    #[error("Product does not offer a {0} subscription")]
    UnsupportedSubscriptionType(SubscriptionType),
    #[error("You already have an active subscription for this product")]
    AlreadySubscribed,
    #[error("A payment method is required")]
    PaymentMethodRequired,
    #[error("No active subscription for product {0}")]
    NotFound(String),
    #[error("Subscription cannot be upgraded: {0}")]
    NotUpgradeable(String),
    #[error("Payment could not be completed: {0}")]
    PaymentIncomplete(String),
    #[error("Payment error: {0}")]
    Payment(#[from] PaymentError),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}
