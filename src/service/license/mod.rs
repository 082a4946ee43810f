mod netlicensing;

pub use netlicensing::NetLicensingProvider;

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

use crate::service::product::{Product, SubscriptionType};

#[derive(Debug, thiserror::Error)]
pub enum LicenseError {
    #[error("Licensing API error: {0}")]
    ApiError(String),
    #[error("No license template configured for {product} ({subscription_type})")]
    MissingTemplate {
        product: String,
        subscription_type: SubscriptionType,
    },
    #[error("Unexpected licensing response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for LicenseError {
    fn from(error: reqwest::Error) -> Self {
        LicenseError::ApiError(error.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedLicense {
    pub licensee_number: String,
    pub license_number: String,
}

#[async_trait]
pub trait LicensingProvider: Send + Sync {
    /// Creates a licensee under the given product number and returns its number.
    async fn create_licensee(&self, product_number: &str, user_ref: &str) -> Result<String, LicenseError>;
    /// Creates a license for a licensee from a license template and returns its number.
    async fn create_license(&self, licensee_number: &str, template_number: &str) -> Result<String, LicenseError>;
    async fn validate(&self, licensee_number: &str, product_number: &str) -> Result<bool, LicenseError>;
}

#[derive(Clone)]
pub struct LicenseService {
    provider: Arc<dyn LicensingProvider>,
}

impl LicenseService {
    pub fn new(provider: Arc<dyn LicensingProvider>) -> Self {
        Self { provider }
    }

    /// Mints a licensee and a license from the product's template for the billing interval.
    pub async fn issue(
        &self,
        product: &Product,
        subscription_type: SubscriptionType,
        user_id: &str,
    ) -> Result<IssuedLicense, LicenseError> {
        let template = product
            .license_template(subscription_type)
            .ok_or_else(|| LicenseError::MissingTemplate {
                product: product.id.clone(),
                subscription_type,
            })?;

        let licensee_number = self.provider.create_licensee(&product.template_id, user_id).await?;
        let license_number = self.provider.create_license(&licensee_number, template).await?;

        info!(
            "Issued license {} (licensee {}) for user {} on {}",
            license_number, licensee_number, user_id, product.id
        );

        Ok(IssuedLicense {
            licensee_number,
            license_number,
        })
    }

    pub async fn validate(&self, licensee_number: &str, product: &Product) -> Result<bool, LicenseError> {
        self.provider.validate(licensee_number, &product.template_id).await
    }
}
