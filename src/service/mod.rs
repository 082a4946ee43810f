use std::sync::Arc;

use crate::{config::AppConfig, storage::StorageManager, utils::http};

pub mod auth;
pub mod catalog;
pub mod content;
pub mod email;
pub mod license;
pub mod payment;
pub mod product;
pub mod subscription;

use auth::{AuthService, GoogleOAuthProvider, IdentityProvider};
use content::{ContentService, FileStore, GoogleDriveFileStore, MeetingProvider, ZoomMeetingProvider};
use email::{EmailService, MailgunMailer, Mailer};
use license::{LicenseService, LicensingProvider, NetLicensingProvider};
use payment::{PaymentProvider, StripePaymentProvider};
use product::ProductService;
use subscription::SubscriptionService;

/// Third-party integrations the services talk to.
#[derive(Clone)]
pub struct Providers {
    pub payments: Arc<dyn PaymentProvider>,
    pub licensing: Arc<dyn LicensingProvider>,
    pub mailer: Arc<dyn Mailer>,
    pub identity: Arc<dyn IdentityProvider>,
    pub meetings: Arc<dyn MeetingProvider>,
    pub files: Arc<dyn FileStore>,
}

impl Providers {
    pub fn from_config(config: &AppConfig) -> Result<Self, reqwest::Error> {
        let api_client = http::create_api_client()?;
        let download_client = http::create_download_client()?;

        Ok(Self {
            payments: Arc::new(StripePaymentProvider::new(api_client.clone(), config.stripe.clone())),
            licensing: Arc::new(NetLicensingProvider::new(api_client.clone(), config.licensing.clone())),
            mailer: Arc::new(MailgunMailer::new(api_client.clone(), config.mailgun.clone())),
            identity: Arc::new(GoogleOAuthProvider::new(api_client.clone(), config.google.clone())),
            meetings: Arc::new(ZoomMeetingProvider::new(api_client, config.zoom.clone())),
            files: Arc::new(GoogleDriveFileStore::new(download_client, config.drive.clone())),
        })
    }
}

#[derive(Clone)]
pub struct ServiceRegistry {
    pub auth: AuthService,
    pub products: ProductService,
    pub subscriptions: SubscriptionService,
    pub licenses: LicenseService,
    pub content: ContentService,
    pub email: EmailService,
}

impl ServiceRegistry {
    pub fn new(config: Arc<AppConfig>, storage: &StorageManager, providers: Providers) -> Self {
        info!("Initializing service registry");

        let email = EmailService::new(providers.mailer, &config.server);
        let licenses = LicenseService::new(providers.licensing);

        let registry = Self {
            auth: AuthService::new(storage.clone(), providers.identity, email.clone(), Arc::clone(&config)),
            products: ProductService::new(storage.turso().clone()),
            subscriptions: SubscriptionService::new(
                storage,
                providers.payments,
                licenses.clone(),
                email.clone(),
                config.stripe.clone(),
            ),
            licenses,
            content: ContentService::new(storage, providers.meetings, providers.files),
            email,
        };

        info!("Service registry initialized");
        registry
    }
}
