mod mailgun;

pub use mailgun::MailgunMailer;

use async_trait::async_trait;
use rust_i18n::t;
use std::{sync::Arc, time::Duration};

use crate::config::ServerConfig;

#[derive(Debug, thiserror::Error)]
pub enum EmailError {
    #[error("Mail API error: {0}")]
    Api(String),
}

impl From<reqwest::Error> for EmailError {
    fn from(error: reqwest::Error) -> Self {
        EmailError::Api(error.to_string())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub text: String,
    pub reply_to: Option<String>,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<(), EmailError>;
}

/// Builds the transactional emails and hands them to a [`Mailer`].
#[derive(Clone)]
pub struct EmailService {
    mailer: Arc<dyn Mailer>,
    frontend_url: String,
    support_email: String,
}

impl EmailService {
    pub fn new(mailer: Arc<dyn Mailer>, server: &ServerConfig) -> Self {
        Self {
            mailer,
            frontend_url: server.frontend_url.trim_end_matches('/').to_string(),
            support_email: server.support_email.clone(),
        }
    }

    pub async fn send_verification(&self, to: &str, name: &str, token: &str) -> Result<(), EmailError> {
        let link = format!("{}/verify-email?token={}", self.frontend_url, token);
        self.deliver(EmailMessage {
            to: to.to_string(),
            subject: t!("email.verify.subject").to_string(),
            text: t!("email.verify.body", name = name, link = link).to_string(),
            reply_to: None,
        })
        .await
    }

    pub async fn send_password_reset(
        &self,
        to: &str,
        name: &str,
        token: &str,
        valid_for: Duration,
    ) -> Result<(), EmailError> {
        let link = format!("{}/reset-password?token={}", self.frontend_url, token);
        let minutes = valid_for.as_secs().div_ceil(60).max(1);
        self.deliver(EmailMessage {
            to: to.to_string(),
            subject: t!("email.reset.subject").to_string(),
            text: t!("email.reset.body", name = name, link = link, minutes = minutes).to_string(),
            reply_to: None,
        })
        .await
    }

    pub async fn send_subscription_started(
        &self,
        to: &str,
        product: &str,
        trial_days: Option<i64>,
        license_number: Option<&str>,
    ) -> Result<(), EmailError> {
        let mut text = match trial_days {
            Some(days) => t!("email.subscription.trial_body", product = product, days = days).to_string(),
            None => t!("email.subscription.active_body", product = product).to_string(),
        };
        if let Some(license) = license_number {
            text.push_str("\n\n");
            text.push_str(&t!("email.subscription.license_line", license = license));
        }

        self.deliver(EmailMessage {
            to: to.to_string(),
            subject: t!("email.subscription.subject", product = product).to_string(),
            text,
            reply_to: None,
        })
        .await
    }

    pub async fn send_cancellation(&self, to: &str, product: &str, access_until: &str) -> Result<(), EmailError> {
        self.deliver(EmailMessage {
            to: to.to_string(),
            subject: t!("email.cancel.subject", product = product).to_string(),
            text: t!("email.cancel.body", product = product, date = access_until).to_string(),
            reply_to: None,
        })
        .await
    }

    pub async fn send_contact_request(&self, name: &str, email: &str, message: &str) -> Result<(), EmailError> {
        self.deliver(EmailMessage {
            to: self.support_email.clone(),
            subject: t!("email.contact.subject", name = name).to_string(),
            text: t!("email.contact.body", name = name, email = email, message = message).to_string(),
            reply_to: Some(email.to_string()),
        })
        .await
    }

    async fn deliver(&self, message: EmailMessage) -> Result<(), EmailError> {
        debug!("Sending '{}' to {}", message.subject, message.to);
        self.mailer.send(&message).await
    }
}
