use async_trait::async_trait;
use reqwest::Client;

use super::{EmailError, EmailMessage, Mailer};
use crate::config::MailgunConfig;

const API_BASE_URL: &str = "https://api.mailgun.net/v3";

pub struct MailgunMailer {
    client: Client,
    config: MailgunConfig,
}

impl MailgunMailer {
    pub fn new(client: Client, config: MailgunConfig) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl Mailer for MailgunMailer {
    async fn send(&self, message: &EmailMessage) -> Result<(), EmailError> {
        let mut form = vec![
            ("from", self.config.from.as_str()),
            ("to", message.to.as_str()),
            ("subject", message.subject.as_str()),
            ("text", message.text.as_str()),
        ];
        if let Some(reply_to) = &message.reply_to {
            form.push(("h:Reply-To", reply_to.as_str()));
        }

        let response = self
            .client
            .post(format!("{}/{}/messages", API_BASE_URL, self.config.domain))
            .basic_auth("api", Some(&self.config.api_key))
            .form(&form)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EmailError::Api(format!("Mailgun returned {}: {}", status, body)));
        }

        Ok(())
    }
}
