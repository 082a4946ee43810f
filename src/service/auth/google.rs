use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use url::Url;

use super::{AuthError, GoogleProfile};
use crate::config::GoogleConfig;

const AUTHORIZATION_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";
const USERINFO_ENDPOINT: &str = "https://www.googleapis.com/oauth2/v2/userinfo";

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    fn authorization_url(&self, redirect_uri: &str, state: &str) -> Result<String, AuthError>;
    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<GoogleProfile, AuthError>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

pub struct GoogleOAuthProvider {
    client: Client,
    config: GoogleConfig,
}

impl GoogleOAuthProvider {
    pub fn new(client: Client, config: GoogleConfig) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl IdentityProvider for GoogleOAuthProvider {
    fn authorization_url(&self, redirect_uri: &str, state: &str) -> Result<String, AuthError> {
        let url = Url::parse_with_params(
            AUTHORIZATION_ENDPOINT,
            &[
                ("client_id", self.config.client_id.as_str()),
                ("redirect_uri", redirect_uri),
                ("response_type", "code"),
                ("scope", "openid email profile"),
                ("state", state),
                ("prompt", "select_account"),
            ],
        )
        .map_err(|e| AuthError::OAuthProvider(e.to_string()))?;

        Ok(url.to_string())
    }

    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<GoogleProfile, AuthError> {
        let response = self
            .client
            .post(TOKEN_ENDPOINT)
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", redirect_uri),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AuthError::OAuthProvider(format!(
                "Token exchange failed with status: {}",
                response.status()
            )));
        }

        let tokens: TokenResponse = response.json().await?;

        let response = self
            .client
            .get(USERINFO_ENDPOINT)
            .bearer_auth(&tokens.access_token)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AuthError::OAuthProvider(format!(
                "Userinfo request failed with status: {}",
                response.status()
            )));
        }

        Ok(response.json::<GoogleProfile>().await?)
    }
}
