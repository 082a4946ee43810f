mod error;
mod google;
mod model;
mod password;
mod store;
mod token;

pub use error::AuthError;
pub use google::{GoogleOAuthProvider, IdentityProvider};
pub use model::*;
pub use store::UserStore;

pub(crate) use store::parse_timestamp;

use chrono::Utc;
use std::{sync::Arc, time::Duration};
use uuid::Uuid;

use crate::{
    config::AppConfig,
    service::email::EmailService,
    storage::StorageManager,
    utils::{validate_email, validate_password},
};

const OAUTH_STATE_PREFIX: &str = "oauth_state:";
const VERIFY_PREFIX: &str = "verify_email:";
const RESET_PREFIX: &str = "password_reset:";

#[derive(Clone)]
pub struct AuthService {
    users: UserStore,
    storage: StorageManager,
    identity: Arc<dyn IdentityProvider>,
    email: EmailService,
    config: Arc<AppConfig>,
}

impl AuthService {
    pub fn new(
        storage: StorageManager,
        identity: Arc<dyn IdentityProvider>,
        email: EmailService,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            users: UserStore::new(storage.turso().clone()),
            storage,
            identity,
            email,
            config,
        }
    }

    pub fn users(&self) -> &UserStore {
        &self.users
    }

    pub async fn register(&self, request: RegisterRequest) -> Result<(User, String), AuthError> {
        let email = request.email.trim().to_lowercase();
        if !validate_email(&email) {
            return Err(AuthError::ValidationError("A valid email is required".into()));
        }
        if !validate_password(&request.password) {
            return Err(AuthError::ValidationError(
                "Password must be at least 8 characters".into(),
            ));
        }

        if self.users.find_by_email(&email).await?.is_some() {
            return Err(AuthError::EmailTaken);
        }

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4().to_string(),
            email,
            password_hash: Some(password::hash_password(&request.password)?),
            google_id: None,
            first_name: request.first_name.trim().to_string(),
            last_name: request.last_name.trim().to_string(),
            is_verified: false,
            stripe_customer_id: None,
            created_at: now,
            updated_at: now,
        };
        self.users.insert(&user).await?;
        info!("Registered user {}", user.id);

        let verification_token = token::random_token();
        self.storage
            .cache()
            .set(
                &format!("{}{}", VERIFY_PREFIX, verification_token),
                user.id.clone(),
                Some(Duration::from_secs(self.config.cache.verification_ttl_secs)),
            )
            .await?;
        if let Err(e) = self
            .email
            .send_verification(&user.email, user.display_name(), &verification_token)
            .await
        {
            warn!("Failed to send verification email to {}: {}", user.email, e);
        }

        let jwt = self.issue_token(&user)?;
        Ok((user, jwt))
    }

    pub async fn login(&self, credentials: Credentials) -> Result<(User, String), AuthError> {
        let email = credentials.email.trim().to_lowercase();
        if email.is_empty() || credentials.password.is_empty() {
            return Err(AuthError::ValidationError("Email and password are required".into()));
        }

        let user = self
            .users
            .find_by_email(&email)
            .await?
            .ok_or(AuthError::BadCredentials)?;

        // Google-only accounts have no password to check against.
        let hash = user.password_hash.as_deref().ok_or(AuthError::BadCredentials)?;
        if !password::verify_password(hash, &credentials.password)? {
            return Err(AuthError::BadCredentials);
        }

        let jwt = self.issue_token(&user)?;
        Ok((user, jwt))
    }

    pub async fn google_authorization_url(&self) -> Result<String, AuthError> {
        let state = token::random_token();
        self.storage
            .cache()
            .set(
                &format!("{}{}", OAUTH_STATE_PREFIX, state),
                "1".to_string(),
                Some(Duration::from_secs(self.config.cache.oauth_state_ttl_secs)),
            )
            .await?;

        self.identity.authorization_url(&self.google_redirect_uri(), &state)
    }

    /// Completes the Google flow and returns a JWT for the linked or newly created user.
    pub async fn google_callback(&self, code: &str, state: &str) -> Result<(User, String), AuthError> {
        if self
            .storage
            .cache()
            .take(&format!("{}{}", OAUTH_STATE_PREFIX, state))
            .await?
            .is_none()
        {
            return Err(AuthError::InvalidOAuthState);
        }

        let profile = self.identity.exchange_code(code, &self.google_redirect_uri()).await?;
        let user = self.upsert_google_user(profile).await?;
        let jwt = self.issue_token(&user)?;
        Ok((user, jwt))
    }

    async fn upsert_google_user(&self, profile: GoogleProfile) -> Result<User, AuthError> {
        if let Some(user) = self.users.find_by_google_id(&profile.id).await? {
            return Ok(user);
        }

        let email = profile.email.trim().to_lowercase();
        if let Some(mut user) = self.users.find_by_email(&email).await? {
            // Only a Google-verified address proves ownership of the existing account.
            if !profile.verified_email {
                warn!("Refusing to link unverified Google email to existing user {}", user.id);
                return Err(AuthError::EmailTaken);
            }

            info!("Linking Google account to existing user {}", user.id);
            self.users.link_google_id(&user.id, &profile.id).await?;
            if !user.is_verified {
                self.users.mark_verified(&user.id).await?;
                user.is_verified = true;
            }
            user.google_id = Some(profile.id);
            return Ok(user);
        }

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4().to_string(),
            email,
            password_hash: None,
            google_id: Some(profile.id),
            first_name: profile.given_name.unwrap_or_default(),
            last_name: profile.family_name.unwrap_or_default(),
            is_verified: profile.verified_email,
            stripe_customer_id: None,
            created_at: now,
            updated_at: now,
        };
        self.users.insert(&user).await?;
        info!("Registered user {} through Google", user.id);
        Ok(user)
    }

    pub async fn verify_email(&self, verification_token: &str) -> Result<(), AuthError> {
        let user_id = self
            .storage
            .cache()
            .take(&format!("{}{}", VERIFY_PREFIX, verification_token))
            .await?
            .ok_or(AuthError::InvalidToken)?;

        self.users.mark_verified(&user_id).await?;
        Ok(())
    }

    /// Sends a reset link when the account exists. Unknown emails succeed silently.
    pub async fn forgot_password(&self, email: &str) -> Result<(), AuthError> {
        let Some(user) = self.users.find_by_email(&email.trim().to_lowercase()).await? else {
            debug!("Password reset requested for unknown email");
            return Ok(());
        };

        let reset_token = token::random_token();
        let valid_for = Duration::from_secs(self.config.cache.password_reset_ttl_secs);
        self.storage
            .cache()
            .set(&format!("{}{}", RESET_PREFIX, reset_token), user.id.clone(), Some(valid_for))
            .await?;

        if let Err(e) = self
            .email
            .send_password_reset(&user.email, user.display_name(), &reset_token, valid_for)
            .await
        {
            warn!("Failed to send password reset email to {}: {}", user.email, e);
        }
        Ok(())
    }

    pub async fn reset_password(&self, reset_token: &str, new_password: &str) -> Result<(), AuthError> {
        if !validate_password(new_password) {
            return Err(AuthError::ValidationError(
                "Password must be at least 8 characters".into(),
            ));
        }

        let user_id = self
            .storage
            .cache()
            .take(&format!("{}{}", RESET_PREFIX, reset_token))
            .await?
            .ok_or(AuthError::InvalidToken)?;

        let hash = password::hash_password(new_password)?;
        self.users.set_password_hash(&user_id, &hash).await?;
        info!("Password reset for user {}", user_id);
        Ok(())
    }

    pub async fn get_user(&self, user_id: &str) -> Result<User, AuthError> {
        self.users.find_by_id(user_id).await?.ok_or(AuthError::UserNotFound)
    }

    pub fn authenticate(&self, bearer: &str) -> Result<Claims, AuthError> {
        token::verify_jwt(bearer, &self.config.jwt.secret)
    }

    pub fn issue_token(&self, user: &User) -> Result<String, AuthError> {
        token::sign_jwt(&user.id, &user.email, &self.config.jwt.secret, self.config.jwt.expires_in_secs)
    }

    fn google_redirect_uri(&self) -> String {
        format!(
            "{}/api/auth/google/callback",
            self.config.server.api_url.trim_end_matches('/')
        )
    }
}
