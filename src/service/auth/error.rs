use crate::storage::StorageError;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Authentication required")]
    AuthenticationRequired,
    #[error("Invalid email or password")]
    BadCredentials,
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("An account with this email already exists")]
    EmailTaken,
    #[error("Invalid or expired token")]
    InvalidToken,
    #[error("Invalid OAuth state")]
    InvalidOAuthState,
    #[error("OAuth provider error: {0}")]
    OAuthProvider(String),
    #[error("User not found")]
    UserNotFound,
    #[error("Crypto error: {0}")]
    Crypto(String),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl From<reqwest::Error> for AuthError {
    fn from(error: reqwest::Error) -> Self {
        AuthError::OAuthProvider(error.to_string())
    }
}
