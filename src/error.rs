use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use shuttle_runtime::Error as ShuttleError;

use crate::{
    config::ConfigError,
    service::{
        auth::AuthError, content::ContentError, email::EmailError, license::LicenseError, payment::PaymentError,
        subscription::SubscriptionError,
    },
    storage::StorageError,
};

const INTERNAL_MESSAGE: &str = "Internal server error";

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Subscription(#[from] SubscriptionError),

    #[error(transparent)]
    Payment(#[from] PaymentError),

    #[error(transparent)]
    License(#[from] LicenseError),

    #[error(transparent)]
    Email(#[from] EmailError),

    #[error(transparent)]
    Content(#[from] ContentError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Auth(e) => match e {
                AuthError::AuthenticationRequired | AuthError::BadCredentials | AuthError::InvalidToken => {
                    StatusCode::UNAUTHORIZED
                }
                AuthError::ValidationError(_) | AuthError::InvalidOAuthState => StatusCode::BAD_REQUEST,
                AuthError::EmailTaken => StatusCode::CONFLICT,
                AuthError::UserNotFound => StatusCode::NOT_FOUND,
                AuthError::OAuthProvider(_) => StatusCode::BAD_GATEWAY,
                AuthError::Crypto(_) | AuthError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            AppError::Subscription(e) => match e {
                SubscriptionError::ProductNotFound(_) | SubscriptionError::UserNotFound | SubscriptionError::NotFound(_) => {
                    StatusCode::NOT_FOUND
                }
                SubscriptionError::UnsupportedSubscriptionType(_)
                | SubscriptionError::PaymentMethodRequired
                | SubscriptionError::NotUpgradeable(_) => StatusCode::BAD_REQUEST,
                SubscriptionError::AlreadySubscribed => StatusCode::CONFLICT,
                SubscriptionError::PaymentIncomplete(_) => StatusCode::PAYMENT_REQUIRED,
                SubscriptionError::Payment(e) => payment_status(e),
                SubscriptionError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            AppError::Payment(e) => payment_status(e),
            AppError::License(_) | AppError::Email(_) => StatusCode::BAD_GATEWAY,
            AppError::Content(e) => match e {
                ContentError::NotFound(_) => StatusCode::NOT_FOUND,
                ContentError::AccessDenied(_) => StatusCode::FORBIDDEN,
                ContentError::Provider(_) => StatusCode::BAD_GATEWAY,
                ContentError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Storage(_) | AppError::Config(_) | AppError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message shown to clients. Server-side failures are not described.
    pub fn public_message(&self) -> String {
        match self.status() {
            StatusCode::INTERNAL_SERVER_ERROR => INTERNAL_MESSAGE.to_string(),
            StatusCode::BAD_GATEWAY => "Upstream service unavailable, please try again later".to_string(),
            _ => self.to_string(),
        }
    }
}

fn payment_status(error: &PaymentError) -> StatusCode {
    match error {
        PaymentError::InvalidWebhookSignature | PaymentError::InvalidPayload(_) => StatusCode::BAD_REQUEST,
        PaymentError::ApiError(_) => StatusCode::PAYMENT_REQUIRED,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        } else {
            debug!("Request rejected ({}): {}", status, self);
        }

        let body = Json(json!({
            "success": false,
            "message": self.public_message(),
        }));
        (status, body).into_response()
    }
}

impl From<AppError> for ShuttleError {
    fn from(error: AppError) -> Self {
        ShuttleError::Custom(anyhow::anyhow!(error))
    }
}

pub type AppResult<T> = Result<T, AppError>;
