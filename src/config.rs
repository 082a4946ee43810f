use std::str::FromStr;

use shuttle_runtime::SecretStore;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing secret: {0}")]
    Missing(String),
    #[error("Invalid secret: {0}")]
    Invalid(String),
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub cache: CacheConfig,
    pub jwt: JwtConfig,
    pub google: GoogleConfig,
    pub stripe: StripeConfig,
    pub licensing: LicensingConfig,
    pub mailgun: MailgunConfig,
    pub zoom: ZoomConfig,
    pub drive: DriveConfig,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Public URL of the React frontend, used for redirects and email links.
    pub frontend_url: String,
    /// Public URL of this API, used to build OAuth callback URLs.
    pub api_url: String,
    pub support_email: String,
    /// Optional JSON file with products and member content, applied at startup.
    pub catalog_path: String,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub token: String,
}

#[derive(Clone, Debug)]
pub struct CacheConfig {
    /// When empty, an in-process cache is used instead of Redis.
    pub redis_url: String,
    pub oauth_state_ttl_secs: u64,
    pub verification_ttl_secs: u64,
    pub password_reset_ttl_secs: u64,
}

#[derive(Clone, Debug)]
pub struct JwtConfig {
    pub secret: String,
    pub expires_in_secs: u64,
}

#[derive(Clone, Debug)]
pub struct GoogleConfig {
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Clone, Debug)]
pub struct StripeConfig {
    pub secret_key: String,
    pub webhook_secret: String,
    pub webhook_tolerance_secs: i64,
}

#[derive(Clone, Debug)]
pub struct LicensingConfig {
    pub api_key: String,
    /// Key desktop software sends in `x-api-key` when validating licenses.
    pub client_api_key: String,
}

#[derive(Clone, Debug)]
pub struct MailgunConfig {
    pub api_key: String,
    pub domain: String,
    pub from: String,
}

#[derive(Clone, Debug)]
pub struct ZoomConfig {
    pub account_id: String,
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Clone, Debug)]
pub struct DriveConfig {
    pub api_key: String,
}

fn required(store: &SecretStore, key: &str) -> Result<String, ConfigError> {
    store.get(key).ok_or_else(|| ConfigError::Missing(key.to_string()))
}

fn optional(store: &SecretStore, key: &str, default: &str) -> String {
    store.get(key).unwrap_or_else(|| default.to_string())
}

fn parsed<T: FromStr>(store: &SecretStore, key: &str, default: T) -> Result<T, ConfigError> {
    match store.get(key) {
        Some(value) => value.parse::<T>().map_err(|_| ConfigError::Invalid(key.to_string())),
        None => Ok(default),
    }
}

pub fn build_config(store: &SecretStore) -> Result<AppConfig, ConfigError> {
    info!("Building AppConfig...");

    let config = AppConfig {
        server: ServerConfig {
            frontend_url: required(store, "FRONTEND_URL")?,
            api_url: required(store, "API_URL")?,
            support_email: required(store, "SUPPORT_EMAIL")?,
            catalog_path: optional(store, "CATALOG_PATH", ""),
        },
        database: DatabaseConfig {
            url: required(store, "TURSO_URL")?,
            token: required(store, "TURSO_TOKEN")?,
        },
        cache: CacheConfig {
            redis_url: optional(store, "REDIS_URL", ""),
            oauth_state_ttl_secs: parsed(store, "OAUTH_STATE_TTL_SECS", 600)?,
            verification_ttl_secs: parsed(store, "VERIFICATION_TTL_SECS", 60 * 60 * 24)?,
            password_reset_ttl_secs: parsed(store, "PASSWORD_RESET_TTL_SECS", 60 * 60)?,
        },
        jwt: JwtConfig {
            secret: required(store, "JWT_SECRET")?,
            expires_in_secs: parsed(store, "JWT_EXPIRES_IN_SECS", 60 * 60 * 24 * 7)?,
        },
        google: GoogleConfig {
            client_id: required(store, "GOOGLE_CLIENT_ID")?,
            client_secret: required(store, "GOOGLE_CLIENT_SECRET")?,
        },
        stripe: StripeConfig {
            secret_key: required(store, "STRIPE_SECRET_KEY")?,
            webhook_secret: required(store, "STRIPE_WEBHOOK_SECRET")?,
            webhook_tolerance_secs: parsed(store, "STRIPE_WEBHOOK_TOLERANCE_SECS", 300)?,
        },
        licensing: LicensingConfig {
            api_key: required(store, "NETLICENSING_API_KEY")?,
            client_api_key: required(store, "LICENSE_VALIDATION_API_KEY")?,
        },
        mailgun: MailgunConfig {
            api_key: required(store, "MAILGUN_API_KEY")?,
            domain: required(store, "MAILGUN_DOMAIN")?,
            from: required(store, "MAILGUN_FROM")?,
        },
        zoom: ZoomConfig {
            account_id: required(store, "ZOOM_ACCOUNT_ID")?,
            client_id: required(store, "ZOOM_CLIENT_ID")?,
            client_secret: required(store, "ZOOM_CLIENT_SECRET")?,
        },
        drive: DriveConfig {
            api_key: required(store, "GOOGLE_DRIVE_API_KEY")?,
        },
    };

    if config.jwt.secret.len() < 32 {
        return Err(ConfigError::Invalid("JWT_SECRET must be at least 32 characters".to_string()));
    }

    info!("AppConfig built");

    Ok(config)
}

#[cfg(test)]
impl AppConfig {
    pub fn new_test_config() -> Self {
        Self {
            server: ServerConfig {
                frontend_url: "http://localhost:3000".to_string(),
                api_url: "http://localhost:8000".to_string(),
                support_email: "support@example.com".to_string(),
                catalog_path: String::new(),
            },
            database: DatabaseConfig {
                url: ":memory:".to_string(),
                token: String::new(),
            },
            cache: CacheConfig {
                redis_url: String::new(),
                oauth_state_ttl_secs: 600,
                verification_ttl_secs: 3600,
                password_reset_ttl_secs: 3600,
            },
            jwt: JwtConfig {
                secret: "test-secret-that-is-long-enough-for-hs256".to_string(),
                expires_in_secs: 3600,
            },
            google: GoogleConfig {
                client_id: "google-client".to_string(),
                client_secret: "google-secret".to_string(),
            },
            stripe: StripeConfig {
                secret_key: "sk_test_123".to_string(),
                webhook_secret: "whsec_test_secret".to_string(),
                webhook_tolerance_secs: 300,
            },
            licensing: LicensingConfig {
                api_key: "netlicensing-key".to_string(),
                client_api_key: "desktop-client-key".to_string(),
            },
            mailgun: MailgunConfig {
                api_key: "mailgun-key".to_string(),
                domain: "mg.example.com".to_string(),
                from: "Trading Desk <no-reply@example.com>".to_string(),
            },
            zoom: ZoomConfig {
                account_id: "zoom-account".to_string(),
                client_id: "zoom-client".to_string(),
                client_secret: "zoom-secret".to_string(),
            },
            drive: DriveConfig {
                api_key: "drive-key".to_string(),
            },
        }
    }
}
