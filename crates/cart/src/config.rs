//! Cart configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required (remote backend only)
//! - `CART_API_BASE_URL` - Base URL of the storefront serving `/orders/api/...`
//!
//! ## Optional
//! - `CART_BACKEND` - `local` or `remote` (default: local)
//! - `CART_SESSION_COOKIE` - Session cookie (`name=value`) for authenticated carts
//! - `CART_CSRF_COOKIE` - Name of the CSRF cookie (default: csrftoken)
//! - `CART_REQUEST_TIMEOUT_SECS` - HTTP timeout (default: 10)
//! - `CART_STORAGE_DIR` - Directory for local cart storage (default: .repairbay)
//! - `CART_CURRENCY` - ISO 4217 code for local carts (default: USD)
//! - `CART_TAX_RATE` - Tax rate fraction for local carts (default: 0)
//! - `CART_SERVICE_FEE` - Flat service fee for non-empty local carts (default: 15.00)
//! - `CART_LOGIN_URL` - Where to send unauthenticated shoppers (default: /accounts/login/?next=/cart/)
//! - `SENTRY_DSN` - Sentry error tracking DSN

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use repairbay_core::{CurrencyCode, PricingPolicy};
use rust_decimal::Decimal;
use secrecy::SecretString;
use thiserror::Error;
use url::Url;

use crate::dispatch::DEFAULT_LOGIN_URL;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Which persistence backend holds the cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backend {
    /// Key/value storage on this machine.
    #[default]
    Local,
    /// Server session behind the cart HTTP API.
    Remote,
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "remote" | "server" => Ok(Self::Remote),
            other => Err(format!("expected 'local' or 'remote', got '{other}'")),
        }
    }
}

/// Cart configuration.
#[derive(Debug, Clone)]
pub struct CartConfig {
    pub backend: Backend,
    /// Remote API settings; present when `backend` is `Remote`.
    pub remote: Option<RemoteConfig>,
    pub local: LocalConfig,
    /// Authentication entry point for login-required responses.
    pub login_url: String,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
}

/// Remote cart API configuration.
///
/// Implements `Debug` manually to redact the session cookie.
#[derive(Clone)]
pub struct RemoteConfig {
    pub base_url: Url,
    /// Session cookie as `name=value`.
    pub session_cookie: Option<SecretString>,
    pub csrf_cookie_name: String,
    pub timeout: Duration,
}

impl std::fmt::Debug for RemoteConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteConfig")
            .field("base_url", &self.base_url.as_str())
            .field(
                "session_cookie",
                &self.session_cookie.as_ref().map(|_| "[REDACTED]"),
            )
            .field("csrf_cookie_name", &self.csrf_cookie_name)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Local storage configuration.
#[derive(Debug, Clone)]
pub struct LocalConfig {
    pub storage_dir: PathBuf,
    pub currency: CurrencyCode,
    pub pricing: PricingPolicy,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            storage_dir: PathBuf::from(DEFAULT_STORAGE_DIR),
            currency: CurrencyCode::default(),
            pricing: PricingPolicy::default(),
        }
    }
}

const DEFAULT_STORAGE_DIR: &str = ".repairbay";
const DEFAULT_CSRF_COOKIE: &str = "csrftoken";
const DEFAULT_TIMEOUT_SECS: &str = "10";

impl CartConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a required variable is missing or a value
    /// fails to parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// See [`CartConfig::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Lookup(&lookup);

        let backend = parse_var(&env, "CART_BACKEND", "local")?;
        let remote = match backend {
            Backend::Remote => Some(RemoteConfig::load(&env)?),
            Backend::Local => None,
        };

        Ok(Self {
            backend,
            remote,
            local: LocalConfig::load(&env)?,
            login_url: env.or_default("CART_LOGIN_URL", DEFAULT_LOGIN_URL),
            sentry_dsn: env.optional("SENTRY_DSN"),
        })
    }
}

impl RemoteConfig {
    fn load(env: &Lookup<'_>) -> Result<Self, ConfigError> {
        let raw = env.required("CART_API_BASE_URL")?;
        let base_url = Url::parse(&raw)
            .map_err(|e| ConfigError::InvalidEnvVar("CART_API_BASE_URL".to_string(), e.to_string()))?;
        let secs: u64 = parse_var(env, "CART_REQUEST_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS)?;

        Ok(Self {
            base_url,
            session_cookie: env.optional("CART_SESSION_COOKIE").map(SecretString::from),
            csrf_cookie_name: env.or_default("CART_CSRF_COOKIE", DEFAULT_CSRF_COOKIE),
            timeout: Duration::from_secs(secs),
        })
    }

    /// Remote settings with defaults for everything but the base URL.
    #[must_use]
    pub fn with_base_url(base_url: Url) -> Self {
        Self {
            base_url,
            session_cookie: None,
            csrf_cookie_name: DEFAULT_CSRF_COOKIE.to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

impl LocalConfig {
    fn load(env: &Lookup<'_>) -> Result<Self, ConfigError> {
        let tax_rate: Decimal = parse_var(env, "CART_TAX_RATE", "0.085")?;
        let service_fee: Decimal = parse_var(env, "CART_SERVICE_FEE", "15.00")?;
        if tax_rate.is_sign_negative() || service_fee.is_sign_negative() {
            return Err(ConfigError::InvalidEnvVar(
                "CART_TAX_RATE/CART_SERVICE_FEE".to_string(),
                "must not be negative".to_string(),
            ));
        }

        Ok(Self {
            storage_dir: PathBuf::from(env.or_default("CART_STORAGE_DIR", DEFAULT_STORAGE_DIR)),
            currency: parse_var(env, "CART_CURRENCY", "USD")?,
            pricing: PricingPolicy {
                tax_rate,
                service_fee,
            },
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

struct Lookup<'a>(&'a dyn Fn(&str) -> Option<String>);

impl Lookup<'_> {
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    fn required(&self, key: &str) -> Result<String, ConfigError> {
        self.optional(key)
            .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
    }

    fn or_default(&self, key: &str, default: &str) -> String {
        self.optional(key).unwrap_or_else(|| default.to_string())
    }
}

/// Parse a variable (or its default) with `FromStr`.
fn parse_var<T>(env: &Lookup<'_>, key: &str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    env.or_default(key, default)
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}
