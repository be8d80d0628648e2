//! Storefront configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `STOREFRONT_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//! - `STOREFRONT_BASE_URL` - Public URL of the API
//! - `STOREFRONT_SESSION_SECRET` - Session signing secret (min 32 chars, high entropy)
//! - `MIDTRANS_SERVER_KEY` - Midtrans server key (also signs webhook notifications)
//!
//! ## Optional
//! - `STOREFRONT_HOST` - Bind address (default: 127.0.0.1)
//! - `STOREFRONT_PORT` - Listen port (default: 5000)
//! - `STOREFRONT_CORS_ORIGIN` - Origin of the storefront SPA allowed to call the API
//! - `MIDTRANS_CLIENT_KEY` - Midtrans client key (exposed to the SPA for Snap.js)
//! - `MIDTRANS_IS_PRODUCTION` - `true` to use the production Snap API (default: false)
//! - `MIDTRANS_SNAP_URL` - Override the Snap API base URL
//! - `MIDTRANS_FINISH_URL` - Where Snap sends the buyer after payment
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

const MIN_SESSION_SECRET_LENGTH: usize = 32;
const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

/// Snap API base URL (sandbox).
pub const MIDTRANS_SANDBOX_SNAP_URL: &str = "https://app.sandbox.midtrans.com";

/// Snap API base URL (production).
pub const MIDTRANS_PRODUCTION_SNAP_URL: &str = "https://app.midtrans.com";

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "secret",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Storefront application configuration.
#[derive(Debug, Clone)]
pub struct StorefrontConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public base URL of the API
    pub base_url: String,
    /// Origin of the SPA allowed by CORS (credentials included)
    pub cors_origin: Option<String>,
    /// Session signing secret
    pub session_secret: SecretString,
    /// Midtrans payment gateway configuration
    pub midtrans: MidtransConfig,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment name
    pub sentry_environment: Option<String>,
}

/// Midtrans Snap configuration.
///
/// Implements `Debug` manually to redact the server key.
#[derive(Clone)]
pub struct MidtransConfig {
    /// Server key used for Basic auth and notification signatures
    pub server_key: SecretString,
    /// Client key handed to the SPA for Snap.js
    pub client_key: Option<String>,
    /// Whether the production environment is used
    pub is_production: bool,
    /// Snap API base URL
    pub snap_url: String,
    /// Redirect target after the buyer finishes payment
    pub finish_url: Option<String>,
}

impl std::fmt::Debug for MidtransConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MidtransConfig")
            .field("server_key", &"[REDACTED]")
            .field("client_key", &self.client_key)
            .field("is_production", &self.is_production)
            .field("snap_url", &self.snap_url)
            .field("finish_url", &self.finish_url)
            .finish()
    }
}

impl StorefrontConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if secrets fail validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database_url = get_database_url("STOREFRONT_DATABASE_URL")?;
        let host = get_env_or_default("STOREFRONT_HOST", "127.0.0.1")
            .parse::<IpAddr>()
            .map_err(|e| {
                ConfigError::InvalidEnvVar("STOREFRONT_HOST".to_string(), e.to_string())
            })?;
        let port = get_env_or_default("STOREFRONT_PORT", "5000")
            .parse::<u16>()
            .map_err(|e| {
                ConfigError::InvalidEnvVar("STOREFRONT_PORT".to_string(), e.to_string())
            })?;
        let base_url = get_required_env("STOREFRONT_BASE_URL")?;
        validate_url(&base_url, "STOREFRONT_BASE_URL")?;
        let cors_origin = get_optional_env("STOREFRONT_CORS_ORIGIN");
        if let Some(origin) = &cors_origin {
            validate_url(origin, "STOREFRONT_CORS_ORIGIN")?;
        }
        let session_secret = get_validated_secret("STOREFRONT_SESSION_SECRET")?;
        validate_session_secret(&session_secret, "STOREFRONT_SESSION_SECRET")?;

        let midtrans = MidtransConfig::from_env()?;

        Ok(Self {
            database_url,
            host,
            port,
            base_url,
            cors_origin,
            session_secret,
            midtrans,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Whether cookies should be marked `Secure`.
    #[must_use]
    pub fn is_https(&self) -> bool {
        self.base_url.starts_with("https://")
    }
}

impl MidtransConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let is_production = parse_bool("MIDTRANS_IS_PRODUCTION", false)?;
        let snap_url = get_optional_env("MIDTRANS_SNAP_URL").unwrap_or_else(|| {
            if is_production {
                MIDTRANS_PRODUCTION_SNAP_URL.to_string()
            } else {
                MIDTRANS_SANDBOX_SNAP_URL.to_string()
            }
        });
        validate_url(&snap_url, "MIDTRANS_SNAP_URL")?;

        Ok(Self {
            server_key: get_validated_secret("MIDTRANS_SERVER_KEY")?,
            client_key: get_optional_env("MIDTRANS_CLIENT_KEY"),
            is_production,
            snap_url,
            finish_url: get_optional_env("MIDTRANS_FINISH_URL"),
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get database URL with fallback to generic `DATABASE_URL` (used by Fly.io postgres attach).
fn get_database_url(primary_key: &str) -> Result<SecretString, ConfigError> {
    // Try primary key first (e.g., STOREFRONT_DATABASE_URL)
    if let Ok(value) = std::env::var(primary_key) {
        return Ok(SecretString::from(value));
    }
    // Fallback to generic DATABASE_URL (set by Fly.io postgres attach)
    if let Ok(value) = std::env::var("DATABASE_URL") {
        return Ok(SecretString::from(value));
    }
    Err(ConfigError::MissingEnvVar(primary_key.to_string()))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse a boolean flag (`true`/`false`/`1`/`0`).
fn parse_bool(key: &str, default: bool) -> Result<bool, ConfigError> {
    match get_optional_env(key).as_deref().map(str::trim) {
        None | Some("") => Ok(default),
        Some("true" | "1") => Ok(true),
        Some("false" | "0") => Ok(false),
        Some(other) => Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            format!("expected true or false, got '{other}'"),
        )),
    }
}

/// Validate that a value is an absolute http(s) URL.
fn validate_url(value: &str, var_name: &str) -> Result<(), ConfigError> {
    let url = url::Url::parse(value)
        .map_err(|e| ConfigError::InvalidEnvVar(var_name.to_string(), e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidEnvVar(
            var_name.to_string(),
            "must be an http or https URL".to_string(),
        ));
    }
    Ok(())
}

/// Validate that a session secret meets minimum length requirements.
fn validate_session_secret(secret: &SecretString, var_name: &str) -> Result<(), ConfigError> {
    let value = secret.expose_secret();
    if value.len() < MIN_SESSION_SECRET_LENGTH {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "must be at least {} characters (got {})",
                MIN_SESSION_SECRET_LENGTH,
                value.len()
            ),
        ));
    }
    Ok(())
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.len() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    // Check blocklist
    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    // Check entropy (real secrets like API keys have high entropy)
    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use a randomly generated secret."
            ),
        ));
    }

    Ok(())
}

/// Load and validate a secret from environment.
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_shannon_entropy_empty() {
        assert!((shannon_entropy("") - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_shannon_entropy_single_char() {
        // All same character = 0 entropy
        assert!((shannon_entropy("aaaaaaa") - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_shannon_entropy_two_chars() {
        // "ab" has entropy of 1 bit per char (50% a, 50% b)
        let entropy = shannon_entropy("ab");
        assert!((entropy - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_shannon_entropy_high() {
        // Random-looking string should have high entropy
        let entropy = shannon_entropy("aB3$xY9!mK2@nL5#");
        assert!(entropy > 3.3);
    }

    #[test]
    fn test_validate_secret_strength_placeholder() {
        let result = validate_secret_strength("your-api-key-here", "TEST_VAR");
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(matches!(err, ConfigError::InsecureSecret(_, _)));
    }

    #[test]
    fn test_validate_secret_strength_changeme() {
        let result = validate_secret_strength("changeme123", "TEST_VAR");
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_secret_strength_low_entropy() {
        let result = validate_secret_strength("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa", "TEST_VAR");
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(matches!(err, ConfigError::InsecureSecret(_, _)));
    }

    #[test]
    fn test_validate_secret_strength_valid() {
        // High-entropy random string
        let result = validate_secret_strength("aB3$xY9!mK2@nL5#pQ7&rT0*uW4^zC6", "TEST_VAR");
        assert!(result.is_ok());
    }

    #[test]
    fn test_validate_session_secret_too_short() {
        let secret = SecretString::from("short");
        let result = validate_session_secret(&secret, "TEST_SESSION");
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_session_secret_valid_length() {
        let secret = SecretString::from("a".repeat(32));
        let result = validate_session_secret(&secret, "TEST_SESSION");
        assert!(result.is_ok());
    }

    #[test]
    fn test_socket_addr() {
        let config = StorefrontConfig {
            database_url: SecretString::from("postgres://localhost/omahring"),
            host: "127.0.0.1".parse().unwrap(),
            port: 5000,
            base_url: "http://localhost:5000".to_string(),
            cors_origin: None,
            session_secret: SecretString::from("x".repeat(32)),
            midtrans: MidtransConfig {
                server_key: SecretString::from("SB-Mid-server-key"),
                client_key: None,
                is_production: false,
                snap_url: MIDTRANS_SANDBOX_SNAP_URL.to_string(),
                finish_url: None,
            },
            sentry_dsn: None,
            sentry_environment: None,
        };

        let addr = config.socket_addr();
        assert_eq!(addr.ip().to_string(), "127.0.0.1");
        assert_eq!(addr.port(), 5000);
        assert!(!config.is_https());
    }

    #[test]
    fn test_midtrans_config_debug_redacts_server_key() {
        let config = MidtransConfig {
            server_key: SecretString::from("SB-Mid-server-TOPSECRETVALUE"),
            client_key: Some("SB-Mid-client-visible".to_string()),
            is_production: false,
            snap_url: MIDTRANS_SANDBOX_SNAP_URL.to_string(),
            finish_url: None,
        };

        let debug_output = format!("{config:?}");

        assert!(debug_output.contains("SB-Mid-client-visible"));
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("TOPSECRETVALUE"));
    }

    #[test]
    fn test_validate_url() {
        assert!(validate_url("https://omahring.id", "TEST_URL").is_ok());
        assert!(validate_url("http://localhost:5173", "TEST_URL").is_ok());
        assert!(validate_url("ftp://omahring.id", "TEST_URL").is_err());
        assert!(validate_url("not a url", "TEST_URL").is_err());
    }
}
