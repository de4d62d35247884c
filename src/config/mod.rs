//! Configuration module for Passage Auth
//!
//! Handles loading and parsing of YAML configuration files with support for
//! environment variable expansion and validation of the Passage credentials.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::identity::IdentityError;

mod loader;

pub use loader::ConfigLoader;

/// Message for missing Passage credentials
pub const MISSING_CREDENTIALS: &str = "PassageStrategy requires an appID and apiKey option";

/// Message for a strategy built without a verify callback
pub const MISSING_VERIFY: &str = "PassageStrategy requires a verify callback";

// ============================================================================
// Environment Variable Expansion
// ============================================================================

/// Expand environment variables in a string.
///
/// Supports two syntaxes:
/// - `${VAR_NAME}` - Simple expansion, keeps placeholder if var not found
/// - `${VAR_NAME:-default}` - Expansion with default value
///
/// # Examples
///
/// ```ignore
/// std::env::set_var("PASSAGE_APP_ID", "app");
/// assert_eq!(expand_env_vars("${PASSAGE_APP_ID}"), "app");
/// assert_eq!(expand_env_vars("${MISSING:-fallback}"), "fallback");
/// ```
fn expand_env_vars(s: &str) -> String {
    let mut last_match = 0;
    let mut result = String::with_capacity(s.len());

    for cap in loader::ENV_VAR_WITH_DEFAULT.captures_iter(s) {
        let (Some(full_match), Some(var_name)) = (cap.get(0), cap.get(1)) else {
            continue;
        };

        result.push_str(&s[last_match..full_match.start()]);

        let value = match std::env::var(var_name.as_str()) {
            Ok(val) => val,
            Err(_) => match cap.get(2) {
                Some(default) => default.as_str().to_string(),
                // No env var and no default. Keep the original placeholder.
                None => full_match.as_str().to_string(),
            },
        };
        result.push_str(&value);

        last_match = full_match.end();
    }

    result.push_str(&s[last_match..]);
    result
}

/// Deserialize a string, expanding environment variables.
fn deserialize_with_env<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::de::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    Ok(expand_env_vars(&s))
}

// ============================================================================
// Validation Helpers
// ============================================================================

/// Validate that a URL starts with http:// or https://
fn is_valid_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// A `${VAR}` placeholder left unexpanded counts as missing
fn is_unset(value: &str) -> bool {
    let value = value.trim();
    value.is_empty() || (value.starts_with("${") && value.ends_with('}'))
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("{}", MISSING_CREDENTIALS)]
    MissingCredentials,

    #[error("{}", MISSING_VERIFY)]
    MissingVerify,

    #[error("Invalid configuration: {0}")]
    ValidationError(String),

    #[error(transparent)]
    Provider(#[from] IdentityError),
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub passage: PassageConfig,
    #[serde(default)]
    pub authenticate: AuthenticateConfig,
}

impl Config {
    /// Load configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        ConfigLoader::load(path)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.passage.validate()?;

        if self.authenticate.deadline_millis == Some(0) {
            return Err(ConfigError::ValidationError(
                "authenticate.deadline_millis must be greater than 0".into(),
            ));
        }

        Ok(())
    }
}

/// Where the Passage auth token is read from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenSource {
    /// `psg_auth_token` cookie
    #[default]
    Cookie,
    /// `Authorization: Bearer` header
    Header,
}

/// Passage application configuration
///
/// # Example
///
/// ```yaml
/// passage:
///   app_id: "${PASSAGE_APP_ID}"
///   api_key: "${PASSAGE_API_KEY}"
///   token_source: header
///   timeout_seconds: 5
/// ```
#[derive(Clone, Serialize, Deserialize)]
pub struct PassageConfig {
    /// Passage application ID. Supports ${VAR} and ${VAR:-default} expansion.
    #[serde(default, deserialize_with = "deserialize_with_env")]
    pub app_id: String,

    /// Passage API key. Supports ${VAR} and ${VAR:-default} expansion.
    #[serde(default, deserialize_with = "deserialize_with_env")]
    pub api_key: String,

    /// Default: cookie
    #[serde(default)]
    pub token_source: TokenSource,

    /// Origin serving the JWKS. Default: "https://auth.passage.id"
    #[serde(default = "default_auth_origin")]
    pub auth_origin: String,

    /// Origin serving the management API. Default: "https://api.passage.id"
    #[serde(default = "default_api_origin")]
    pub api_origin: String,

    /// Per-request HTTP timeout in seconds. Default: 10
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    /// How long fetched signing keys are trusted. Default: 3600
    #[serde(default = "default_jwks_cache_ttl")]
    pub jwks_cache_ttl_seconds: u64,
}

impl std::fmt::Debug for PassageConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PassageConfig")
            .field("app_id", &self.app_id)
            .field("api_key", &"<redacted>")
            .field("token_source", &self.token_source)
            .field("auth_origin", &self.auth_origin)
            .field("api_origin", &self.api_origin)
            .field("timeout_seconds", &self.timeout_seconds)
            .field("jwks_cache_ttl_seconds", &self.jwks_cache_ttl_seconds)
            .finish()
    }
}

impl PassageConfig {
    /// Configuration with default origins and timeouts
    pub fn new(app_id: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            api_key: api_key.into(),
            token_source: TokenSource::default(),
            auth_origin: default_auth_origin(),
            api_origin: default_api_origin(),
            timeout_seconds: default_timeout_seconds(),
            jwks_cache_ttl_seconds: default_jwks_cache_ttl(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if is_unset(&self.app_id) || is_unset(&self.api_key) {
            return Err(ConfigError::MissingCredentials);
        }

        for (field, origin) in [
            ("auth_origin", &self.auth_origin),
            ("api_origin", &self.api_origin),
        ] {
            if !is_valid_http_url(origin) {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid {} '{}': must start with http:// or https://",
                    field, origin
                )));
            }
        }

        if self.timeout_seconds == 0 {
            return Err(ConfigError::ValidationError(
                "timeout_seconds must be greater than 0".into(),
            ));
        }

        Ok(())
    }
}

fn default_auth_origin() -> String {
    "https://auth.passage.id".to_string()
}

fn default_api_origin() -> String {
    "https://api.passage.id".to_string()
}

fn default_timeout_seconds() -> u64 {
    10
}

fn default_jwks_cache_ttl() -> u64 {
    3600 // 1 hour
}

/// Settings for a whole authentication attempt
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthenticateConfig {
    /// Upper bound for validate + fetch together, in milliseconds.
    /// Default: none (per-request HTTP timeouts only)
    #[serde(default)]
    pub deadline_millis: Option<u64>,
}

impl AuthenticateConfig {
    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_millis.map(Duration::from_millis)
    }
}
