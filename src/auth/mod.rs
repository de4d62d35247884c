//! Authentication module
//!
//! Request view, outcome type and the strategy capability that hosting
//! pipelines compose over.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use crate::identity::IdentityError;
use crate::profile::ProfileError;

mod outcome;

pub use outcome::{Outcome, Signals};

/// Boxed error raised by application verification logic
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Cause carried by [`Outcome::Error`]
///
/// Every variant keeps the original error as its source so the hosting
/// framework sees the provider or application failure unchanged.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Identity provider error: {0}")]
    Provider(#[from] IdentityError),

    #[error("Profile normalization failed: {0}")]
    Profile(#[from] ProfileError),

    #[error("Verify callback failed: {0}")]
    Verify(#[source] BoxError),

    #[error("Verify callback panicked: {0}")]
    VerifyPanicked(String),
}

/// Auxiliary information attached to a success or fail outcome
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl AuthInfo {
    /// Info carrying only a message
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            extra: serde_json::Map::new(),
        }
    }

    /// Attach an extra field
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

/// Authentication request context
///
/// Header names are stored lower-cased.
#[derive(Debug, Clone, Default)]
pub struct AuthRequest {
    pub headers: HashMap<String, String>,
    pub method: String,
    pub path: String,
}

impl AuthRequest {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            headers: HashMap::new(),
            method: method.into(),
            path: path.into(),
        }
    }

    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    /// Get header value by name (case-insensitive)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Token from `Authorization: Bearer <token>`
    pub fn bearer_token(&self) -> Option<&str> {
        self.header("authorization")?
            .strip_prefix("Bearer ")
            .map(str::trim)
            .filter(|token| !token.is_empty())
    }

    /// Value of a cookie from the `Cookie` header, percent-decoded
    pub fn cookie(&self, name: &str) -> Option<String> {
        let header = self.header("cookie")?;
        header.split(';').find_map(|pair| {
            let (key, value) = pair.trim().split_once('=')?;
            if key != name {
                return None;
            }
            let value = value.trim_matches('"');
            Some(
                percent_encoding::percent_decode_str(value)
                    .decode_utf8_lossy()
                    .into_owned(),
            )
        })
    }
}

/// Authentication strategy capability
///
/// A strategy inspects a request and produces exactly one [`Outcome`].
/// Hosting pipelines look strategies up by [`Strategy::name`].
#[async_trait]
pub trait Strategy: Send + Sync {
    /// Application-level user produced on success
    type User: Send;

    /// Name the strategy is registered under
    fn name(&self) -> &str;

    /// Authenticate a request
    async fn authenticate(&self, request: &AuthRequest) -> Outcome<Self::User>;
}
