//! Passage identity provider client
//!
//! Validates Passage auth tokens against the application's JWKS and looks up
//! users through the management API.
//!
//! # Example
//!
//! ```no_run
//! use passage_auth::config::PassageConfig;
//! use passage_auth::identity::{Deadline, IdentityProvider, PassageClient};
//! use passage_auth::auth::AuthRequest;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = PassageClient::new(&PassageConfig::new("app-id", "api-key"))?;
//!
//! let request = AuthRequest::new("GET", "/dashboard")
//!     .with_header("cookie", "psg_auth_token=eyJhbGciOi...");
//! if let Some(user_id) = client.validate_request(&request, Deadline::none()).await? {
//!     let user = client.fetch_identity(&user_id, Deadline::none()).await?;
//!     println!("{:?}", user);
//! }
//! # Ok(())
//! # }
//! ```

use super::{Deadline, IdentityError, IdentityProvider};
use crate::auth::AuthRequest;
use crate::config::{PassageConfig, TokenSource};
use crate::metrics;
use crate::profile::IdentityRecord;
use async_trait::async_trait;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, warn};

/// Cookie carrying the Passage auth token
pub const AUTH_COOKIE: &str = "psg_auth_token";

/// Characters escaped in a URL path segment
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Minimum age of the cached key set before an unknown `kid` triggers a refetch
const MIN_JWKS_REFRESH_INTERVAL: Duration = Duration::from_secs(10);

/// A single JSON Web Key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Jwk {
    /// Key type, "RSA" for Passage
    pub kty: String,

    #[serde(default)]
    pub kid: Option<String>,

    #[serde(default, rename = "use")]
    pub key_use: Option<String>,

    #[serde(default)]
    pub alg: Option<String>,

    /// RSA modulus (base64url encoded)
    #[serde(default)]
    pub n: Option<String>,

    /// RSA exponent (base64url encoded)
    #[serde(default)]
    pub e: Option<String>,
}

impl Jwk {
    /// Convert JWK to DecodingKey
    pub fn to_decoding_key(&self) -> Result<DecodingKey, IdentityError> {
        if self.kty != "RSA" {
            return Err(IdentityError::Jwks(format!(
                "Unsupported key type: {}",
                self.kty
            )));
        }
        let n = self
            .n
            .as_ref()
            .ok_or_else(|| IdentityError::Jwks("Missing RSA modulus (n)".into()))?;
        let e = self
            .e
            .as_ref()
            .ok_or_else(|| IdentityError::Jwks("Missing RSA exponent (e)".into()))?;

        DecodingKey::from_rsa_components(n, e)
            .map_err(|e| IdentityError::Jwks(format!("Invalid RSA key: {}", e)))
    }
}

/// JSON Web Key Set
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Jwks {
    pub keys: Vec<Jwk>,
}

impl Jwks {
    pub fn find(&self, kid: &str) -> Option<&Jwk> {
        self.keys.iter().find(|k| k.kid.as_deref() == Some(kid))
    }
}

/// Cached JWKS with metadata
struct CachedJwks {
    jwks: Jwks,
    fetched_at: Instant,
}

/// Claims Passage puts in its auth tokens
#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
}

/// `GET /users/{id}` response body
#[derive(Debug, Deserialize)]
struct UserResponse {
    user: IdentityRecord,
}

/// Passage identity provider
pub struct PassageClient {
    app_id: String,
    api_key: String,
    token_source: TokenSource,
    jwks_url: String,
    users_url: String,
    client: reqwest::Client,
    cache: RwLock<Option<CachedJwks>>,
    cache_ttl: Duration,
    refresh: Mutex<()>,
}

impl std::fmt::Debug for PassageClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PassageClient")
            .field("app_id", &self.app_id)
            .field("token_source", &self.token_source)
            .field("jwks_url", &self.jwks_url)
            .finish_non_exhaustive()
    }
}

impl PassageClient {
    /// Create a client from validated configuration
    pub fn new(config: &PassageConfig) -> Result<Self, IdentityError> {
        config
            .validate()
            .map_err(|e| IdentityError::Config(e.to_string()))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| IdentityError::Config(e.to_string()))?;

        let app = utf8_percent_encode(&config.app_id, PATH_SEGMENT).to_string();
        let jwks_url = format!(
            "{}/v1/apps/{}/.well-known/jwks.json",
            config.auth_origin.trim_end_matches('/'),
            app
        );
        let users_url = format!(
            "{}/v1/apps/{}/users",
            config.api_origin.trim_end_matches('/'),
            app
        );

        Ok(Self {
            app_id: config.app_id.clone(),
            api_key: config.api_key.clone(),
            token_source: config.token_source,
            jwks_url,
            users_url,
            client,
            cache: RwLock::new(None),
            cache_ttl: Duration::from_secs(config.jwks_cache_ttl_seconds),
            refresh: Mutex::new(()),
        })
    }

    /// Extract the auth token according to the configured token source
    fn extract_token(&self, request: &AuthRequest) -> Option<String> {
        match self.token_source {
            TokenSource::Cookie => request.cookie(AUTH_COOKIE).filter(|t| !t.is_empty()),
            TokenSource::Header => request.bearer_token().map(str::to_string),
        }
    }

    /// Look up `kid` in the cached key set, refetching when stale or unknown
    ///
    /// Only one refetch runs at a time; attempts queued behind it reuse the
    /// key set it stored.
    async fn find_key(&self, kid: &str, deadline: Deadline) -> Result<Option<Jwk>, IdentityError> {
        if let Some(lookup) = self.cached_key(kid).await {
            return Ok(lookup);
        }

        let _refresh = deadline.run(async { Ok(self.refresh.lock().await) }).await?;
        if let Some(lookup) = self.cached_key(kid).await {
            return Ok(lookup);
        }

        let jwks = self.fetch_jwks(deadline).await?;
        let found = jwks.find(kid).cloned();
        let mut cache = self.cache.write().await;
        *cache = Some(CachedJwks {
            jwks,
            fetched_at: Instant::now(),
        });
        Ok(found)
    }

    /// Answer for `kid` from the cache, `None` when a refetch is due
    ///
    /// An unknown `kid` is answered as missing while the cached set is
    /// younger than [`MIN_JWKS_REFRESH_INTERVAL`].
    async fn cached_key(&self, kid: &str) -> Option<Option<Jwk>> {
        let cache = self.cache.read().await;
        let cached = cache.as_ref()?;
        let age = cached.fetched_at.elapsed();
        if age > self.cache_ttl {
            return None;
        }
        if let Some(jwk) = cached.jwks.find(kid) {
            return Some(Some(jwk.clone()));
        }
        if age < MIN_JWKS_REFRESH_INTERVAL {
            return Some(None);
        }
        None
    }

    /// Fetch JWKS from the auth origin
    async fn fetch_jwks(&self, deadline: Deadline) -> Result<Jwks, IdentityError> {
        let started = Instant::now();
        let result = deadline
            .run(async {
                let response = self
                    .client
                    .get(&self.jwks_url)
                    .send()
                    .await
                    .map_err(|e| IdentityError::Jwks(e.to_string()))?;

                if !response.status().is_success() {
                    return Err(IdentityError::Jwks(format!(
                        "HTTP {}: {}",
                        response.status(),
                        response.status().canonical_reason().unwrap_or("Unknown")
                    )));
                }

                response
                    .json::<Jwks>()
                    .await
                    .map_err(|e| IdentityError::Jwks(e.to_string()))
            })
            .await;

        metrics::record_provider_request("jwks", result.is_ok(), started.elapsed().as_secs_f64());
        match &result {
            Ok(jwks) => debug!(keys = jwks.keys.len(), "fetched Passage JWKS"),
            Err(e) => warn!(error = %e, "failed to fetch Passage JWKS"),
        }
        result
    }
}

#[async_trait]
impl IdentityProvider for PassageClient {
    async fn validate_request(
        &self,
        request: &AuthRequest,
        deadline: Deadline,
    ) -> Result<Option<String>, IdentityError> {
        let Some(token) = self.extract_token(request) else {
            debug!(source = ?self.token_source, "no Passage auth token on request");
            return Ok(None);
        };

        let header = match decode_header(&token) {
            Ok(header) => header,
            Err(e) => {
                debug!(error = %e, "malformed Passage auth token");
                return Ok(None);
            }
        };
        let Some(kid) = header.kid else {
            debug!("Passage auth token has no kid");
            return Ok(None);
        };

        let Some(jwk) = self.find_key(&kid, deadline).await? else {
            debug!(kid = %kid, "Passage auth token signed with unknown key");
            return Ok(None);
        };
        let decoding_key = jwk.to_decoding_key()?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.validate_exp = true;
        validation.validate_aud = false;

        match decode::<Claims>(&token, &decoding_key, &validation) {
            Ok(data) => Ok(Some(data.claims.sub)),
            Err(e) => {
                debug!(error = %e, "Passage auth token rejected");
                Ok(None)
            }
        }
    }

    async fn fetch_identity(
        &self,
        identity_id: &str,
        deadline: Deadline,
    ) -> Result<Option<IdentityRecord>, IdentityError> {
        let url = format!(
            "{}/{}",
            self.users_url,
            utf8_percent_encode(identity_id, PATH_SEGMENT)
        );

        let started = Instant::now();
        let result = deadline
            .run(async {
                let response = self
                    .client
                    .get(&url)
                    .bearer_auth(&self.api_key)
                    .send()
                    .await
                    .map_err(|e| IdentityError::Transport(e.to_string()))?;

                let status = response.status();
                if status == reqwest::StatusCode::NOT_FOUND {
                    return Ok(None);
                }
                if !status.is_success() {
                    let body = response.text().await.unwrap_or_default();
                    return Err(IdentityError::Status {
                        status: status.as_u16(),
                        body,
                    });
                }

                let body: UserResponse = response
                    .json()
                    .await
                    .map_err(|e| IdentityError::Decode(e.to_string()))?;
                Ok(Some(body.user))
            })
            .await;

        metrics::record_provider_request(
            "fetch_identity",
            result.is_ok(),
            started.elapsed().as_secs_f64(),
        );
        debug!(
            found = matches!(result, Ok(Some(_))),
            ok = result.is_ok(),
            "Passage user lookup finished"
        );
        result
    }
}
