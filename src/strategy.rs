//! Passage authentication strategy
//!
//! Drives one authentication attempt: validate the request's credential with
//! Passage, fetch the user behind it, normalize the profile and hand it to
//! the application's verify callback.
//!
//! # Example
//!
//! ```no_run
//! use passage_auth::auth::{AuthRequest, Outcome, Strategy};
//! use passage_auth::strategy::{verify_fn, PassageStrategy, Verdict};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let strategy = PassageStrategy::builder()
//!     .app_id("ABC123")
//!     .api_key("secret")
//!     .verify(verify_fn(|_request, user_id, _profile| async move {
//!         Ok(Verdict::user(user_id))
//!     }))
//!     .build()?;
//!
//! let request = AuthRequest::new("GET", "/").with_header("cookie", "psg_auth_token=...");
//! match strategy.authenticate(&request).await {
//!     Outcome::Success { user, .. } => println!("hello {}", user),
//!     other => println!("rejected with {}", other.http_status()),
//! }
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::auth::{AuthError, AuthInfo, AuthRequest, BoxError, Outcome, Strategy};
use crate::config::{Config, ConfigError, PassageConfig};
use crate::identity::{Deadline, IdentityProvider, PassageClient};
use crate::metrics;
use crate::profile::{normalize, Profile};

/// Name the strategy registers under
pub const STRATEGY_NAME: &str = "passage";

/// Fail message when the request carries no valid credential
pub const INVALID_TOKEN_MESSAGE: &str = "Invalid auth token";

/// Fail message when the credential's user no longer exists
pub const USER_NOT_FOUND_MESSAGE: &str = "User not found";

/// Status attached to an invalid-token failure
///
/// A missing user carries no status and leaves the choice to the host.
pub const INVALID_TOKEN_STATUS: u16 = 401;

/// Decision of the application's verify callback
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict<U> {
    pub user: Option<U>,
    pub info: Option<AuthInfo>,
}

impl<U> Verdict<U> {
    /// Accept the identity as `user`
    pub fn user(user: U) -> Self {
        Self {
            user: Some(user),
            info: None,
        }
    }

    pub fn user_with_info(user: U, info: AuthInfo) -> Self {
        Self {
            user: Some(user),
            info: Some(info),
        }
    }

    /// Decline the identity
    pub fn reject(info: Option<AuthInfo>) -> Self {
        Self { user: None, info }
    }
}

/// Application verification logic
///
/// Maps a resolved Passage identity to an application user, or declines it.
/// An `Err` becomes an [`Outcome::Error`].
#[async_trait]
pub trait Verify<U>: Send + Sync {
    async fn verify(
        &self,
        request: &AuthRequest,
        identity_id: &str,
        profile: Profile,
    ) -> Result<Verdict<U>, BoxError>;
}

/// [`Verify`] implemented by an async closure
pub struct VerifyFn<F>(F);

/// Wrap an async closure taking owned `(request, identity_id, profile)`
pub fn verify_fn<U, F, Fut>(f: F) -> VerifyFn<F>
where
    U: Send + 'static,
    F: Fn(AuthRequest, String, Profile) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Verdict<U>, BoxError>> + Send + 'static,
{
    VerifyFn(f)
}

#[async_trait]
impl<U, F, Fut> Verify<U> for VerifyFn<F>
where
    U: Send + 'static,
    F: Fn(AuthRequest, String, Profile) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Verdict<U>, BoxError>> + Send + 'static,
{
    async fn verify(
        &self,
        request: &AuthRequest,
        identity_id: &str,
        profile: Profile,
    ) -> Result<Verdict<U>, BoxError> {
        (self.0)(request.clone(), identity_id.to_string(), profile).await
    }
}

/// Passage authentication strategy
///
/// Long-lived and shareable; attempts hold no state beyond their own call.
pub struct PassageStrategy<U> {
    provider: Arc<dyn IdentityProvider>,
    verify: Arc<dyn Verify<U>>,
    deadline: Option<Duration>,
}

impl<U> Clone for PassageStrategy<U> {
    fn clone(&self) -> Self {
        Self {
            provider: Arc::clone(&self.provider),
            verify: Arc::clone(&self.verify),
            deadline: self.deadline,
        }
    }
}

/// Builder for [`PassageStrategy`]
pub struct PassageStrategyBuilder<U> {
    config: Option<PassageConfig>,
    app_id: Option<String>,
    api_key: Option<String>,
    provider: Option<Arc<dyn IdentityProvider>>,
    verify: Option<Arc<dyn Verify<U>>>,
    deadline: Option<Duration>,
}

impl<U> Default for PassageStrategyBuilder<U> {
    fn default() -> Self {
        Self {
            config: None,
            app_id: None,
            api_key: None,
            provider: None,
            verify: None,
            deadline: None,
        }
    }
}

impl<U: Send + 'static> PassageStrategyBuilder<U> {
    /// Start from a full Passage configuration
    pub fn config(mut self, config: PassageConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn app_id(mut self, app_id: impl Into<String>) -> Self {
        self.app_id = Some(app_id.into());
        self
    }

    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Use `provider` instead of a [`PassageClient`] built from the config
    pub fn provider(mut self, provider: impl IdentityProvider + 'static) -> Self {
        self.provider = Some(Arc::new(provider));
        self
    }

    pub fn verify(mut self, verify: impl Verify<U> + 'static) -> Self {
        self.verify = Some(Arc::new(verify));
        self
    }

    /// Bound every attempt's provider calls by `deadline`
    pub fn deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Build the strategy
    pub fn build(self) -> Result<PassageStrategy<U>, ConfigError> {
        let verify = self.verify.ok_or(ConfigError::MissingVerify)?;

        let mut config = self
            .config
            .unwrap_or_else(|| PassageConfig::new(String::new(), String::new()));
        if let Some(app_id) = self.app_id {
            config.app_id = app_id;
        }
        if let Some(api_key) = self.api_key {
            config.api_key = api_key;
        }
        config.validate()?;

        let provider: Arc<dyn IdentityProvider> = match self.provider {
            Some(provider) => provider,
            None => Arc::new(PassageClient::new(&config)?),
        };

        Ok(PassageStrategy {
            provider,
            verify,
            deadline: self.deadline,
        })
    }
}

impl<U: Send + 'static> PassageStrategy<U> {
    pub fn builder() -> PassageStrategyBuilder<U> {
        PassageStrategyBuilder::default()
    }

    /// Create a strategy from loaded configuration
    pub fn new(config: &Config, verify: impl Verify<U> + 'static) -> Result<Self, ConfigError> {
        let mut builder = Self::builder()
            .config(config.passage.clone())
            .verify(verify);
        if let Some(deadline) = config.authenticate.deadline() {
            builder = builder.deadline(deadline);
        }
        builder.build()
    }

    /// Authenticate `request`, bounding provider calls by `deadline`
    #[tracing::instrument(
        name = "auth.passage",
        skip_all,
        fields(
            auth.method = STRATEGY_NAME,
            auth.outcome = tracing::field::Empty,
            http.method = %request.method,
            http.path = %request.path
        )
    )]
    pub async fn authenticate_with_deadline(
        &self,
        request: &AuthRequest,
        deadline: Deadline,
    ) -> Outcome<U> {
        let outcome = self.attempt(request, deadline).await;

        tracing::Span::current().record("auth.outcome", outcome.kind());
        metrics::record_auth_outcome(outcome.kind());
        debug!(outcome = outcome.kind(), "Passage authentication finished");

        outcome
    }

    /// Fetch the user behind `identity_id` and normalize it into a [`Profile`]
    ///
    /// `Ok(None)` when the identity provider has no such user.
    pub async fn user_profile(
        &self,
        identity_id: &str,
        deadline: Deadline,
    ) -> Result<Option<Profile>, AuthError> {
        match self.provider.fetch_identity(identity_id, deadline).await? {
            Some(record) => Ok(Some(normalize(&record)?)),
            None => Ok(None),
        }
    }

    async fn attempt(&self, request: &AuthRequest, deadline: Deadline) -> Outcome<U> {
        let identity_id = match self.provider.validate_request(request, deadline).await {
            Ok(Some(identity_id)) => identity_id,
            Ok(None) => {
                return Outcome::Fail {
                    info: Some(AuthInfo::message(INVALID_TOKEN_MESSAGE)),
                    status: Some(INVALID_TOKEN_STATUS),
                }
            }
            Err(e) => return Outcome::Error(e.into()),
        };

        let profile = match self.user_profile(&identity_id, deadline).await {
            Ok(Some(profile)) => profile,
            Ok(None) => {
                return Outcome::Fail {
                    info: Some(AuthInfo::message(USER_NOT_FOUND_MESSAGE)),
                    status: None,
                }
            }
            Err(e) => return Outcome::Error(e),
        };

        let verdict = AssertUnwindSafe(self.verify.verify(request, &identity_id, profile))
            .catch_unwind()
            .await;

        match verdict {
            Ok(Ok(Verdict {
                user: Some(user),
                info,
            })) => Outcome::Success { user, info },
            Ok(Ok(Verdict { user: None, info })) => Outcome::Fail { info, status: None },
            Ok(Err(e)) => Outcome::Error(AuthError::Verify(e)),
            Err(panic) => Outcome::Error(AuthError::VerifyPanicked(panic_message(&*panic))),
        }
    }

    fn default_deadline(&self) -> Deadline {
        self.deadline.map(Deadline::after).unwrap_or_default()
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[async_trait]
impl<U: Send + 'static> Strategy for PassageStrategy<U> {
    type User = U;

    fn name(&self) -> &str {
        STRATEGY_NAME
    }

    async fn authenticate(&self, request: &AuthRequest) -> Outcome<U> {
        self.authenticate_with_deadline(request, self.default_deadline())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AcceptAll;

    #[async_trait]
    impl Verify<String> for AcceptAll {
        async fn verify(
            &self,
            _request: &AuthRequest,
            identity_id: &str,
            _profile: Profile,
        ) -> Result<Verdict<String>, BoxError> {
            Ok(Verdict::user(identity_id.to_string()))
        }
    }

    #[test]
    fn test_strategy_is_named_passage() {
        let strategy = PassageStrategy::builder()
            .app_id("ABC123")
            .api_key("secret")
            .verify(AcceptAll)
            .build()
            .unwrap();
        assert_eq!(strategy.name(), "passage");
    }

    #[test]
    fn test_build_without_verify_callback() {
        let result = PassageStrategy::<String>::builder()
            .app_id("ABC123")
            .api_key("secret")
            .build();
        let err = result.err().unwrap();
        assert_eq!(err.to_string(), "PassageStrategy requires a verify callback");
    }

    #[test]
    fn test_verify_callback_checked_before_credentials() {
        let result = PassageStrategy::<String>::builder().build();
        assert!(matches!(result, Err(ConfigError::MissingVerify)));
    }

    #[test]
    fn test_build_without_app_id() {
        let result = PassageStrategy::builder()
            .api_key("secret")
            .verify(AcceptAll)
            .build();
        let err = result.err().unwrap();
        assert_eq!(
            err.to_string(),
            "PassageStrategy requires an appID and apiKey option"
        );
    }

    #[test]
    fn test_build_without_api_key() {
        let result = PassageStrategy::builder()
            .app_id("ABC123")
            .verify(AcceptAll)
            .build();
        assert!(matches!(result, Err(ConfigError::MissingCredentials)));
    }

    #[test]
    fn test_new_from_config() {
        let config = crate::config::ConfigLoader::from_yaml(
            "passage:\n  app_id: ABC123\n  api_key: secret\nauthenticate:\n  deadline_millis: 250\n",
        )
        .unwrap();
        let strategy = PassageStrategy::new(&config, AcceptAll).unwrap();
        assert_eq!(strategy.deadline, Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_panic_message() {
        let panic: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_message(&*panic), "boom");
        let panic: Box<dyn std::any::Any + Send> = Box::new(String::from("kaboom"));
        assert_eq!(panic_message(&*panic), "kaboom");
    }

    struct NoIdentity;

    #[async_trait]
    impl IdentityProvider for NoIdentity {
        async fn validate_request(
            &self,
            _request: &AuthRequest,
            _deadline: Deadline,
        ) -> Result<Option<String>, crate::identity::IdentityError> {
            Ok(None)
        }

        async fn fetch_identity(
            &self,
            _identity_id: &str,
            _deadline: Deadline,
        ) -> Result<Option<crate::profile::IdentityRecord>, crate::identity::IdentityError> {
            Ok(None)
        }
    }

    /// Collects the fields of `auth.passage` spans
    #[derive(Clone, Default)]
    struct SpanFields(Arc<std::sync::Mutex<Vec<(String, String)>>>);

    struct FieldVisitor<'a>(&'a mut Vec<(String, String)>);

    impl tracing::field::Visit for FieldVisitor<'_> {
        fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
            self.0.push((field.name().to_string(), format!("{:?}", value)));
        }
    }

    impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for SpanFields {
        fn on_new_span(
            &self,
            attrs: &tracing::span::Attributes<'_>,
            _id: &tracing::span::Id,
            _ctx: tracing_subscriber::layer::Context<'_, S>,
        ) {
            if attrs.metadata().name() == "auth.passage" {
                let mut fields = self.0.lock().unwrap();
                attrs.record(&mut FieldVisitor(&mut fields));
            }
        }
    }

    #[tokio::test]
    async fn test_span_records_request_method_and_path() {
        use tracing_subscriber::layer::SubscriberExt;

        let fields = SpanFields::default();
        let _guard = tracing::subscriber::set_default(tracing_subscriber::registry().with(fields.clone()));

        let strategy = PassageStrategy::builder()
            .app_id("ABC123")
            .api_key("secret")
            .provider(NoIdentity)
            .verify(AcceptAll)
            .build()
            .unwrap();
        let outcome = strategy.authenticate(&AuthRequest::new("POST", "/session")).await;
        assert_eq!(outcome.kind(), "fail");

        let fields = fields.0.lock().unwrap();
        assert!(fields.contains(&("http.method".to_string(), "POST".to_string())));
        assert!(fields.contains(&("http.path".to_string(), "/session".to_string())));
    }
}
