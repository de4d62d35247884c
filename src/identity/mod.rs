//! Identity provider boundary
//!
//! The orchestrator only needs two capabilities from the remote identity
//! service: resolve the credential on a request to an identity id, and fetch
//! the user record behind an id. [`passage::PassageClient`] is the production
//! implementation; tests substitute their own.

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

use crate::auth::AuthRequest;
use crate::profile::IdentityRecord;

pub mod passage;

pub use passage::PassageClient;

/// Identity provider errors
///
/// These are transport or internal failures. "No identity" and "not found"
/// are `Ok(None)`, not errors.
#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("Identity provider request failed: {0}")]
    Transport(String),

    #[error("Identity provider returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Failed to decode identity provider response: {0}")]
    Decode(String),

    #[error("JWKS error: {0}")]
    Jwks(String),

    #[error("Identity provider deadline exceeded")]
    DeadlineExceeded,

    #[error("Invalid identity provider configuration: {0}")]
    Config(String),
}

/// Point in time by which a provider call has to complete
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Deadline(Option<Instant>);

impl Deadline {
    /// No deadline; the provider's own timeouts apply
    pub fn none() -> Self {
        Self(None)
    }

    pub fn at(instant: Instant) -> Self {
        Self(Some(instant))
    }

    pub fn after(timeout: Duration) -> Self {
        Self(Some(Instant::now() + timeout))
    }

    pub fn instant(&self) -> Option<Instant> {
        self.0
    }

    pub fn is_expired(&self) -> bool {
        self.0.is_some_and(|instant| instant <= Instant::now())
    }

    /// Time left before the deadline, `None` when unbounded
    pub fn remaining(&self) -> Option<Duration> {
        self.0
            .map(|instant| instant.saturating_duration_since(Instant::now()))
    }

    /// Run `fut` to completion or until the deadline passes
    pub async fn run<F, T>(&self, fut: F) -> Result<T, IdentityError>
    where
        F: Future<Output = Result<T, IdentityError>>,
    {
        if self.is_expired() {
            return Err(IdentityError::DeadlineExceeded);
        }
        match self.0 {
            Some(instant) => tokio::time::timeout_at(instant, fut)
                .await
                .map_err(|_| IdentityError::DeadlineExceeded)?,
            None => fut.await,
        }
    }
}

/// Remote identity provider
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Resolve the credential on `request` to an identity id
    ///
    /// Returns `Ok(None)` when the credential is missing, expired or invalid.
    async fn validate_request(
        &self,
        request: &AuthRequest,
        deadline: Deadline,
    ) -> Result<Option<String>, IdentityError>;

    /// Fetch the identity record for `identity_id`
    ///
    /// Returns `Ok(None)` when no such identity exists.
    async fn fetch_identity(
        &self,
        identity_id: &str,
        deadline: Deadline,
    ) -> Result<Option<IdentityRecord>, IdentityError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_deadline_none_runs_to_completion() {
        let result = Deadline::none().run(async { Ok::<_, IdentityError>(7) }).await;
        assert_eq!(result.unwrap(), 7);
        assert!(Deadline::none().remaining().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_elapses() {
        let deadline = Deadline::after(Duration::from_millis(50));
        let result = deadline
            .run(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, IdentityError>(())
            })
            .await;
        assert!(matches!(result, Err(IdentityError::DeadlineExceeded)));
        assert!(deadline.is_expired());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_deadline_skips_the_call() {
        let deadline = Deadline::after(Duration::from_millis(10));
        tokio::time::advance(Duration::from_millis(20)).await;

        let polled = std::sync::atomic::AtomicBool::new(false);
        let result = deadline
            .run(async {
                polled.store(true, std::sync::atomic::Ordering::SeqCst);
                Ok::<_, IdentityError>(())
            })
            .await;
        assert!(matches!(result, Err(IdentityError::DeadlineExceeded)));
        assert!(!polled.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[test]
    fn test_deadline_remaining() {
        tokio_test::block_on(async {
            let deadline = Deadline::after(Duration::from_secs(60));
            let remaining = deadline.remaining().unwrap();
            assert!(remaining <= Duration::from_secs(60));
            assert!(remaining > Duration::from_secs(59));
            assert!(!deadline.is_expired());
        });
    }
}
