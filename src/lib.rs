//! Passage Auth Library
//!
//! Authentication strategy that delegates identity verification to Passage.
//!
//! # Features
//!
//! - **Token Validation**: Passage auth tokens from the `psg_auth_token`
//!   cookie or a Bearer header, verified against the app's JWKS
//! - **Profile Normalization**: Passage users mapped to a provider-neutral profile
//! - **Application Verify Callback**: Map identities to your own user records
//! - **Single Outcome**: Every attempt ends in exactly one success, fail or error
//!
//! # Example
//!
//! ```no_run
//! use passage_auth::{config::Config, Outcome, PassageStrategy, Strategy};
//! use passage_auth::strategy::{verify_fn, Verdict};
//! use passage_auth::auth::AuthRequest;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let strategy = PassageStrategy::new(
//!         &config,
//!         verify_fn(|_req, _id, profile| async move { Ok(Verdict::user(profile)) }),
//!     )?;
//!
//!     let request = AuthRequest::new("GET", "/").with_header("cookie", "psg_auth_token=...");
//!     if let Outcome::Success { user, .. } = strategy.authenticate(&request).await {
//!         println!("{}", user.display_name);
//!     }
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod config;
pub mod identity;
pub mod metrics;
pub mod profile;
pub mod strategy;

// Re-export commonly used types
pub use auth::{AuthError, AuthInfo, AuthRequest, Outcome, Signals, Strategy};
pub use config::Config;
pub use identity::{Deadline, IdentityProvider, PassageClient};
pub use profile::{normalize, IdentityRecord, Profile};
pub use strategy::{PassageStrategy, Verdict, Verify};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
