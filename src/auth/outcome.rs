//! Terminal result of one authentication attempt

use super::{AuthError, AuthInfo};

/// Status a hosting framework applies to a fail outcome that carries none
const DEFAULT_FAIL_STATUS: u16 = 401;

/// Outcome of an authentication attempt
///
/// Exactly one outcome is produced per attempt.
#[derive(Debug)]
pub enum Outcome<U> {
    /// The request is authenticated as `user`
    Success { user: U, info: Option<AuthInfo> },

    /// The request is not authenticated
    ///
    /// `status` is only set when the strategy wants a specific status code.
    Fail {
        info: Option<AuthInfo>,
        status: Option<u16>,
    },

    /// Authentication could not be decided
    Error(AuthError),
}

/// Callback-style outcome reporting used by hosts that expect
/// `success`/`fail`/`error` signals instead of a return value.
pub trait Signals<U> {
    fn success(&mut self, user: U, info: Option<AuthInfo>);
    fn fail(&mut self, info: Option<AuthInfo>, status: Option<u16>);
    fn error(&mut self, cause: AuthError);
}

impl<U> Outcome<U> {
    /// Short label: `success`, `fail` or `error`
    pub fn kind(&self) -> &'static str {
        match self {
            Outcome::Success { .. } => "success",
            Outcome::Fail { .. } => "fail",
            Outcome::Error(_) => "error",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success { .. })
    }

    /// HTTP status a host would answer with
    pub fn http_status(&self) -> u16 {
        match self {
            Outcome::Success { .. } => 200,
            Outcome::Fail { status, .. } => status.unwrap_or(DEFAULT_FAIL_STATUS),
            Outcome::Error(_) => 500,
        }
    }

    /// Info attached to a success or fail outcome
    pub fn info(&self) -> Option<&AuthInfo> {
        match self {
            Outcome::Success { info, .. } | Outcome::Fail { info, .. } => info.as_ref(),
            Outcome::Error(_) => None,
        }
    }

    /// The authenticated user, if any
    pub fn into_user(self) -> Option<U> {
        match self {
            Outcome::Success { user, .. } => Some(user),
            _ => None,
        }
    }

    /// Report this outcome through exactly one signal
    pub fn signal<S: Signals<U> + ?Sized>(self, signals: &mut S) {
        match self {
            Outcome::Success { user, info } => signals.success(user, info),
            Outcome::Fail { info, status } => signals.fail(info, status),
            Outcome::Error(cause) => signals.error(cause),
        }
    }
}
