//! Error types for the DNS reconciliation engine
//!
//! Defines the closed error taxonomy the reconciler uses to decide
//! retry-vs-surface behavior (see the retry policy in `crate::retry`), plus
//! the ambient configuration/storage error variants every crate in the
//! workspace needs.

use std::time::Duration;
use thiserror::Error;

/// Result type alias for reconciler operations
pub type Result<T> = std::result::Result<T, Error>;

/// Closed taxonomy of provider-facing error kinds.
///
/// This is the kind set the retry policy dispatches on. It does not grow a
/// catch-all "unknown" variant — every provider adapter maps its wire
/// errors onto one of these before returning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// DNS/TCP/TLS failures, 5xx responses
    Transient,
    /// 401/403
    Auth,
    /// 404 on update/delete
    NotFound,
    /// 4xx "already exists" without a matching lookup
    Conflict,
    /// Provider rejected the payload
    Validation,
    /// 429, optionally carrying a `Retry-After`
    RateLimited,
    /// Bug or invariant violation
    Internal,
}

/// Core error type for the reconciliation engine
#[derive(Error, Debug)]
pub enum Error {
    /// Provider-facing error, tagged with the taxonomy kind that decides retry behavior
    #[error("provider error ({provider}, {kind:?}): {message}")]
    Provider {
        provider: String,
        kind: ErrorKind,
        message: String,
        retry_after: Option<Duration>,
    },

    /// Startup/config errors, outside the retry taxonomy
    #[error("configuration error: {0}")]
    Config(String),

    /// Tracker/persistence errors
    #[error("state store error: {0}")]
    StateStore(String),

    /// Label/hostname/spec validation errors
    #[error("validation error: {0}")]
    Validation(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn provider(
        provider: impl Into<String>,
        kind: ErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self::Provider {
            provider: provider.into(),
            kind,
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn rate_limited(
        provider: impl Into<String>,
        message: impl Into<String>,
        retry_after: Option<Duration>,
    ) -> Self {
        Self::Provider {
            provider: provider.into(),
            kind: ErrorKind::RateLimited,
            message: message.into(),
            retry_after,
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn state_store(msg: impl Into<String>) -> Self {
        Self::StateStore(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Provider {
            provider: "engine".to_string(),
            kind: ErrorKind::Internal,
            message: msg.into(),
            retry_after: None,
        }
    }

    /// The taxonomy kind this error maps to, where one applies.
    ///
    /// `Config`/`StateStore`/`Io`/`Json`/`Other` sit outside the
    /// provider-retry taxonomy and always surface.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Error::Provider { kind, .. } => Some(*kind),
            Error::Validation(_) => Some(ErrorKind::Validation),
            _ => None,
        }
    }

    /// Redact anything that looks like a bearer token or API key before an
    /// error message crosses a log or external boundary.
    pub fn redacted(&self) -> String {
        redact(&self.to_string())
    }
}

/// Replace bearer tokens / API-key query params with `<redacted>`.
pub fn redact(input: &str) -> String {
    let mut out = input.to_string();
    for marker in ["Bearer ", "token=", "api_token=", "Authorization: "] {
        if let Some(idx) = out.find(marker) {
            let start = idx + marker.len();
            let end = out[start..]
                .find(|c: char| c.is_whitespace() || c == '&' || c == '"')
                .map(|o| start + o)
                .unwrap_or(out.len());
            out.replace_range(start..end, "<redacted>");
        }
    }
    out
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redacts_bearer_token() {
        let msg = "request failed: Bearer sk-abc123 rejected";
        assert_eq!(redact(msg), "request failed: Bearer <redacted> rejected");
    }

    #[test]
    fn kind_roundtrip() {
        let e = Error::provider("cloudflare", ErrorKind::Auth, "bad token");
        assert_eq!(e.kind(), Some(ErrorKind::Auth));
        assert_eq!(Error::Config("x".into()).kind(), None);
    }
}
