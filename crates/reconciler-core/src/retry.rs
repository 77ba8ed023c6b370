//! Retry policy and exponential backoff with jitter.
//!
//! Dispatches on the closed `ErrorKind` taxonomy from `crate::error`
//! instead of retrying blindly: transient and rate-limited failures
//! back off and retry, everything else surfaces immediately.

use crate::error::{Error, ErrorKind};
use rand::Rng;
use std::time::Duration;

pub const MAX_ATTEMPTS: u32 = 5;
const BASE_DELAY: Duration = Duration::from_secs(1);
const MAX_DELAY: Duration = Duration::from_secs(30);

/// What to do after a provider call failed.
pub enum RetryDecision {
    Retry(Duration),
    Surface,
}

/// Decide whether `error` on attempt number `attempt` (1-indexed) should
/// be retried, and with what delay.
///
/// - `Transient` and `RateLimited` retry up to `MAX_ATTEMPTS`.
/// - `RateLimited` honors the provider's `Retry-After` when present,
///   capped at `MAX_DELAY`.
/// - `Auth`, `NotFound`, `Conflict`, `Validation`, `Internal` surface
///   immediately — retrying a rejected payload or bad credential wastes
///   attempts without changing the outcome.
pub fn classify(error: &Error, attempt: u32) -> RetryDecision {
    let Some(kind) = error.kind() else {
        return RetryDecision::Surface;
    };
    if attempt >= MAX_ATTEMPTS {
        return RetryDecision::Surface;
    }
    match kind {
        ErrorKind::Transient => RetryDecision::Retry(backoff_with_jitter(attempt)),
        ErrorKind::RateLimited => {
            let delay = match error {
                Error::Provider {
                    retry_after: Some(d),
                    ..
                } => (*d).min(MAX_DELAY),
                _ => backoff_with_jitter(attempt),
            };
            RetryDecision::Retry(delay)
        }
        ErrorKind::Auth
        | ErrorKind::NotFound
        | ErrorKind::Conflict
        | ErrorKind::Validation
        | ErrorKind::Internal => RetryDecision::Surface,
    }
}

/// `base * 2^(attempt-1)`, capped at `MAX_DELAY`, with up to 20% jitter
/// added so a burst of simultaneous retries doesn't all land on the same
/// tick.
pub fn backoff_with_jitter(attempt: u32) -> Duration {
    let exp = attempt.saturating_sub(1).min(8);
    let scaled = BASE_DELAY.saturating_mul(1u32 << exp);
    let capped = scaled.min(MAX_DELAY);
    let jitter_ms = rand::thread_rng().gen_range(0..=(capped.as_millis() as u64 / 5).max(1));
    capped + Duration::from_millis(jitter_ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_errors_retry_until_max_attempts() {
        let err = Error::provider("cf", ErrorKind::Transient, "timeout");
        assert!(matches!(classify(&err, 1), RetryDecision::Retry(_)));
        assert!(matches!(classify(&err, MAX_ATTEMPTS), RetryDecision::Surface));
    }

    #[test]
    fn auth_errors_never_retry() {
        let err = Error::provider("cf", ErrorKind::Auth, "bad token");
        assert!(matches!(classify(&err, 1), RetryDecision::Surface));
    }

    #[test]
    fn rate_limited_honors_retry_after() {
        let err = Error::rate_limited("cf", "slow down", Some(Duration::from_secs(5)));
        match classify(&err, 1) {
            RetryDecision::Retry(d) => assert_eq!(d, Duration::from_secs(5)),
            RetryDecision::Surface => panic!("expected retry"),
        }
    }

    #[test]
    fn backoff_grows_and_caps() {
        let d1 = backoff_with_jitter(1);
        let d4 = backoff_with_jitter(4);
        let d10 = backoff_with_jitter(10);
        assert!(d1 < d4);
        assert!(d10 <= Duration::from_secs(30) + Duration::from_secs(6));
    }
}
