//! Retry policy
//!
//! A pure decision over (retries already spent, cancellation) made each
//! time the origin finds a result computed against a stale version.

use serde::{Deserialize, Serialize};

/// How many times a mismatched request is re-evaluated.
///
/// Serialized as `"no_retry"`, `{"max_retry": n}` or `"indefinite"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryPolicy {
    /// Fail on the first mismatch
    NoRetry,
    /// Re-evaluate at most `n` times
    MaxRetry(u32),
    /// Re-evaluate until versions converge or the request is cancelled.
    ///
    /// Converges only if writers eventually pause; there is no timeout.
    #[default]
    Indefinite,
}

/// Outcome of consulting a `RetryPolicy`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Start another attempt
    Retry,
    /// Stop and report the mismatch as terminal
    GiveUp,
}

impl RetryPolicy {
    /// Decide after a mismatch, given how many retries were already spent.
    ///
    /// Retry iff the request is not cancelled and `retries_spent` is below
    /// the maximum (always, for `Indefinite`).
    pub fn decide(&self, retries_spent: u32, cancelled: bool) -> RetryDecision {
        if cancelled {
            return RetryDecision::GiveUp;
        }
        let allowed = match self {
            RetryPolicy::NoRetry => false,
            RetryPolicy::MaxRetry(max) => retries_spent < *max,
            RetryPolicy::Indefinite => true,
        };
        if allowed {
            RetryDecision::Retry
        } else {
            RetryDecision::GiveUp
        }
    }

    /// Maximum number of retries, or None when unbounded
    pub fn max_retries(&self) -> Option<u32> {
        match self {
            RetryPolicy::NoRetry => Some(0),
            RetryPolicy::MaxRetry(max) => Some(*max),
            RetryPolicy::Indefinite => None,
        }
    }

    /// Policy name for log output
    pub fn name(&self) -> &'static str {
        match self {
            RetryPolicy::NoRetry => "no_retry",
            RetryPolicy::MaxRetry(_) => "max_retry",
            RetryPolicy::Indefinite => "indefinite",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_retry_always_gives_up() {
        assert_eq!(RetryPolicy::NoRetry.decide(0, false), RetryDecision::GiveUp);
    }

    #[test]
    fn test_max_retry_allows_exactly_n() {
        let policy = RetryPolicy::MaxRetry(2);
        assert_eq!(policy.decide(0, false), RetryDecision::Retry);
        assert_eq!(policy.decide(1, false), RetryDecision::Retry);
        assert_eq!(policy.decide(2, false), RetryDecision::GiveUp);
    }

    #[test]
    fn test_max_retry_zero_behaves_like_no_retry() {
        assert_eq!(RetryPolicy::MaxRetry(0).decide(0, false), RetryDecision::GiveUp);
    }

    #[test]
    fn test_indefinite_retries_until_cancelled() {
        let policy = RetryPolicy::Indefinite;
        assert_eq!(policy.decide(10_000, false), RetryDecision::Retry);
        assert_eq!(policy.decide(0, true), RetryDecision::GiveUp);
        assert_eq!(policy.max_retries(), None);
    }

    #[test]
    fn test_default_is_indefinite() {
        assert_eq!(RetryPolicy::default(), RetryPolicy::Indefinite);
    }

    #[test]
    fn test_serde_forms() {
        assert_eq!(serde_json::to_string(&RetryPolicy::NoRetry).unwrap(), "\"no_retry\"");
        assert_eq!(
            serde_json::to_string(&RetryPolicy::MaxRetry(3)).unwrap(),
            "{\"max_retry\":3}"
        );
        let back: RetryPolicy = serde_json::from_str("\"indefinite\"").unwrap();
        assert_eq!(back, RetryPolicy::Indefinite);
    }
}
