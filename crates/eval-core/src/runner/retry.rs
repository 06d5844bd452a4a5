//! Retry policy (spec §4.5 item 3): classifies a provider error message as
//! retryable or terminal. Reuses [`eval_common::ProviderErrorKind::classify`]
//! rather than re-implementing the string-sniffing heuristic; grounded in
//! the teacher's `RunError::legacy_classify_message`, which the same error
//! taxonomy module already generalizes.

use eval_common::ProviderErrorKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryDecision {
    pub kind: ProviderErrorKind,
    pub is_retryable: bool,
}

pub fn classify_retry(error_message: &str) -> RetryDecision {
    let kind = ProviderErrorKind::classify(error_message);
    RetryDecision {
        kind,
        is_retryable: kind.is_transient(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_is_retryable() {
        let d = classify_retry("429 Too Many Requests: rate limit exceeded");
        assert_eq!(d.kind, ProviderErrorKind::RateLimit);
        assert!(d.is_retryable);
    }

    #[test]
    fn auth_failure_is_not_retryable() {
        let d = classify_retry("401 Unauthorized: invalid api key");
        assert_eq!(d.kind, ProviderErrorKind::Auth);
        assert!(!d.is_retryable);
    }

    #[test]
    fn timeout_is_retryable() {
        let d = classify_retry("request timed out after 30s");
        assert_eq!(d.kind, ProviderErrorKind::Timeout);
        assert!(d.is_retryable);
    }
}
