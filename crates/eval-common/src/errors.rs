//! Error taxonomy shared across the engine (spec §7). Mirrors the teacher's
//! `RunErrorKind`/`RunError` split (`errors/mod.rs`): a closed, classifiable
//! kind for programmatic handling, plus a `thiserror`-derived wrapper that
//! carries the human-readable detail.

use thiserror::Error;

/// Problems with the host-supplied configuration (spec §6.3's
/// `EvaluateOptions`, malformed suite structure caught before any provider
/// is called).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required field `{0}`")]
    MissingField(String),
    #[error("invalid value for `{field}`: {detail}")]
    InvalidValue { field: String, detail: String },
    #[error("unsupported URI scheme `{0}`")]
    UnsupportedScheme(String),
}

/// Classification of a provider failure, used to decide whether a retry is
/// worthwhile (spec §4.5/§7). Providers are opaque external collaborators
/// that may only ever hand back a `String`, so `classify` exists to turn
/// that string into one of these buckets the same way the teacher's
/// `legacy_classify_message` does for untyped errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    /// Worth retrying: rate limit, timeout, 5xx, connection reset.
    RateLimit,
    Timeout,
    ServerError,
    Network,
    /// Not worth retrying: bad request, auth failure, unknown model.
    InvalidRequest,
    Auth,
    /// Didn't match any known pattern.
    Unknown,
}

impl ProviderErrorKind {
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            Self::RateLimit | Self::Timeout | Self::ServerError | Self::Network
        )
    }

    /// Best-effort classification of a raw provider error string. Grounded
    /// in the teacher's `RunError::legacy_classify_message` string-sniffing
    /// fallback, used here because the `Provider` trait's `call` returns a
    /// plain `Option<String>` error rather than a typed error enum.
    pub fn classify(message: &str) -> Self {
        let lower = message.to_lowercase();
        if lower.contains("rate limit") || lower.contains("429") || lower.contains("too many requests")
        {
            Self::RateLimit
        } else if lower.contains("timed out") || lower.contains("timeout") || lower.contains("deadline")
        {
            Self::Timeout
        } else if lower.contains("500")
            || lower.contains("502")
            || lower.contains("503")
            || lower.contains("504")
            || lower.contains("internal server error")
            || lower.contains("bad gateway")
            || lower.contains("service unavailable")
        {
            Self::ServerError
        } else if lower.contains("connection reset")
            || lower.contains("connection refused")
            || lower.contains("dns")
            || lower.contains("network")
        {
            Self::Network
        } else if lower.contains("unauthorized")
            || lower.contains("401")
            || lower.contains("403")
            || lower.contains("forbidden")
            || lower.contains("invalid api key")
        {
            Self::Auth
        } else if lower.contains("400")
            || lower.contains("invalid request")
            || lower.contains("unknown model")
            || lower.contains("bad request")
        {
            Self::InvalidRequest
        } else {
            Self::Unknown
        }
    }
}

/// A provider call failed (spec §4.5: used to decide retry vs. give up).
#[derive(Debug, Error)]
#[error("provider `{provider}` failed ({kind:?}): {detail}")]
pub struct ProviderError {
    pub provider: String,
    pub kind: ProviderErrorKind,
    pub detail: String,
}

impl ProviderError {
    pub fn from_message(provider: impl Into<String>, detail: impl Into<String>) -> Self {
        let detail = detail.into();
        let kind = ProviderErrorKind::classify(&detail);
        Self {
            provider: provider.into(),
            kind,
            detail,
        }
    }
}

/// An assertion handler could not be evaluated at all (distinct from a
/// handler that ran and returned `pass: false`; spec §4.2's "never panics,
/// converts internal errors into a failing GradingResult" contract relies on
/// this being caught and folded into a leaf result, not propagated raw).
#[derive(Debug, Error)]
pub enum AssertionError {
    #[error("assertion `{kind}` requires a `value`")]
    MissingValue { kind: String },
    #[error("assertion `{kind}` has malformed config: {detail}")]
    MalformedConfig { kind: String, detail: String },
    #[error("regex `{pattern}` failed to compile: {detail}")]
    InvalidRegex { pattern: String, detail: String },
    #[error("external script failed: {0}")]
    Script(#[from] ExternalScriptError),
    #[error("webhook call failed: {0}")]
    Webhook(String),
    #[error("grading sub-provider call failed: {0}")]
    Judge(String),
}

/// A `javascript`/`python` assertion body failed outside the engine's
/// control (spec §6.4).
#[derive(Debug, Error)]
pub enum ExternalScriptError {
    #[error("script runner not configured for this test run")]
    NoRunnerConfigured,
    #[error("script raised an exception: {0}")]
    Raised(String),
    #[error("script returned a value that could not be interpreted as a result: {0}")]
    UnparsableResult(String),
}

/// Top-level error type for anything the engine surfaces to its caller
/// outside a `GradingResult` (suite-level setup failures, scheduler
/// failures); mirrors the teacher's split between a typed `RunError` for
/// classification and `anyhow::Error` for ordinary propagation.
#[derive(Debug, Error)]
pub enum EvalError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Assertion(#[from] AssertionError),
    #[error("evaluation run was cancelled")]
    Cancelled,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_rate_limit() {
        assert_eq!(
            ProviderErrorKind::classify("429 Too Many Requests"),
            ProviderErrorKind::RateLimit
        );
    }

    #[test]
    fn classify_timeout() {
        assert_eq!(
            ProviderErrorKind::classify("request timed out after 30s"),
            ProviderErrorKind::Timeout
        );
    }

    #[test]
    fn classify_server_error_is_transient() {
        let kind = ProviderErrorKind::classify("502 Bad Gateway");
        assert_eq!(kind, ProviderErrorKind::ServerError);
        assert!(kind.is_transient());
    }

    #[test]
    fn classify_auth_is_not_transient() {
        let kind = ProviderErrorKind::classify("401 Unauthorized: invalid api key");
        assert_eq!(kind, ProviderErrorKind::Auth);
        assert!(!kind.is_transient());
    }

    #[test]
    fn classify_unknown_message_falls_back() {
        assert_eq!(
            ProviderErrorKind::classify("the model said something weird"),
            ProviderErrorKind::Unknown
        );
    }
}
