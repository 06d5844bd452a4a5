//! Assertion Registry (C1, spec §4.1): shorthand parsing and the dispatch
//! table mapping assertion kinds to handlers.

use crate::combinator;
use crate::handlers;
use eval_common::{Assertion, AssertionKind, AssertionValue, ConfigError, GradingResult, Provider, ProviderResponse, ScriptRunner};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

/// Everything a handler or the combinator evaluator needs to grade one
/// assertion node. Borrows instead of the spec's positional tuple
/// `(output, outputString, vars, providerResponse, prompt, provider,
/// renderedValue, inverse)`; idiomatic translation of the same contract.
pub struct AssertionContext<'a> {
    pub response: &'a ProviderResponse,
    pub output_string: String,
    pub vars: &'a HashMap<String, Value>,
    pub prompt: &'a str,
    pub provider: Option<&'a dyn Provider>,
    pub embedder: Option<&'a dyn eval_common::Embedder>,
    pub grading_provider: Option<&'a dyn Provider>,
    pub script_runner: Option<&'a dyn ScriptRunner>,
    pub http: &'a reqwest::Client,
    pub cancelled: &'a dyn Fn() -> bool,
}

impl<'a> AssertionContext<'a> {
    pub fn is_cancelled(&self) -> bool {
        (self.cancelled)()
    }
}

pub type DispatchFuture<'a> = Pin<Box<dyn Future<Output = GradingResult> + Send + 'a>>;

/// Parses the shorthand grammar of spec §6.1:
/// `kind[(threshold)]:value | "fn:" js_expr | bare_string`.
pub fn parse(shorthand: &str) -> Result<Assertion, ConfigError> {
    if let Some(body) = shorthand.strip_prefix("fn:") {
        return Ok(Assertion::leaf(
            AssertionKind::Javascript,
            Some(AssertionValue::Text(body.to_string())),
        ));
    }

    let Some(colon) = shorthand.find(':') else {
        return Ok(Assertion::leaf(
            AssertionKind::Equals,
            Some(AssertionValue::Text(shorthand.to_string())),
        ));
    };

    let head = &shorthand[..colon];
    let value = &shorthand[colon + 1..];

    let (kind_token, threshold) = match (head.find('('), head.ends_with(')')) {
        (Some(open), true) => {
            let kind = &head[..open];
            let inner = &head[open + 1..head.len() - 1];
            let threshold: f64 = inner.parse().map_err(|_| ConfigError::InvalidValue {
                field: "threshold".into(),
                detail: format!("`{inner}` is not a number"),
            })?;
            (kind, Some(threshold))
        }
        _ => (head, None),
    };

    let Some(kind) = AssertionKind::from_str(kind_token) else {
        // Not a recognized `kind:` prefix at all; treat the whole string as
        // a bare `equals` literal, since `:` is also valid inside free text.
        return Ok(Assertion::leaf(
            AssertionKind::Equals,
            Some(AssertionValue::Text(shorthand.to_string())),
        ));
    };

    let assertion_value = match kind {
        AssertionKind::ContainsAny | AssertionKind::ContainsAll => AssertionValue::List(
            value.split(',').map(|s| s.trim().to_string()).collect(),
        ),
        _ => AssertionValue::Text(value.to_string()),
    };

    Ok(Assertion {
        kind: Some(kind),
        value: Some(assertion_value),
        threshold,
        ..Default::default()
    })
}

/// Dispatches one assertion node: combinators recurse through
/// [`combinator::evaluate`]; leaves go to [`handlers::evaluate`]. Never
/// panics; handler failures are folded into a failing leaf
/// `GradingResult` (spec §4.5's "assertion handler exception" rule).
pub fn dispatch<'a>(assertion: &'a Assertion, ctx: &'a AssertionContext<'a>) -> DispatchFuture<'a> {
    Box::pin(async move {
        let Some(kind) = assertion.kind else {
            return GradingResult::leaf(false, 0.0, "InvalidAssertionKind: missing `type`")
                .with_assertion(assertion.clone());
        };

        if assertion.is_zero_weight() {
            return GradingResult {
                pass: true,
                score: 1.0,
                reason: "Assertion has weight 0, skipping".to_string(),
                ..GradingResult::default()
            }
            .with_assertion(assertion.clone());
        }

        if ctx.is_cancelled() {
            return GradingResult::leaf(false, 0.0, "Cancelled").with_assertion(assertion.clone());
        }

        if kind.is_combinator() {
            combinator::evaluate(assertion, kind, ctx).await
        } else {
            handlers::evaluate(assertion, kind, ctx)
                .await
                .unwrap_or_else(|err| {
                    GradingResult::leaf(false, 0.0, err.to_string()).with_assertion(assertion.clone())
                })
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_string_as_equals() {
        let a = parse("Expected output").unwrap();
        assert_eq!(a.kind, Some(AssertionKind::Equals));
        assert_eq!(a.value.unwrap().as_text(), Some("Expected output"));
    }

    #[test]
    fn parses_fn_prefix_as_javascript() {
        let a = parse("fn:output === 'x'").unwrap();
        assert_eq!(a.kind, Some(AssertionKind::Javascript));
    }

    #[test]
    fn parses_kind_with_threshold() {
        let a = parse("similar(0.9):Paris").unwrap();
        assert_eq!(a.kind, Some(AssertionKind::Similar));
        assert_eq!(a.threshold, Some(0.9));
        assert_eq!(a.value.unwrap().as_text(), Some("Paris"));
    }

    #[test]
    fn parses_contains_any_as_comma_list() {
        let a = parse("contains-any:foo, bar,baz").unwrap();
        assert_eq!(a.value.unwrap().as_list(), vec!["foo", "bar", "baz"]);
    }

    #[test]
    fn parses_kind_without_threshold() {
        let a = parse("contains:foo").unwrap();
        assert_eq!(a.kind, Some(AssertionKind::Contains));
        assert_eq!(a.threshold, None);
    }
}
