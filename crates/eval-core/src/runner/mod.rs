//! Test Runner (C5, spec §4.5): per-`(prompt, provider, testCase,
//! repeatIndex)` orchestration; render, cache, call-with-retry, grade,
//! assemble. Grounded in the teacher's
//! `engine::runner::Runner::run_test_once`/`run_test_with_policy`/
//! `run_attempt_with_policy` split, re-pointed at this spec's
//! assertion-list/`GradingResult` semantics instead of the teacher's
//! single-`Metric`-list semantics.

mod retry;

pub use retry::{classify_retry, RetryDecision};

use crate::cache::{Cache, CacheKey};
use crate::config::EvaluateOptions;
use crate::metric::render_metric;
use crate::registry::{self, AssertionContext};
use eval_common::{
    AtomicTestCase, CallContext, Embedder, GradingResult, Provider, ProviderOutput, ProviderResponse,
    ScriptRunner, TokenUsage,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// One unit the scheduler dispatches (spec glossary: "Work item").
pub struct WorkItem {
    pub provider_index: usize,
    pub prompt_index: usize,
    pub test_index: usize,
    pub repeat_index: usize,
    pub prompt_template: String,
    pub test: AtomicTestCase,
    pub provider: Arc<dyn Provider>,
    pub provider_id: String,
}

/// Collaborators and options shared by every work item in a run.
pub struct RunnerDeps {
    pub cache: Arc<Cache>,
    pub embedder: Option<Arc<dyn Embedder>>,
    pub grading_provider: Option<Arc<dyn Provider>>,
    pub script_runner: Option<Arc<dyn ScriptRunner>>,
    pub http: reqwest::Client,
    pub options: EvaluateOptions,
    pub cancelled: Arc<AtomicBool>,
    pub config_version: String,
}

/// Renders `{{var}}` placeholders in a prompt template against test vars,
/// the same substitution rule as the metric renderer (spec §4.4/§4.9).
pub fn render_prompt(template: &str, vars: &HashMap<String, serde_json::Value>) -> String {
    render_metric(template, vars)
}

pub async fn run_item(item: &WorkItem, deps: &RunnerDeps) -> GradingResult {
    let rendered_prompt = render_prompt(&item.prompt_template, &item.test.vars);

    let bypass_cache = deps.options.bypasses_cache_for_repeats();
    let assertion_config = serde_json::Value::Array(
        item.test
            .assert
            .iter()
            .map(|a| serde_json::to_value(a).unwrap_or(serde_json::Value::Null))
            .collect(),
    );

    let (response, _cache_hit) = if deps.options.cache_enabled && !bypass_cache {
        let key = CacheKey::new(
            &item.provider_id,
            &rendered_prompt,
            &item.test.vars,
            &assertion_config,
            &deps.config_version,
        );
        let provider = item.provider.clone();
        let prompt_for_call = rendered_prompt.clone();
        let vars = item.test.vars.clone();
        let options = item.test.options.clone();
        let timeout = deps.options.timeout;
        let max_retries = deps.options.max_retries;
        deps.cache
            .get_or_compute(key, move || {
                Box::pin(call_with_retry(provider, prompt_for_call, vars, options, timeout, max_retries))
            })
            .await
    } else {
        let response = call_with_retry(
            item.provider.clone(),
            rendered_prompt.clone(),
            item.test.vars.clone(),
            item.test.options.clone(),
            deps.options.timeout,
            deps.options.max_retries,
        )
        .await;
        (response, false)
    };

    if let Some(error) = &response.error {
        return GradingResult {
            pass: false,
            score: 0.0,
            reason: error.clone(),
            named_scores: HashMap::new(),
            tokens_used: response.token_usage,
            component_results: Vec::new(),
            assertion: None,
            metadata: serde_json::Value::Null,
        };
    }

    let is_cancelled = deps.cancelled.clone();
    let cancelled_fn = move || is_cancelled.load(Ordering::Relaxed);
    let http = deps.http.clone();
    let ctx = AssertionContext {
        response: &response,
        output_string: response.output.as_display_string(),
        vars: &item.test.vars,
        prompt: &rendered_prompt,
        provider: Some(item.provider.as_ref()),
        embedder: deps.embedder.as_deref(),
        grading_provider: deps.grading_provider.as_deref(),
        script_runner: deps.script_runner.as_deref(),
        http: &http,
        cancelled: &cancelled_fn,
    };

    let mut component_results = Vec::with_capacity(item.test.assert.len());
    for assertion in &item.test.assert {
        let result = registry::dispatch(assertion, &ctx).await;
        component_results.push(result);
    }

    assemble_test_result(&item.test, component_results, response.token_usage)
}

/// Aggregates the top-level assertion list into the test case's overall
/// `GradingResult`, per spec §4.5 item 4's exact reason-string rules.
fn assemble_test_result(
    test: &AtomicTestCase,
    component_results: Vec<GradingResult>,
    provider_tokens: TokenUsage,
) -> GradingResult {
    if component_results.is_empty() {
        return GradingResult {
            pass: true,
            score: 1.0,
            reason: "All assertions passed".to_string(),
            named_scores: HashMap::new(),
            tokens_used: provider_tokens,
            component_results,
            assertion: None,
            metadata: serde_json::Value::Null,
        };
    }

    let all_pass = component_results.iter().all(|r| r.pass);
    let total_weight: f64 = component_results
        .iter()
        .map(|r| r.assertion.as_ref().map(|a| a.effective_weight()).unwrap_or(1.0))
        .sum();
    let weighted_sum: f64 = component_results
        .iter()
        .map(|r| r.score * r.assertion.as_ref().map(|a| a.effective_weight()).unwrap_or(1.0))
        .sum();
    let avg = if total_weight > 0.0 {
        (weighted_sum / total_weight).clamp(0.0, 1.0)
    } else {
        1.0
    };

    let (pass, reason) = match test.threshold {
        Some(threshold) => {
            let pass = all_pass && avg >= threshold;
            let reason = if pass {
                format!("Aggregate score {avg:.2} \u{2265} {threshold} threshold")
            } else {
                format!("Aggregate score {avg:.2} < {threshold} threshold")
            };
            (pass, reason)
        }
        None => {
            let reason = if all_pass {
                "All assertions passed".to_string()
            } else {
                component_results
                    .iter()
                    .find(|r| !r.pass)
                    .map(|r| r.reason.clone())
                    .unwrap_or_default()
            };
            (all_pass, reason)
        }
    };

    let mut named_scores = HashMap::new();
    for result in &component_results {
        for (k, v) in &result.named_scores {
            named_scores.insert(k.clone(), *v);
        }
    }

    let tokens_used: TokenUsage = component_results.iter().map(|r| r.tokens_used).sum::<TokenUsage>() + provider_tokens;

    GradingResult {
        pass,
        score: avg,
        reason,
        named_scores,
        tokens_used,
        component_results,
        assertion: None,
        metadata: serde_json::Value::Null,
    }
}

/// Calls the provider with a per-call timeout and retries transient
/// failures with exponential backoff, up to `max_retries` attempts (spec
/// §4.5 item 3, default cap 3).
async fn call_with_retry(
    provider: Arc<dyn Provider>,
    rendered_prompt: String,
    vars: HashMap<String, serde_json::Value>,
    options: serde_json::Value,
    timeout: Option<Duration>,
    max_retries: u32,
) -> ProviderResponse {
    let call_ctx = CallContext { vars, options };
    let mut attempt = 0u32;
    loop {
        let response = match timeout {
            Some(d) => match tokio::time::timeout(d, provider.call(&rendered_prompt, &call_ctx)).await {
                Ok(r) => r,
                Err(_) => {
                    return ProviderResponse {
                        output: ProviderOutput::default(),
                        error: Some(format!("Timeout after {}ms", d.as_millis())),
                        retryable: None,
                        token_usage: TokenUsage::default(),
                        cost: 0.0,
                        latency_ms: d.as_millis() as f64,
                        metadata: serde_json::Value::Null,
                    };
                }
            },
            None => provider.call(&rendered_prompt, &call_ctx).await,
        };

        let Some(error) = &response.error else {
            return response;
        };

        // A provider's own `retryable` signal wins over message-sniffing;
        // only fall back to `classify_retry` when the provider has no
        // opinion (spec §4.5 item 3's three independent triggers).
        let is_retryable = response.retryable.unwrap_or_else(|| classify_retry(error).is_retryable);
        if !is_retryable || attempt >= max_retries {
            if attempt > 0 {
                warn!(attempts = attempt + 1, %error, "provider call failed after retries");
            }
            return response;
        }

        attempt += 1;
        let base_ms = 100 * 2u64.pow(attempt.min(10));
        let jitter_ms = rand::random::<u64>() % (base_ms / 4 + 1);
        let backoff = Duration::from_millis(base_ms + jitter_ms);
        debug!(attempt, backoff_ms = backoff.as_millis(), %error, "retrying transient provider failure");
        tokio::time::sleep(backoff).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eval_common::{Assertion, AssertionKind, AssertionValue, GradingResult};

    fn leaf(pass: bool, score: f64, weight: Option<f64>) -> GradingResult {
        let assertion = Assertion {
            weight,
            ..Assertion::leaf(AssertionKind::Contains, Some(AssertionValue::Text("x".to_string())))
        };
        GradingResult::leaf(pass, score, "x").with_assertion(assertion)
    }

    #[test]
    fn aggregate_threshold_failure_reason_matches_literal_format() {
        let test = AtomicTestCase {
            threshold: Some(0.5),
            ..Default::default()
        };
        let components = vec![leaf(false, 0.0, Some(2.0)), leaf(true, 1.0, Some(1.0))];
        let result = assemble_test_result(&test, components, TokenUsage::default());
        assert!(!result.pass);
        assert_eq!(result.reason, "Aggregate score 0.33 < 0.5 threshold");
    }

    #[test]
    fn aggregate_threshold_pass_reason_matches_literal_format() {
        let test = AtomicTestCase {
            threshold: Some(0.25),
            ..Default::default()
        };
        let components = vec![leaf(false, 0.0, Some(2.0)), leaf(true, 1.0, Some(1.0))];
        let result = assemble_test_result(&test, components, TokenUsage::default());
        assert!(result.pass);
        assert_eq!(result.reason, "Aggregate score 0.33 \u{2265} 0.25 threshold");
    }

    #[test]
    fn no_threshold_all_pass_reports_all_assertions_passed() {
        let test = AtomicTestCase::default();
        let components = vec![leaf(true, 1.0, None), leaf(true, 1.0, None)];
        let result = assemble_test_result(&test, components, TokenUsage::default());
        assert!(result.pass);
        assert_eq!(result.reason, "All assertions passed");
    }

    struct FlakyProvider {
        calls: std::sync::atomic::AtomicU32,
    }

    #[async_trait::async_trait]
    impl Provider for FlakyProvider {
        fn id(&self) -> &str {
            "flaky"
        }

        async fn call(&self, prompt: &str, _ctx: &CallContext) -> ProviderResponse {
            let call_no = self.calls.fetch_add(1, Ordering::Relaxed);
            if call_no == 0 {
                ProviderResponse {
                    output: ProviderOutput::default(),
                    error: Some("vendor code E_BACKPRESSURE".to_string()),
                    retryable: Some(true),
                    token_usage: TokenUsage::default(),
                    cost: 0.0,
                    latency_ms: 0.0,
                    metadata: serde_json::Value::Null,
                }
            } else {
                ProviderResponse {
                    output: ProviderOutput::Text(prompt.to_string()),
                    error: None,
                    retryable: None,
                    token_usage: TokenUsage::default(),
                    cost: 0.0,
                    latency_ms: 0.0,
                    metadata: serde_json::Value::Null,
                }
            }
        }
    }

    #[tokio::test]
    async fn explicit_retryable_flag_overrides_message_classification() {
        // "vendor code E_BACKPRESSURE" matches none of `classify_retry`'s
        // known substrings, so only the response's own `retryable: true`
        // makes this retry.
        let provider = Arc::new(FlakyProvider { calls: std::sync::atomic::AtomicU32::new(0) });
        let response = call_with_retry(
            provider.clone(),
            "hi".to_string(),
            HashMap::new(),
            serde_json::Value::Null,
            None,
            3,
        )
        .await;
        assert!(response.error.is_none());
        assert_eq!(provider.calls.load(Ordering::Relaxed), 2);
    }
}
