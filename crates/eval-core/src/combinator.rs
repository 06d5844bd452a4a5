//! Combinator / AssertSet Evaluator (C3, spec §4.3).

use crate::metric::render_metric;
use crate::registry::{self, AssertionContext};
use eval_common::{Assertion, AssertionKind, GradingResult};
use serde_json::Value;

/// Evaluates an `and`/`or`/`assert-set` node. `assertion.assert` holds the
/// ordered children; short-circuit and threshold semantics per kind are
/// implemented literally from spec §4.3.
pub async fn evaluate<'a>(
    assertion: &'a Assertion,
    kind: AssertionKind,
    ctx: &'a AssertionContext<'a>,
) -> GradingResult {
    let children = merge_config_into_children(assertion);

    match kind {
        AssertionKind::And => evaluate_and(assertion, &children, ctx).await,
        AssertionKind::Or => evaluate_or(assertion, &children, ctx).await,
        AssertionKind::AssertSet => evaluate_assert_set(assertion, &children, ctx).await,
        _ => unreachable!("evaluate() only called for combinator kinds"),
    }
}

/// Shallow-merges `parent.config` into each child's `config` (child wins),
/// per spec §4.3's "Config inheritance" paragraph.
fn merge_config_into_children(parent: &Assertion) -> Vec<Assertion> {
    parent
        .assert
        .iter()
        .map(|child| {
            let mut merged = child.clone();
            for (k, v) in &parent.config {
                merged.config.entry(k.clone()).or_insert_with(|| v.clone());
            }
            merged
        })
        .collect()
}

async fn run_child<'a>(
    kind: AssertionKind,
    index: usize,
    child: &'a Assertion,
    ctx: &'a AssertionContext<'a>,
    namespaced: bool,
) -> GradingResult {
    let mut result = registry::dispatch(child, ctx).await;
    if namespaced {
        namespace_named_scores(&mut result, kind, index);
    }
    result
}

fn namespace_named_scores(result: &mut GradingResult, kind: AssertionKind, index: usize) {
    let prefix = format!("{}[{}].", kind.as_str(), index);
    let renamed: std::collections::HashMap<String, f64> = result
        .named_scores
        .drain()
        .map(|(k, v)| (format!("{prefix}{k}"), v))
        .collect();
    result.named_scores = renamed;
}

fn weighted_average(results: &[GradingResult], weights: &[f64]) -> f64 {
    let total_weight: f64 = weights.iter().sum();
    if total_weight <= 0.0 {
        return 1.0;
    }
    let sum: f64 = results
        .iter()
        .zip(weights)
        .map(|(r, w)| r.score * w)
        .sum();
    (sum / total_weight).clamp(0.0, 1.0)
}

fn self_metric_entry(assertion: &Assertion, vars: &std::collections::HashMap<String, Value>, score: f64) -> Option<(String, f64)> {
    let template = assertion.metric.as_ref()?;
    let name = render_metric(template, vars);
    if name.is_empty() {
        None
    } else {
        Some((name, score))
    }
}

fn assemble(
    assertion: &Assertion,
    pass: bool,
    score: f64,
    reason: String,
    children: Vec<GradingResult>,
    executed: usize,
    skipped: usize,
    ctx: &AssertionContext<'_>,
) -> GradingResult {
    let mut named_scores = std::collections::HashMap::new();
    for child in &children {
        for (k, v) in &child.named_scores {
            named_scores.insert(k.clone(), *v);
        }
    }
    if let Some((name, s)) = self_metric_entry(assertion, ctx.vars, score) {
        named_scores.insert(name, s);
    }

    let tokens_used = children.iter().map(|c| c.tokens_used).sum();

    GradingResult {
        pass,
        score: score.clamp(0.0, 1.0),
        reason,
        named_scores,
        tokens_used,
        component_results: children,
        assertion: Some(assertion.clone()),
        metadata: serde_json::json!({ "executedCount": executed, "skippedCount": skipped }),
    }
}

async fn evaluate_and<'a>(
    assertion: &'a Assertion,
    children: &'a [Assertion],
    ctx: &'a AssertionContext<'a>,
) -> GradingResult {
    let has_threshold = assertion.threshold.is_some();
    let short_circuit = assertion.short_circuit.unwrap_or(true) && !has_threshold;

    let mut results = Vec::with_capacity(children.len());
    let mut weights = Vec::with_capacity(children.len());
    let mut executed = 0usize;
    let mut short_circuited_on_fail = false;

    for (i, child) in children.iter().enumerate() {
        let result = run_child(AssertionKind::And, i, child, ctx, true).await;
        let weight = child.effective_weight();
        executed += 1;
        let failed = !result.pass;
        weights.push(weight);
        results.push(result);
        if failed && short_circuit {
            short_circuited_on_fail = true;
            break;
        }
    }

    let skipped = children.len() - executed;
    let avg = weighted_average(&results, &weights);
    let all_pass = !short_circuited_on_fail && results.iter().all(|r| r.pass);

    let (pass, reason) = match assertion.threshold {
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
                results
                    .last()
                    .map(|r| r.reason.clone())
                    .unwrap_or_else(|| "Assertion failed".to_string())
            };
            (all_pass, reason)
        }
    };

    assemble(assertion, pass, avg, reason, results, executed, skipped, ctx)
}

async fn evaluate_or<'a>(
    assertion: &'a Assertion,
    children: &'a [Assertion],
    ctx: &'a AssertionContext<'a>,
) -> GradingResult {
    let has_threshold = assertion.threshold.is_some();
    let short_circuit = assertion.short_circuit.unwrap_or(true) && !has_threshold;

    let mut results = Vec::with_capacity(children.len());
    let mut weights = Vec::with_capacity(children.len());
    let mut executed = 0usize;
    let mut short_circuited_on_pass = false;

    for (i, child) in children.iter().enumerate() {
        let result = run_child(AssertionKind::Or, i, child, ctx, true).await;
        let weight = child.effective_weight();
        executed += 1;
        let passed = result.pass;
        weights.push(weight);
        results.push(result);
        if passed && short_circuit && weight > 0.0 {
            short_circuited_on_pass = true;
            break;
        }
    }

    let skipped = children.len() - executed;
    let max_score = results.iter().map(|r| r.score).fold(0.0_f64, f64::max);
    let avg = weighted_average(&results, &weights);

    let (score, pass, reason) = if let Some(threshold) = assertion.threshold {
        let pass = avg >= threshold;
        let reason = if pass {
            format!("Aggregate score {avg:.2} \u{2265} {threshold} threshold")
        } else {
            format!("Aggregate score {avg:.2} < {threshold} threshold")
        };
        (avg, pass, reason)
    } else {
        let pass = short_circuited_on_pass || max_score > 0.0;
        let reason = if pass {
            "At least one assertion passed".to_string()
        } else {
            results
                .last()
                .map(|r| r.reason.clone())
                .unwrap_or_else(|| "No assertions passed".to_string())
        };
        (max_score, pass, reason)
    };

    assemble(assertion, pass, score, reason, results, executed, skipped, ctx)
}

async fn evaluate_assert_set<'a>(
    assertion: &'a Assertion,
    children: &'a [Assertion],
    ctx: &'a AssertionContext<'a>,
) -> GradingResult {
    let mut results = Vec::with_capacity(children.len());
    let mut weights = Vec::with_capacity(children.len());

    for child in children.iter() {
        let result = registry::dispatch(child, ctx).await;
        weights.push(child.effective_weight());
        results.push(result);
    }

    let executed = children.len();
    let avg = weighted_average(&results, &weights);
    let threshold = assertion.threshold.unwrap_or(1.0);
    let pass = avg >= threshold;
    let reason = if pass {
        format!("Aggregate score {avg:.2} \u{2265} {threshold} threshold")
    } else {
        format!("Aggregate score {avg:.2} < {threshold} threshold")
    };

    assemble(assertion, pass, avg, reason, results, executed, 0, ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use eval_common::{AssertionValue, ProviderOutput, ProviderResponse, TokenUsage};
    use std::collections::HashMap;

    fn ctx<'a>(
        response: &'a ProviderResponse,
        vars: &'a HashMap<String, Value>,
        http: &'a reqwest::Client,
    ) -> AssertionContext<'a> {
        AssertionContext {
            response,
            output_string: response.output.as_display_string(),
            vars,
            prompt: "",
            provider: None,
            embedder: None,
            grading_provider: None,
            script_runner: None,
            http,
            cancelled: &|| false,
        }
    }

    fn contains(value: &str) -> Assertion {
        Assertion::leaf(AssertionKind::Contains, Some(AssertionValue::Text(value.to_string())))
    }

    fn response(text: &str) -> ProviderResponse {
        ProviderResponse {
            output: ProviderOutput::Text(text.to_string()),
            error: None,
            retryable: None,
            token_usage: TokenUsage::default(),
            cost: 0.0,
            latency_ms: 0.0,
            metadata: Value::Null,
        }
    }

    #[tokio::test]
    async fn or_short_circuits_and_reports_skipped() {
        let resp = response("test output Paris");
        let vars = HashMap::new();
        let http = reqwest::Client::new();
        let c = ctx(&resp, &vars, &http);

        let assertion = Assertion {
            kind: Some(AssertionKind::Or),
            assert: vec![contains("test"), contains("Paris")],
            ..Default::default()
        };

        let result = evaluate(&assertion, AssertionKind::Or, &c).await;
        assert!(result.pass);
        assert_eq!(result.score, 1.0);
        assert_eq!(result.component_results.len(), 1);
        assert_eq!(result.metadata["skippedCount"], 1);
    }

    #[tokio::test]
    async fn zero_weight_leading_child_does_not_short_circuit_or() {
        let resp = response("test output Paris");
        let vars = HashMap::new();
        let http = reqwest::Client::new();
        let c = ctx(&resp, &vars, &http);

        let mut zero_weight_pass = contains("test");
        zero_weight_pass.weight = Some(0.0);

        let assertion = Assertion {
            kind: Some(AssertionKind::Or),
            assert: vec![zero_weight_pass, contains("nonexistent"), contains("Paris")],
            ..Default::default()
        };

        let result = evaluate(&assertion, AssertionKind::Or, &c).await;
        assert_eq!(result.metadata["executedCount"], 3);
        assert!(result.pass);
    }

    #[tokio::test]
    async fn and_with_threshold_disables_short_circuit() {
        let resp = response("test output");
        let vars = HashMap::new();
        let http = reqwest::Client::new();
        let c = ctx(&resp, &vars, &http);

        let assertion = Assertion {
            kind: Some(AssertionKind::And),
            assert: vec![contains("nonexistent"), contains("test")],
            threshold: Some(0.5),
            short_circuit: Some(true),
            ..Default::default()
        };

        let result = evaluate(&assertion, AssertionKind::And, &c).await;
        assert_eq!(result.metadata["executedCount"], 2);
        assert_eq!(result.metadata["skippedCount"], 0);
        assert!(result.pass);
    }

    #[tokio::test]
    async fn nested_metric_namespacing() {
        let resp = response("test output");
        let vars = HashMap::new();
        let http = reqwest::Client::new();
        let c = ctx(&resp, &vars, &http);

        let mut first = contains("test");
        first.metric = Some("first".to_string());
        let mut second = contains("output");
        second.metric = Some("second".to_string());

        let assertion = Assertion {
            kind: Some(AssertionKind::And),
            assert: vec![first, second],
            ..Default::default()
        };

        let result = evaluate(&assertion, AssertionKind::And, &c).await;
        assert_eq!(result.named_scores.get("and[0].first"), Some(&1.0));
        assert_eq!(result.named_scores.get("and[1].second"), Some(&1.0));
    }
}
