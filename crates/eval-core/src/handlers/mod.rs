//! Assertion Handlers (C2, spec §4.2). Each submodule grades one family of
//! kinds and returns `(pass, score, reason)`; [`evaluate`] applies the
//! shared finishing touches every kind gets: the `not-` inverse flip
//! (flips only `pass`, per spec §4.2's `similar` paragraph generalized to
//! every inverted kind), metric-name rendering, and `GradingResult`
//! assembly.

mod html;
mod json;
mod rubric;
mod script;
mod similarity;
mod text;
mod tool_call;
mod webhook;

use crate::metric::render_metric;
use crate::registry::AssertionContext;
use eval_common::{Assertion, AssertionError, AssertionKind, GradingResult, TokenUsage};

/// One handler's raw verdict before inversion/metric-naming is applied.
pub(crate) struct Verdict {
    pub pass: bool,
    pub score: f64,
    pub reason: String,
    pub tokens_used: TokenUsage,
}

impl Verdict {
    pub(crate) fn new(pass: bool, score: f64, reason: impl Into<String>) -> Self {
        Self {
            pass,
            score: score.clamp(0.0, 1.0),
            reason: reason.into(),
            tokens_used: TokenUsage::default(),
        }
    }
}

pub async fn evaluate(
    assertion: &Assertion,
    kind: AssertionKind,
    ctx: &AssertionContext<'_>,
) -> anyhow::Result<GradingResult> {
    let base_kind = kind.base_kind();
    let verdict = dispatch_kind(assertion, base_kind, ctx).await?;

    let pass = if kind.is_inverse() {
        !verdict.pass
    } else {
        verdict.pass
    };

    let mut named_scores = std::collections::HashMap::new();
    if let Some(template) = &assertion.metric {
        let name = render_metric(template, ctx.vars);
        if !name.is_empty() {
            named_scores.insert(name, verdict.score);
        }
    }

    Ok(GradingResult {
        pass,
        score: verdict.score,
        reason: verdict.reason,
        named_scores,
        tokens_used: verdict.tokens_used,
        component_results: Vec::new(),
        assertion: Some(assertion.clone()),
        metadata: serde_json::Value::Null,
    })
}

async fn dispatch_kind(
    assertion: &Assertion,
    kind: AssertionKind,
    ctx: &AssertionContext<'_>,
) -> anyhow::Result<Verdict> {
    use AssertionKind::*;
    match kind {
        Equals => text::equals(assertion, ctx),
        Contains => text::contains(assertion, ctx, false),
        Icontains => text::contains(assertion, ctx, true),
        ContainsAny => text::contains_any(assertion, ctx, false),
        ContainsAll => text::contains_all(assertion, ctx, false),
        Regex => text::regex(assertion, ctx),
        StartsWith => text::starts_with(assertion, ctx),
        IsJson => json::is_json(assertion, ctx),
        ContainsJson => json::contains_json(assertion, ctx),
        IsHtml => html::is_html(ctx),
        ContainsHtml => html::contains_html(ctx),
        RougeN => text::rouge_n(assertion, ctx),
        ToolCallF1 => return tool_call::tool_call_f1(assertion, ctx),
        Similar => return similarity::similar(assertion, ctx).await,
        Webhook => return webhook::webhook(assertion, ctx).await,
        LlmRubric => return rubric::llm_rubric(assertion, ctx).await,
        Javascript => return script::javascript(assertion, ctx).await,
        Python => return script::python(assertion, ctx).await,
        other => Err(AssertionError::MalformedConfig {
            kind: other.as_str().to_string(),
            detail: "not a leaf assertion kind".to_string(),
        }
        .into()),
    }
}

