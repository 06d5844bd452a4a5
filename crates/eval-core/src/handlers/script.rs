//! `javascript` / `python` (spec §4.2, §6.4): the inline body or `file://`
//! reference is forwarded verbatim to the host's [`ScriptRunner`]; the
//! core never loads or interprets script code itself (spec §9's "External
//! scripts & dynamic dispatch" design note). What we do own is the return
//! value coercion table: bool → pass/1-or-0, number → threshold comparison,
//! object → pass through the runner's own pass/score/reason.

use super::Verdict;
use crate::registry::AssertionContext;
use eval_common::{Assertion, AssertionError, CallContext, ScriptOutcome};

pub(super) async fn javascript(assertion: &Assertion, ctx: &AssertionContext<'_>) -> anyhow::Result<Verdict> {
    run(assertion, ctx, ScriptLang::Javascript).await
}

pub(super) async fn python(assertion: &Assertion, ctx: &AssertionContext<'_>) -> anyhow::Result<Verdict> {
    run(assertion, ctx, ScriptLang::Python).await
}

enum ScriptLang {
    Javascript,
    Python,
}

async fn run(assertion: &Assertion, ctx: &AssertionContext<'_>, lang: ScriptLang) -> anyhow::Result<Verdict> {
    let kind_name = match lang {
        ScriptLang::Javascript => "javascript",
        ScriptLang::Python => "python",
    };
    let body = assertion
        .value
        .as_ref()
        .and_then(|v| v.as_text())
        .ok_or_else(|| AssertionError::MissingValue {
            kind: kind_name.to_string(),
        })?;

    let Some(runner) = ctx.script_runner else {
        return Err(AssertionError::Script(eval_common::ExternalScriptError::NoRunnerConfigured).into());
    };

    let output_json = match ctx.response.output {
        eval_common::ProviderOutput::Structured(ref v) => v.clone(),
        eval_common::ProviderOutput::Text(ref s) => serde_json::Value::String(s.clone()),
    };
    let call_ctx = CallContext {
        vars: ctx.vars.clone(),
        options: serde_json::Value::Null,
    };

    let outcome = match lang {
        ScriptLang::Javascript => runner.run_javascript(body, &output_json, &call_ctx).await,
        ScriptLang::Python => runner.run_python(body, &output_json, &call_ctx).await,
    }
    .map_err(|e| AssertionError::Script(eval_common::ExternalScriptError::Raised(e.to_string())))?;

    coerce(outcome, assertion.threshold)
}

fn coerce(outcome: ScriptOutcome, threshold: Option<f64>) -> anyhow::Result<Verdict> {
    let reason = outcome
        .reason
        .clone()
        .unwrap_or_else(|| "Script assertion".to_string());

    match (outcome.pass, outcome.score) {
        (Some(pass), None) => {
            let score = if pass { 1.0 } else { 0.0 };
            let mut v = Verdict::new(pass, score, reason);
            v.tokens_used = outcome.token_usage;
            Ok(v)
        }
        (None, Some(score)) => {
            let threshold = threshold.unwrap_or(0.5);
            let pass = score >= threshold;
            let mut v = Verdict::new(pass, score, reason);
            v.tokens_used = outcome.token_usage;
            Ok(v)
        }
        (Some(pass), Some(score)) => {
            let mut v = Verdict::new(pass, score, reason);
            v.tokens_used = outcome.token_usage;
            Ok(v)
        }
        (None, None) => Err(eval_common::ExternalScriptError::UnparsableResult(
            "script returned neither a boolean nor a numeric score".to_string(),
        )
        .into()),
    }
}
