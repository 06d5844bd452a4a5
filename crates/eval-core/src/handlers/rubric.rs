//! `llm-rubric`: delegates grading to a sub-provider (the "grading
//! provider", itself an `eval_common::Provider`) that is asked to judge the
//! output against a rubric and return `{pass, score, reason}` JSON (spec
//! §4.2).

use super::Verdict;
use crate::registry::AssertionContext;
use eval_common::{Assertion, AssertionError, CallContext};
use serde::Deserialize;

const SYSTEM_PROMPT: &str = "You are grading an AI assistant's output against a rubric. \
Respond with a single JSON object: {\"pass\": boolean, \"score\": number between 0 and 1, \"reason\": string}.";

#[derive(Deserialize)]
struct JudgeVerdict {
    pass: bool,
    score: f64,
    reason: String,
}

pub(super) async fn llm_rubric(assertion: &Assertion, ctx: &AssertionContext<'_>) -> anyhow::Result<Verdict> {
    let rubric = assertion
        .value
        .as_ref()
        .and_then(|v| v.as_text())
        .ok_or_else(|| AssertionError::MissingValue {
            kind: "llm-rubric".to_string(),
        })?;

    let Some(judge) = ctx.grading_provider else {
        return Err(AssertionError::Judge("no grading provider configured for this run".to_string()).into());
    };

    let user_prompt = format!(
        "Rubric:\n{rubric}\n\nOutput under evaluation:\n{}",
        ctx.output_string
    );
    let prompt = format!("{SYSTEM_PROMPT}\n\n{user_prompt}");

    let call_ctx = CallContext {
        vars: ctx.vars.clone(),
        options: serde_json::Value::Null,
    };
    let response = judge.call(&prompt, &call_ctx).await;
    if let Some(err) = &response.error {
        return Err(AssertionError::Judge(err.clone()).into());
    }

    let text = response.output.as_display_string();
    let verdict = extract_first_json_object(&text)
        .ok_or_else(|| AssertionError::Judge("grading provider response did not contain JSON".to_string()))?;

    let mut result = Verdict::new(verdict.pass, verdict.score, verdict.reason);
    result.tokens_used = response.token_usage;
    Ok(result)
}

/// Grading providers often wrap the JSON in prose or a code fence; scan for
/// the first syntactically valid JSON object in the text, the way the
/// teacher's judge client does.
fn extract_first_json_object(text: &str) -> Option<JudgeVerdict> {
    let mut stream = serde_json::Deserializer::from_str(text).into_iter::<serde_json::Value>();
    if let Some(Ok(value)) = stream.next() {
        if let Ok(v) = serde_json::from_value(value) {
            return Some(v);
        }
    }
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&text[start..=end]).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_json_from_prose() {
        let text = "Sure, here is my verdict:\n{\"pass\": true, \"score\": 0.9, \"reason\": \"good\"}\nThanks.";
        let v = extract_first_json_object(text).unwrap();
        assert!(v.pass);
        assert_eq!(v.score, 0.9);
    }
}
