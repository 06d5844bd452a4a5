//! `webhook`: POSTs the output to an external URL and grades on its
//! response (spec §4.2, protocol in §6.5).

use super::Verdict;
use crate::registry::AssertionContext;
use eval_common::{Assertion, AssertionError};
use serde::Deserialize;
use serde_json::json;

#[derive(Deserialize)]
struct WebhookResponse {
    pass: bool,
    score: Option<f64>,
    reason: Option<String>,
}

pub(super) async fn webhook(assertion: &Assertion, ctx: &AssertionContext<'_>) -> anyhow::Result<Verdict> {
    let url = assertion
        .value
        .as_ref()
        .and_then(|v| v.as_text())
        .ok_or_else(|| AssertionError::MissingValue {
            kind: "webhook".to_string(),
        })?;

    let include_prompt = assertion
        .config
        .get("includePrompt")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    let include_metadata = assertion
        .config
        .get("includeMetadata")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    let mut body = json!({ "output": output_json(ctx) });
    if include_prompt {
        body["prompt"] = json!(ctx.prompt);
    }
    body["vars"] = serde_json::to_value(ctx.vars).unwrap_or(serde_json::Value::Null);
    if include_metadata {
        body["metadata"] = ctx.response.metadata.clone();
    }

    let resp = match ctx.http.post(url).json(&body).send().await {
        Ok(r) => r,
        Err(e) => return Ok(Verdict::new(false, 0.0, format!("Webhook error: {e}"))),
    };

    let status = resp.status();
    if !status.is_success() {
        return Ok(Verdict::new(
            false,
            0.0,
            format!("Webhook error: Webhook response status: {}", status.as_u16()),
        ));
    }

    let parsed: WebhookResponse = match resp.json().await {
        Ok(p) => p,
        Err(_) => {
            return Ok(Verdict::new(false, 0.0, "Webhook error: Invalid JSON response"));
        }
    };

    let score = parsed.score.unwrap_or(if parsed.pass { 1.0 } else { 0.0 });
    let reason = parsed
        .reason
        .unwrap_or_else(|| if parsed.pass { "Webhook passed".to_string() } else { "Webhook failed".to_string() });
    Ok(Verdict::new(parsed.pass, score, reason))
}

fn output_json(ctx: &AssertionContext<'_>) -> serde_json::Value {
    match ctx.response.output {
        eval_common::ProviderOutput::Structured(ref v) => v.clone(),
        eval_common::ProviderOutput::Text(ref s) => serde_json::Value::String(s.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eval_common::{AssertionValue, ProviderOutput, ProviderResponse, TokenUsage};
    use serde_json::Value;
    use std::collections::HashMap;

    fn ctx<'a>(resp: &'a ProviderResponse, vars: &'a HashMap<String, Value>, http: &'a reqwest::Client) -> AssertionContext<'a> {
        AssertionContext {
            response: resp,
            output_string: resp.output.as_display_string(),
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
    async fn missing_value_is_rejected() {
        let resp = response("hi");
        let vars = HashMap::new();
        let http = reqwest::Client::new();
        let c = ctx(&resp, &vars, &http);
        let a = Assertion::leaf(eval_common::AssertionKind::Webhook, None::<AssertionValue>);
        assert!(webhook(&a, &c).await.is_err());
    }
}
