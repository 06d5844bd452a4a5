//! `tool-call-f1`: set F1 of called tool names vs. expected (spec §4.2).
//! Tool calls are extracted from whatever shape the provider happened to
//! return them in; this module is grounded directly in the teacher's
//! `assay-metrics::tool_calls` best-effort extraction.

use super::Verdict;
use crate::registry::AssertionContext;
use eval_common::{Assertion, AssertionError, ProviderOutput};
use std::collections::HashSet;

pub(super) fn tool_call_f1(assertion: &Assertion, ctx: &AssertionContext<'_>) -> anyhow::Result<Verdict> {
    let expected = assertion
        .value
        .as_ref()
        .map(|v| v.as_list())
        .unwrap_or_default();
    if expected.is_empty() {
        return Err(AssertionError::MissingValue {
            kind: "tool-call-f1".to_string(),
        }
        .into());
    }
    let expected: HashSet<String> = expected.into_iter().collect();

    let actual = extract_tool_names(&ctx.response.output);
    let threshold = assertion.threshold.unwrap_or(1.0);

    let f1 = set_f1(&actual, &expected);
    let pass = f1 >= threshold;
    let reason = format!(
        "Tool-call F1 {f1:.2} against expected {{{}}}",
        {
            let mut names: Vec<&String> = expected.iter().collect();
            names.sort();
            names
                .iter()
                .map(|s| s.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        }
    );
    Ok(Verdict::new(pass, f1, reason))
}

fn set_f1(actual: &HashSet<String>, expected: &HashSet<String>) -> f64 {
    if actual.is_empty() || expected.is_empty() {
        return 0.0;
    }
    let overlap = actual.intersection(expected).count() as f64;
    if overlap == 0.0 {
        return 0.0;
    }
    let precision = overlap / actual.len() as f64;
    let recall = overlap / expected.len() as f64;
    2.0 * precision * recall / (precision + recall)
}

/// Extracts called tool names from any of the provider response shapes the
/// spec names: OpenAI `tool_calls[].function.name`, Anthropic `tool_use`
/// blocks, Google `functionCall(s).name`, bare name arrays, and
/// JSON-stringified or mixed-text-and-JSON variants of all the above.
/// Duplicates collapse into the returned set.
fn extract_tool_names(output: &ProviderOutput) -> HashSet<String> {
    match output {
        ProviderOutput::Structured(value) => extract_from_value(value),
        ProviderOutput::Text(text) => {
            if let Ok(value) = serde_json::from_str::<serde_json::Value>(text) {
                let found = extract_from_value(&value);
                if !found.is_empty() {
                    return found;
                }
            }
            extract_from_mixed_text(text)
        }
    }
}

fn extract_from_value(value: &serde_json::Value) -> HashSet<String> {
    let mut names = HashSet::new();

    if let Some(calls) = value.get("tool_calls").and_then(|v| v.as_array()) {
        for call in calls {
            if let Some(name) = call
                .get("function")
                .and_then(|f| f.get("name"))
                .or_else(|| call.get("name"))
                .or_else(|| call.get("tool_name"))
                .or_else(|| call.get("tool"))
                .and_then(|v| v.as_str())
            {
                names.insert(name.to_string());
            }
        }
    }

    if let Some(content) = value.get("content").and_then(|v| v.as_array()) {
        collect_tool_use_blocks(content, &mut names);
    }
    if value.get("type").and_then(|v| v.as_str()) == Some("tool_use") {
        if let Some(name) = value.get("name").and_then(|v| v.as_str()) {
            names.insert(name.to_string());
        }
    }

    if let Some(call) = value.get("functionCall") {
        if let Some(name) = call.get("name").and_then(|v| v.as_str()) {
            names.insert(name.to_string());
        }
    }
    if let Some(calls) = value.get("functionCalls").and_then(|v| v.as_array()) {
        for call in calls {
            if let Some(name) = call.get("name").and_then(|v| v.as_str()) {
                names.insert(name.to_string());
            }
        }
    }

    if let Some(arr) = value.as_array() {
        for entry in arr {
            if let Some(s) = entry.as_str() {
                names.insert(s.to_string());
            } else if let Some(name) = entry
                .get("name")
                .or_else(|| entry.get("tool_name"))
                .or_else(|| entry.get("tool"))
                .and_then(|v| v.as_str())
            {
                names.insert(name.to_string());
            }
        }
    }

    names
}

fn collect_tool_use_blocks(blocks: &[serde_json::Value], names: &mut HashSet<String>) {
    for block in blocks {
        if block.get("type").and_then(|v| v.as_str()) == Some("tool_use") {
            if let Some(name) = block.get("name").and_then(|v| v.as_str()) {
                names.insert(name.to_string());
            }
        }
    }
}

/// Anthropic sometimes interleaves prose with raw JSON tool-use blocks in a
/// plain-text response; scan for `"type":"tool_use"` objects anywhere in
/// the text and pull out their `name` field.
fn extract_from_mixed_text(text: &str) -> HashSet<String> {
    let mut names = HashSet::new();
    let mut search_from = 0;
    while let Some(rel) = text[search_from..].find("\"type\"") {
        let start = search_from + rel;
        let Some(obj_start) = text[..start].rfind('{') else {
            break;
        };
        let Some(obj_end_rel) = find_matching_brace(&text[obj_start..]) else {
            search_from = start + 6;
            continue;
        };
        let candidate = &text[obj_start..obj_start + obj_end_rel + 1];
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(candidate) {
            if value.get("type").and_then(|v| v.as_str()) == Some("tool_use") {
                if let Some(name) = value.get("name").and_then(|v| v.as_str()) {
                    names.insert(name.to_string());
                }
            }
        }
        search_from = obj_start + obj_end_rel + 1;
    }
    names
}

fn find_matching_brace(s: &str) -> Option<usize> {
    let mut depth = 0i32;
    for (idx, ch) in s.char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(idx);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use eval_common::{AssertionKind, AssertionValue, ProviderResponse, TokenUsage};
    use serde_json::{json, Value};
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

    #[test]
    fn partial_match_scores_expected_f1() {
        let resp = ProviderResponse {
            output: ProviderOutput::Structured(json!({
                "tool_calls": [
                    {"function": {"name": "get_weather"}},
                    {"function": {"name": "book_flight"}},
                    {"function": {"name": "extra_tool"}}
                ]
            })),
            error: None,
            retryable: None,
            token_usage: TokenUsage::default(),
            cost: 0.0,
            latency_ms: 0.0,
            metadata: Value::Null,
        };
        let vars = HashMap::new();
        let http = reqwest::Client::new();
        let c = ctx(&resp, &vars, &http);

        let assertion = Assertion::leaf(
            AssertionKind::ToolCallF1,
            Some(AssertionValue::List(vec!["get_weather".into(), "book_flight".into()])),
        );
        let v = tool_call_f1(&assertion, &c).unwrap();
        assert!((v.score - 0.8).abs() < 1e-6);
        assert!(!v.pass);
    }

    #[test]
    fn empty_expected_list_is_missing_value_error() {
        let resp = ProviderResponse::default();
        let vars = HashMap::new();
        let http = reqwest::Client::new();
        let c = ctx(&resp, &vars, &http);
        let assertion = Assertion::leaf(AssertionKind::ToolCallF1, Some(AssertionValue::List(vec![])));
        assert!(tool_call_f1(&assertion, &c).is_err());
    }

    #[test]
    fn extracts_anthropic_tool_use_blocks() {
        let value = json!({
            "content": [
                {"type": "text", "text": "calling a tool"},
                {"type": "tool_use", "name": "get_weather"}
            ]
        });
        let names = extract_from_value(&value);
        assert!(names.contains("get_weather"));
    }
}
