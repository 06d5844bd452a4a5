//! `is-html` and `contains-html` (spec §4.2) with their literal edge cases.

use super::Verdict;
use crate::registry::AssertionContext;
use regex::Regex;
use std::sync::OnceLock;

fn tag_token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^</?[A-Za-z][A-Za-z0-9]*(?:\s[^<>]*)?/?>$").unwrap())
}

fn entity_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"&[A-Za-z#][A-Za-z0-9]*;").unwrap())
}

fn comment_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<!--.*?-->").unwrap())
}

fn self_close_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[A-Za-z][A-Za-z0-9]*(?:\s[^<>]*)?/>").unwrap())
}

fn tag_pair_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<([A-Za-z][A-Za-z0-9]*)(?:\s[^<>]*)?>.*?</\1>").unwrap())
}

/// The whole trimmed output must be exclusively HTML tags (and the text
/// they wrap); no XML prolog, no text before the first tag or after the
/// last, no unrecognized tag names.
fn is_exclusively_html(s: &str) -> bool {
    let s = s.trim();
    if s.is_empty() {
        return false;
    }
    if s.to_lowercase().starts_with("<?xml") {
        return false;
    }
    if !s.starts_with('<') || !s.ends_with('>') {
        return false;
    }
    let mut rest = s;
    while let Some(open_rel) = rest.find('<') {
        let tag_start = &rest[open_rel..];
        let Some(close_rel) = tag_start.find('>') else {
            return false;
        };
        let token = &tag_start[..close_rel + 1];
        if !tag_token_re().is_match(token) {
            return false;
        }
        rest = &tag_start[close_rel + 1..];
    }
    true
}

pub(super) fn is_html(ctx: &AssertionContext<'_>) -> anyhow::Result<Verdict> {
    if is_exclusively_html(&ctx.output_string) {
        Ok(Verdict::new(true, 1.0, "Assertion passed"))
    } else {
        Ok(Verdict::new(false, 0.0, "Expected output to be HTML"))
    }
}

fn count_indicators(s: &str) -> usize {
    entity_re().find_iter(s).count()
        + comment_re().find_iter(s).count()
        + self_close_re().find_iter(s).count()
        + tag_pair_re().find_iter(s).count()
}

pub(super) fn contains_html(ctx: &AssertionContext<'_>) -> anyhow::Result<Verdict> {
    if count_indicators(&ctx.output_string) >= 2 {
        Ok(Verdict::new(true, 1.0, "Assertion passed"))
    } else {
        Ok(Verdict::new(false, 0.0, "Expected output to contain HTML"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eval_common::{ProviderOutput, ProviderResponse, TokenUsage};
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

    #[test]
    fn is_html_accepts_fragment() {
        let resp = response("<div><span>hi</span></div>");
        let vars = HashMap::new();
        let http = reqwest::Client::new();
        let c = ctx(&resp, &vars, &http);
        assert!(is_html(&c).unwrap().pass);
    }

    #[test]
    fn is_html_rejects_mixed_content() {
        let resp = response("prefix <b>bold</b>");
        let vars = HashMap::new();
        let http = reqwest::Client::new();
        let c = ctx(&resp, &vars, &http);
        assert!(!is_html(&c).unwrap().pass);
    }

    #[test]
    fn is_html_rejects_whitespace_only() {
        let resp = response("   ");
        let vars = HashMap::new();
        let http = reqwest::Client::new();
        let c = ctx(&resp, &vars, &http);
        assert!(!is_html(&c).unwrap().pass);
    }

    #[test]
    fn contains_html_rejects_math_comparison() {
        let resp = response("a<b>c");
        let vars = HashMap::new();
        let http = reqwest::Client::new();
        let c = ctx(&resp, &vars, &http);
        assert!(!contains_html(&c).unwrap().pass);
    }

    #[test]
    fn contains_html_rejects_email_in_brackets() {
        let resp = response("contact <foo@bar.com> for details");
        let vars = HashMap::new();
        let http = reqwest::Client::new();
        let c = ctx(&resp, &vars, &http);
        assert!(!contains_html(&c).unwrap().pass);
    }

    #[test]
    fn contains_html_accepts_two_indicators() {
        let resp = response("<b>bold</b> and &amp;");
        let vars = HashMap::new();
        let http = reqwest::Client::new();
        let c = ctx(&resp, &vars, &http);
        assert!(contains_html(&c).unwrap().pass);
    }

    #[test]
    fn contains_html_rejects_single_indicator() {
        let resp = response("<b>bold</b>");
        let vars = HashMap::new();
        let http = reqwest::Client::new();
        let c = ctx(&resp, &vars, &http);
        assert!(!contains_html(&c).unwrap().pass);
    }
}
