//! `is-json` and `contains-json` (spec §4.2).

use super::Verdict;
use crate::registry::AssertionContext;
use eval_common::Assertion;

pub(super) fn is_json(_assertion: &Assertion, ctx: &AssertionContext<'_>) -> anyhow::Result<Verdict> {
    if serde_json::from_str::<serde_json::Value>(ctx.output_string.trim()).is_ok() {
        Ok(Verdict::new(true, 1.0, "Assertion passed"))
    } else {
        Ok(Verdict::new(false, 0.0, "Expected output to be valid JSON"))
    }
}

/// Scans substrings for one that parses as JSON, the way a source object
/// embedded in surrounding prose (e.g. inside a markdown code fence) would
/// be found. Tries, in order: the whole trimmed string, then each `{...}`
/// or `[...]` bracketed span.
pub(super) fn contains_json(_assertion: &Assertion, ctx: &AssertionContext<'_>) -> anyhow::Result<Verdict> {
    let text = &ctx.output_string;
    if serde_json::from_str::<serde_json::Value>(text.trim()).is_ok() {
        return Ok(Verdict::new(true, 1.0, "Assertion passed"));
    }
    for (open, close) in [('{', '}'), ('[', ']')] {
        if let Some(found) = find_balanced(text, open, close) {
            if serde_json::from_str::<serde_json::Value>(&found).is_ok() {
                return Ok(Verdict::new(true, 1.0, "Assertion passed"));
            }
        }
    }
    Ok(Verdict::new(
        false,
        0.0,
        "Expected output to contain valid JSON",
    ))
}

fn find_balanced(text: &str, open: char, close: char) -> Option<String> {
    let start = text.find(open)?;
    let mut depth = 0i32;
    for (offset, ch) in text[start..].char_indices() {
        if ch == open {
            depth += 1;
        } else if ch == close {
            depth -= 1;
            if depth == 0 {
                return Some(text[start..start + offset + ch.len_utf8()].to_string());
            }
        }
    }
    None
}
