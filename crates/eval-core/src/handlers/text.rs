//! `equals`, `contains`/`icontains`, `contains-any`/`contains-all`,
//! `regex`, `starts-with`, and `rouge-n` (spec §4.2).

use super::Verdict;
use crate::registry::AssertionContext;
use eval_common::{Assertion, AssertionError};
use std::collections::HashSet;

fn required_text(assertion: &Assertion, kind: &str) -> anyhow::Result<String> {
    assertion
        .value
        .as_ref()
        .and_then(|v| v.as_text())
        .map(str::to_string)
        .ok_or_else(|| {
            AssertionError::MissingValue {
                kind: kind.to_string(),
            }
            .into()
        })
}

fn required_list(assertion: &Assertion, kind: &str) -> anyhow::Result<Vec<String>> {
    let list = assertion
        .value
        .as_ref()
        .map(|v| v.as_list())
        .unwrap_or_default();
    if list.is_empty() {
        return Err(AssertionError::MissingValue {
            kind: kind.to_string(),
        }
        .into());
    }
    Ok(list)
}

pub(super) fn equals(assertion: &Assertion, ctx: &AssertionContext<'_>) -> anyhow::Result<Verdict> {
    let expected = required_text(assertion, "equals")?;
    let actual = &ctx.output_string;
    if *actual == expected {
        Ok(Verdict::new(true, 1.0, "Assertion passed"))
    } else {
        Ok(Verdict::new(
            false,
            0.0,
            format!("Expected output \"{actual}\" to equal \"{expected}\""),
        ))
    }
}

pub(super) fn contains(
    assertion: &Assertion,
    ctx: &AssertionContext<'_>,
    case_insensitive: bool,
) -> anyhow::Result<Verdict> {
    let kind = if case_insensitive { "icontains" } else { "contains" };
    let needle = required_text(assertion, kind)?;
    let (haystack, needle_cmp) = if case_insensitive {
        (ctx.output_string.to_lowercase(), needle.to_lowercase())
    } else {
        (ctx.output_string.clone(), needle.clone())
    };
    if haystack.contains(&needle_cmp) {
        Ok(Verdict::new(true, 1.0, "Assertion passed"))
    } else {
        Ok(Verdict::new(
            false,
            0.0,
            format!("Expected output \"{}\" to contain \"{needle}\"", ctx.output_string),
        ))
    }
}

pub(super) fn contains_any(
    assertion: &Assertion,
    ctx: &AssertionContext<'_>,
    case_insensitive: bool,
) -> anyhow::Result<Verdict> {
    let values = required_list(assertion, "contains-any")?;
    let haystack = if case_insensitive {
        ctx.output_string.to_lowercase()
    } else {
        ctx.output_string.clone()
    };
    let hit = values.iter().any(|v| {
        let needle = if case_insensitive { v.to_lowercase() } else { v.clone() };
        haystack.contains(&needle)
    });
    if hit {
        Ok(Verdict::new(true, 1.0, "Assertion passed"))
    } else {
        Ok(Verdict::new(
            false,
            0.0,
            format!("Expected output to contain one of {values:?}"),
        ))
    }
}

pub(super) fn contains_all(
    assertion: &Assertion,
    ctx: &AssertionContext<'_>,
    case_insensitive: bool,
) -> anyhow::Result<Verdict> {
    let values = required_list(assertion, "contains-all")?;
    let haystack = if case_insensitive {
        ctx.output_string.to_lowercase()
    } else {
        ctx.output_string.clone()
    };
    let all = values.iter().all(|v| {
        let needle = if case_insensitive { v.to_lowercase() } else { v.clone() };
        haystack.contains(&needle)
    });
    if all {
        Ok(Verdict::new(true, 1.0, "Assertion passed"))
    } else {
        Ok(Verdict::new(
            false,
            0.0,
            format!("Expected output to contain all of {values:?}"),
        ))
    }
}

pub(super) fn regex(assertion: &Assertion, ctx: &AssertionContext<'_>) -> anyhow::Result<Verdict> {
    let pattern = required_text(assertion, "regex")?;
    let re = regex::Regex::new(&pattern).map_err(|e| AssertionError::InvalidRegex {
        pattern: pattern.clone(),
        detail: e.to_string(),
    })?;
    if re.is_match(&ctx.output_string) {
        Ok(Verdict::new(true, 1.0, "Assertion passed"))
    } else {
        Ok(Verdict::new(
            false,
            0.0,
            format!("Expected output \"{}\" to match regex \"{pattern}\"", ctx.output_string),
        ))
    }
}

pub(super) fn starts_with(assertion: &Assertion, ctx: &AssertionContext<'_>) -> anyhow::Result<Verdict> {
    let prefix = required_text(assertion, "starts-with")?;
    if ctx.output_string.starts_with(&prefix) {
        Ok(Verdict::new(true, 1.0, "Assertion passed"))
    } else {
        Ok(Verdict::new(
            false,
            0.0,
            format!("Expected output \"{}\" to start with \"{prefix}\"", ctx.output_string),
        ))
    }
}

/// Unigram ROUGE-N F1 (spec §4.2's `rouge-n` row). Reason strings are
/// reproduced literally: `"ROUGE-N score <s> is greater than or equal to
/// threshold <t>"` / `"... is less than threshold ..."`.
pub(super) fn rouge_n(assertion: &Assertion, ctx: &AssertionContext<'_>) -> anyhow::Result<Verdict> {
    let reference = required_text(assertion, "rouge-n")?;
    let threshold = assertion.threshold.unwrap_or(0.75);

    let ref_tokens = unigrams(&reference);
    let hyp_tokens = unigrams(&ctx.output_string);

    let f1 = rouge_unigram_f1(&hyp_tokens, &ref_tokens);
    let pass = f1 >= threshold;
    let reason = if pass {
        format!("ROUGE-N score {f1:.2} is greater than or equal to threshold {threshold}")
    } else {
        format!("ROUGE-N score {f1:.2} is less than threshold {threshold}")
    };
    Ok(Verdict::new(pass, f1, reason))
}

fn unigrams(text: &str) -> Vec<String> {
    text.split_whitespace().map(|w| w.to_lowercase()).collect()
}

fn rouge_unigram_f1(hyp: &[String], reference: &[String]) -> f64 {
    if hyp.is_empty() || reference.is_empty() {
        return 0.0;
    }
    let ref_set: HashSet<&String> = reference.iter().collect();
    let hyp_set: HashSet<&String> = hyp.iter().collect();
    let overlap = hyp_set.intersection(&ref_set).count() as f64;
    if overlap == 0.0 {
        return 0.0;
    }
    let precision = overlap / hyp_set.len() as f64;
    let recall = overlap / ref_set.len() as f64;
    2.0 * precision * recall / (precision + recall)
}
