//! `similar`: cosine-similarity of embeddings against a threshold (spec §4.2).

use super::Verdict;
use crate::registry::AssertionContext;
use eval_common::{Assertion, AssertionError};

pub(super) async fn similar(assertion: &Assertion, ctx: &AssertionContext<'_>) -> anyhow::Result<Verdict> {
    let reference = assertion
        .value
        .as_ref()
        .and_then(|v| v.as_text())
        .ok_or_else(|| AssertionError::MissingValue {
            kind: "similar".to_string(),
        })?;
    let threshold = assertion.threshold.unwrap_or(0.75);

    let Some(embedder) = ctx.embedder else {
        return Err(AssertionError::MalformedConfig {
            kind: "similar".to_string(),
            detail: "no embedder configured for this run".to_string(),
        }
        .into());
    };

    let a = embedder.embed(&ctx.output_string).await?;
    let b = embedder.embed(reference).await?;
    let cosine = cosine_similarity(&a, &b);

    // `inverse` only flips `pass`; the reason still describes the raw
    // similarity vs threshold regardless of direction (spec §4.2).
    let pass = cosine >= threshold;
    let reason = format!("Similarity {cosine:.2} is {} threshold {threshold}", if pass { "above or equal to" } else { "below" });
    Ok(Verdict::new(pass, cosine, reason))
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f64 = a.iter().zip(b).map(|(x, y)| f64::from(*x) * f64::from(*y)).sum();
    let norm_a: f64 = a.iter().map(|x| f64::from(*x).powi(2)).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| f64::from(*x).powi(2)).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        (dot / (norm_a * norm_b)).clamp(-1.0, 1.0)
    }
}
