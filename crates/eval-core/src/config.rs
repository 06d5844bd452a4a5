//! Run-wide configuration the host assembles from CLI flags / config files
//! (spec §6.3). The engine only ever consumes this plain-data struct; it
//! never parses CLI args or config files itself.

use std::time::Duration;

/// Mirrors `evaluateOptions`. Every field has a sensible default so a host
/// can construct `EvaluateOptions::default()` and override only what it
/// needs.
#[derive(Debug, Clone)]
pub struct EvaluateOptions {
    /// Coerced to 1 if `delay > 0`; see [`Self::effective_concurrency`].
    pub max_concurrency: usize,
    pub delay: Duration,
    /// Repetitions per case; bypasses the cache when `> 1`.
    pub repeat: usize,
    /// Bounds a single provider call.
    pub timeout: Option<Duration>,
    /// Bounds the whole run.
    pub max_eval_time: Option<Duration>,
    pub cache_enabled: bool,
    pub show_progress_bar: bool,
    pub generate_suggestions: bool,
    /// Max retry attempts for a transient provider failure (spec §4.5, default 3).
    pub max_retries: u32,
    /// Ring-buffer capacity for errors/logs (spec §4.8).
    pub ring_buffer_capacity: usize,
}

impl Default for EvaluateOptions {
    fn default() -> Self {
        Self {
            max_concurrency: default_concurrency(),
            delay: Duration::ZERO,
            repeat: 1,
            timeout: None,
            max_eval_time: None,
            cache_enabled: true,
            show_progress_bar: true,
            generate_suggestions: false,
            max_retries: 3,
            ring_buffer_capacity: 1000,
        }
    }
}

impl EvaluateOptions {
    /// Applies the hard rule from spec §4.6: `delay > 0` silently coerces
    /// concurrency to 1, and concurrency is always clamped to at least 1.
    pub fn effective_concurrency(&self) -> usize {
        if self.delay > Duration::ZERO {
            1
        } else {
            self.max_concurrency.max(1)
        }
    }

    pub fn bypasses_cache_for_repeats(&self) -> bool {
        self.repeat > 1
    }
}

fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(std::num::NonZeroUsize::get)
        .unwrap_or(4)
}
