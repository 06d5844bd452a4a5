//! Traits the evaluation engine calls out through. Concrete implementations
//! (an OpenAI client, a local script runner, an embedding service) live in
//! adapter crates that depend on this one; `eval-core` only ever sees these
//! trait objects.

use crate::model::{ProviderResponse, TokenUsage};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;

/// Everything a `Provider::call` needs besides the rendered prompt itself:
/// the test's variables and whatever per-test options the suite attached
/// (spec §3/§6.3).
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    pub vars: HashMap<String, serde_json::Value>,
    pub options: serde_json::Value,
}

/// A model/provider under test (spec §6.1's `provider` interface). Concrete
/// adapters (OpenAI, Anthropic, a local HTTP endpoint) implement this
/// outside the engine; the engine only calls `call` and reads `id`.
#[async_trait]
pub trait Provider: Send + Sync + fmt::Debug {
    /// Stable identifier used in cache keys and progress reporting.
    fn id(&self) -> &str;

    async fn call(&self, prompt: &str, ctx: &CallContext) -> ProviderResponse;
}

/// An embedding backend, used by the `similar` assertion (spec §4.2).
#[async_trait]
pub trait Embedder: Send + Sync + fmt::Debug {
    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>>;
}

/// Outcome of running an external script body (`javascript`/`python`
/// assertions, spec §6.4).
#[derive(Debug, Clone)]
pub struct ScriptOutcome {
    pub pass: Option<bool>,
    pub score: Option<f64>,
    pub reason: Option<String>,
    pub token_usage: TokenUsage,
}

/// Runs a `javascript` or `python` assertion body out-of-process. The engine
/// never embeds a JS/Python interpreter itself; this is the seam a host
/// wires up (spec §6.4, "external collaborator").
#[async_trait]
pub trait ScriptRunner: Send + Sync + fmt::Debug {
    async fn run_javascript(
        &self,
        body: &str,
        output: &serde_json::Value,
        ctx: &CallContext,
    ) -> anyhow::Result<ScriptOutcome>;

    async fn run_python(
        &self,
        body: &str,
        output: &serde_json::Value,
        ctx: &CallContext,
    ) -> anyhow::Result<ScriptOutcome>;
}
