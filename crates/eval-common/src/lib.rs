//! Shared data model and provider contracts for the prompt evaluation engine.
//!
//! This crate carries no execution logic; it only defines the shapes that
//! cross the boundary between the evaluation engine (`eval-core`) and its
//! external collaborators: concrete providers, grading sub-providers,
//! script runners, and whatever loads suites from disk. Keeping it
//! dependency-light means a future provider-adapter crate can depend on
//! `eval-common` alone without pulling in the engine.

pub mod errors;
pub mod model;
pub mod provider;

pub use errors::{
    AssertionError, ConfigError, EvalError, ExternalScriptError, ProviderError, ProviderErrorKind,
};
pub use model::{
    Assertion, AssertionKind, AssertionValue, AtomicTestCase, GradingResult, ProviderOutput,
    ProviderResponse, TokenUsage,
};
pub use provider::{CallContext, Embedder, Provider, ScriptOutcome, ScriptRunner};
