//! Data model shared by the assertion runtime and the test-case execution
//! pipeline (spec §3).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ops::Add;

/// Closed set of assertion kinds (spec §6.2). Variants are tagged with
/// `kebab-case` so `AssertionKind::NotContains` serializes as
/// `"not-contains"`, matching the wire vocabulary the shorthand grammar and
/// suite authors use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AssertionKind {
    Equals,
    Contains,
    Icontains,
    NotContains,
    NotIcontains,
    ContainsAny,
    ContainsAll,
    Regex,
    NotRegex,
    StartsWith,
    IsJson,
    ContainsJson,
    IsHtml,
    ContainsHtml,
    NotIsHtml,
    NotContainsHtml,
    Similar,
    RougeN,
    NotRougeN,
    Webhook,
    NotWebhook,
    LlmRubric,
    Javascript,
    Python,
    ToolCallF1,
    NotToolCallF1,
    And,
    Or,
    AssertSet,
}

impl AssertionKind {
    /// True for the three structural combinators (spec §3, CombinatorAssertion).
    pub fn is_combinator(self) -> bool {
        matches!(self, Self::And | Self::Or | Self::AssertSet)
    }

    /// True when the kind carries the `not-` prefix (spec §3, `inverse`).
    pub fn is_inverse(self) -> bool {
        matches!(
            self,
            Self::NotContains
                | Self::NotIcontains
                | Self::NotRegex
                | Self::NotIsHtml
                | Self::NotContainsHtml
                | Self::NotRougeN
                | Self::NotWebhook
                | Self::NotToolCallF1
        )
    }

    /// The positive form backing an inverted kind, used to look up the
    /// shared scorer (only the `pass` bit flips; spec §4.2, `similar`
    /// paragraph, generalized to every `not-` kind).
    pub fn base_kind(self) -> Self {
        match self {
            Self::NotContains => Self::Contains,
            Self::NotIcontains => Self::Icontains,
            Self::NotRegex => Self::Regex,
            Self::NotIsHtml => Self::IsHtml,
            Self::NotContainsHtml => Self::ContainsHtml,
            Self::NotRougeN => Self::RougeN,
            Self::NotWebhook => Self::Webhook,
            Self::NotToolCallF1 => Self::ToolCallF1,
            other => other,
        }
    }

    /// Shorthand kind token as it appears in `kind[(threshold)]:value` (spec §6.1).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Equals => "equals",
            Self::Contains => "contains",
            Self::Icontains => "icontains",
            Self::NotContains => "not-contains",
            Self::NotIcontains => "not-icontains",
            Self::ContainsAny => "contains-any",
            Self::ContainsAll => "contains-all",
            Self::Regex => "regex",
            Self::NotRegex => "not-regex",
            Self::StartsWith => "starts-with",
            Self::IsJson => "is-json",
            Self::ContainsJson => "contains-json",
            Self::IsHtml => "is-html",
            Self::ContainsHtml => "contains-html",
            Self::NotIsHtml => "not-is-html",
            Self::NotContainsHtml => "not-contains-html",
            Self::Similar => "similar",
            Self::RougeN => "rouge-n",
            Self::NotRougeN => "not-rouge-n",
            Self::Webhook => "webhook",
            Self::NotWebhook => "not-webhook",
            Self::LlmRubric => "llm-rubric",
            Self::Javascript => "javascript",
            Self::Python => "python",
            Self::ToolCallF1 => "tool-call-f1",
            Self::NotToolCallF1 => "not-tool-call-f1",
            Self::And => "and",
            Self::Or => "or",
            Self::AssertSet => "assert-set",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "equals" => Self::Equals,
            "contains" => Self::Contains,
            "icontains" => Self::Icontains,
            "not-contains" => Self::NotContains,
            "not-icontains" => Self::NotIcontains,
            "contains-any" => Self::ContainsAny,
            "contains-all" => Self::ContainsAll,
            "regex" => Self::Regex,
            "not-regex" => Self::NotRegex,
            "starts-with" => Self::StartsWith,
            "is-json" => Self::IsJson,
            "contains-json" => Self::ContainsJson,
            "is-html" => Self::IsHtml,
            "contains-html" => Self::ContainsHtml,
            "not-is-html" => Self::NotIsHtml,
            "not-contains-html" => Self::NotContainsHtml,
            "similar" => Self::Similar,
            "rouge-n" => Self::RougeN,
            "not-rouge-n" => Self::NotRougeN,
            "webhook" => Self::Webhook,
            "not-webhook" => Self::NotWebhook,
            "llm-rubric" => Self::LlmRubric,
            "javascript" => Self::Javascript,
            "python" => Self::Python,
            "tool-call-f1" => Self::ToolCallF1,
            "not-tool-call-f1" => Self::NotToolCallF1,
            "and" => Self::And,
            "or" => Self::Or,
            "assert-set" => Self::AssertSet,
            _ => return None,
        })
    }
}

/// `value` of an Assertion (spec §3): a string, a list (for `contains-any`/
/// `contains-all`), an inline script body, a webhook URL, or a
/// `file://path[:function]` reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AssertionValue {
    Text(String),
    List(Vec<String>),
}

impl AssertionValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::List(_) => None,
        }
    }

    pub fn as_list(&self) -> Vec<String> {
        match self {
            Self::Text(s) => vec![s.clone()],
            Self::List(v) => v.clone(),
        }
    }
}

/// A single node in the assertion tree. Leaves carry `assert: vec![]`;
/// combinators (`and`/`or`/`assert-set`) carry their ordered children here
/// rather than as a separate sum-type variant, which keeps the recursive
/// structure a plain tree instead of requiring a tagged enum with a
/// self-referential payload (spec §3's `CombinatorAssertion` is modeled as
/// `Assertion` with `kind.is_combinator() && !assert.is_empty()`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Assertion {
    #[serde(rename = "type")]
    pub kind: Option<AssertionKind>,
    #[serde(default)]
    pub value: Option<AssertionValue>,
    #[serde(default)]
    pub threshold: Option<f64>,
    #[serde(default)]
    pub weight: Option<f64>,
    #[serde(default)]
    pub metric: Option<String>,
    #[serde(default)]
    pub config: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub assert: Vec<Assertion>,
    #[serde(default, rename = "shortCircuit")]
    pub short_circuit: Option<bool>,
}

impl Assertion {
    pub fn leaf(kind: AssertionKind, value: Option<AssertionValue>) -> Self {
        Self {
            kind: Some(kind),
            value,
            ..Default::default()
        }
    }

    /// Effective weight: defaults to 1, spec invariant 3 (`weight: 0` forces
    /// an always-pass, zero-weighted skip).
    pub fn effective_weight(&self) -> f64 {
        self.weight.unwrap_or(1.0)
    }

    pub fn is_zero_weight(&self) -> bool {
        self.weight.map(|w| w == 0.0).unwrap_or(false)
    }
}

/// One test case: variables for rendering/templating, its assertions, and
/// an optional aggregate pass threshold (spec §3).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AtomicTestCase {
    #[serde(default)]
    pub vars: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub assert: Vec<Assertion>,
    #[serde(default)]
    pub threshold: Option<f64>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
    #[serde(default)]
    pub options: serde_json::Value,
}

/// Non-negative token-usage counters (spec §3, `ProviderResponse.tokenUsage`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt: u64,
    pub completion: u64,
    pub cached: u64,
    pub total: u64,
    pub num_requests: u64,
    pub reasoning: u64,
}

impl Add for TokenUsage {
    type Output = TokenUsage;

    fn add(self, rhs: TokenUsage) -> TokenUsage {
        TokenUsage {
            prompt: self.prompt + rhs.prompt,
            completion: self.completion + rhs.completion,
            cached: self.cached + rhs.cached,
            total: self.total + rhs.total,
            num_requests: self.num_requests + rhs.num_requests,
            reasoning: self.reasoning + rhs.reasoning,
        }
    }
}

impl std::iter::Sum for TokenUsage {
    fn sum<I: Iterator<Item = TokenUsage>>(iter: I) -> Self {
        iter.fold(TokenUsage::default(), Add::add)
    }
}

/// A provider's output: most providers return text; structured providers
/// (tool-calling, JSON mode) may return an object directly (spec §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProviderOutput {
    Text(String),
    Structured(serde_json::Value),
}

impl Default for ProviderOutput {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

impl ProviderOutput {
    /// String coercion used throughout §4.2 (`starts-with` on non-string
    /// output, `equals` JSON-serializing objects, etc.)
    pub fn as_display_string(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Structured(v) => serde_json::to_string(v).unwrap_or_default(),
        }
    }
}

/// What a `Provider::call` returns (spec §3).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderResponse {
    pub output: ProviderOutput,
    #[serde(default)]
    pub error: Option<String>,
    /// Explicit transient/permanent signal a provider can report alongside
    /// `error`, taking precedence over message-sniffing (spec §4.5 item 3:
    /// "network, HTTP 5xx, explicit `retryable: true`" are three independent
    /// triggers, not one). `None` means the provider has no opinion and the
    /// runner falls back to classifying `error`'s text.
    #[serde(default)]
    pub retryable: Option<bool>,
    #[serde(default)]
    pub token_usage: TokenUsage,
    #[serde(default)]
    pub cost: f64,
    #[serde(default)]
    pub latency_ms: f64,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl ProviderResponse {
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Recursive grading tree (spec §3). Each `GradingResult` exclusively owns
/// its `component_results`; no shared structure, no back-references
/// (Design Note §9).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GradingResult {
    pub pass: bool,
    pub score: f64,
    pub reason: String,
    #[serde(default)]
    pub named_scores: HashMap<String, f64>,
    #[serde(default)]
    pub tokens_used: TokenUsage,
    #[serde(default)]
    pub component_results: Vec<GradingResult>,
    #[serde(default)]
    pub assertion: Option<Assertion>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl GradingResult {
    pub fn leaf(pass: bool, score: f64, reason: impl Into<String>) -> Self {
        Self {
            pass,
            score: score.clamp(0.0, 1.0),
            reason: reason.into(),
            ..Default::default()
        }
    }

    pub fn with_assertion(mut self, assertion: Assertion) -> Self {
        self.assertion = Some(assertion);
        self
    }

    pub fn with_metric(mut self, name: Option<String>, score: f64) -> Self {
        if let Some(name) = name {
            if !name.is_empty() {
                self.named_scores.insert(name, score);
            }
        }
        self
    }
}
