//! Cache (C7, spec §4.7): content-addressed, single-flight lookup keyed on
//! `(provider id, rendered prompt, vars, assertion config, config version)`,
//! the full tuple of the spec's `CacheKey`, generalized from the
//! teacher's simpler `cache::key::cache_key(model, prompt, fingerprint)`.
//!
//! Single-flight is implemented the way spec §9's Design Notes prescribe:
//! `map<CacheKey, Future<Response>>` guarded by a short critical section:
//! `lock -> lookup -> if absent, insert and release -> await`. The stored
//! future is a [`futures::future::Shared`] so every waiter polls the same
//! underlying computation rather than the first waiter's result being
//! copied out.

use eval_common::ProviderResponse;
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(
        provider_id: &str,
        rendered_prompt: &str,
        vars: &HashMap<String, Value>,
        assertion_config: &Value,
        config_version: &str,
    ) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(provider_id.as_bytes());
        hasher.update(b"\0");
        hasher.update(rendered_prompt.as_bytes());
        hasher.update(b"\0");
        // Sort keys so the hash is stable regardless of HashMap iteration
        // order.
        let mut keys: Vec<&String> = vars.keys().collect();
        keys.sort();
        for k in keys {
            hasher.update(k.as_bytes());
            hasher.update(b"=");
            hasher.update(vars[k].to_string().as_bytes());
            hasher.update(b"\0");
        }
        hasher.update(assertion_config.to_string().as_bytes());
        hasher.update(b"\0");
        hasher.update(config_version.as_bytes());
        Self(hex::encode(hasher.finalize()))
    }
}

type SharedResponse = Shared<BoxFuture<'static, ProviderResponse>>;

/// Process-scoped single-flight cache. `enabled = false` turns every
/// `get_or_compute` into an unconditional call of `compute` (spec §4.7's
/// "disable flag" rule).
#[derive(Default)]
pub struct Cache {
    enabled: bool,
    inner: Mutex<HashMap<CacheKey, SharedResponse>>,
}

impl Cache {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            inner: Mutex::new(HashMap::new()),
        }
    }

    /// Returns `(response, was_cache_hit)`. `compute` is only ever invoked
    /// once per key even under concurrent callers (spec invariant 6).
    pub async fn get_or_compute<F>(&self, key: CacheKey, compute: F) -> (ProviderResponse, bool)
    where
        F: FnOnce() -> BoxFuture<'static, ProviderResponse>,
    {
        if !self.enabled {
            return (compute().await, false);
        }

        let (shared, is_fresh) = {
            let mut guard = self.inner.lock().await;
            if let Some(existing) = guard.get(&key) {
                (existing.clone(), false)
            } else {
                let shared = compute().shared();
                guard.insert(key, shared.clone());
                (shared, true)
            }
        };

        let response = shared.await;
        (response, !is_fresh)
    }

    /// Bypasses the cache entirely regardless of `enabled`; used for
    /// `repeat > 1` work items (spec §4.6: repeated calls must be fresh).
    pub async fn compute_uncached<F>(compute: F) -> ProviderResponse
    where
        F: FnOnce() -> BoxFuture<'static, ProviderResponse>,
    {
        compute().await
    }
}

pub type SharedCache = Arc<Cache>;

#[cfg(test)]
mod tests {
    use super::*;
    use eval_common::{ProviderOutput, TokenUsage};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn single_flight_calls_compute_once_for_concurrent_identical_keys() {
        let cache = Arc::new(Cache::new(true));
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                let key = CacheKey::new("p", "prompt", &HashMap::new(), &Value::Null, "v1");
                cache
                    .get_or_compute(key, move || {
                        let calls = calls.clone();
                        Box::pin(async move {
                            calls.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                            ProviderResponse {
                                output: ProviderOutput::Text("hi".to_string()),
                                error: None,
                                retryable: None,
                                token_usage: TokenUsage::default(),
                                cost: 0.0,
                                latency_ms: 0.0,
                                metadata: Value::Null,
                            }
                        })
                    })
                    .await
            }));
        }

        let mut results = Vec::new();
        for h in handles {
            results.push(h.await.unwrap());
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(results.iter().any(|(_, hit)| *hit));
        for (resp, _) in &results {
            assert_eq!(resp.output.as_display_string(), "hi");
        }
    }

    #[test]
    fn cache_key_is_stable_regardless_of_var_insertion_order() {
        let mut a = HashMap::new();
        a.insert("z".to_string(), Value::from(1));
        a.insert("a".to_string(), Value::from(2));
        let mut b = HashMap::new();
        b.insert("a".to_string(), Value::from(2));
        b.insert("z".to_string(), Value::from(1));

        let ka = CacheKey::new("p", "prompt", &a, &Value::Null, "v1");
        let kb = CacheKey::new("p", "prompt", &b, &Value::Null, "v1");
        assert_eq!(ka, kb);
    }
}
