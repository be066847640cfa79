//! Token usage: per-call counters, payload normalisation, and the shared
//! per-request accumulator.
//!
//! Providers report usage in different shapes. Adapters convert whatever they
//! receive into a [`TokenUsage`] before handing it to the extractor, so the
//! extractor never branches on payload shape:
//!
//! ```text
//! Anthropic     { input_tokens, output_tokens,
//!                 cache_creation_input_tokens, cache_read_input_tokens }
//! LangChain-ish { input_tokens, output_tokens, total_tokens,
//!                 input_token_details:  { cache_creation, cache_read },
//!                 output_token_details: { reasoning } }
//! OpenAI        { prompt_tokens, completion_tokens, total_tokens,
//!                 prompt_tokens_details:     { cached_tokens },
//!                 completion_tokens_details: { reasoning_tokens } }
//! ```

use crate::pricing::PricingTable;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Arc, Mutex};

/// Normalised usage reported by one successful model invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    /// Zero means "not reported"; merging derives it from input + output.
    pub total_tokens: u64,
    pub cache_write: u64,
    pub cache_read: u64,
    pub reasoning: u64,
    pub tool_calls: u64,
}

impl TokenUsage {
    /// Plain input/output counts with nothing else reported.
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Normalise a raw provider usage payload.
    ///
    /// Unknown keys are ignored; a non-object payload yields empty usage.
    pub fn from_payload(payload: &Value) -> Self {
        let Some(obj) = payload.as_object() else {
            return Self::default();
        };
        let n = |v: Option<&Value>| v.and_then(Value::as_u64).unwrap_or(0);
        let nested = |outer: &str, inner: &str| n(obj.get(outer).and_then(|d| d.get(inner)));

        let input_tokens = n(obj.get("input_tokens")).max(n(obj.get("prompt_tokens")));
        let output_tokens = n(obj.get("output_tokens")).max(n(obj.get("completion_tokens")));

        // Flat Anthropic counters and nested details never co-occur in
        // practice; summing keeps either shape correct.
        let cache_write = n(obj.get("cache_creation_input_tokens"))
            + nested("input_token_details", "cache_creation");
        let cache_read = n(obj.get("cache_read_input_tokens"))
            + nested("input_token_details", "cache_read")
            + nested("prompt_tokens_details", "cached_tokens");
        let reasoning = nested("output_token_details", "reasoning")
            + nested("completion_tokens_details", "reasoning_tokens");

        let tool_calls = n(obj.get("tool_call_count"));

        Self {
            input_tokens,
            output_tokens,
            total_tokens: n(obj.get("total_tokens")),
            cache_write,
            cache_read,
            reasoning,
            tool_calls,
        }
    }
}

/// Usage accumulated over every page of one request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageMetadata {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
    pub cache_write: u64,
    pub cache_read: u64,
    pub reasoning: u64,
    pub successful_requests: u64,
    pub tool_call_count: u64,
    /// Derived from the counters above; see [`PricingTable::cost`].
    pub total_cost: f64,
}

impl UsageMetadata {
    /// Add one call's counters. Does not touch `total_cost` or
    /// `successful_requests`.
    pub fn merge(&mut self, usage: &TokenUsage) {
        self.input_tokens += usage.input_tokens;
        self.output_tokens += usage.output_tokens;
        self.total_tokens += if usage.total_tokens > 0 {
            usage.total_tokens
        } else {
            usage.input_tokens + usage.output_tokens
        };
        self.cache_write += usage.cache_write;
        self.cache_read += usage.cache_read;
        self.reasoning += usage.reasoning;
        self.tool_call_count += usage.tool_calls;
    }

    /// Normalise `payload` and [`merge`](Self::merge) it.
    pub fn merge_payload(&mut self, payload: &Value) {
        self.merge(&TokenUsage::from_payload(payload));
    }
}

/// The one piece of state shared by concurrent page tasks.
///
/// Every mutation happens under the mutex and recomputes `total_cost` from
/// the counters, so a snapshot is always self-consistent.
#[derive(Debug)]
pub struct UsageAccumulator {
    model_name: String,
    pricing: Arc<PricingTable>,
    batch_pricing: bool,
    inner: Mutex<UsageMetadata>,
}

impl UsageAccumulator {
    pub fn new(model_name: impl Into<String>, pricing: Arc<PricingTable>) -> Self {
        Self {
            model_name: model_name.into(),
            pricing,
            batch_pricing: false,
            inner: Mutex::new(UsageMetadata::default()),
        }
    }

    /// Price at the 50 % batch discount.
    pub fn with_batch_pricing(mut self, batch: bool) -> Self {
        self.batch_pricing = batch;
        self
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Record one successful invocation.
    pub fn record(&self, usage: &TokenUsage) {
        let mut meta = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        meta.merge(usage);
        meta.successful_requests += 1;
        meta.total_cost = self.pricing.cost(&self.model_name, &meta, self.batch_pricing);
    }

    /// Copy of the current totals.
    pub fn snapshot(&self) -> UsageMetadata {
        self.inner.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn anthropic_flat_payload() {
        let u = TokenUsage::from_payload(&json!({
            "input_tokens": 1200,
            "output_tokens": 300,
            "cache_creation_input_tokens": 100,
            "cache_read_input_tokens": 50
        }));
        assert_eq!(u.input_tokens, 1200);
        assert_eq!(u.output_tokens, 300);
        assert_eq!(u.cache_write, 100);
        assert_eq!(u.cache_read, 50);
        assert_eq!(u.total_tokens, 0);
    }

    #[test]
    fn nested_details_payload() {
        let u = TokenUsage::from_payload(&json!({
            "input_tokens": 900,
            "output_tokens": 400,
            "total_tokens": 1300,
            "input_token_details": { "cache_creation": 10, "cache_read": 200 },
            "output_token_details": { "reasoning": 64 }
        }));
        assert_eq!(u.cache_write, 10);
        assert_eq!(u.cache_read, 200);
        assert_eq!(u.reasoning, 64);
        assert_eq!(u.total_tokens, 1300);
    }

    #[test]
    fn openai_payload() {
        let u = TokenUsage::from_payload(&json!({
            "prompt_tokens": 1000,
            "completion_tokens": 500,
            "total_tokens": 1500,
            "prompt_tokens_details": { "cached_tokens": 256 },
            "completion_tokens_details": { "reasoning_tokens": 32 }
        }));
        assert_eq!(u.input_tokens, 1000);
        assert_eq!(u.output_tokens, 500);
        assert_eq!(u.cache_read, 256);
        assert_eq!(u.reasoning, 32);
    }

    #[test]
    fn non_object_payload_is_empty() {
        assert!(TokenUsage::from_payload(&Value::Null).is_empty());
        assert!(TokenUsage::from_payload(&json!([1, 2])).is_empty());
    }

    #[test]
    fn merge_adds_and_derives_total() {
        let mut m = UsageMetadata::default();
        m.merge(&TokenUsage::new(100, 20));
        m.merge_payload(&json!({ "input_tokens": 5, "output_tokens": 5, "total_tokens": 12 }));
        assert_eq!(m.input_tokens, 105);
        assert_eq!(m.output_tokens, 25);
        assert_eq!(m.total_tokens, 132);
    }

    #[test]
    fn accumulator_recomputes_cost() {
        let acc = UsageAccumulator::new("gpt-4o", Arc::new(PricingTable::default()));
        acc.record(&TokenUsage::new(500, 250));
        acc.record(&TokenUsage::new(500, 250));
        let snap = acc.snapshot();
        assert_eq!(snap.successful_requests, 2);
        assert_eq!(snap.input_tokens, 1000);
        assert!((snap.total_cost - 0.0075).abs() < 1e-12, "cost {}", snap.total_cost);
    }

    #[test]
    fn accumulator_is_safe_under_concurrent_records() {
        let acc = Arc::new(UsageAccumulator::new("gpt-4o", Arc::new(PricingTable::default())));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let acc = Arc::clone(&acc);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        acc.record(&TokenUsage::new(1, 1));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let snap = acc.snapshot();
        assert_eq!(snap.successful_requests, 800);
        assert_eq!(snap.input_tokens, 800);
        assert_eq!(snap.total_tokens, 1600);
    }
}
