//! Static per-model pricing and cost estimation.
//!
//! Estimates only; not billing-grade. Rates are USD per token. The cache
//! columns are multipliers applied to the input rate: `0.5` means cached
//! reads cost half the normal input price, `3.75` means cache writes cost
//! 3.75× the input price.
//!
//! ## Fuzzy model lookup
//!
//! Providers version model ids freely (`gpt-4o-2024-08-06`,
//! `us.anthropic.claude-…-v2:0`). When the exact id is not in the table, keys
//! are scanned longest first: a suffix pass (key ends with the name or the
//! name ends with the key), then a prefix pass (same test with
//! `starts_with`). The first hit wins; equal-length keys keep table order.

use crate::usage::UsageMetadata;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::info;

/// One pricing row.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    /// USD per input token.
    pub input: f64,
    /// USD per output token.
    pub output: f64,
    /// Multiplier on `input` for cache-read tokens.
    pub cache_read: f64,
    /// Multiplier on `input` for cache-write tokens.
    pub cache_write: f64,
}

const fn per_million(input: f64, output: f64, cache_read: f64, cache_write: f64) -> ModelPricing {
    ModelPricing {
        input: input / 1_000_000.0,
        output: output / 1_000_000.0,
        cache_read,
        cache_write,
    }
}

#[rustfmt::skip]
const BUILTIN: &[(&str, ModelPricing)] = &[
    // OpenAI
    ("gpt-4o",                    per_million(2.50, 10.0, 0.5, 1.0)),
    ("gpt-4o-latest",             per_million(5.0, 15.0, 0.5, 1.0)),
    ("gpt-4o-2024-05-13",         per_million(5.0, 15.0, 0.5, 1.0)),
    ("gpt-4o-mini",               per_million(0.15, 0.6, 0.5, 1.0)),
    ("o1-preview",                per_million(15.0, 60.0, 0.5, 1.0)),
    ("o1-mini",                   per_million(3.0, 12.0, 0.5, 1.0)),
    ("gpt-4",                     per_million(30.0, 60.0, 0.5, 1.0)),
    ("gpt-4-32k",                 per_million(60.0, 120.0, 0.5, 1.0)),
    ("gpt-4-turbo",               per_million(10.0, 30.0, 0.5, 1.0)),
    ("gpt-4-turbo-2024-04-09",    per_million(10.0, 30.0, 0.5, 1.0)),
    ("gpt-3.5-turbo-0125",        per_million(0.5, 1.50, 0.5, 1.0)),
    // Anthropic
    ("claude-3-5-sonnet-20240620", per_million(3.0, 15.0, 0.1, 3.75)),
    ("claude-3-5-sonnet-20241022", per_million(3.0, 15.0, 0.1, 3.75)),
    ("claude-3-5-sonnet-latest",   per_million(3.0, 15.0, 0.1, 3.75)),
    ("claude-3-5-haiku-20241022",  per_million(1.0, 5.0, 0.1, 1.25)),
    ("claude-3-5-haiku-latest",    per_million(1.0, 5.0, 0.1, 1.25)),
    ("claude-3-haiku-20240307",    per_million(0.25, 1.25, 0.1, 1.25)),
    ("claude-3-sonnet-20240229",   per_million(3.0, 15.0, 0.1, 1.25)),
    ("claude-3-opus-20240229",     per_million(15.0, 75.0, 0.1, 1.25)),
    // AWS Bedrock (family ids without the revision suffix catch new revisions)
    ("amazon.nova-micro-v1:0",                    per_million(0.035, 0.14, 0.25, 1.0)),
    ("amazon.nova-lite-v1:0",                     per_million(0.06, 0.24, 0.25, 1.0)),
    ("amazon.nova-pro-v1:0",                      per_million(0.8, 3.2, 0.25, 1.0)),
    ("anthropic.claude-3-5-haiku-20241022-v1:0",  per_million(1.0, 5.0, 0.1, 1.25)),
    ("anthropic.claude-3-5-haiku-20241022",       per_million(1.0, 5.0, 0.1, 1.25)),
    ("anthropic.claude-3-5-sonnet-20240620-v1:0", per_million(3.0, 15.0, 0.1, 3.75)),
    ("anthropic.claude-3-5-sonnet-20241022-v2:0", per_million(3.0, 15.0, 0.1, 3.75)),
    ("anthropic.claude-3-5-sonnet-20241022",      per_million(3.0, 15.0, 0.1, 3.75)),
    // Google
    ("flash1.5",                  per_million(0.075, 0.30, 0.25, 1.0)),
    ("flash1.5-8b",               per_million(0.0375, 0.15, 0.27, 1.0)),
    ("pro1.5",                    per_million(1.25, 10.0, 0.25, 1.0)),
    ("pro1.0",                    per_million(0.5, 1.5, 1.0, 1.0)),
    // xAI
    ("grok-beta",                 per_million(5.0, 15.0, 1.0, 1.0)),
    ("grok-vision-beta",          per_million(5.0, 15.0, 1.0, 1.0)),
    ("grok-2-vision",             per_million(2.0, 10.0, 1.0, 1.0)),
    ("grok-2",                    per_million(2.0, 10.0, 1.0, 1.0)),
    // DeepSeek
    ("deepseek-chat",             per_million(0.14, 0.28, 1.0, 1.0)),
];

static BUILTIN_TABLE: Lazy<PricingTable> = Lazy::new(|| {
    PricingTable::from_rows(BUILTIN.iter().map(|(k, p)| ((*k).to_string(), *p)))
});

/// Model-name → pricing lookup with fuzzy fallback.
#[derive(Debug, Clone)]
pub struct PricingTable {
    /// Declaration order; lookups by exact name scan this.
    rows: Vec<(String, ModelPricing)>,
    /// Indices into `rows`, longest key first, ties in declaration order.
    by_len: Vec<usize>,
}

impl Default for PricingTable {
    /// The built-in table.
    fn default() -> Self {
        BUILTIN_TABLE.clone()
    }
}

impl PricingTable {
    pub fn from_rows(rows: impl IntoIterator<Item = (String, ModelPricing)>) -> Self {
        let rows: Vec<_> = rows.into_iter().collect();
        let mut by_len: Vec<usize> = (0..rows.len()).collect();
        // Stable: equal lengths keep declaration order.
        by_len.sort_by(|&a, &b| rows[b].0.len().cmp(&rows[a].0.len()));
        Self { rows, by_len }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Resolve `model_name` to the table key used for pricing.
    pub fn resolve_model_name(&self, model_name: &str) -> Option<&str> {
        if model_name.is_empty() {
            return None;
        }
        if let Some((k, _)) = self.rows.iter().find(|(k, _)| k == model_name) {
            return Some(k);
        }
        let keys = || self.by_len.iter().map(|&i| self.rows[i].0.as_str());
        keys()
            .find(|k| k.ends_with(model_name) || model_name.ends_with(k))
            .or_else(|| keys().find(|k| k.starts_with(model_name) || model_name.starts_with(k)))
    }

    /// Pricing row for `model_name`, after fuzzy resolution.
    pub fn lookup(&self, model_name: &str) -> Option<&ModelPricing> {
        let key = self.resolve_model_name(model_name)?;
        self.rows.iter().find(|(k, _)| k == key).map(|(_, p)| p)
    }

    /// Estimated USD cost of `usage` on `model_name`; `0.0` when unpriced.
    ///
    /// Cache-read and cache-write tokens are carved out of the input count
    /// before the base rate applies, then priced with their own multipliers.
    pub fn cost(&self, model_name: &str, usage: &UsageMetadata, batch_pricing: bool) -> f64 {
        let Some(p) = self.lookup(model_name) else {
            return 0.0;
        };
        let input = usage.input_tokens as f64;
        let cache_read = usage.cache_read as f64;
        let cache_write = usage.cache_write as f64;
        let output = usage.output_tokens as f64;

        let total = (input - cache_read - cache_write) * p.input
            + cache_read * p.input * p.cache_read
            + cache_write * p.input * p.cache_write
            + output * p.output;

        if batch_pricing {
            total * 0.5
        } else {
            total
        }
    }
}

/// How much cost detail to report at the end of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PricingDisplay {
    /// Report nothing.
    None,
    /// Total cost only.
    Price,
    /// Resolved pricing key, every counter, and the total. (default)
    #[default]
    Details,
}

impl FromStr for PricingDisplay {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" => Ok(PricingDisplay::None),
            "price" => Ok(PricingDisplay::Price),
            "details" => Ok(PricingDisplay::Details),
            other => Err(format!("unknown pricing display '{other}' (none, price, details)")),
        }
    }
}

impl fmt::Display for PricingDisplay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PricingDisplay::None => "none",
            PricingDisplay::Price => "price",
            PricingDisplay::Details => "details",
        })
    }
}

/// Log the run's cost at the requested verbosity.
pub fn report_cost(display: PricingDisplay, table: &PricingTable, model_name: &str, usage: &UsageMetadata) {
    match display {
        PricingDisplay::None => {}
        PricingDisplay::Price => info!("Total Cost ${:.4}", usage.total_cost),
        PricingDisplay::Details => {
            let key = table.resolve_model_name(model_name).unwrap_or("<unpriced>");
            info!(
                model = model_name,
                pricing_key = key,
                input_tokens = usage.input_tokens,
                output_tokens = usage.output_tokens,
                total_tokens = usage.total_tokens,
                cache_read = usage.cache_read,
                cache_write = usage.cache_write,
                reasoning = usage.reasoning,
                successful_requests = usage.successful_requests,
                "Model: {} Cost: ${:.4}",
                key,
                usage.total_cost
            );
            info!("Total Cost ${:.4}", usage.total_cost);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usage(input: u64, output: u64, cache_read: u64, cache_write: u64) -> UsageMetadata {
        UsageMetadata {
            input_tokens: input,
            output_tokens: output,
            cache_read,
            cache_write,
            ..UsageMetadata::default()
        }
    }

    fn approx(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-12, "{a} != {b}");
    }

    #[test]
    fn gpt4o_cost_example() {
        let t = PricingTable::default();
        approx(t.cost("gpt-4o", &usage(1000, 500, 0, 0), false), 0.0075);
    }

    #[test]
    fn batch_pricing_halves() {
        let t = PricingTable::default();
        approx(t.cost("gpt-4o", &usage(1000, 500, 0, 0), true), 0.00375);
    }

    #[test]
    fn cached_tokens_are_not_double_counted() {
        let t = PricingTable::default();
        // 1000 input of which 400 read from cache and 100 written to cache.
        let got = t.cost("claude-3-5-sonnet-20241022", &usage(1000, 0, 400, 100), false);
        let rate = 3.0 / 1_000_000.0;
        let expected = 500.0 * rate + 400.0 * rate * 0.1 + 100.0 * rate * 3.75;
        approx(got, expected);
    }

    #[test]
    fn unknown_model_costs_nothing() {
        let t = PricingTable::default();
        assert_eq!(t.cost("mystery-model", &usage(1000, 1000, 0, 0), false), 0.0);
        assert_eq!(t.resolve_model_name(""), None);
    }

    #[test]
    fn fuzzy_prefix_uses_longest_known_key() {
        let t = PricingTable::default();
        assert_eq!(
            t.resolve_model_name("anthropic.claude-3-5-sonnet-20241022-v2:5"),
            Some("anthropic.claude-3-5-sonnet-20241022")
        );
        assert!(t.cost("anthropic.claude-3-5-sonnet-20241022-v2:5", &usage(1000, 0, 0, 0), false) > 0.0);
        // Dated snapshot of gpt-4o: "gpt-4o-2024-05-13" is longer but does not
        // prefix-match; "gpt-4o-mini" / "gpt-4o-latest" neither; "gpt-4o" does.
        assert_eq!(t.resolve_model_name("gpt-4o-2024-08-06"), Some("gpt-4o"));
    }

    #[test]
    fn fuzzy_suffix_wins_over_prefix() {
        let t = PricingTable::default();
        // Cross-region Bedrock ids end with a known key.
        assert_eq!(
            t.resolve_model_name("us.anthropic.claude-3-5-sonnet-20241022-v2:0"),
            Some("anthropic.claude-3-5-sonnet-20241022-v2:0")
        );
    }

    #[test]
    fn equal_length_ties_keep_table_order() {
        let p = per_million(1.0, 1.0, 1.0, 1.0);
        let t = PricingTable::from_rows(vec![
            ("abc-1".to_string(), p),
            ("abc-2".to_string(), p),
        ]);
        // "abc" is a prefix of both keys; first declared wins.
        assert_eq!(t.resolve_model_name("abc"), Some("abc-1"));
    }

    #[test]
    fn pricing_display_parses() {
        assert_eq!("details".parse::<PricingDisplay>().unwrap(), PricingDisplay::Details);
        assert_eq!("PRICE".parse::<PricingDisplay>().unwrap(), PricingDisplay::Price);
        assert!("verbose".parse::<PricingDisplay>().is_err());
    }
}
