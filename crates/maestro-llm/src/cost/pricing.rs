//! Model pricing tables and cost arithmetic
//!
//! Prices are per 1K tokens in USD. Cost per call is
//! `(tokens_in/1000)*input + (tokens_out/1000)*output`, rounded half-even
//! to whole micro-USD (six fractional digits).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Pricing key used for models missing from the table
pub const DEFAULT_PRICING_KEY: &str = "__default__";

/// Default input cost per 1K tokens (USD) for unknown models
const DEFAULT_INPUT_PER_1K: f64 = 0.003;

/// Default output cost per 1K tokens (USD) for unknown models
const DEFAULT_OUTPUT_PER_1K: f64 = 0.015;

/// A cost amount in micro-USD (1e-6 dollars)
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct CostMicros(u64);

impl CostMicros {
    /// Zero cost
    pub const ZERO: Self = Self(0);

    /// Construct from a raw micro-USD amount
    #[must_use]
    pub const fn from_micros(micros: u64) -> Self {
        Self(micros)
    }

    /// Construct from a USD amount, rounding half-even to micros
    #[must_use]
    pub fn from_usd(usd: f64) -> Self {
        Self(round_half_even_micros(usd))
    }

    /// Raw micro-USD amount
    #[must_use]
    pub const fn as_micros(&self) -> u64 {
        self.0
    }

    /// Amount as USD
    #[must_use]
    pub fn as_usd(&self) -> f64 {
        self.0 as f64 / 1_000_000.0
    }

    /// Saturating addition
    #[must_use]
    pub fn saturating_add(self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    /// Whether this amount is zero
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl std::ops::Add for CostMicros {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self(self.0 + other.0)
    }
}

impl std::ops::AddAssign for CostMicros {
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl std::iter::Sum for CostMicros {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, |acc, c| acc.saturating_add(c))
    }
}

impl std::fmt::Display for CostMicros {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "${}.{:06}", self.0 / 1_000_000, self.0 % 1_000_000)
    }
}

/// Round a USD amount to whole micro-USD, ties to even
fn round_half_even_micros(usd: f64) -> u64 {
    let scaled = (usd * 1_000_000.0).max(0.0);
    let floor = scaled.floor();
    let frac = scaled - floor;
    let floor = floor as u64;
    if frac > 0.5 {
        floor + 1
    } else if frac < 0.5 {
        floor
    } else if floor % 2 == 0 {
        floor
    } else {
        floor + 1
    }
}

/// Pricing for one model, per 1K tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelPricing {
    /// Model id
    pub model: String,
    /// Provider name
    pub provider: String,
    /// USD per 1K input tokens
    pub input_per_1k: f64,
    /// USD per 1K output tokens
    pub output_per_1k: f64,
    /// Context window size
    pub context_window: u32,
}

impl ModelPricing {
    /// Cost of a call with the given token counts
    #[must_use]
    pub fn calculate_cost(&self, tokens_in: u32, tokens_out: u32) -> CostMicros {
        let usd = (f64::from(tokens_in) / 1000.0) * self.input_per_1k
            + (f64::from(tokens_out) / 1000.0) * self.output_per_1k;
        CostMicros::from_usd(usd)
    }
}

fn entry(model: &str, provider: &str, input: f64, output: f64, window: u32) -> ModelPricing {
    ModelPricing {
        model: model.to_string(),
        provider: provider.to_string(),
        input_per_1k: input,
        output_per_1k: output,
        context_window: window,
    }
}

/// Default pricing for known models, plus a fallback entry under
/// [`DEFAULT_PRICING_KEY`]
#[must_use]
pub fn default_pricing() -> HashMap<String, ModelPricing> {
    let mut pricing = HashMap::new();

    // Anthropic
    for (model, input, output) in [
        ("claude-opus-4-5-20251101", 0.015, 0.075),
        ("claude-3-5-sonnet-20241022", 0.003, 0.015),
        ("claude-3-5-haiku-20241022", 0.0008, 0.004),
        ("claude-3-opus-20240229", 0.015, 0.075),
        ("claude-3-sonnet-20240229", 0.003, 0.015),
        ("claude-3-haiku-20240307", 0.00025, 0.00125),
    ] {
        pricing.insert(model.to_string(), entry(model, "anthropic", input, output, 200_000));
    }

    // Local models via Ollama are free
    for model in ["codellama:7b", "qwen2.5:7b", "mistral"] {
        pricing.insert(model.to_string(), entry(model, "ollama", 0.0, 0.0, 32_000));
    }

    pricing.insert(
        DEFAULT_PRICING_KEY.to_string(),
        entry(DEFAULT_PRICING_KEY, "unknown", DEFAULT_INPUT_PER_1K, DEFAULT_OUTPUT_PER_1K, 128_000),
    );

    pricing
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cost_formula() {
        // 2,000 in + 2,000 out at $0.003/$0.015 per 1K = 0.006 + 0.030
        let sonnet = entry("s", "anthropic", 0.003, 0.015, 200_000);
        let cost = sonnet.calculate_cost(2000, 2000);
        assert_eq!(cost.as_micros(), 36_000);
        assert_eq!(cost.to_string(), "$0.036000");
    }

    #[test]
    fn test_half_even_rounding() {
        // 0.0000005 USD = 0.5 micros, ties to even (0)
        assert_eq!(round_half_even_micros(0.000_000_5), 0);
        // 1.5 micros ties to 2
        assert_eq!(round_half_even_micros(0.000_001_5), 2);
        assert_eq!(round_half_even_micros(0.000_002_4), 2);
        assert_eq!(round_half_even_micros(0.000_002_6), 3);
    }

    #[test]
    fn test_free_local_models() {
        let pricing = default_pricing();
        let local = &pricing["codellama:7b"];
        assert!(local.calculate_cost(100_000, 100_000).is_zero());
    }

    #[test]
    fn test_cost_accumulation() {
        let mut total = CostMicros::ZERO;
        total += CostMicros::from_micros(36_000);
        total += CostMicros::from_micros(4);
        assert_eq!(total.as_micros(), 36_004);
        assert!((total.as_usd() - 0.036_004).abs() < 1e-12);
    }
}
