//! Cost accounting for provider calls
//!
//! Costs are carried as integer micro-USD so accumulation is exact and
//! comparisons against cost caps are deterministic.

mod pricing;
mod tracker;

pub use pricing::{default_pricing, CostMicros, ModelPricing, DEFAULT_PRICING_KEY};
pub use tracker::{CostTracker, DailyCost, ModelStats, ProviderStats, UsageRecord, UsageStats};

#[cfg(test)]
mod tests;
