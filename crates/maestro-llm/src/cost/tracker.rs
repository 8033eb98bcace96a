//! Usage tracker for provider calls
//!
//! Records every billable call (including failed and retried calls) and
//! aggregates statistics for the monitoring surface.

use super::pricing::{default_pricing, CostMicros, ModelPricing, DEFAULT_PRICING_KEY};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Maximum records kept in memory by default
const DEFAULT_MAX_RECORDS: usize = 10_000;

/// One billable provider call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageRecord {
    /// Record id
    pub id: u64,
    /// When the call finished
    pub timestamp: DateTime<Utc>,
    /// Task the call was made for, if any
    pub task_id: Option<Uuid>,
    /// Provider name
    pub provider: String,
    /// Model id
    pub model: String,
    /// Prompt tokens
    pub tokens_in: u32,
    /// Completion tokens
    pub tokens_out: u32,
    /// Cost of the call
    pub cost: CostMicros,
    /// Call latency
    pub latency_ms: u64,
    /// Whether the call succeeded
    pub success: bool,
}

/// Per-provider aggregate
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderStats {
    /// Total tokens (in + out)
    pub total_tokens: u64,
    /// Total cost
    pub total_cost: CostMicros,
    /// Number of calls
    pub request_count: u64,
}

/// Per-model aggregate
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelStats {
    /// Prompt tokens
    pub tokens_in: u64,
    /// Completion tokens
    pub tokens_out: u64,
    /// Total cost
    pub total_cost: CostMicros,
    /// Number of calls
    pub request_count: u64,
}

/// Aggregated usage statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UsageStats {
    /// Total prompt tokens
    pub total_tokens_in: u64,
    /// Total completion tokens
    pub total_tokens_out: u64,
    /// Total cost
    pub total_cost: CostMicros,
    /// Total calls
    pub total_requests: u64,
    /// Successful calls
    pub successful_requests: u64,
    /// Failed calls
    pub failed_requests: u64,
    /// Breakdown by provider
    pub by_provider: HashMap<String, ProviderStats>,
    /// Breakdown by model
    pub by_model: HashMap<String, ModelStats>,
}

/// Cost aggregate for one calendar day
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyCost {
    /// The day (UTC)
    pub date: NaiveDate,
    /// Cost incurred that day
    pub cost: CostMicros,
    /// Calls made that day
    pub requests: u64,
    /// Tokens consumed that day
    pub tokens: u64,
}

/// Cost tracker recording provider usage
pub struct CostTracker {
    pricing: RwLock<HashMap<String, ModelPricing>>,
    records: RwLock<Vec<UsageRecord>>,
    next_id: AtomicU64,
    max_records: usize,
}

impl Default for CostTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl CostTracker {
    /// Create a tracker with the default pricing table
    #[must_use]
    pub fn new() -> Self {
        Self {
            pricing: RwLock::new(default_pricing()),
            records: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
            max_records: DEFAULT_MAX_RECORDS,
        }
    }

    /// Cap on in-memory records
    #[must_use]
    pub fn with_max_records(mut self, max: usize) -> Self {
        self.max_records = max;
        self
    }

    /// Update pricing for a model
    pub async fn update_pricing(&self, model: &str, pricing: ModelPricing) {
        self.pricing.write().await.insert(model.to_string(), pricing);
    }

    /// Cost of a call against a model, via the pricing table
    pub async fn estimate_cost(&self, model: &str, tokens_in: u32, tokens_out: u32) -> CostMicros {
        let pricing = self.pricing.read().await;
        let entry = pricing
            .get(model)
            .or_else(|| pricing.get(DEFAULT_PRICING_KEY));
        match entry {
            Some(p) => p.calculate_cost(tokens_in, tokens_out),
            None => CostMicros::ZERO,
        }
    }

    /// Record a billable call and return the stored record
    #[allow(clippy::too_many_arguments)]
    pub async fn record_usage(
        &self,
        provider: &str,
        model: &str,
        tokens_in: u32,
        tokens_out: u32,
        latency_ms: u64,
        success: bool,
        task_id: Option<Uuid>,
    ) -> UsageRecord {
        let cost = self.estimate_cost(model, tokens_in, tokens_out).await;
        let record = UsageRecord {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            timestamp: Utc::now(),
            task_id,
            provider: provider.to_string(),
            model: model.to_string(),
            tokens_in,
            tokens_out,
            cost,
            latency_ms,
            success,
        };

        let mut records = self.records.write().await;
        records.push(record.clone());
        if records.len() > self.max_records {
            let drain = records.len() - self.max_records;
            records.drain(0..drain);
        }
        record
    }

    /// Aggregate statistics, optionally limited to records since an instant
    pub async fn stats(&self, since: Option<DateTime<Utc>>) -> UsageStats {
        let records = self.records.read().await;
        let mut stats = UsageStats::default();

        for record in records.iter() {
            if let Some(since) = since {
                if record.timestamp < since {
                    continue;
                }
            }

            stats.total_tokens_in += u64::from(record.tokens_in);
            stats.total_tokens_out += u64::from(record.tokens_out);
            stats.total_cost += record.cost;
            stats.total_requests += 1;
            if record.success {
                stats.successful_requests += 1;
            } else {
                stats.failed_requests += 1;
            }

            let provider = stats.by_provider.entry(record.provider.clone()).or_default();
            provider.total_tokens += u64::from(record.tokens_in + record.tokens_out);
            provider.total_cost += record.cost;
            provider.request_count += 1;

            let model = stats.by_model.entry(record.model.clone()).or_default();
            model.tokens_in += u64::from(record.tokens_in);
            model.tokens_out += u64::from(record.tokens_out);
            model.total_cost += record.cost;
            model.request_count += 1;
        }

        stats
    }

    /// Accumulated cost for one task
    pub async fn task_cost(&self, task_id: Uuid) -> CostMicros {
        self.records
            .read()
            .await
            .iter()
            .filter(|r| r.task_id == Some(task_id))
            .map(|r| r.cost)
            .sum()
    }

    /// Daily cost aggregates for the last `days` days, oldest first
    pub async fn daily_costs(&self, days: u32) -> Vec<DailyCost> {
        let cutoff = Utc::now() - Duration::days(i64::from(days));
        let records = self.records.read().await;

        let mut by_day: HashMap<NaiveDate, DailyCost> = HashMap::new();
        for record in records.iter().filter(|r| r.timestamp >= cutoff) {
            let date = record.timestamp.date_naive();
            let day = by_day.entry(date).or_insert(DailyCost {
                date,
                cost: CostMicros::ZERO,
                requests: 0,
                tokens: 0,
            });
            day.cost += record.cost;
            day.requests += 1;
            day.tokens += u64::from(record.tokens_in + record.tokens_out);
        }

        let mut out: Vec<DailyCost> = by_day.into_values().collect();
        out.sort_by_key(|d| d.date);
        out
    }

    /// Most recent records, oldest first
    pub async fn recent(&self, limit: usize) -> Vec<UsageRecord> {
        let records = self.records.read().await;
        let start = records.len().saturating_sub(limit);
        records[start..].to_vec()
    }
}
