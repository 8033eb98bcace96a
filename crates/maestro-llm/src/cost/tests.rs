use super::*;
use uuid::Uuid;

#[tokio::test]
async fn test_record_and_stats() {
    let tracker = CostTracker::new();

    tracker
        .record_usage("anthropic", "claude-3-5-sonnet-20241022", 2000, 2000, 120, true, None)
        .await;
    tracker
        .record_usage("anthropic", "claude-3-5-sonnet-20241022", 1000, 500, 80, false, None)
        .await;

    let stats = tracker.stats(None).await;
    assert_eq!(stats.total_requests, 2);
    assert_eq!(stats.successful_requests, 1);
    assert_eq!(stats.failed_requests, 1);
    assert_eq!(stats.total_tokens_in, 3000);
    assert_eq!(stats.total_tokens_out, 2500);
    // 0.036 + (0.003 + 0.0075) = 0.0465
    assert_eq!(stats.total_cost.as_micros(), 46_500);

    let model = &stats.by_model["claude-3-5-sonnet-20241022"];
    assert_eq!(model.request_count, 2);
}

#[tokio::test]
async fn test_failed_calls_still_cost() {
    let tracker = CostTracker::new();
    let record = tracker
        .record_usage("anthropic", "claude-3-5-sonnet-20241022", 2000, 2000, 90, false, None)
        .await;
    assert_eq!(record.cost.as_micros(), 36_000);
}

#[tokio::test]
async fn test_task_cost_accumulates() {
    let tracker = CostTracker::new();
    let task = Uuid::new_v4();
    let other = Uuid::new_v4();

    tracker
        .record_usage("anthropic", "claude-3-5-sonnet-20241022", 1000, 1000, 50, true, Some(task))
        .await;
    tracker
        .record_usage("anthropic", "claude-3-5-sonnet-20241022", 1000, 1000, 50, true, Some(task))
        .await;
    tracker
        .record_usage("anthropic", "claude-3-5-sonnet-20241022", 1000, 1000, 50, true, Some(other))
        .await;

    // Each call: 0.003 + 0.015 = 0.018
    assert_eq!(tracker.task_cost(task).await.as_micros(), 36_000);
    assert_eq!(tracker.task_cost(other).await.as_micros(), 18_000);
}

#[tokio::test]
async fn test_unknown_model_uses_default_pricing() {
    let tracker = CostTracker::new();
    let cost = tracker.estimate_cost("some-new-model", 1000, 1000).await;
    // Defaults: $0.003 in, $0.015 out per 1K
    assert_eq!(cost.as_micros(), 18_000);
}

#[tokio::test]
async fn test_local_model_is_free() {
    let tracker = CostTracker::new();
    let cost = tracker.estimate_cost("codellama:7b", 50_000, 50_000).await;
    assert!(cost.is_zero());
}

#[tokio::test]
async fn test_record_trimming() {
    let tracker = CostTracker::new().with_max_records(3);
    for _ in 0..5 {
        tracker.record_usage("ollama", "codellama:7b", 10, 10, 5, true, None).await;
    }
    assert_eq!(tracker.recent(10).await.len(), 3);
}

#[tokio::test]
async fn test_daily_costs() {
    let tracker = CostTracker::new();
    tracker
        .record_usage("anthropic", "claude-3-5-sonnet-20241022", 1000, 1000, 50, true, None)
        .await;

    let daily = tracker.daily_costs(7).await;
    assert_eq!(daily.len(), 1);
    assert_eq!(daily[0].requests, 1);
    assert_eq!(daily[0].cost.as_micros(), 18_000);
}
