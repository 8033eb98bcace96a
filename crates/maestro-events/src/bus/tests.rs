use super::*;
use futures::FutureExt;
use std::sync::atomic::AtomicUsize;

fn counting_handler(counter: Arc<AtomicUsize>) -> EventHandler {
    Arc::new(move |_event| {
        let counter = Arc::clone(&counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        .boxed()
    })
}

fn failing_handler() -> EventHandler {
    Arc::new(|_event| async { Err("handler exploded".into()) }.boxed())
}

#[tokio::test]
async fn test_typed_and_wildcard_delivery() {
    let bus = EventBus::new();
    let typed = Arc::new(AtomicUsize::new(0));
    let wild = Arc::new(AtomicUsize::new(0));

    bus.subscribe(Topic::Kind(EventKind::TaskCreated), counting_handler(Arc::clone(&typed)))
        .await
        .unwrap();
    bus.subscribe(Topic::Wildcard, counting_handler(Arc::clone(&wild)))
        .await
        .unwrap();

    bus.publish(EventKind::TaskCreated, serde_json::json!({}), PublishOptions::default())
        .await;
    bus.publish(EventKind::TaskStarted, serde_json::json!({}), PublishOptions::default())
        .await;

    assert_eq!(typed.load(Ordering::SeqCst), 1);
    assert_eq!(wild.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_versions_strictly_increase() {
    let bus = EventBus::new();
    let e1 = bus
        .publish(EventKind::TaskCreated, serde_json::json!({}), PublishOptions::default())
        .await;
    let e2 = bus
        .publish(EventKind::TaskStarted, serde_json::json!({}), PublishOptions::default())
        .await;
    let batch = bus
        .publish_batch(vec![
            (EventKind::TaskCompleted, serde_json::json!({}), PublishOptions::default()),
            (EventKind::SystemShutdown, serde_json::json!({}), PublishOptions::default()),
        ])
        .await;

    assert_eq!(e1.version, 1);
    assert_eq!(e2.version, 2);
    assert_eq!(batch[0].version, 3);
    assert_eq!(batch[1].version, 4);
}

#[tokio::test]
async fn test_once_removed_after_successful_delivery() {
    let bus = EventBus::new();
    let counter = Arc::new(AtomicUsize::new(0));

    bus.once(EventKind::TaskCompleted, counting_handler(Arc::clone(&counter)))
        .await
        .unwrap();
    assert_eq!(bus.handler_count(Topic::Kind(EventKind::TaskCompleted)).await, 1);

    bus.publish(EventKind::TaskCompleted, serde_json::json!({}), PublishOptions::default())
        .await;
    bus.publish(EventKind::TaskCompleted, serde_json::json!({}), PublishOptions::default())
        .await;

    assert_eq!(counter.load(Ordering::SeqCst), 1);
    assert_eq!(bus.handler_count(Topic::Kind(EventKind::TaskCompleted)).await, 0);
}

#[tokio::test]
async fn test_handler_errors_are_isolated() {
    let bus = EventBus::new();
    let counter = Arc::new(AtomicUsize::new(0));

    bus.subscribe(Topic::Kind(EventKind::TaskFailed), failing_handler())
        .await
        .unwrap();
    bus.subscribe(Topic::Kind(EventKind::TaskFailed), counting_handler(Arc::clone(&counter)))
        .await
        .unwrap();

    // The failing handler must not prevent delivery to the healthy one
    bus.publish(EventKind::TaskFailed, serde_json::json!({}), PublishOptions::default())
        .await;
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_failed_once_handler_stays_registered() {
    let bus = EventBus::new();
    bus.once(EventKind::TaskFailed, failing_handler()).await.unwrap();

    bus.publish(EventKind::TaskFailed, serde_json::json!({}), PublishOptions::default())
        .await;

    assert_eq!(bus.handler_count(Topic::Kind(EventKind::TaskFailed)).await, 1);
}

#[tokio::test]
async fn test_unsubscribe_restores_count() {
    let bus = EventBus::new();
    let before = bus.handler_count(Topic::Wildcard).await;

    let id = bus
        .subscribe(Topic::Wildcard, counting_handler(Arc::new(AtomicUsize::new(0))))
        .await
        .unwrap();
    assert_eq!(bus.handler_count(Topic::Wildcard).await, before + 1);

    assert!(bus.unsubscribe(id).await);
    assert_eq!(bus.handler_count(Topic::Wildcard).await, before);
    assert!(!bus.unsubscribe(id).await);
}

#[tokio::test]
async fn test_max_listeners_conflict() {
    let bus = EventBus::with_max_listeners(2);
    for _ in 0..2 {
        bus.subscribe(
            Topic::Kind(EventKind::AgentLog),
            counting_handler(Arc::new(AtomicUsize::new(0))),
        )
        .await
        .unwrap();
    }

    let err = bus
        .subscribe(
            Topic::Kind(EventKind::AgentLog),
            counting_handler(Arc::new(AtomicUsize::new(0))),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Conflict(_)));

    // A different kind still has room
    bus.subscribe(
        Topic::Kind(EventKind::AgentStarted),
        counting_handler(Arc::new(AtomicUsize::new(0))),
    )
    .await
    .unwrap();
}

#[tokio::test]
async fn test_default_aggregate_is_nil() {
    let bus = EventBus::new();
    let event = bus
        .publish(EventKind::SystemStarted, serde_json::json!({}), PublishOptions::default())
        .await;
    assert_eq!(event.aggregate_id, Uuid::nil());
}

#[tokio::test]
async fn test_tap_receives_events() {
    let bus = EventBus::new();
    let mut tap = bus.tap();

    let published = bus
        .publish(
            EventKind::TaskCreated,
            serde_json::json!({"description": "x"}),
            PublishOptions::default(),
        )
        .await;

    let received = tap.recv().await.unwrap();
    assert_eq!(received.id, published.id);
    assert_eq!(received.kind, EventKind::TaskCreated);
}
