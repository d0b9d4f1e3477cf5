use huddle_core::bus::{
    BusError, HandlerError, Message, MessageBus, MessageKind, MessageStatus, handler_fn,
};
use huddle_core::config::{BusConfig, RetryPolicy};
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::sync::Notify;

fn bus_config() -> BusConfig {
    BusConfig {
        retry: RetryPolicy::immediate(),
        ..Default::default()
    }
}

fn ping(recipient: &str, label: &str) -> Message {
    Message::request("orchestrator", recipient, json!({ "text": label }))
}

#[tokio::test]
async fn delivers_by_priority_then_arrival() {
    let bus = MessageBus::new(bus_config());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = seen.clone();
    bus.register(
        "retrieval",
        handler_fn(move |message: Message| {
            let log = log.clone();
            async move {
                log.lock().push(message.text().unwrap_or_default().to_string());
                Ok(Value::Null)
            }
        }),
    )
    .unwrap();

    // queue everything before the worker exists so ordering is fully decided by the queue
    let mut handles = Vec::new();
    for (label, priority) in [("a", 5u8), ("b", 1), ("c", 10), ("d", 1), ("e", 5)] {
        handles.push(bus.send(ping("retrieval", label).with_priority(priority)).unwrap());
    }
    bus.start();
    for handle in handles {
        handle.outcome().await.unwrap();
    }

    assert_eq!(*seen.lock(), vec!["b", "d", "a", "e", "c"]);
}

#[tokio::test]
async fn failing_handler_is_attempted_exactly_max_attempts_times() {
    let bus = MessageBus::new(bus_config());
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    bus.register(
        "analysis",
        handler_fn(move |_message: Message| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(HandlerError::new("model backend exploded"))
            }
        }),
    )
    .unwrap();
    bus.start();

    let err = bus
        .request(ping("analysis", "compare").with_max_attempts(3))
        .await
        .unwrap_err();

    match &err {
        BusError::Handler { agent, attempts, cause } => {
            assert_eq!(agent, "analysis");
            assert_eq!(*attempts, 3);
            assert_eq!(cause.message, "model backend exploded");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    let stats = bus.stats();
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.retried, 2);
    assert_eq!(stats.completed, 0);

    let dead = bus.dead_letters();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].kind, MessageKind::Error);
    assert_eq!(dead[0].status, MessageStatus::Failed);
}

#[tokio::test]
async fn transient_failures_recover_on_retry() {
    let bus = MessageBus::new(bus_config());
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    bus.register(
        "ideation",
        handler_fn(move |_message: Message| {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(HandlerError::new("flaky"))
                } else {
                    Ok(json!({ "text": "third time lucky" }))
                }
            }
        }),
    )
    .unwrap();
    bus.start();

    let delivery = bus
        .request(ping("ideation", "ideas").with_max_attempts(3))
        .await
        .unwrap();
    assert_eq!(delivery.attempts(), 3);
    assert_eq!(delivery.request.status, MessageStatus::Completed);
    assert_eq!(delivery.response.text(), Some("third time lucky"));
    assert_eq!(
        delivery.response.correlation_id.as_deref(),
        Some(delivery.request.id.as_str())
    );
    assert_eq!(bus.stats().retried, 2);
}

#[tokio::test]
async fn slow_handlers_time_out_and_are_retried() {
    let bus = MessageBus::new(bus_config());
    bus.register(
        "retrieval",
        handler_fn(|_message: Message| async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            Ok(Value::Null)
        }),
    )
    .unwrap();
    bus.start();

    let err = bus
        .request(
            ping("retrieval", "slow")
                .with_timeout_ms(20)
                .with_max_attempts(2),
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        BusError::Timeout {
            timeout_ms: 20,
            attempts: 2,
            ..
        }
    ));
    let stats = bus.stats();
    assert_eq!(stats.timed_out, 2);
    assert_eq!(stats.failed, 1);
}

#[tokio::test]
async fn full_queue_rejects_new_messages() {
    let bus = MessageBus::new(BusConfig {
        queue_capacity: 1,
        ..bus_config()
    });
    bus.register("retrieval", handler_fn(|m: Message| async move { Ok(m.payload) }))
        .unwrap();

    let _first = bus.send(ping("retrieval", "one")).unwrap();
    let err = bus.send(ping("retrieval", "two")).unwrap_err();
    assert_eq!(
        err,
        BusError::QueueFull {
            agent: "retrieval".to_string(),
            capacity: 1
        }
    );

    let stats = bus.stats();
    assert_eq!(stats.sent, 1);
    assert_eq!(stats.rejected, 1);
    assert_eq!(stats.queue_depths["retrieval"], 1);
}

#[tokio::test]
async fn broadcast_skips_sender_and_excluded_agents() {
    let bus = MessageBus::new(bus_config());
    let received = Arc::new(Mutex::new(Vec::new()));
    for name in ["orchestrator", "retrieval", "ideation", "analysis"] {
        let log = received.clone();
        bus.register(
            name,
            handler_fn(move |message: Message| {
                let log = log.clone();
                let name = name.to_string();
                async move {
                    assert_eq!(message.kind, MessageKind::Broadcast);
                    log.lock().push(name);
                    Ok(Value::Null)
                }
            }),
        )
        .unwrap();
    }
    bus.start();

    let results = bus.broadcast("orchestrator", json!("meeting moved to 3pm"), &["analysis"]);
    let targets: Vec<&str> = results.iter().map(|(agent, _)| agent.as_str()).collect();
    assert_eq!(targets, vec!["ideation", "retrieval"]);

    for (_, handle) in results {
        handle.unwrap().outcome().await.unwrap();
    }
    let mut received = received.lock().clone();
    received.sort();
    assert_eq!(received, vec!["ideation", "retrieval"]);
}

#[tokio::test]
async fn cancelled_pending_message_never_runs() {
    let bus = MessageBus::new(bus_config());
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    bus.register(
        "retrieval",
        handler_fn(move |_message: Message| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Value::Null)
            }
        }),
    )
    .unwrap();

    let cancelled = bus.send(ping("retrieval", "never mind")).unwrap();
    cancelled.cancel();
    let kept = bus.send(ping("retrieval", "still wanted")).unwrap();
    bus.start();

    kept.outcome().await.unwrap();
    assert_eq!(cancelled.outcome().await.unwrap_err(), BusError::Cancelled);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(bus.stats().cancelled, 1);
}

#[tokio::test]
async fn cancelling_in_flight_message_suppresses_the_reply() {
    let bus = MessageBus::new(bus_config());
    let started = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let finished = Arc::new(AtomicU32::new(0));
    {
        let started = started.clone();
        let release = release.clone();
        let finished = finished.clone();
        bus.register(
            "analysis",
            handler_fn(move |_message: Message| {
                let started = started.clone();
                let release = release.clone();
                let finished = finished.clone();
                async move {
                    started.notify_one();
                    release.notified().await;
                    finished.fetch_add(1, Ordering::SeqCst);
                    Ok(json!({ "text": "done" }))
                }
            }),
        )
        .unwrap();
    }
    bus.start();

    let handle = bus.send(ping("analysis", "long job")).unwrap();
    started.notified().await;
    handle.cancel();
    release.notify_one();

    assert_eq!(handle.outcome().await.unwrap_err(), BusError::Cancelled);
    // the handler still ran to completion
    for _ in 0..50 {
        if bus.stats().completed == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(finished.load(Ordering::SeqCst), 1);
    assert_eq!(bus.stats().completed, 1);
}

#[tokio::test]
async fn agents_registered_after_start_are_served() {
    let bus = MessageBus::new(bus_config());
    bus.start();
    bus.register(
        "late",
        handler_fn(|_m: Message| async move { Ok(json!({ "text": "here" })) }),
    )
    .unwrap();

    let delivery = bus.request(ping("late", "anyone?")).await.unwrap();
    assert_eq!(delivery.response.text(), Some("here"));
}

#[tokio::test]
async fn shutdown_fails_queued_messages() {
    let bus = MessageBus::new(bus_config());
    bus.register("retrieval", handler_fn(|m: Message| async move { Ok(m.payload) }))
        .unwrap();

    let queued = bus.send(ping("retrieval", "too late")).unwrap();
    bus.shutdown().await;

    assert_eq!(queued.outcome().await.unwrap_err(), BusError::ShutDown);
    assert!(bus.agents().is_empty());
    assert!(matches!(
        bus.register("retrieval", handler_fn(|m: Message| async move { Ok(m.payload) })),
        Err(BusError::ShutDown)
    ));
}
