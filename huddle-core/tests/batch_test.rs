use huddle_core::batch::{BatchAbandoned, BatchAggregator, BatchOutcome};
use huddle_core::config::BatchConfig;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
enum TestError {
    Abandoned,
    Backend(String),
}

impl From<BatchAbandoned> for TestError {
    fn from(_: BatchAbandoned) -> Self {
        TestError::Abandoned
    }
}

type Aggregator = BatchAggregator<String, String, TestError>;

fn aggregator(window_ms: u64, max_members: usize) -> Aggregator {
    BatchAggregator::new(&BatchConfig {
        enabled: true,
        window_ms,
        max_members,
        similarity_threshold: 0.6,
    })
}

/// Submit `text`, counting dispatches and answering with the joined batch
async fn ask(
    aggregator: &Aggregator,
    calls: &Arc<AtomicU32>,
    scope: &str,
    text: &str,
) -> Result<BatchOutcome<String>, TestError> {
    let calls = calls.clone();
    aggregator
        .submit(scope, text, text.to_string(), move |items: Vec<String>| async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(items.join(" | "))
        })
        .await
}

#[tokio::test(start_paused = true)]
async fn similar_concurrent_requests_share_one_dispatch() {
    let aggregator = aggregator(50, 8);
    let calls = Arc::new(AtomicU32::new(0));

    let (first, second) = tokio::join!(
        ask(&aggregator, &calls, "retrieval", "what did we decide about the budget"),
        ask(&aggregator, &calls, "retrieval", "What did we decide about the budget?"),
    );
    let first = first.unwrap();
    let second = second.unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(first.value, second.value);
    assert_eq!(
        first.value,
        "what did we decide about the budget | What did we decide about the budget?"
    );
    assert_eq!((first.member_index, second.member_index), (0, 1));
    assert!(first.was_coalesced() && second.was_coalesced());

    let stats = aggregator.stats();
    assert_eq!(stats.submitted, 2);
    assert_eq!(stats.groups_dispatched, 1);
    assert_eq!(stats.coalesced, 1);
    assert_eq!(stats.largest_group, 2);
    assert_eq!(aggregator.open_groups(), 0);
}

#[tokio::test(start_paused = true)]
async fn dissimilar_requests_are_dispatched_separately() {
    let aggregator = aggregator(50, 8);
    let calls = Arc::new(AtomicU32::new(0));

    let (first, second) = tokio::join!(
        ask(&aggregator, &calls, "retrieval", "who owns the hiring plan"),
        ask(&aggregator, &calls, "retrieval", "when is the offsite scheduled"),
    );

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(first.unwrap().group_size, 1);
    assert_eq!(second.unwrap().group_size, 1);
    assert_eq!(aggregator.stats().coalesced, 0);
}

#[tokio::test(start_paused = true)]
async fn groups_never_cross_scopes() {
    let aggregator = aggregator(50, 8);
    let calls = Arc::new(AtomicU32::new(0));

    let (first, second) = tokio::join!(
        ask(&aggregator, &calls, "retrieval", "summarize the budget discussion"),
        ask(&aggregator, &calls, "analysis", "summarize the budget discussion"),
    );

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(!first.unwrap().was_coalesced());
    assert!(!second.unwrap().was_coalesced());
}

#[tokio::test]
async fn full_group_dispatches_before_the_window_closes() {
    // a window far longer than the test timeout: only the size cap can end it
    let aggregator = aggregator(5_000, 2);
    let calls = Arc::new(AtomicU32::new(0));

    let joined = tokio::time::timeout(Duration::from_secs(1), async {
        tokio::join!(
            ask(&aggregator, &calls, "ideation", "ideas for the team offsite"),
            ask(&aggregator, &calls, "ideation", "ideas for the team offsite please"),
        )
    })
    .await
    .expect("full group should dispatch without waiting for the window");

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(joined.0.unwrap().group_size, 2);
    assert_eq!(joined.1.unwrap().group_size, 2);
}

#[tokio::test(start_paused = true)]
async fn full_group_does_not_accept_more_members() {
    let aggregator = aggregator(50, 2);
    let calls = Arc::new(AtomicU32::new(0));

    let (a, b, c) = tokio::join!(
        ask(&aggregator, &calls, "retrieval", "what did we decide about pricing"),
        ask(&aggregator, &calls, "retrieval", "what did we decide about pricing"),
        ask(&aggregator, &calls, "retrieval", "what did we decide about pricing"),
    );

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(a.unwrap().group_size, 2);
    assert_eq!(b.unwrap().group_size, 2);
    assert_eq!(c.unwrap().group_size, 1);
    assert_eq!(aggregator.stats().largest_group, 2);
}

#[tokio::test(start_paused = true)]
async fn dispatch_errors_reach_every_member() {
    let aggregator = aggregator(50, 8);

    let fail = |text: &'static str| {
        let aggregator = aggregator.clone();
        async move {
            aggregator
                .submit("analysis", text, text.to_string(), |_items: Vec<String>| async {
                    Err::<String, _>(TestError::Backend("model unavailable".into()))
                })
                .await
        }
    };

    let (first, second) = tokio::join!(
        fail("compare the two vendor proposals"),
        fail("compare the two vendor proposals"),
    );

    let expected = TestError::Backend("model unavailable".into());
    assert_eq!(first.unwrap_err(), expected);
    assert_eq!(second.unwrap_err(), expected);
    assert_eq!(aggregator.stats().groups_dispatched, 1);
}
