//! Coalescing of similar concurrent requests
//!
//! The first request in a scope opens a group; later requests whose text is
//! similar enough join it while it is open. When the window closes (or the
//! group fills up) the leader's dispatch closure runs once with every
//! member's item and all members receive the same result.

use crate::config::BatchConfig;
use crate::types::normalize_text;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Notify, oneshot};
use tracing::debug;

/// Returned to members whose group went away without producing a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("batch group was abandoned before dispatch completed")]
pub struct BatchAbandoned;

/// One member's share of a group result
#[derive(Debug, Clone, PartialEq)]
pub struct BatchOutcome<O> {
    pub value: O,
    /// Position of this member's item in the dispatched batch
    pub member_index: usize,
    pub group_size: usize,
}

impl<O> BatchOutcome<O> {
    pub fn was_coalesced(&self) -> bool {
        self.group_size > 1
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchStats {
    pub submitted: u64,
    pub groups_dispatched: u64,
    /// Requests that joined an existing group instead of opening one
    pub coalesced: u64,
    pub largest_group: u64,
}

/// Jaccard overlap of the normalized token sets of `a` and `b`
pub fn similarity(a: &str, b: &str) -> f64 {
    jaccard(&tokenize(a), &tokenize(b))
}

fn tokenize(text: &str) -> HashSet<String> {
    normalize_text(text)
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let shared = a.intersection(b).count();
    let union = a.len() + b.len() - shared;
    shared as f64 / union as f64
}

type Waiter<O, E> = oneshot::Sender<Result<BatchOutcome<O>, E>>;

struct OpenGroup<I, O, E> {
    id: u64,
    scope: String,
    tokens: HashSet<String>,
    members: Vec<(I, Waiter<O, E>)>,
    full: Arc<Notify>,
}

struct Inner<I, O, E> {
    window: Duration,
    max_members: usize,
    threshold: f64,
    enabled: bool,
    open: Mutex<Vec<OpenGroup<I, O, E>>>,
    next_id: AtomicU64,
    submitted: AtomicU64,
    dispatched: AtomicU64,
    coalesced: AtomicU64,
    largest_group: AtomicU64,
}

pub struct BatchAggregator<I, O, E> {
    inner: Arc<Inner<I, O, E>>,
}

impl<I, O, E> Clone for BatchAggregator<I, O, E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<I, O, E> BatchAggregator<I, O, E>
where
    I: Send + 'static,
    O: Clone + Send + 'static,
    E: Clone + Send + From<BatchAbandoned> + 'static,
{
    pub fn new(config: &BatchConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                window: Duration::from_millis(config.window_ms),
                max_members: config.max_members.max(1),
                threshold: config.similarity_threshold,
                enabled: config.enabled,
                open: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(0),
                submitted: AtomicU64::new(0),
                dispatched: AtomicU64::new(0),
                coalesced: AtomicU64::new(0),
                largest_group: AtomicU64::new(0),
            }),
        }
    }

    /// Submit `item` for processing. `dispatch` only runs if this call
    /// opens a new group; otherwise it is dropped and the caller shares the
    /// result of the group it joined.
    pub async fn submit<F, Fut>(
        &self,
        scope: &str,
        text: &str,
        item: I,
        dispatch: F,
    ) -> Result<BatchOutcome<O>, E>
    where
        F: FnOnce(Vec<I>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<O, E>> + Send + 'static,
    {
        let inner = &self.inner;
        inner.submitted.fetch_add(1, Ordering::Relaxed);

        if !inner.enabled || inner.max_members == 1 {
            inner.dispatched.fetch_add(1, Ordering::Relaxed);
            inner.largest_group.fetch_max(1, Ordering::Relaxed);
            let value = dispatch(vec![item]).await?;
            return Ok(BatchOutcome {
                value,
                member_index: 0,
                group_size: 1,
            });
        }

        let tokens = tokenize(text);
        let (tx, rx) = oneshot::channel();

        let leader = {
            let mut open = inner.open.lock();
            let joinable = open.iter().position(|group| {
                group.scope == scope
                    && group.members.len() < inner.max_members
                    && jaccard(&group.tokens, &tokens) >= inner.threshold
            });
            match joinable {
                Some(index) => {
                    let group = &mut open[index];
                    group.members.push((item, tx));
                    inner.coalesced.fetch_add(1, Ordering::Relaxed);
                    debug!(scope, group = group.id, members = group.members.len(), "joined batch group");
                    if group.members.len() >= inner.max_members {
                        group.full.notify_one();
                    }
                    None
                }
                None => {
                    let id = inner.next_id.fetch_add(1, Ordering::Relaxed);
                    let full = Arc::new(Notify::new());
                    open.push(OpenGroup {
                        id,
                        scope: scope.to_string(),
                        tokens,
                        members: vec![(item, tx)],
                        full: full.clone(),
                    });
                    debug!(scope, group = id, "opened batch group");
                    Some((id, full))
                }
            }
        };

        // Dispatch runs detached so followers are served even if the
        // leader's caller stops waiting.
        if let Some((id, full)) = leader {
            let inner = inner.clone();
            tokio::spawn(async move {
                inner.run_group(id, full, dispatch).await;
            });
        }

        match rx.await {
            Ok(outcome) => outcome,
            Err(_) => Err(E::from(BatchAbandoned)),
        }
    }

    pub fn stats(&self) -> BatchStats {
        BatchStats {
            submitted: self.inner.submitted.load(Ordering::Relaxed),
            groups_dispatched: self.inner.dispatched.load(Ordering::Relaxed),
            coalesced: self.inner.coalesced.load(Ordering::Relaxed),
            largest_group: self.inner.largest_group.load(Ordering::Relaxed),
        }
    }

    /// Groups still collecting members
    pub fn open_groups(&self) -> usize {
        self.inner.open.lock().len()
    }
}

impl<I, O: Clone, E: Clone> Inner<I, O, E> {
    async fn run_group<F, Fut>(&self, id: u64, full: Arc<Notify>, dispatch: F)
    where
        F: FnOnce(Vec<I>) -> Fut,
        Fut: Future<Output = Result<O, E>>,
    {
        tokio::select! {
            _ = tokio::time::sleep(self.window) => {}
            _ = full.notified() => {}
        }

        let group = {
            let mut open = self.open.lock();
            open.iter()
                .position(|group| group.id == id)
                .map(|index| open.swap_remove(index))
        };
        let Some(group) = group else {
            return;
        };

        let size = group.members.len();
        self.dispatched.fetch_add(1, Ordering::Relaxed);
        self.largest_group.fetch_max(size as u64, Ordering::Relaxed);
        debug!(scope = %group.scope, group = id, size, "dispatching batch group");

        let (items, waiters): (Vec<I>, Vec<Waiter<O, E>>) = group.members.into_iter().unzip();
        let result = dispatch(items).await;

        for (member_index, waiter) in waiters.into_iter().enumerate() {
            let outcome = result.clone().map(|value| BatchOutcome {
                value,
                member_index,
                group_size: size,
            });
            let _ = waiter.send(outcome);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn similarity_is_token_jaccard() {
        assert_eq!(similarity("Summarize the budget", "summarize  the BUDGET"), 1.0);
        assert_eq!(similarity("alpha beta", "gamma delta"), 0.0);
        let partial = similarity("what was decided about hiring", "what was decided about pricing");
        assert!(partial > 0.6 && partial < 1.0);
        assert_eq!(similarity("", ""), 1.0);
    }

    #[tokio::test]
    async fn disabled_aggregator_dispatches_alone() {
        let aggregator: BatchAggregator<u32, u32, BatchAbandoned> =
            BatchAggregator::new(&BatchConfig {
                enabled: false,
                ..Default::default()
            });
        let outcome = aggregator
            .submit("retrieval", "x", 7, |items: Vec<u32>| async move {
                Ok(items.iter().sum::<u32>())
            })
            .await
            .unwrap();
        assert_eq!(outcome.value, 7);
        assert_eq!(outcome.group_size, 1);
        assert!(!outcome.was_coalesced());
        assert_eq!(aggregator.stats().groups_dispatched, 1);
    }
}
