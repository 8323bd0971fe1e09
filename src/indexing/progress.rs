//! Completion estimate for a resync travelling through both queues.
//!
//! A marker entry follows the resync requests through the resolve queue and
//! then through the index queue. While it sits in the resolve queue the
//! estimate grows with the resolve queue's drained counter up to the resolve
//! share; once the resolve worker forwards it, the remaining share follows the
//! index queue's drained counter. The estimate stops at 99: only the batch
//! worker, after flushing the batch that contained the marker, signals 100.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};
use tokio::sync::watch;

use super::queue::QueueProbe;

/// Resolve share when resolving is expected to be the bottleneck
const SLOW_RESOLVE_SHARE: u64 = 50;
/// Resolve share when resolving is expected to be near instant
const FAST_RESOLVE_SHARE: u64 = 10;
const MAX_ESTIMATE: u64 = 99;

#[derive(Debug, Clone, Copy)]
struct IndexPhase {
    drained_at_switch: u64,
    size_at_switch: usize,
}

#[derive(Debug)]
struct ProgressState {
    resolve_queue: QueueProbe,
    index_queue: QueueProbe,
    resolve_drained_at_start: u64,
    resolve_size_at_start: usize,
    resolve_share: u64,
    index_phase: OnceLock<IndexPhase>,
    /// Highest estimate reported so far, keeps the estimate monotonic
    reported: AtomicU8,
    done: watch::Sender<bool>,
}

/// Handle returned by a resync request: pollable for a percentage, awaitable
/// for completion. Clones share the same state.
#[derive(Debug, Clone)]
pub struct ProgressIndicator {
    state: Arc<ProgressState>,
}

impl ProgressIndicator {
    /// Capture both queues as they are right now
    pub fn new(resolve_queue: QueueProbe, index_queue: QueueProbe) -> Self {
        let resolve_size_at_start = resolve_queue.len();
        let index_len = index_queue.len();
        let index_capacity = index_queue.capacity().unwrap_or(usize::MAX);

        let index_queue_nearly_full = index_len.saturating_mul(10) >= index_capacity.saturating_mul(9);
        let resolve_share = if index_queue_nearly_full || resolve_size_at_start > 1 {
            SLOW_RESOLVE_SHARE
        } else {
            FAST_RESOLVE_SHARE
        };

        let (done, _) = watch::channel(false);
        Self {
            state: Arc::new(ProgressState {
                resolve_drained_at_start: resolve_queue.drained(),
                resolve_size_at_start,
                resolve_queue,
                index_queue,
                resolve_share,
                index_phase: OnceLock::new(),
                reported: AtomicU8::new(0),
                done,
            }),
        }
    }

    /// Share of the percentage given to the resolve phase (10 or 50)
    pub fn resolve_share(&self) -> u8 {
        self.state.resolve_share as u8
    }

    /// Called by the resolve worker when the marker leaves the resolve queue.
    /// Only the first call captures the index queue.
    pub fn switch_to_index_queue(&self) {
        let index_queue = &self.state.index_queue;
        self.state.index_phase.get_or_init(|| IndexPhase {
            drained_at_switch: index_queue.drained(),
            size_at_switch: index_queue.len(),
        });
    }

    pub fn in_index_queue(&self) -> bool {
        self.state.index_phase.get().is_some()
    }

    /// Estimated completion in `0..=99`
    pub fn estimate(&self) -> u8 {
        let state = &self.state;
        let share = state.resolve_share;

        let computed = match state.index_phase.get() {
            None => {
                let drained = state
                    .resolve_queue
                    .drained()
                    .saturating_sub(state.resolve_drained_at_start);
                let size = state.resolve_size_at_start.max(1) as u64;
                share.min(drained.saturating_mul(share) / size)
            }
            Some(phase) => {
                let drained = state
                    .index_queue
                    .drained()
                    .saturating_sub(phase.drained_at_switch);
                let size = phase.size_at_switch.max(1) as u64;
                MAX_ESTIMATE.min(share + drained.saturating_mul(100 - share) / size)
            }
        };

        let computed = computed as u8;
        let previous = state.reported.fetch_max(computed, Ordering::Relaxed);
        previous.max(computed)
    }

    /// 100 once complete, the estimate otherwise
    pub fn percentage(&self) -> u8 {
        if self.is_done() {
            100
        } else {
            self.estimate()
        }
    }

    /// Terminal signal, set by whoever handles the marker last
    pub fn complete(&self) {
        self.state.done.send_replace(true);
    }

    pub fn is_done(&self) -> bool {
        *self.state.done.borrow()
    }

    /// Wait until the resync is complete
    pub async fn wait(&self) {
        let mut done = self.state.done.subscribe();
        // The sender lives in `self`, so the channel cannot close while waiting
        let _ = done.wait_for(|done| *done).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexing::queue::{index_queue, resolve_queue, IndexEntry, ResolveEntry};
    use crate::indexing::request::{IndexRequest, ResolveRequest};
    use crate::model::EntityReference;
    use std::time::Duration;

    fn resolve_request(name: &str) -> ResolveEntry {
        ResolveEntry::Request(ResolveRequest::index(
            EntityReference::new_document("w", "S", name),
            false,
        ))
    }

    fn index_request(name: &str) -> IndexEntry {
        IndexEntry::Request(IndexRequest::index(EntityReference::new_document(
            "w", "S", name,
        )))
    }

    #[tokio::test]
    async fn test_fast_resolve_share_when_queues_are_quiet() {
        let (resolve, _resolve_rx) = resolve_queue();
        let (index, _index_rx) = index_queue(10);
        resolve.push(resolve_request("a"));

        let progress = ProgressIndicator::new(resolve.probe(), index.probe());
        assert_eq!(progress.resolve_share(), 10);
        assert_eq!(progress.estimate(), 0);
    }

    #[tokio::test]
    async fn test_slow_resolve_share_with_pending_resolves() {
        let (resolve, _resolve_rx) = resolve_queue();
        let (index, _index_rx) = index_queue(10);
        resolve.push(resolve_request("a"));
        resolve.push(resolve_request("b"));

        let progress = ProgressIndicator::new(resolve.probe(), index.probe());
        assert_eq!(progress.resolve_share(), 50);
    }

    #[tokio::test]
    async fn test_slow_resolve_share_with_nearly_full_index_queue() {
        let (resolve, _resolve_rx) = resolve_queue();
        let (index, _index_rx) = index_queue(10);
        for i in 0..9 {
            index.put(index_request(&i.to_string())).await;
        }

        let progress = ProgressIndicator::new(resolve.probe(), index.probe());
        assert_eq!(progress.resolve_share(), 50);
    }

    #[tokio::test]
    async fn test_two_phase_estimate() {
        let (resolve, mut resolve_rx) = resolve_queue();
        let (index, mut index_rx) = index_queue(100);
        for i in 0..4 {
            resolve.push(resolve_request(&i.to_string()));
        }

        let progress = ProgressIndicator::new(resolve.probe(), index.probe());
        assert_eq!(progress.resolve_share(), 50);
        assert_eq!(progress.estimate(), 0);

        resolve_rx.take().await.unwrap();
        resolve_rx.take().await.unwrap();
        assert_eq!(progress.estimate(), 25);

        resolve_rx.take().await.unwrap();
        resolve_rx.take().await.unwrap();
        assert_eq!(progress.estimate(), 50);

        for i in 0..10 {
            index.put(index_request(&i.to_string())).await;
        }
        progress.switch_to_index_queue();
        assert!(progress.in_index_queue());
        assert_eq!(progress.estimate(), 50);

        for _ in 0..5 {
            index_rx.take().await.unwrap();
        }
        assert_eq!(progress.estimate(), 75);

        // A later switch does not recapture the index queue
        progress.switch_to_index_queue();
        assert_eq!(progress.estimate(), 75);
    }

    #[tokio::test]
    async fn test_estimate_never_reaches_100() {
        let (resolve, mut resolve_rx) = resolve_queue();
        let (index, mut index_rx) = index_queue(100);
        resolve.push(resolve_request("a"));

        let progress = ProgressIndicator::new(resolve.probe(), index.probe());
        resolve_rx.take().await.unwrap();
        assert_eq!(progress.estimate(), 10);

        index.put(index_request("a")).await;
        progress.switch_to_index_queue();
        for i in 0..50 {
            index.put(index_request(&i.to_string())).await;
        }
        while index_rx.poll().is_some() {}

        assert_eq!(progress.estimate(), 99);
        assert_eq!(progress.percentage(), 99);
        assert!(!progress.is_done());

        progress.complete();
        assert_eq!(progress.percentage(), 100);
        assert_eq!(progress.estimate(), 99);
    }

    #[tokio::test]
    async fn test_wait_returns_after_complete() {
        let (resolve, _resolve_rx) = resolve_queue();
        let (index, _index_rx) = index_queue(1);
        let progress = ProgressIndicator::new(resolve.probe(), index.probe());

        let waiter = progress.clone();
        let handle = tokio::spawn(async move { waiter.wait().await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!handle.is_finished());

        progress.complete();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(progress.is_done());
    }
}
