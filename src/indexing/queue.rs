//! FIFO queues between the producers, the resolve worker and the batch worker.
//!
//! The resolve queue is unbounded: producers never wait on it. The index queue
//! is bounded and is the only backpressure point of the pipeline: `put` waits
//! for a free slot instead of dropping work. Both queues keep lock-free
//! counters of their current length and of how many entries were drained,
//! which the progress indicator reads.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

use super::progress::ProgressIndicator;
use super::request::{IndexRequest, ResolveRequest};

/// Entry of the resolve queue
#[derive(Debug)]
pub enum ResolveEntry {
    Request(ResolveRequest),
    /// Tracks a resync: every request queued before it has been handled once
    /// it is taken
    Marker(ProgressIndicator),
}

/// Entry of the index queue
#[derive(Debug)]
pub enum IndexEntry {
    Request(IndexRequest),
    Marker(ProgressIndicator),
}

#[derive(Debug, Default)]
struct QueueCounters {
    queued: AtomicUsize,
    enqueued: AtomicU64,
    drained: AtomicU64,
}

impl QueueCounters {
    fn on_enqueue(&self) {
        self.queued.fetch_add(1, Ordering::Relaxed);
        self.enqueued.fetch_add(1, Ordering::Relaxed);
    }

    fn on_enqueue_failed(&self) {
        self.queued.fetch_sub(1, Ordering::Relaxed);
        self.enqueued.fetch_sub(1, Ordering::Relaxed);
    }

    fn on_drain(&self) {
        self.queued.fetch_sub(1, Ordering::Relaxed);
        self.drained.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self, capacity: Option<usize>) -> QueueSnapshot {
        QueueSnapshot {
            len: self.queued.load(Ordering::Relaxed),
            capacity,
            total_enqueued: self.enqueued.load(Ordering::Relaxed),
            total_drained: self.drained.load(Ordering::Relaxed),
        }
    }
}

/// Lightweight queue snapshot for status reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSnapshot {
    pub len: usize,
    /// `None` for the unbounded resolve queue
    pub capacity: Option<usize>,
    pub total_enqueued: u64,
    pub total_drained: u64,
}

/// Read-only view of a queue's counters
#[derive(Debug, Clone)]
pub struct QueueProbe {
    counters: Arc<QueueCounters>,
    capacity: Option<usize>,
}

impl QueueProbe {
    pub fn len(&self) -> usize {
        self.counters.queued.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn drained(&self) -> u64 {
        self.counters.drained.load(Ordering::Relaxed)
    }

    /// `None` for unbounded queues
    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }
}

/// Producer side of the resolve queue
#[derive(Debug, Clone)]
pub struct ResolveQueue {
    sender: mpsc::UnboundedSender<ResolveEntry>,
    counters: Arc<QueueCounters>,
}

/// Consumer side of the resolve queue, owned by the resolve worker
#[derive(Debug)]
pub struct ResolveQueueReceiver {
    receiver: mpsc::UnboundedReceiver<ResolveEntry>,
    counters: Arc<QueueCounters>,
}

pub fn resolve_queue() -> (ResolveQueue, ResolveQueueReceiver) {
    let (sender, receiver) = mpsc::unbounded_channel();
    let counters = Arc::new(QueueCounters::default());
    (
        ResolveQueue {
            sender,
            counters: counters.clone(),
        },
        ResolveQueueReceiver { receiver, counters },
    )
}

impl ResolveQueue {
    /// Never waits; returns false once the worker is gone
    pub fn push(&self, entry: ResolveEntry) -> bool {
        self.counters.on_enqueue();
        if self.sender.send(entry).is_err() {
            self.counters.on_enqueue_failed();
            debug!("Resolve queue closed, dropping entry");
            return false;
        }
        true
    }

    pub fn len(&self) -> usize {
        self.counters.queued.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn drained(&self) -> u64 {
        self.counters.drained.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        self.counters.snapshot(None)
    }

    pub fn probe(&self) -> QueueProbe {
        QueueProbe {
            counters: self.counters.clone(),
            capacity: None,
        }
    }
}

impl ResolveQueueReceiver {
    /// Wait for the next entry, `None` once every producer is gone
    pub async fn take(&mut self) -> Option<ResolveEntry> {
        let entry = self.receiver.recv().await?;
        self.counters.on_drain();
        Some(entry)
    }
}

/// Producer side of the bounded index queue
#[derive(Debug, Clone)]
pub struct IndexQueue {
    sender: mpsc::Sender<IndexEntry>,
    counters: Arc<QueueCounters>,
    capacity: usize,
}

/// Consumer side of the index queue, owned by the batch worker
#[derive(Debug)]
pub struct IndexQueueReceiver {
    receiver: mpsc::Receiver<IndexEntry>,
    counters: Arc<QueueCounters>,
}

/// `capacity` must be greater than zero
pub fn index_queue(capacity: usize) -> (IndexQueue, IndexQueueReceiver) {
    let capacity = capacity.max(1);
    let (sender, receiver) = mpsc::channel(capacity);
    let counters = Arc::new(QueueCounters::default());
    (
        IndexQueue {
            sender,
            counters: counters.clone(),
            capacity,
        },
        IndexQueueReceiver { receiver, counters },
    )
}

impl IndexQueue {
    /// Append an entry, waiting for a free slot while the queue is full.
    /// Waiting producers are served in arrival order. Returns false once the
    /// worker is gone.
    pub async fn put(&self, entry: IndexEntry) -> bool {
        let Ok(permit) = self.sender.reserve().await else {
            debug!("Index queue closed, dropping entry");
            return false;
        };
        self.counters.on_enqueue();
        permit.send(entry);
        true
    }

    pub fn len(&self) -> usize {
        self.counters.queued.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn drained(&self) -> u64 {
        self.counters.drained.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        self.counters.snapshot(Some(self.capacity))
    }

    pub fn probe(&self) -> QueueProbe {
        QueueProbe {
            counters: self.counters.clone(),
            capacity: Some(self.capacity),
        }
    }
}

impl IndexQueueReceiver {
    /// Wait for the next entry, `None` once every producer is gone
    pub async fn take(&mut self) -> Option<IndexEntry> {
        let entry = self.receiver.recv().await?;
        self.counters.on_drain();
        Some(entry)
    }

    /// Next entry if one is already queued, never waits
    pub fn poll(&mut self) -> Option<IndexEntry> {
        let entry = self.receiver.try_recv().ok()?;
        self.counters.on_drain();
        Some(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EntityReference;
    use std::time::Duration;
    use tokio::time::timeout;

    fn request(name: &str) -> IndexRequest {
        IndexRequest::index(EntityReference::new_document("w", "S", name))
    }

    fn name_of(entry: IndexEntry) -> String {
        match entry {
            IndexEntry::Request(request) => request.reference().unwrap().name().to_string(),
            IndexEntry::Marker(_) => "<marker>".to_string(),
        }
    }

    #[tokio::test]
    async fn test_resolve_queue_is_fifo_and_counts() {
        let (queue, mut receiver) = resolve_queue();
        for name in ["a", "b", "c"] {
            let reference = EntityReference::new_document("w", "S", name);
            assert!(queue.push(ResolveEntry::Request(ResolveRequest::index(reference, false))));
        }
        assert_eq!(queue.len(), 3);

        let mut names = Vec::new();
        for _ in 0..3 {
            match receiver.take().await.unwrap() {
                ResolveEntry::Request(request) => names.push(request.reference.name().to_string()),
                ResolveEntry::Marker(_) => unreachable!(),
            }
        }
        assert_eq!(names, vec!["a", "b", "c"]);
        assert!(queue.is_empty());
        assert_eq!(queue.drained(), 3);
        assert_eq!(queue.snapshot().total_enqueued, 3);
    }

    #[tokio::test]
    async fn test_push_fails_once_receiver_dropped() {
        let (queue, receiver) = resolve_queue();
        drop(receiver);
        let reference = EntityReference::wiki("w");
        assert!(!queue.push(ResolveEntry::Request(ResolveRequest::index(reference, true))));
        assert_eq!(queue.len(), 0);
    }

    #[tokio::test]
    async fn test_poll_never_waits() {
        let (queue, mut receiver) = index_queue(4);
        assert!(receiver.poll().is_none());

        queue.put(IndexEntry::Request(request("a"))).await;
        queue.put(IndexEntry::Request(request("b"))).await;
        assert_eq!(name_of(receiver.poll().unwrap()), "a");
        assert_eq!(name_of(receiver.poll().unwrap()), "b");
        assert!(receiver.poll().is_none());
        assert_eq!(queue.drained(), 2);
    }

    #[tokio::test]
    async fn test_put_blocks_when_full() {
        let (queue, mut receiver) = index_queue(2);
        queue.put(IndexEntry::Request(request("a"))).await;
        queue.put(IndexEntry::Request(request("b"))).await;
        assert_eq!(queue.len(), queue.capacity());

        let blocked = queue.clone();
        let producer = tokio::spawn(async move { blocked.put(IndexEntry::Request(request("c"))).await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!producer.is_finished());
        assert_eq!(queue.len(), 2);

        assert_eq!(name_of(receiver.take().await.unwrap()), "a");
        assert!(timeout(Duration::from_secs(1), producer).await.unwrap().unwrap());

        assert_eq!(name_of(receiver.take().await.unwrap()), "b");
        assert_eq!(name_of(receiver.take().await.unwrap()), "c");
    }

    #[tokio::test]
    async fn test_saturated_queue_loses_nothing() {
        let (queue, mut receiver) = index_queue(3);
        let mut producers = Vec::new();
        for producer_id in 0..5 {
            let queue = queue.clone();
            producers.push(tokio::spawn(async move {
                for i in 0..40 {
                    queue
                        .put(IndexEntry::Request(request(&format!("{}-{}", producer_id, i))))
                        .await;
                }
            }));
        }

        let mut received = Vec::new();
        while received.len() < 200 {
            let entry = timeout(Duration::from_secs(5), receiver.take())
                .await
                .unwrap()
                .unwrap();
            received.push(name_of(entry));
        }
        for producer in producers {
            producer.await.unwrap();
        }

        received.sort();
        received.dedup();
        assert_eq!(received.len(), 200);
        assert!(queue.is_empty());

        // Each producer's own entries stay in order
        let (queue, mut receiver) = index_queue(1);
        let producer = tokio::spawn(async move {
            for i in 0..10 {
                queue.put(IndexEntry::Request(request(&i.to_string()))).await;
            }
        });
        let mut order = Vec::new();
        for _ in 0..10 {
            order.push(name_of(receiver.take().await.unwrap()));
        }
        producer.await.unwrap();
        let expected: Vec<String> = (0..10).map(|i| i.to_string()).collect();
        assert_eq!(order, expected);
    }
}
