//! Indexer facade and its two background workers.
//!
//! ```text
//! index()/delete()/start_index()
//!        │ (never waits)
//!        ▼
//!  resolve queue ──► resolve worker ──► index queue (bounded) ──► batch worker ──► IndexStore
//!                     ReferenceResolver    put() waits when full    ExtractorRegistry
//! ```
//!
//! Each queue has exactly one consumer, so requests are applied in the order
//! they were submitted.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::batch::{BatchAccumulator, FlushOutcome};
use super::context::IndexContext;
use super::extractor::ExtractorRegistry;
use super::progress::ProgressIndicator;
use super::queue::{
    index_queue, resolve_queue, IndexEntry, IndexQueue, IndexQueueReceiver, QueueSnapshot,
    ResolveEntry, ResolveQueue, ResolveQueueReceiver,
};
use super::request::{IndexRequest, IndexTarget, Operation, ResolveRequest, ResyncRequest};
use super::resolver::ReferenceResolver;
use super::store::IndexStore;
use crate::config::IndexerConfig;
use crate::model::EntityReference;

/// Pipeline counters
#[derive(Debug, Default)]
pub struct IndexerStats {
    /// Resolve requests expanded successfully
    pub resolved: AtomicU64,
    /// Resolve requests dropped because the resolver failed
    pub resolve_failures: AtomicU64,
    /// Documents handed to the store
    pub documents_added: AtomicU64,
    /// Documents the store refused
    pub add_failures: AtomicU64,
    /// Delete operations issued (by id or by query)
    pub deletes: AtomicU64,
    /// Entities skipped: no extractor, nothing to index, or extraction failed
    pub skipped: AtomicU64,
    /// Entities whose extraction failed
    pub extraction_failures: AtomicU64,
    pub commits: AtomicU64,
    pub rollbacks: AtomicU64,
    /// Commits that failed, rolled back or not
    pub commit_failures: AtomicU64,
    pub resolve_worker_active: AtomicBool,
    pub batch_worker_active: AtomicBool,
}

impl IndexerStats {
    pub fn snapshot(&self) -> IndexerStatsSnapshot {
        IndexerStatsSnapshot {
            resolved: self.resolved.load(Ordering::Relaxed),
            resolve_failures: self.resolve_failures.load(Ordering::Relaxed),
            documents_added: self.documents_added.load(Ordering::Relaxed),
            add_failures: self.add_failures.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            extraction_failures: self.extraction_failures.load(Ordering::Relaxed),
            commits: self.commits.load(Ordering::Relaxed),
            rollbacks: self.rollbacks.load(Ordering::Relaxed),
            commit_failures: self.commit_failures.load(Ordering::Relaxed),
            resolve_worker_active: self.resolve_worker_active.load(Ordering::Relaxed),
            batch_worker_active: self.batch_worker_active.load(Ordering::Relaxed),
        }
    }

    fn record_flush(&self, outcome: FlushOutcome) {
        self.documents_added
            .fetch_add(outcome.added as u64, Ordering::Relaxed);
        self.add_failures
            .fetch_add(outcome.failed_adds as u64, Ordering::Relaxed);
        if outcome.committed {
            self.commits.fetch_add(1, Ordering::Relaxed);
        }
        if outcome.commit_failed {
            self.commit_failures.fetch_add(1, Ordering::Relaxed);
        }
        if outcome.rolled_back {
            self.rollbacks.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Point-in-time copy of [`IndexerStats`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexerStatsSnapshot {
    pub resolved: u64,
    pub resolve_failures: u64,
    pub documents_added: u64,
    pub add_failures: u64,
    pub deletes: u64,
    pub skipped: u64,
    pub extraction_failures: u64,
    pub commits: u64,
    pub rollbacks: u64,
    pub commit_failures: u64,
    pub resolve_worker_active: bool,
    pub batch_worker_active: bool,
}

/// Asynchronous indexing pipeline.
///
/// Producers call [`Indexer::index`], [`Indexer::delete`] or
/// [`Indexer::start_index`] and return immediately; the work happens on two
/// tokio tasks spawned by [`Indexer::start`]. Must be started from within a
/// tokio runtime.
pub struct Indexer {
    resolve_queue: ResolveQueue,
    index_queue: IndexQueue,
    stats: Arc<IndexerStats>,
    cancel: CancellationToken,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Indexer {
    pub fn start(
        config: &IndexerConfig,
        resolver: ReferenceResolver,
        registry: ExtractorRegistry,
        store: Arc<dyn IndexStore>,
    ) -> Self {
        let (resolve_sender, resolve_receiver) = resolve_queue();
        let (index_sender, index_receiver) = index_queue(config.queue_capacity);
        let stats = Arc::new(IndexerStats::default());
        let cancel = CancellationToken::new();

        let resolve_worker = ResolveWorker {
            receiver: resolve_receiver,
            index_queue: index_sender.clone(),
            resolver,
            stats: stats.clone(),
            cancel: cancel.clone(),
        };

        let batch_worker = BatchWorker {
            receiver: index_receiver,
            round_limit: index_sender.capacity(),
            registry,
            context: IndexContext::from_config(config),
            batch: BatchAccumulator::new(store, config.batch_limits()),
            stats: stats.clone(),
            cancel: cancel.clone(),
        };

        let handles = vec![
            tokio::spawn(resolve_worker.run()),
            tokio::spawn(batch_worker.run()),
        ];

        info!(
            "Indexer started (queue capacity {}, batch size {}, batch length {})",
            config.queue_capacity, config.max_batch_size, config.max_batch_length
        );

        Self {
            resolve_queue: resolve_sender,
            index_queue: index_sender,
            stats,
            cancel,
            handles: Mutex::new(handles),
        }
    }

    /// Schedule `reference` (and everything below it when `recurse`) for indexing
    pub fn index(&self, reference: EntityReference, recurse: bool) {
        debug!("Scheduling index of '{}' (recurse: {})", reference, recurse);
        self.resolve_queue
            .push(ResolveEntry::Request(ResolveRequest::index(reference, recurse)));
    }

    /// Schedule removal of `reference` (and everything below it when `recurse`)
    pub fn delete(&self, reference: EntityReference, recurse: bool) {
        debug!("Scheduling delete of '{}' (recurse: {})", reference, recurse);
        self.resolve_queue
            .push(ResolveEntry::Request(ResolveRequest::delete(reference, recurse)));
    }

    /// Resync a subtree and track it. The indicator reaches 100 once every
    /// request submitted so far, this resync included, has been committed.
    pub fn start_index(&self, request: ResyncRequest) -> ProgressIndicator {
        info!(
            "Starting resync of '{}' (purge: {})",
            request.root, request.purge
        );
        if request.purge {
            self.delete(request.root.clone(), true);
        }
        self.index(request.root, true);

        let progress = ProgressIndicator::new(self.resolve_queue.probe(), self.index_queue.probe());
        if !self
            .resolve_queue
            .push(ResolveEntry::Marker(progress.clone()))
        {
            warn!("Indexer is shut down, resync will never complete");
        }
        progress
    }

    pub fn resolve_queue_len(&self) -> usize {
        self.resolve_queue.len()
    }

    pub fn index_queue_len(&self) -> usize {
        self.index_queue.len()
    }

    pub fn resolve_queue_snapshot(&self) -> QueueSnapshot {
        self.resolve_queue.snapshot()
    }

    pub fn index_queue_snapshot(&self) -> QueueSnapshot {
        self.index_queue.snapshot()
    }

    pub fn stats(&self) -> IndexerStatsSnapshot {
        self.stats.snapshot()
    }

    /// Stop both workers and wait for them. Entries still queued are dropped,
    /// the batch in progress is flushed first.
    pub async fn shutdown(&self) {
        info!("Shutting down indexer");
        self.cancel.cancel();
        let handles = std::mem::take(&mut *self.handles.lock().await);
        for handle in handles {
            if let Err(e) = handle.await {
                warn!("Indexer worker ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for Indexer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct ResolveWorker {
    receiver: ResolveQueueReceiver,
    index_queue: IndexQueue,
    resolver: ReferenceResolver,
    stats: Arc<IndexerStats>,
    cancel: CancellationToken,
}

impl ResolveWorker {
    async fn run(mut self) {
        info!("Resolve worker started");
        self.stats
            .resolve_worker_active
            .store(true, Ordering::Relaxed);

        loop {
            let entry = tokio::select! {
                _ = self.cancel.cancelled() => break,
                entry = self.receiver.take() => match entry {
                    Some(entry) => entry,
                    None => break,
                },
            };

            let forwarded = match entry {
                ResolveEntry::Request(request) => self.resolve(request).await,
                ResolveEntry::Marker(progress) => {
                    progress.switch_to_index_queue();
                    self.forward(IndexEntry::Marker(progress)).await
                }
            };
            if !forwarded {
                break;
            }
        }

        self.stats
            .resolve_worker_active
            .store(false, Ordering::Relaxed);
        info!("Resolve worker stopped");
    }

    /// Returns false once the index queue can no longer be fed
    async fn resolve(&self, request: ResolveRequest) -> bool {
        let requests = match self.resolver.resolve(&request).await {
            Ok(requests) => requests,
            Err(e) => {
                self.stats.resolve_failures.fetch_add(1, Ordering::Relaxed);
                warn!("{}", e);
                return true;
            }
        };
        self.stats.resolved.fetch_add(1, Ordering::Relaxed);

        for index_request in requests {
            if !self.forward(IndexEntry::Request(index_request)).await {
                return false;
            }
        }
        true
    }

    async fn forward(&self, entry: IndexEntry) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            sent = self.index_queue.put(entry) => sent,
        }
    }
}

struct BatchWorker {
    receiver: IndexQueueReceiver,
    /// Upper bound on entries drained per round, so markers complete even
    /// under a steady stream of work
    round_limit: usize,
    registry: ExtractorRegistry,
    context: IndexContext,
    batch: BatchAccumulator,
    stats: Arc<IndexerStats>,
    cancel: CancellationToken,
}

impl BatchWorker {
    async fn run(mut self) {
        info!("Batch worker started");
        self.stats.batch_worker_active.store(true, Ordering::Relaxed);

        loop {
            let first = tokio::select! {
                _ = self.cancel.cancelled() => break,
                entry = self.receiver.take() => match entry {
                    Some(entry) => entry,
                    None => break,
                },
            };

            let mut markers = Vec::new();
            let mut next = Some(first);
            let mut taken = 0;
            while let Some(entry) = next {
                taken += 1;
                match entry {
                    IndexEntry::Request(request) => self.apply(request).await,
                    IndexEntry::Marker(progress) => markers.push(progress),
                }
                next = if taken < self.round_limit {
                    self.receiver.poll()
                } else {
                    None
                };
            }

            debug!("Batch worker handled {} entries", taken);
            let outcome = self.batch.flush().await;
            self.stats.record_flush(outcome);

            for progress in markers {
                progress.complete();
            }
        }

        let outcome = self.batch.flush().await;
        self.stats.record_flush(outcome);
        self.stats
            .batch_worker_active
            .store(false, Ordering::Relaxed);
        info!("Batch worker stopped");
    }

    async fn apply(&mut self, request: IndexRequest) {
        let outcome = match (&request.target, request.operation) {
            (IndexTarget::Query(query), Operation::Delete) => {
                self.stats.deletes.fetch_add(1, Ordering::Relaxed);
                self.batch.delete_by_query(query).await
            }
            (IndexTarget::Query(query), Operation::Index) => {
                warn!("Ignoring index request for query [{}]", query);
                self.stats.skipped.fetch_add(1, Ordering::Relaxed);
                None
            }
            (IndexTarget::Reference(reference), operation) => {
                let Some(extractor) = self.registry.get(reference.entity_type()).cloned() else {
                    debug!(
                        "No extractor for {} '{}', skipping",
                        reference.entity_type(),
                        reference
                    );
                    self.stats.skipped.fetch_add(1, Ordering::Relaxed);
                    return;
                };

                match operation {
                    Operation::Index => match extractor.document(reference, &self.context).await {
                        Ok(Some(document)) => self.batch.add(document).await,
                        Ok(None) => {
                            debug!("Nothing to index for '{}'", reference);
                            self.stats.skipped.fetch_add(1, Ordering::Relaxed);
                            None
                        }
                        Err(e) => {
                            warn!("Skipping '{}': {}", reference, e);
                            self.stats.extraction_failures.fetch_add(1, Ordering::Relaxed);
                            self.stats.skipped.fetch_add(1, Ordering::Relaxed);
                            None
                        }
                    },
                    Operation::Delete => match extractor.id(reference, &self.context).await {
                        Ok(id) => {
                            self.stats.deletes.fetch_add(1, Ordering::Relaxed);
                            self.batch.delete_by_id(&id).await
                        }
                        Err(e) => {
                            warn!("Cannot delete '{}': {}", reference, e);
                            self.stats.extraction_failures.fetch_add(1, Ordering::Relaxed);
                            self.stats.skipped.fetch_add(1, Ordering::Relaxed);
                            None
                        }
                    },
                }
            }
        };

        if let Some(outcome) = outcome {
            self.stats.record_flush(outcome);
        }
    }
}
