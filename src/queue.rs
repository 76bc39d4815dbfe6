//! Ingestion queue between connection handlers and the log consumer.
//!
//! # Responsibilities
//! - Accept records from any number of handler tasks without blocking them
//! - Hand the consumer everything pending as one FIFO batch
//! - Stop accepting on close while keeping already-queued records drainable
//!
//! # Design Decisions
//! - Unbounded mpsc channel: producers never wait on disk I/O
//! - A submission's records travel as one message, so a close can never
//!   split a batch between "queued" and "refused"
//! - Pending count kept alongside the channel for metrics and shutdown reports

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::observability::metrics;
use crate::record::TransactionRecord;

/// Error returned when pushing into a closed queue.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("ingestion queue is closed")]
    Closed,
}

/// Producer handle. Cheap to clone, one per connection handler.
#[derive(Debug, Clone)]
pub struct IngestQueue {
    tx: mpsc::UnboundedSender<Vec<TransactionRecord>>,
    pending: Arc<AtomicUsize>,
}

/// Consumer side, owned by the single log consumer.
#[derive(Debug)]
pub struct QueueReceiver {
    rx: mpsc::UnboundedReceiver<Vec<TransactionRecord>>,
    pending: Arc<AtomicUsize>,
}

/// Create a connected producer/consumer pair.
pub fn channel() -> (IngestQueue, QueueReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    let pending = Arc::new(AtomicUsize::new(0));
    (
        IngestQueue {
            tx,
            pending: Arc::clone(&pending),
        },
        QueueReceiver { rx, pending },
    )
}

impl IngestQueue {
    /// Append a record to the tail and wake the consumer.
    pub fn push(&self, record: TransactionRecord) -> Result<(), QueueError> {
        self.push_batch(vec![record])
    }

    /// Append records to the tail, in order. Either all of them are queued
    /// or, once closed, none are.
    pub fn push_batch(&self, records: Vec<TransactionRecord>) -> Result<(), QueueError> {
        if records.is_empty() {
            return if self.is_closed() {
                Err(QueueError::Closed)
            } else {
                Ok(())
            };
        }

        let count = records.len();
        // Count before sending so the consumer can never observe a negative depth.
        let depth = self.pending.fetch_add(count, Ordering::SeqCst) + count;
        if self.tx.send(records).is_err() {
            self.pending.fetch_sub(count, Ordering::SeqCst);
            return Err(QueueError::Closed);
        }
        metrics::record_queue_depth(depth);
        Ok(())
    }

    /// Records enqueued but not yet drained.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl QueueReceiver {
    /// Wait for work and take everything currently queued, oldest first.
    ///
    /// Returns `None` once the queue is closed and fully drained.
    pub async fn drain_all(&mut self) -> Option<Vec<TransactionRecord>> {
        let mut batch = self.rx.recv().await?;
        while let Ok(more) = self.rx.try_recv() {
            batch.extend(more);
        }
        let left = self.pending.fetch_sub(batch.len(), Ordering::SeqCst) - batch.len();
        metrics::record_queue_depth(left);
        Some(batch)
    }

    /// Refuse further pushes. Records already queued stay drainable.
    pub fn close(&mut self) {
        self.rx.close();
    }

    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str) -> TransactionRecord {
        TransactionRecord {
            transaction_id: id.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn drain_returns_fifo_batch() {
        let (queue, mut rx) = channel();
        for id in ["a", "b", "c"] {
            queue.push(record(id)).unwrap();
        }
        assert_eq!(queue.pending(), 3);

        let batch = rx.drain_all().await.unwrap();
        let ids: Vec<_> = batch.iter().map(|r| r.transaction_id.as_str()).collect();
        assert_eq!(ids, ["a", "b", "c"]);
        assert_eq!(rx.pending(), 0);
    }

    #[tokio::test]
    async fn batches_are_all_or_nothing() {
        let (queue, mut rx) = channel();
        queue.push(record("solo")).unwrap();
        queue
            .push_batch(vec![record("b1"), record("b2"), record("b3")])
            .unwrap();
        assert_eq!(queue.pending(), 4);

        rx.close();
        let refused = queue.push_batch(vec![record("late-1"), record("late-2")]);
        assert_eq!(refused, Err(QueueError::Closed));
        assert_eq!(queue.push_batch(Vec::new()), Err(QueueError::Closed));
        assert_eq!(queue.pending(), 4);

        let batch = rx.drain_all().await.unwrap();
        let ids: Vec<_> = batch.iter().map(|r| r.transaction_id.as_str()).collect();
        assert_eq!(ids, ["solo", "b1", "b2", "b3"]);
        assert!(rx.drain_all().await.is_none());
        assert_eq!(rx.pending(), 0);
    }

    #[tokio::test]
    async fn empty_batch_is_a_no_op() {
        let (queue, rx) = channel();
        queue.push_batch(Vec::new()).unwrap();
        assert_eq!(rx.pending(), 0);
    }

    #[tokio::test]
    async fn drain_waits_for_a_push() {
        let (queue, mut rx) = channel();
        let producer = tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            queue.push(record("late")).unwrap();
            queue
        });

        let batch = rx.drain_all().await.unwrap();
        assert_eq!(batch[0].transaction_id, "late");
        drop(producer.await.unwrap());
    }

    #[tokio::test]
    async fn close_keeps_queued_records() {
        let (queue, mut rx) = channel();
        queue.push(record("1")).unwrap();
        queue.push(record("2")).unwrap();

        rx.close();
        assert_eq!(queue.push(record("3")), Err(QueueError::Closed));
        assert!(queue.is_closed());
        assert_eq!(queue.pending(), 2);

        let batch = rx.drain_all().await.unwrap();
        assert_eq!(batch.len(), 2);
        assert!(rx.drain_all().await.is_none());
    }

    #[tokio::test]
    async fn concurrent_producers_lose_nothing() {
        let (queue, mut rx) = channel();
        let mut handles = Vec::new();
        for p in 0..8 {
            let queue = queue.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..50 {
                    queue.push(record(&format!("{p}-{i}"))).unwrap();
                }
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        drop(queue);

        let mut seen = Vec::new();
        while let Some(batch) = rx.drain_all().await {
            seen.extend(batch);
        }
        assert_eq!(seen.len(), 400);

        // Per-producer order survives interleaving.
        for p in 0..8 {
            let prefix = format!("{p}-");
            let mine: Vec<usize> = seen
                .iter()
                .filter_map(|r| r.transaction_id.strip_prefix(&prefix))
                .map(|i| i.parse().unwrap())
                .collect();
            assert_eq!(mine, (0..50).collect::<Vec<_>>());
        }
    }
}
