//! Scoring job queue and per-record claims
//!
//! Jobs carry only the homework id; the worker reloads the record on pickup.
//! The channel is bounded, so intake waits when the workers fall behind.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::{HomeworkError, HwResult};

/// One scoring request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoringJob {
    pub homework_id: Uuid,
}

/// Sending side of the scoring queue
#[derive(Debug, Clone)]
pub struct ScoringQueue {
    tx: mpsc::Sender<ScoringJob>,
}

/// Create a bounded queue
pub fn scoring_channel(capacity: usize) -> (ScoringQueue, mpsc::Receiver<ScoringJob>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (ScoringQueue { tx }, rx)
}

impl ScoringQueue {
    /// Queue a job, waiting for space when the queue is full
    pub async fn enqueue(&self, homework_id: Uuid) -> HwResult<()> {
        self.tx
            .send(ScoringJob { homework_id })
            .await
            .map_err(|_| {
                HomeworkError::Common(turan_common::Error::Internal(
                    "Scoring queue is closed".to_string(),
                ))
            })
    }

    /// Jobs that can be queued without waiting
    pub fn available_capacity(&self) -> usize {
        self.tx.capacity()
    }

    /// Jobs waiting for a worker
    pub fn depth(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    /// True once the worker pool has stopped consuming
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Set of homework ids currently being processed
///
/// A record can be claimed by one worker at a time; duplicate jobs for the
/// same id are skipped while the claim is held.
#[derive(Debug, Default)]
pub struct ClaimSet {
    active: Mutex<HashSet<Uuid>>,
}

/// Held claim, released on drop
#[derive(Debug)]
pub struct Claim {
    set: Arc<ClaimSet>,
    homework_id: Uuid,
}

impl ClaimSet {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Claim `homework_id`, or `None` if another worker holds it
    pub fn try_claim(self: &Arc<Self>, homework_id: Uuid) -> Option<Claim> {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        if active.insert(homework_id) {
            Some(Claim {
                set: Arc::clone(self),
                homework_id,
            })
        } else {
            None
        }
    }

    pub fn is_claimed(&self, homework_id: Uuid) -> bool {
        self.active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&homework_id)
    }
}

impl Drop for Claim {
    fn drop(&mut self) {
        self.set
            .active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.homework_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_is_exclusive_until_dropped() {
        let claims = ClaimSet::new();
        let id = Uuid::new_v4();

        let first = claims.try_claim(id);
        assert!(first.is_some());
        assert!(claims.try_claim(id).is_none());
        assert!(claims.try_claim(Uuid::new_v4()).is_some());

        drop(first);
        assert!(!claims.is_claimed(id));
        assert!(claims.try_claim(id).is_some());
    }

    #[tokio::test]
    async fn test_enqueue_and_receive() {
        let (queue, mut rx) = scoring_channel(2);
        let id = Uuid::new_v4();

        queue.enqueue(id).await.unwrap();
        assert_eq!(queue.depth(), 1);
        assert_eq!(queue.available_capacity(), 1);

        assert_eq!(rx.recv().await, Some(ScoringJob { homework_id: id }));
        assert_eq!(queue.depth(), 0);
    }

    #[tokio::test]
    async fn test_enqueue_after_close_fails() {
        let (queue, rx) = scoring_channel(1);
        assert!(!queue.is_closed());
        drop(rx);

        assert!(queue.is_closed());
        assert!(queue.enqueue(Uuid::new_v4()).await.is_err());
    }
}
