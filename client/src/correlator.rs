//! Correlates `DiceLanded` outcomes with the rolls this client is waiting on.
//!
//! A roll's outcome lands in a different transaction than the roll itself,
//! an unknown number of slots later, or never. Each submitted roll registers
//! a oneshot channel keyed by its request id; the event listener feeds every
//! observed outcome through [`RequestCorrelator::observe`], which resolves the
//! matching wait and ignores the rest.
//!
//! Outcomes can be observed before the submitter has read the request id
//! back from its transaction, so unmatched outcomes are remembered in a
//! bounded history and handed out on registration. Ids that were resolved or
//! cancelled are remembered too, so redelivered or late outcomes are dropped.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use solana_sdk::pubkey::Pubkey;
use tokio::sync::oneshot;
use tracing::debug;

use crate::metrics::Metrics;

/// A published roll outcome: `(request_id, player, result)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RollOutcome {
    pub request_id: u64,
    pub player: Pubkey,
    /// Die face, 1-6.
    pub result: u8,
}

/// Failure outcomes surfaced to the consumer of a roll.
#[derive(Debug, thiserror::Error)]
pub enum RollError {
    #[error("roll submission failed: {0:#}")]
    Submission(anyhow::Error),
    #[error("request {0} is already being awaited")]
    AlreadyAwaiting(u64),
    #[error("request {0} already resolved")]
    AlreadyResolved(u64),
    #[error("wait for request {0} was cancelled")]
    Cancelled(u64),
    #[error("timed out waiting for request {0}")]
    TimedOut(u64),
}

/// What [`RequestCorrelator::observe`] did with an outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// A registered wait was resolved.
    Resolved,
    /// Nobody is waiting yet; kept for a later registration.
    Unclaimed,
    /// Already resolved, cancelled or cached; discarded.
    Dropped,
}

struct Waiter {
    tx: oneshot::Sender<RollOutcome>,
    since: Instant,
}

enum Settled {
    Unclaimed(RollOutcome),
    Resolved,
    Cancelled,
}

struct Waits {
    pending: HashMap<u64, Waiter>,
    history: HashMap<u64, Settled>,
    order: VecDeque<u64>,
    capacity: usize,
}

impl Waits {
    fn remember(&mut self, request_id: u64, settled: Settled) {
        if self.history.insert(request_id, settled).is_none() {
            self.order.push_back(request_id);
        }
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.history.remove(&oldest);
            }
        }
    }
}

/// Thread-safe table of awaited request ids. Cheap to clone.
#[derive(Clone)]
pub struct RequestCorrelator {
    inner: Arc<Mutex<Waits>>,
    metrics: Arc<Metrics>,
}

impl RequestCorrelator {
    /// `history_capacity` bounds how many unmatched or settled ids are remembered.
    pub fn new(history_capacity: usize, metrics: Arc<Metrics>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Waits {
                pending: HashMap::new(),
                history: HashMap::new(),
                order: VecDeque::new(),
                capacity: history_capacity.max(1),
            })),
            metrics,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Waits> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start waiting for `request_id`.
    ///
    /// Resolves immediately when the outcome was already observed. An id
    /// whose outcome was already handed out cannot be awaited again; a
    /// cancelled one can.
    pub fn register(&self, request_id: u64) -> Result<PendingRoll, RollError> {
        let (tx, rx) = oneshot::channel();
        let mut waits = self.lock();

        if waits.pending.contains_key(&request_id) {
            return Err(RollError::AlreadyAwaiting(request_id));
        }

        let unclaimed = match waits.history.get(&request_id) {
            Some(Settled::Resolved) => return Err(RollError::AlreadyResolved(request_id)),
            Some(Settled::Unclaimed(outcome)) => Some(*outcome),
            Some(Settled::Cancelled) | None => None,
        };

        match unclaimed {
            Some(outcome) => {
                // Keeps its place in `order`.
                waits.history.insert(request_id, Settled::Resolved);
                let _ = tx.send(outcome);
                self.metrics.record_resolution(0);
                debug!(request_id, "Outcome already observed");
            }
            None => {
                if waits.history.remove(&request_id).is_some() {
                    waits.order.retain(|id| *id != request_id);
                }
                waits.pending.insert(
                    request_id,
                    Waiter {
                        tx,
                        since: Instant::now(),
                    },
                );
            }
        }

        Ok(PendingRoll {
            request_id,
            rx,
            correlator: self.clone(),
            settled: false,
        })
    }

    /// Feed one observed outcome. Unrelated or repeated outcomes are not errors.
    pub fn observe(&self, outcome: &RollOutcome) -> Observation {
        let request_id = outcome.request_id;
        let mut waits = self.lock();

        if let Some(waiter) = waits.pending.remove(&request_id) {
            waits.remember(request_id, Settled::Resolved);
            let latency_ms = waiter.since.elapsed().as_millis() as u64;
            if waiter.tx.send(*outcome).is_ok() {
                self.metrics.record_resolution(latency_ms);
            }
            return Observation::Resolved;
        }

        if waits.history.contains_key(&request_id) {
            self.metrics.record_dropped_event();
            return Observation::Dropped;
        }

        waits.remember(request_id, Settled::Unclaimed(*outcome));
        self.metrics.record_unclaimed_event();
        Observation::Unclaimed
    }

    /// Stop waiting for `request_id`. On-chain state is unaffected; a late
    /// outcome for it is dropped. Returns whether a wait was registered.
    pub fn cancel(&self, request_id: u64) -> bool {
        let mut waits = self.lock();
        if waits.pending.remove(&request_id).is_none() {
            return false;
        }
        waits.remember(request_id, Settled::Cancelled);
        self.metrics.record_cancellation();
        true
    }

    /// Ids currently awaited, in no particular order.
    pub fn awaited_ids(&self) -> Vec<u64> {
        self.lock().pending.keys().copied().collect()
    }

    pub fn pending_count(&self) -> usize {
        self.lock().pending.len()
    }
}

/// A registered wait for one request id.
///
/// Dropping it before it resolves cancels the wait.
pub struct PendingRoll {
    request_id: u64,
    rx: oneshot::Receiver<RollOutcome>,
    correlator: RequestCorrelator,
    settled: bool,
}

impl PendingRoll {
    pub fn request_id(&self) -> u64 {
        self.request_id
    }

    /// Wait without a deadline.
    pub async fn wait(mut self) -> Result<RollOutcome, RollError> {
        let received = (&mut self.rx).await;
        self.settled = true;
        received.map_err(|_| RollError::Cancelled(self.request_id))
    }

    /// Wait at most `timeout`; expiry cancels the wait.
    pub async fn wait_timeout(self, timeout: Duration) -> Result<RollOutcome, RollError> {
        let request_id = self.request_id;
        let metrics = self.correlator.metrics.clone();
        match tokio::time::timeout(timeout, self.wait()).await {
            Ok(result) => result,
            Err(_) => {
                metrics.record_timeout();
                Err(RollError::TimedOut(request_id))
            }
        }
    }
}

impl Drop for PendingRoll {
    fn drop(&mut self) {
        if !self.settled {
            self.correlator.cancel(self.request_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    fn correlator() -> RequestCorrelator {
        RequestCorrelator::new(16, Arc::new(Metrics::new()))
    }

    fn outcome(request_id: u64, player: Pubkey, result: u8) -> RollOutcome {
        RollOutcome {
            request_id,
            player,
            result,
        }
    }

    #[tokio::test]
    async fn resolves_matching_wait() {
        let correlator = correlator();
        let player = Pubkey::new_unique();
        let pending = correlator.register(42).unwrap();

        assert_eq!(correlator.observe(&outcome(42, player, 6)), Observation::Resolved);
        assert_eq!(pending.wait().await.unwrap(), outcome(42, player, 6));
        assert_eq!(correlator.pending_count(), 0);
    }

    #[tokio::test]
    async fn duplicate_delivery_is_dropped() {
        let correlator = correlator();
        let player = Pubkey::new_unique();
        let pending = correlator.register(42).unwrap();

        correlator.observe(&outcome(42, player, 6));
        assert_eq!(correlator.observe(&outcome(42, player, 3)), Observation::Dropped);
        assert_eq!(pending.wait().await.unwrap().result, 6);
        assert_eq!(correlator.metrics.events_dropped.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn unrelated_ids_are_ignored() {
        let correlator = correlator();
        let pending = correlator.register(1).unwrap();

        assert_eq!(
            correlator.observe(&outcome(99, Pubkey::new_unique(), 2)),
            Observation::Unclaimed
        );
        assert_eq!(correlator.pending_count(), 1);

        correlator.observe(&outcome(1, Pubkey::new_unique(), 5));
        assert_eq!(pending.wait().await.unwrap().result, 5);
    }

    #[tokio::test]
    async fn out_of_order_outcomes_reach_their_own_waits() {
        let correlator = correlator();
        let p1 = Pubkey::new_unique();
        let p2 = Pubkey::new_unique();
        let first = correlator.register(1).unwrap();
        let second = correlator.register(2).unwrap();

        let first_task = tokio::spawn(first.wait());
        let second_task = tokio::spawn(second.wait());

        correlator.observe(&outcome(2, p2, 3));
        correlator.observe(&outcome(1, p1, 6));

        assert_eq!(second_task.await.unwrap().unwrap(), outcome(2, p2, 3));
        assert_eq!(first_task.await.unwrap().unwrap(), outcome(1, p1, 6));
    }

    #[tokio::test]
    async fn outcome_seen_before_registration_is_delivered() {
        let correlator = correlator();
        let player = Pubkey::new_unique();

        assert_eq!(correlator.observe(&outcome(7, player, 4)), Observation::Unclaimed);
        let pending = correlator.register(7).unwrap();

        assert_eq!(pending.wait().await.unwrap(), outcome(7, player, 4));
        assert_eq!(correlator.observe(&outcome(7, player, 4)), Observation::Dropped);
    }

    #[tokio::test]
    async fn cancelled_wait_drops_late_outcome() {
        let correlator = correlator();
        let pending = correlator.register(5).unwrap();
        let request_id = pending.request_id();

        assert!(correlator.cancel(request_id));
        assert!(matches!(pending.wait().await, Err(RollError::Cancelled(5))));
        assert_eq!(
            correlator.observe(&outcome(5, Pubkey::new_unique(), 1)),
            Observation::Dropped
        );
        assert!(!correlator.cancel(request_id));
    }

    #[tokio::test]
    async fn dropping_the_wait_unregisters_it() {
        let correlator = correlator();
        let pending = correlator.register(8).unwrap();
        assert_eq!(correlator.awaited_ids(), vec![8]);

        drop(pending);
        assert_eq!(correlator.pending_count(), 0);
        assert_eq!(correlator.metrics.rolls_cancelled.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn second_registration_for_same_id_is_rejected() {
        let correlator = correlator();
        let _pending = correlator.register(3).unwrap();

        assert!(matches!(
            correlator.register(3),
            Err(RollError::AlreadyAwaiting(3))
        ));
    }

    #[tokio::test]
    async fn resolved_id_cannot_be_awaited_again() {
        let correlator = correlator();
        let player = Pubkey::new_unique();
        let pending = correlator.register(12).unwrap();
        correlator.observe(&outcome(12, player, 4));
        assert_eq!(pending.wait().await.unwrap().result, 4);

        assert!(matches!(
            correlator.register(12),
            Err(RollError::AlreadyResolved(12))
        ));
        assert_eq!(correlator.pending_count(), 0);
        assert_eq!(correlator.observe(&outcome(12, player, 2)), Observation::Dropped);
    }

    #[tokio::test]
    async fn claimed_early_outcome_is_not_handed_out_twice() {
        let correlator = correlator();
        let player = Pubkey::new_unique();
        correlator.observe(&outcome(13, player, 5));
        assert_eq!(correlator.register(13).unwrap().wait().await.unwrap().result, 5);

        assert!(matches!(
            correlator.register(13),
            Err(RollError::AlreadyResolved(13))
        ));
    }

    #[tokio::test]
    async fn cancelled_id_can_be_awaited_again() {
        let correlator = correlator();
        let player = Pubkey::new_unique();
        drop(correlator.register(14).unwrap());

        let pending = correlator.register(14).unwrap();
        assert_eq!(correlator.observe(&outcome(14, player, 1)), Observation::Resolved);
        assert_eq!(pending.wait().await.unwrap().result, 1);
    }

    #[tokio::test]
    async fn timeout_cancels_the_wait() {
        let correlator = correlator();
        let pending = correlator.register(11).unwrap();

        let err = pending.wait_timeout(Duration::from_millis(20)).await.unwrap_err();
        assert!(matches!(err, RollError::TimedOut(11)));
        assert_eq!(correlator.pending_count(), 0);
        assert_eq!(
            correlator.observe(&outcome(11, Pubkey::new_unique(), 2)),
            Observation::Dropped
        );
    }

    #[test]
    fn history_is_bounded() {
        let correlator = RequestCorrelator::new(2, Arc::new(Metrics::new()));
        let player = Pubkey::new_unique();
        for id in 0..5 {
            correlator.observe(&outcome(id, player, 1));
        }

        let waits = correlator.lock();
        assert_eq!(waits.history.len(), 2);
        assert!(waits.history.contains_key(&3));
        assert!(waits.history.contains_key(&4));
    }
}
