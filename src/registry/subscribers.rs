//! Concurrent subscriber map and line fan-out.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use uuid::Uuid;

use super::error::{RegistryError, SendError};
use crate::line::Line;

/// Default number of lines buffered per subscriber before lines are
/// dropped for it.
pub const DEFAULT_SUBSCRIBER_BUFFER: usize = 256;

/// Identifier minted for each connection.
pub type SubscriberId = Uuid;

/// Send side of a subscriber's line queue.
pub type SubscriberHandle = mpsc::Sender<Line>;

/// Outcome of one broadcast call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Subscribers the line was queued for.
    pub delivered: usize,
    /// Subscribers whose queue was full.
    pub lagging: usize,
    /// Subscribers whose session has already gone away.
    pub disconnected: usize,
}

impl BroadcastReport {
    /// Total number of failed deliveries.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.lagging + self.disconnected
    }
}

/// Set of live subscribers keyed by ID.
///
/// Membership changes come from sessions, broadcasts come from the pump.
/// Both take the same lock, and a broadcast only performs non-blocking
/// sends while holding it, so every subscriber registered before a
/// broadcast begins gets that line exactly once.
#[derive(Debug, Default)]
pub struct SubscriberRegistry {
    subscribers: Mutex<HashMap<SubscriberId, SubscriberHandle>>,
}

impl SubscriberRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<SubscriberId, SubscriberHandle>> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a subscriber.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::DuplicateId` if `id` is already registered.
    pub fn register(&self, id: SubscriberId, handle: SubscriberHandle) -> Result<(), RegistryError> {
        let mut subscribers = self.lock();
        if subscribers.contains_key(&id) {
            return Err(RegistryError::DuplicateId(id));
        }
        subscribers.insert(id, handle);
        tracing::debug!(subscriber = %id, total = subscribers.len(), "Subscriber registered");
        Ok(())
    }

    /// Add a subscriber and return a guard that removes it on drop.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::DuplicateId` if `id` is already registered.
    pub fn join(
        self: &Arc<Self>,
        id: SubscriberId,
        handle: SubscriberHandle,
    ) -> Result<Registration, RegistryError> {
        self.register(id, handle)?;
        Ok(Registration {
            id,
            registry: Arc::clone(self),
        })
    }

    /// Remove a subscriber. Returns whether it was present.
    pub fn deregister(&self, id: &SubscriberId) -> bool {
        let mut subscribers = self.lock();
        let removed = subscribers.remove(id).is_some();
        if removed {
            tracing::debug!(subscriber = %id, total = subscribers.len(), "Subscriber deregistered");
        }
        removed
    }

    /// Queue `line` for every registered subscriber.
    ///
    /// Failures are logged and counted but never stop delivery to the
    /// others. Failed subscribers stay registered; their own session
    /// removes them once it notices the disconnect.
    pub fn broadcast(&self, line: &Line) -> BroadcastReport {
        let subscribers = self.lock();
        let mut report = BroadcastReport::default();

        for (id, handle) in subscribers.iter() {
            match deliver(handle, line) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    tracing::warn!(subscriber = %id, error = %e, "Failed to queue line for subscriber");
                    match e {
                        SendError::Lagging => report.lagging += 1,
                        SendError::Disconnected | SendError::Transport(_) => {
                            report.disconnected += 1;
                        }
                    }
                }
            }
        }

        report
    }

    /// Number of registered subscribers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no subscriber is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Whether `id` is registered.
    #[must_use]
    pub fn contains(&self, id: &SubscriberId) -> bool {
        self.lock().contains_key(id)
    }
}

fn deliver(handle: &SubscriberHandle, line: &Line) -> Result<(), SendError> {
    handle.try_send(line.clone()).map_err(|e| match e {
        TrySendError::Full(_) => SendError::Lagging,
        TrySendError::Closed(_) => SendError::Disconnected,
    })
}

/// Registry membership that ends when dropped.
#[derive(Debug)]
pub struct Registration {
    id: SubscriberId,
    registry: Arc<SubscriberRegistry>,
}

impl Registration {
    /// The registered subscriber ID.
    #[must_use]
    pub fn id(&self) -> SubscriberId {
        self.id
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.registry.deregister(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subscriber(buffer: usize) -> (SubscriberId, SubscriberHandle, mpsc::Receiver<Line>) {
        let (tx, rx) = mpsc::channel(buffer);
        (Uuid::new_v4(), tx, rx)
    }

    #[test]
    fn test_broadcast_reaches_every_subscriber_once() {
        let registry = SubscriberRegistry::new();
        let (id1, tx1, mut rx1) = subscriber(8);
        let (id2, tx2, mut rx2) = subscriber(8);
        let (id3, tx3, mut rx3) = subscriber(8);
        registry.register(id1, tx1).unwrap();
        registry.register(id2, tx2).unwrap();
        registry.register(id3, tx3).unwrap();

        let report = registry.broadcast(&Line::from("ERROR disk full"));
        assert_eq!(report.delivered, 3);
        assert_eq!(report.failed(), 0);

        // Leaving right after the broadcast does not take the line back.
        assert!(registry.deregister(&id2));

        for rx in [&mut rx1, &mut rx2, &mut rx3] {
            assert_eq!(rx.try_recv().unwrap().as_str(), "ERROR disk full");
            assert!(rx.try_recv().is_err());
        }
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let registry = SubscriberRegistry::new();
        let (id, tx, _rx) = subscriber(1);
        registry.register(id, tx.clone()).unwrap();

        let err = registry.register(id, tx).unwrap_err();
        assert_eq!(err, RegistryError::DuplicateId(id));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_deregister_is_idempotent() {
        let registry = SubscriberRegistry::new();
        let (id, tx, _rx) = subscriber(1);
        registry.register(id, tx).unwrap();

        assert!(registry.deregister(&id));
        assert!(!registry.deregister(&id));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_full_subscriber_does_not_block_others() {
        let registry = SubscriberRegistry::new();
        let (slow_id, slow_tx, mut slow_rx) = subscriber(1);
        let (fast_id, fast_tx, mut fast_rx) = subscriber(8);
        registry.register(slow_id, slow_tx).unwrap();
        registry.register(fast_id, fast_tx).unwrap();

        registry.broadcast(&Line::from("one"));
        let report = registry.broadcast(&Line::from("two"));

        assert_eq!(report.delivered, 1);
        assert_eq!(report.lagging, 1);
        assert!(registry.contains(&slow_id));
        assert_eq!(slow_rx.try_recv().unwrap().as_str(), "one");
        assert!(slow_rx.try_recv().is_err());
        assert_eq!(fast_rx.try_recv().unwrap().as_str(), "one");
        assert_eq!(fast_rx.try_recv().unwrap().as_str(), "two");
    }

    #[test]
    fn test_closed_subscriber_left_registered() {
        let registry = SubscriberRegistry::new();
        let (id, tx, rx) = subscriber(4);
        registry.register(id, tx).unwrap();
        drop(rx);

        let report = registry.broadcast(&Line::from("x"));
        assert_eq!(report.disconnected, 1);
        assert!(registry.contains(&id));
    }

    #[test]
    fn test_registration_guard_deregisters_on_drop() {
        let registry = Arc::new(SubscriberRegistry::new());
        let (id, tx, _rx) = subscriber(1);

        let registration = registry.join(id, tx).unwrap();
        assert_eq!(registration.id(), id);
        assert!(registry.contains(&id));

        drop(registration);
        assert!(!registry.contains(&id));
    }

    #[test]
    fn test_broadcast_with_no_subscribers() {
        let registry = SubscriberRegistry::new();
        let report = registry.broadcast(&Line::from("nobody listening"));
        assert_eq!(report, BroadcastReport::default());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_membership_during_broadcast() {
        let registry = Arc::new(SubscriberRegistry::new());
        let (stable_id, stable_tx, mut stable_rx) = subscriber(1024);
        registry.register(stable_id, stable_tx).unwrap();

        let mut churn = Vec::new();
        for _ in 0..8 {
            let registry = Arc::clone(&registry);
            churn.push(tokio::spawn(async move {
                for _ in 0..50 {
                    let (id, tx, _rx) = subscriber(4);
                    registry.register(id, tx).unwrap();
                    tokio::task::yield_now().await;
                    assert!(registry.deregister(&id));
                }
            }));
        }

        for i in 0..500 {
            registry.broadcast(&Line::from(format!("line-{i}")));
            if i % 50 == 0 {
                tokio::task::yield_now().await;
            }
        }

        for task in churn {
            task.await.unwrap();
        }

        for i in 0..500 {
            assert_eq!(stable_rx.try_recv().unwrap().to_string(), format!("line-{i}"));
        }
        assert!(stable_rx.try_recv().is_err());
        assert_eq!(registry.len(), 1);
    }
}
