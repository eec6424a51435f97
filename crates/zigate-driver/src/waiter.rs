//! Registry of pending expectations.
//!
//! Each expectation carries a matcher and a timeout. Every item offered to
//! [`WaiterRegistry::settle`] is tested against the pending expectations in
//! registration order; the first one whose matcher passes receives the item
//! and is removed. Deciding whether an item matches is delegated to a
//! [`WaitPolicy`], so the registry itself knows nothing about the protocol.
//!
//! An expectation's timer only starts once its handle is started, so a
//! command can register everything it expects before writing and start the
//! clocks later. Dropping a handle removes its expectation.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::trace;

/// Matching policy plugged into a [`WaiterRegistry`].
pub trait WaitPolicy: Send + Sync + 'static {
    /// Per-expectation matching data.
    type Matcher: Send + 'static;
    /// Items offered to the registry.
    type Item: Clone + Send + 'static;

    /// Whether `item` satisfies `matcher`. Must not panic.
    fn matches(&self, item: &Self::Item, matcher: &Self::Matcher) -> bool;

    /// Human-readable description used in timeout errors.
    fn describe(&self, matcher: &Self::Matcher, timeout: Duration) -> String;
}

/// Why an expectation did not produce an item.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WaitError {
    /// The deadline elapsed before a matching item arrived.
    #[error("{description}")]
    Timeout {
        /// Description of the unmet expectation.
        description: String,
        /// Configured timeout.
        timeout: Duration,
    },

    /// The expectation was removed before it settled.
    #[error("expectation removed before it settled")]
    Cancelled,
}

struct Pending<P: WaitPolicy> {
    matcher: P::Matcher,
    reply: oneshot::Sender<P::Item>,
}

struct Slots<P: WaitPolicy> {
    next_id: u64,
    pending: BTreeMap<u64, Pending<P>>,
}

struct Shared<P: WaitPolicy> {
    policy: P,
    slots: Mutex<Slots<P>>,
}

/// Pending expectations, shared between the command path and the dispatch path.
pub struct WaiterRegistry<P: WaitPolicy> {
    shared: Arc<Shared<P>>,
}

impl<P: WaitPolicy> Clone for WaiterRegistry<P> {
    fn clone(&self) -> Self {
        WaiterRegistry {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<P: WaitPolicy> WaiterRegistry<P> {
    /// Create an empty registry.
    pub fn new(policy: P) -> Self {
        WaiterRegistry {
            shared: Arc::new(Shared {
                policy,
                slots: Mutex::new(Slots {
                    next_id: 0,
                    pending: BTreeMap::new(),
                }),
            }),
        }
    }

    /// Register an expectation. Its timer does not run until the handle is started.
    pub fn register(&self, matcher: P::Matcher, timeout: Duration) -> WaitHandle<P> {
        let (reply, rx) = oneshot::channel();
        let mut slots = self.shared.slots.lock();
        let id = slots.next_id;
        slots.next_id += 1;
        slots.pending.insert(id, Pending { matcher, reply });
        trace!(id, pending = slots.pending.len(), "registered expectation");

        WaitHandle {
            id,
            timeout,
            rx,
            registry: self.clone(),
        }
    }

    /// Offer an item to the pending expectations.
    ///
    /// Settles and removes at most one expectation, the oldest that matches.
    /// Returns whether one was settled.
    pub fn settle(&self, item: &P::Item) -> bool {
        let mut slots = self.shared.slots.lock();
        let policy = &self.shared.policy;
        let Some(id) = slots
            .pending
            .iter()
            .find(|(_, pending)| policy.matches(item, &pending.matcher))
            .map(|(id, _)| *id)
        else {
            return false;
        };

        if let Some(pending) = slots.pending.remove(&id) {
            trace!(id, "settled expectation");
            // The receiver may already be gone if its handle is being dropped
            let _ = pending.reply.send(item.clone());
        }
        true
    }

    /// Remove an expectation without settling it. Returns whether it was pending.
    pub fn remove(&self, id: u64) -> bool {
        self.take(id).is_some()
    }

    /// Number of pending expectations.
    pub fn len(&self) -> usize {
        self.shared.slots.lock().pending.len()
    }

    /// Whether no expectations are pending.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn take(&self, id: u64) -> Option<Pending<P>> {
        self.shared.slots.lock().pending.remove(&id)
    }
}

/// A registered expectation whose timer has not started yet.
pub struct WaitHandle<P: WaitPolicy> {
    id: u64,
    timeout: Duration,
    rx: oneshot::Receiver<P::Item>,
    registry: WaiterRegistry<P>,
}

impl<P: WaitPolicy> WaitHandle<P> {
    /// Registry id of the expectation.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Start the timer.
    pub fn start(self) -> Waiting<P> {
        Waiting {
            deadline: Instant::now() + self.timeout,
            handle: self,
        }
    }

    /// Remove the expectation from the registry.
    pub fn cancel(self) {
        self.registry.remove(self.id);
    }
}

impl<P: WaitPolicy> Drop for WaitHandle<P> {
    fn drop(&mut self) {
        self.registry.remove(self.id);
    }
}

/// A started expectation.
pub struct Waiting<P: WaitPolicy> {
    handle: WaitHandle<P>,
    deadline: Instant,
}

impl<P: WaitPolicy> Waiting<P> {
    /// Registry id of the expectation.
    pub fn id(&self) -> u64 {
        self.handle.id
    }

    /// Wait for a matching item or the deadline.
    pub async fn wait(mut self) -> Result<P::Item, WaitError> {
        let handle = &mut self.handle;
        match tokio::time::timeout_at(self.deadline, &mut handle.rx).await {
            Ok(Ok(item)) => Ok(item),
            Ok(Err(_)) => Err(WaitError::Cancelled),
            Err(_) => match handle.registry.take(handle.id) {
                Some(pending) => Err(WaitError::Timeout {
                    description: handle
                        .registry
                        .shared
                        .policy
                        .describe(&pending.matcher, handle.timeout),
                    timeout: handle.timeout,
                }),
                // Settled between the deadline and the removal
                None => handle.rx.try_recv().map_err(|_| WaitError::Cancelled),
            },
        }
    }
}

/// Start every handle and return the first outcome, success or timeout.
///
/// The losing expectations are removed from the registry before returning.
pub async fn first_of<P: WaitPolicy>(handles: Vec<WaitHandle<P>>) -> Result<P::Item, WaitError> {
    if handles.len() <= 1 {
        return match handles.into_iter().next() {
            Some(handle) => handle.start().wait().await,
            None => Err(WaitError::Cancelled),
        };
    }

    let registry = handles[0].registry.clone();
    let ids: Vec<u64> = handles.iter().map(WaitHandle::id).collect();

    let mut race = JoinSet::new();
    for handle in handles {
        race.spawn(handle.start().wait());
    }

    let outcome = match race.join_next().await {
        Some(Ok(outcome)) => outcome,
        Some(Err(_)) | None => Err(WaitError::Cancelled),
    };

    race.abort_all();
    for id in ids {
        registry.remove(id);
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Matches numbers equal to the matcher.
    struct Exact;

    impl WaitPolicy for Exact {
        type Matcher = u32;
        type Item = u32;

        fn matches(&self, item: &u32, matcher: &u32) -> bool {
            item == matcher
        }

        fn describe(&self, matcher: &u32, timeout: Duration) -> String {
            format!("waiting for {} ({}ms)", matcher, timeout.as_millis())
        }
    }

    const LONG: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn test_settle_first_match_in_registration_order() {
        let registry = WaiterRegistry::new(Exact);
        let first = registry.register(7, LONG);
        let second = registry.register(7, LONG);

        assert!(registry.settle(&7));
        assert_eq!(registry.len(), 1);
        assert_eq!(first.start().wait().await, Ok(7));

        assert!(registry.settle(&7));
        assert_eq!(second.start().wait().await, Ok(7));
        assert!(!registry.settle(&7));
    }

    #[tokio::test]
    async fn test_settle_before_start_is_kept() {
        let registry = WaiterRegistry::new(Exact);
        let handle = registry.register(1, Duration::from_millis(10));
        assert!(registry.settle(&1));

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(handle.start().wait().await, Ok(1));
    }

    #[tokio::test]
    async fn test_timeout_describes_and_removes() {
        let registry = WaiterRegistry::new(Exact);
        let handle = registry.register(3, Duration::from_millis(20));

        let err = handle.start().wait().await.unwrap_err();
        assert_eq!(
            err,
            WaitError::Timeout {
                description: "waiting for 3 (20ms)".to_string(),
                timeout: Duration::from_millis(20),
            }
        );
        assert!(registry.is_empty());
        // A late match settles nothing
        assert!(!registry.settle(&3));
    }

    #[tokio::test]
    async fn test_drop_and_cancel_remove() {
        let registry = WaiterRegistry::new(Exact);
        let dropped = registry.register(1, LONG);
        let cancelled = registry.register(2, LONG);
        assert_eq!(registry.len(), 2);

        drop(dropped);
        cancelled.cancel();
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_first_of_cleans_up_losers() {
        let registry = WaiterRegistry::new(Exact);
        let handles = vec![registry.register(10, LONG), registry.register(20, LONG)];

        let settler = registry.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            settler.settle(&20);
        });

        assert_eq!(first_of(handles).await, Ok(20));
        assert!(registry.is_empty());
        assert!(!registry.settle(&10));
    }

    #[tokio::test]
    async fn test_first_of_empty() {
        let handles: Vec<WaitHandle<Exact>> = Vec::new();
        assert_eq!(first_of(handles).await, Err(WaitError::Cancelled));
    }
}
