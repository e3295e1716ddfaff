use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use tracing::trace;

/// Callback invoked with every published value.
pub type Listener<S> = Arc<dyn Fn(&S) + Send + Sync>;

/// Handle returned by `subscribe`, used to unsubscribe later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Synchronous "update" event channel.
///
/// Listeners are kept in subscription order behind an `ArcSwap`, so `publish`
/// walks an immutable snapshot: a listener may subscribe or unsubscribe from
/// inside its own callback, and changes apply from the next publish on.
pub struct UpdateChannel<S> {
    listeners: ArcSwap<Vec<(SubscriptionId, Listener<S>)>>,
    next_id: AtomicU64,
}

impl<S> UpdateChannel<S> {
    pub fn new() -> Self {
        Self { listeners: ArcSwap::from_pointee(Vec::new()), next_id: AtomicU64::new(1) }
    }

    /// Register a listener; it receives every value published from now on.
    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&S) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let listener: Listener<S> = Arc::new(listener);
        self.listeners.rcu(|current| {
            let mut next = Vec::clone(current);
            next.push((id, Arc::clone(&listener)));
            next
        });
        trace!(subscription = id.0, "listener subscribed");
        id
    }

    /// Remove a listener; returns whether it was registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let previous = self.listeners.rcu(|current| {
            current.iter().filter(|(sid, _)| *sid != id).cloned().collect::<Vec<_>>()
        });
        previous.iter().any(|(sid, _)| *sid == id)
    }

    /// Deliver `data` to every current listener before returning.
    pub fn publish(&self, data: &S) {
        let listeners = self.listeners.load_full();
        trace!(listeners = listeners.len(), "publishing update");
        for (_, listener) in listeners.iter() {
            listener(data);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.listeners.load().len()
    }
}

impl<S> Default for UpdateChannel<S> {
    fn default() -> Self { Self::new() }
}

impl<S> fmt::Debug for UpdateChannel<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpdateChannel").field("subscribers", &self.subscriber_count()).finish()
    }
}

/// Publish-only handle a backend keeps to announce external changes.
pub struct UpdatePublisher<S> {
    channel: Arc<UpdateChannel<S>>,
}

impl<S> UpdatePublisher<S> {
    pub(crate) fn new(channel: &Arc<UpdateChannel<S>>) -> Self {
        Self { channel: Arc::clone(channel) }
    }

    pub fn publish(&self, data: &S) {
        self.channel.publish(data);
    }
}

impl<S> Clone for UpdatePublisher<S> {
    fn clone(&self) -> Self { Self { channel: Arc::clone(&self.channel) } }
}

impl<S> fmt::Debug for UpdatePublisher<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpdatePublisher").field("channel", &self.channel).finish()
    }
}
