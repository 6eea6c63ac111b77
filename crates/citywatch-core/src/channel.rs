//! Channel adapter contract and the in-process adapter.
//!
//! The transport that delivers `operations_update`, `traffic_update`,
//! `system_metrics`, and `iot_data` events lives outside this crate. The
//! engine only needs [`ChannelAdapter`]: subscribe a handler to a channel
//! and get back a [`Subscription`] that removes it again.
//!
//! [`LocalChannelAdapter`] is an in-memory fan-out used by the binary's
//! publish bridge and by tests. Handlers for one channel run in
//! subscription order on the publishing thread, so per-channel delivery
//! order is the publish order. A handler that cannot take a payload says
//! so, and `publish` reports it to the caller.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use citywatch_types::{Channel, ChannelPayload, SubscriptionId};
use tracing::{debug, trace};

/// Callback invoked with each payload delivered on a channel.
///
/// Returns [`ChannelError::Refused`] when the subscriber could not accept
/// the payload.
pub type Handler = Arc<dyn Fn(ChannelPayload) -> Result<(), ChannelError> + Send + Sync>;

/// Errors from a channel adapter.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    /// Nothing is listening on the channel.
    #[error("channel {channel} has no subscribers")]
    Unavailable {
        /// The channel that could not be reached.
        channel: Channel,
    },

    /// The adapter has been shut down.
    #[error("channel adapter is closed")]
    Closed,

    /// A subscriber did not accept the payload.
    #[error("subscriber on {channel} refused the payload: {reason}")]
    Refused {
        /// The channel the payload was published on.
        channel: Channel,
        /// Why the subscriber refused it.
        reason: String,
    },
}

/// Subscribe/unsubscribe contract for an event source.
pub trait ChannelAdapter: Send + Sync {
    /// Register `handler` for every payload delivered on `channel`.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Closed`] if the adapter no longer accepts
    /// subscriptions.
    fn subscribe(&self, channel: Channel, handler: Handler) -> Result<Subscription, ChannelError>;

    /// Remove a subscription by ID. Returns `false` if it was already gone.
    fn unsubscribe(&self, id: SubscriptionId) -> bool;
}

/// Handle for one registered handler.
///
/// Dropping the handle unsubscribes. Call [`Subscription::detach`] to keep
/// the handler registered for the adapter's lifetime.
pub struct Subscription {
    id: SubscriptionId,
    channel: Channel,
    cancel: Option<Box<dyn FnOnce(SubscriptionId) + Send + Sync>>,
}

impl Subscription {
    /// Build a handle that runs `cancel` once when unsubscribed or dropped.
    pub fn new(
        id: SubscriptionId,
        channel: Channel,
        cancel: impl FnOnce(SubscriptionId) + Send + Sync + 'static,
    ) -> Self {
        Self {
            id,
            channel,
            cancel: Some(Box::new(cancel)),
        }
    }

    /// The subscription's ID.
    pub const fn id(&self) -> SubscriptionId {
        self.id
    }

    /// The channel this subscription listens on.
    pub const fn channel(&self) -> Channel {
        self.channel
    }

    /// Remove the handler now.
    pub fn unsubscribe(mut self) {
        self.cancel_now();
    }

    /// Keep the handler registered and drop the handle.
    pub fn detach(mut self) {
        self.cancel = None;
    }

    fn cancel_now(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel(self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel_now();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("channel", &self.channel)
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// In-process adapter
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Registry {
    closed: bool,
    handlers: HashMap<Channel, Vec<(SubscriptionId, Handler)>>,
}

/// In-memory [`ChannelAdapter`] with a synchronous `publish`.
///
/// Cheap to clone; clones share the same registry.
#[derive(Clone, Default)]
pub struct LocalChannelAdapter {
    registry: Arc<Mutex<Registry>>,
}

impl LocalChannelAdapter {
    /// Create an adapter with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver `payload` to every handler on its channel.
    ///
    /// Returns the number of handlers that accepted it.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Closed`] after [`close`](Self::close),
    /// [`ChannelError::Unavailable`] when the channel has no subscribers, or
    /// the first [`ChannelError::Refused`] from a handler. Every handler is
    /// still called.
    pub fn publish(&self, payload: ChannelPayload) -> Result<usize, ChannelError> {
        let channel = payload.channel();
        // Copy the handler list out so handlers may subscribe or
        // unsubscribe without deadlocking.
        let handlers: Vec<Handler> = {
            let registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
            if registry.closed {
                return Err(ChannelError::Closed);
            }
            registry
                .handlers
                .get(&channel)
                .map(|list| list.iter().map(|(_, h)| Arc::clone(h)).collect())
                .unwrap_or_default()
        };

        if handlers.is_empty() {
            return Err(ChannelError::Unavailable { channel });
        }

        trace!(%channel, subscribers = handlers.len(), "Publishing payload");
        let delivered = handlers.len();
        let mut refused = None;
        for handler in handlers {
            if let Err(e) = handler(payload.clone()) {
                debug!(%channel, error = %e, "Subscriber refused payload");
                refused.get_or_insert(e);
            }
        }
        refused.map_or(Ok(delivered), Err)
    }

    /// Number of handlers currently registered on `channel`.
    pub fn subscriber_count(&self, channel: Channel) -> usize {
        let registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        registry.handlers.get(&channel).map_or(0, Vec::len)
    }

    /// Drop every handler and refuse further subscribe and publish calls.
    pub fn close(&self) {
        let mut registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        registry.closed = true;
        registry.handlers.clear();
        debug!("Local channel adapter closed");
    }
}

fn remove_handler(registry: &Mutex<Registry>, id: SubscriptionId) -> bool {
    let mut registry = registry.lock().unwrap_or_else(PoisonError::into_inner);
    let mut removed = false;
    for list in registry.handlers.values_mut() {
        let before = list.len();
        list.retain(|(sub, _)| *sub != id);
        removed |= list.len() != before;
    }
    removed
}

impl ChannelAdapter for LocalChannelAdapter {
    fn subscribe(&self, channel: Channel, handler: Handler) -> Result<Subscription, ChannelError> {
        let id = SubscriptionId::new();
        {
            let mut registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
            if registry.closed {
                return Err(ChannelError::Closed);
            }
            registry.handlers.entry(channel).or_default().push((id, handler));
        }
        debug!(%channel, subscription = %id, "Handler subscribed");

        let registry: Weak<Mutex<Registry>> = Arc::downgrade(&self.registry);
        Ok(Subscription::new(id, channel, move |id| {
            if let Some(registry) = registry.upgrade() {
                remove_handler(&registry, id);
            }
        }))
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        remove_handler(&self.registry, id)
    }
}

impl fmt::Debug for LocalChannelAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("LocalChannelAdapter")
            .field("closed", &registry.closed)
            .field("channels", &registry.handlers.len())
            .finish()
    }
}
