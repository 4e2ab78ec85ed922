#![forbid(unsafe_code)]

//! A typed, channel-keyed publish/subscribe broker.
//!
//! Channels are named; a handler registers under a channel together with the
//! value type it accepts. A publish delivers only to handlers whose
//! registered type equals the published type exactly — handlers for a
//! different type on the same channel are skipped.
//!
//! # Failure policy
//!
//! Handlers are fallible. During a publish every matching handler runs;
//! failures are collected and reported together as one
//! [`BindError::PublishFailed`] after delivery completes. The policy is
//! never mixed: no handler failure aborts the remaining deliveries.
//!
//! # Invariants
//!
//! 1. Handler identity is the `Arc` allocation; re-subscribing the same
//!    handler to the same channel is idempotent.
//! 2. A channel with zero handlers is removed; publishing to an unknown or
//!    now-empty channel is a no-op.
//! 3. Delivery runs over a point-in-time snapshot taken under the broker
//!    lock and invoked outside it; handlers added or removed during a
//!    publish do not affect the in-flight delivery.

use std::any::{Any, TypeId, type_name};
use std::fmt;
use std::sync::{Arc, Mutex};

use ahash::AHashMap;
use tracing::{debug, trace, warn};

use uibind_core::error::{BindError, BindResult, HandlerError};

use crate::lock;

/// A typed, fallible handler registered on a broker channel.
pub type BrokerHandler<T> = Arc<dyn Fn(&T) -> Result<(), HandlerError> + Send + Sync>;

fn handler_key<T: 'static>(handler: &BrokerHandler<T>) -> usize {
    Arc::as_ptr(handler).cast::<()>() as usize
}

struct ChannelEntry {
    key: usize,
    type_id: TypeId,
    // Holds a `BrokerHandler<T>` for the registered `T`.
    handler: Box<dyn Any + Send + Sync>,
}

/// A channel-name-keyed registry of typed handlers.
pub struct EventBroker {
    channels: Mutex<AHashMap<String, Vec<ChannelEntry>>>,
}

impl EventBroker {
    /// Create an empty broker.
    #[must_use]
    pub fn new() -> Self {
        Self {
            channels: Mutex::new(AHashMap::new()),
        }
    }

    /// Subscribe `handler` to `channel` for values of type `T`.
    ///
    /// Idempotent for the same `Arc` on the same channel. Errors on an
    /// empty channel name.
    pub fn subscribe<T: 'static>(&self, channel: &str, handler: BrokerHandler<T>) -> BindResult<()> {
        if channel.is_empty() {
            return Err(BindError::InvalidArgument("channel name must be non-empty"));
        }
        let key = handler_key(&handler);
        let mut channels = lock(&self.channels);
        let entries = channels.entry(channel.to_owned()).or_default();
        if entries.iter().any(|entry| entry.key == key) {
            return Ok(());
        }
        entries.push(ChannelEntry {
            key,
            type_id: TypeId::of::<T>(),
            handler: Box::new(handler),
        });
        debug!(channel, value_type = type_name::<T>(), "handler subscribed");
        Ok(())
    }

    /// Remove `handler` from `channel`; no-op when not subscribed.
    pub fn unsubscribe<T: 'static>(
        &self,
        channel: &str,
        handler: &BrokerHandler<T>,
    ) -> BindResult<()> {
        if channel.is_empty() {
            return Err(BindError::InvalidArgument("channel name must be non-empty"));
        }
        let key = handler_key(handler);
        let mut channels = lock(&self.channels);
        if let Some(entries) = channels.get_mut(channel) {
            entries.retain(|entry| entry.key != key);
            if entries.is_empty() {
                channels.remove(channel);
            }
            debug!(channel, "handler unsubscribed");
        }
        Ok(())
    }

    /// Deliver `value` synchronously to every handler on `channel`
    /// registered for exactly `T`.
    ///
    /// All matching handlers run; their failures, if any, come back as one
    /// [`BindError::PublishFailed`] in delivery order.
    pub fn publish<T: 'static>(&self, channel: &str, value: &T) -> BindResult<()> {
        if channel.is_empty() {
            return Err(BindError::InvalidArgument("channel name must be non-empty"));
        }
        let snapshot: Vec<BrokerHandler<T>> = {
            let channels = lock(&self.channels);
            match channels.get(channel) {
                None => return Ok(()),
                Some(entries) => entries
                    .iter()
                    .filter(|entry| entry.type_id == TypeId::of::<T>())
                    .filter_map(|entry| entry.handler.downcast_ref::<BrokerHandler<T>>())
                    .map(Arc::clone)
                    .collect(),
            }
        };
        trace!(channel, handlers = snapshot.len(), "publishing");
        let mut errors = Vec::new();
        for handler in &snapshot {
            if let Err(error) = handler(value) {
                warn!(channel, %error, "broker handler failed");
                errors.push(error);
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(BindError::PublishFailed {
                channel: channel.to_owned(),
                errors,
            })
        }
    }

    /// Number of handlers currently registered on `channel`.
    #[must_use]
    pub fn handler_count(&self, channel: &str) -> usize {
        lock(&self.channels)
            .get(channel)
            .map_or(0, |entries| entries.len())
    }

    /// Clear every channel. Idempotent and infallible.
    pub fn dispose(&self) {
        lock(&self.channels).clear();
    }
}

impl Default for EventBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventBroker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBroker")
            .field("channels", &lock(&self.channels).len())
            .finish()
    }
}
