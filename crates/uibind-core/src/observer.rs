#![forbid(unsafe_code)]

//! Push-style observers, identity-keyed observer sets, and subscription
//! tokens.
//!
//! Observer registrations are keyed by reference identity (the `Arc`
//! allocation), never by value equality: subscribing the same `Arc` twice is
//! an upsert, and removing an absent observer is a no-op.
//!
//! # Invariants
//!
//! 1. A [`SubscriptionToken`] revokes exactly one registration, exactly once.
//! 2. Observers are notified in registration order over a point-in-time
//!    snapshot; mutation during delivery never corrupts iteration.
//! 3. Disposing a token prevents all future deliveries to that observer but
//!    does not recall a delivery already in flight.

use std::fmt;
use std::sync::Arc;

use crate::error::BindError;

/// A push-style consumer of notifications of type `T`.
pub trait Observer<T>: Send + Sync {
    /// A notification was raised.
    fn on_next(&self, value: &T);

    /// The source encountered an error it could not deliver past.
    fn on_error(&self, _error: &BindError) {}

    /// The source was disposed; no further notifications will arrive.
    fn on_completed(&self) {}
}

/// Reference identity of an observer registration.
fn identity<T>(observer: &Arc<dyn Observer<T>>) -> usize {
    Arc::as_ptr(observer).cast::<()>() as usize
}

/// An ordered set of observers keyed by reference identity.
///
/// Owned by a single notifier or command instance and mutated only under
/// that instance's lock; delivery happens over [`snapshot`] outside it.
///
/// [`snapshot`]: ObserverSet::snapshot
pub struct ObserverSet<T> {
    entries: Vec<(usize, Arc<dyn Observer<T>>)>,
}

impl<T> ObserverSet<T> {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Add an observer, returning its identity key.
    ///
    /// Re-adding an already-registered observer is a no-op-safe upsert: the
    /// existing registration (and its position) is kept.
    pub fn insert(&mut self, observer: Arc<dyn Observer<T>>) -> usize {
        let key = identity(&observer);
        if !self.entries.iter().any(|(k, _)| *k == key) {
            self.entries.push((key, observer));
        }
        key
    }

    /// Remove the registration with the given key; no-op if absent.
    pub fn remove(&mut self, key: usize) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(k, _)| *k != key);
        self.entries.len() != before
    }

    /// A point-in-time copy of the current observers, in registration order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Arc<dyn Observer<T>>> {
        self.entries
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect()
    }

    /// Remove and return every observer, for completion outside the lock.
    pub fn drain(&mut self) -> Vec<Arc<dyn Observer<T>>> {
        self.entries
            .drain(..)
            .map(|(_, observer)| observer)
            .collect()
    }

    /// Number of registered observers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T> Default for ObserverSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for ObserverSet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverSet")
            .field("len", &self.entries.len())
            .finish()
    }
}

/// A disposable handle that revokes exactly one observer registration.
///
/// Disposal happens on the first of: an explicit [`dispose`] call or drop
/// (RAII). Repeated disposal is a no-op. Call [`forget`] to keep the
/// registration alive for the owner's lifetime instead.
///
/// [`dispose`]: SubscriptionToken::dispose
/// [`forget`]: SubscriptionToken::forget
pub struct SubscriptionToken {
    revoke: Option<Box<dyn FnOnce() + Send>>,
}

impl SubscriptionToken {
    /// Create a token that runs `revoke` on first disposal.
    pub fn new(revoke: impl FnOnce() + Send + 'static) -> Self {
        Self {
            revoke: Some(Box::new(revoke)),
        }
    }

    /// A token that is already disposed and does nothing.
    #[must_use]
    pub fn inert() -> Self {
        Self { revoke: None }
    }

    /// Remove the registration this token guards. Idempotent.
    pub fn dispose(&mut self) {
        if let Some(revoke) = self.revoke.take() {
            revoke();
        }
    }

    /// Whether the token has already been disposed.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.revoke.is_none()
    }

    /// Keep the registration alive permanently (the token no longer revokes
    /// it on drop).
    pub fn forget(mut self) {
        self.revoke = None;
    }
}

impl Drop for SubscriptionToken {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for SubscriptionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionToken")
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
