#![forbid(unsafe_code)]

//! Commands whose executability is re-queried when tracked sources change.
//!
//! A [`CommandController`] wraps an action and an optional guard predicate.
//! `can_execute` evaluates the guard on every call; the controller never
//! caches the result. Attaching a [`ChangeNotifier`] with [`track`] makes a
//! matching property change on that source raise the controller's own
//! state-changed signal, through the same dispatch discipline and observer
//! machinery the notifier uses.
//!
//! # Invariants
//!
//! 1. Tracked sources are keyed by reference identity; re-tracking a source
//!    replaces its name filter (last write wins, not a union).
//! 2. A source notification with an empty property name never matches.
//! 3. `dispose()` detaches from every tracked source, completes every
//!    observer, and is idempotent; `execute` afterwards is a `Disposed`
//!    error.
//!
//! [`track`]: CommandController::track

use std::fmt;
use std::sync::{Arc, Mutex, Weak};

use ahash::{AHashMap, AHashSet};
use tracing::{debug, trace};

use uibind_core::dispatch::{Dispatcher, run_or_post};
use uibind_core::error::{BindError, BindResult};
use uibind_core::observer::{Observer, ObserverSet, SubscriptionToken};

use crate::lock;
use crate::notifier::{ChangeNotifier, PropertyChanged};

/// The record delivered per command state-changed notification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommandStateChanged;

/// A delegate-style subscriber on the conventional state-changed event.
pub type StateChangedHandler = Arc<dyn Fn() + Send + Sync>;

struct TrackedSource {
    token: SubscriptionToken,
    /// `None` is the sentinel for "all properties".
    names: Option<AHashSet<String>>,
}

struct CommandState {
    disposed: bool,
    dispatcher: Option<Arc<dyn Dispatcher>>,
    handlers: Vec<StateChangedHandler>,
    observers: ObserverSet<CommandStateChanged>,
    tracked: AHashMap<usize, TrackedSource>,
}

struct CommandShared<P: 'static> {
    action: Box<dyn Fn(&P) + Send + Sync>,
    guard: Option<Box<dyn Fn(&P) -> bool + Send + Sync>>,
    state: Mutex<CommandState>,
}

impl<P> CommandShared<P> {
    fn raise(self: &Arc<Self>) {
        let dispatcher = {
            let state = lock(&self.state);
            if state.disposed {
                return;
            }
            state.dispatcher.clone()
        };
        let shared = Arc::clone(self);
        run_or_post(dispatcher.as_ref(), move || shared.deliver());
    }

    fn deliver(self: &Arc<Self>) {
        let (handlers, observers) = {
            let state = lock(&self.state);
            if state.disposed {
                return;
            }
            (state.handlers.clone(), state.observers.snapshot())
        };
        trace!("command state changed");
        let event = CommandStateChanged;
        for handler in &handlers {
            handler();
        }
        for observer in &observers {
            observer.on_next(&event);
        }
    }

    /// Property-changed entry point from a tracked source.
    fn on_source_changed(self: &Arc<Self>, source_key: usize, event: &PropertyChanged) {
        let matched = {
            let state = lock(&self.state);
            if state.disposed || event.name().is_empty() {
                false
            } else {
                match state.tracked.get(&source_key) {
                    None => false,
                    Some(source) => match &source.names {
                        None => true,
                        Some(names) => names.contains(event.name()),
                    },
                }
            }
        };
        if matched {
            self.raise();
        }
    }
}

struct TrackingObserver<P: 'static> {
    shared: Weak<CommandShared<P>>,
    source_key: usize,
}

impl<P> Observer<PropertyChanged> for TrackingObserver<P> {
    fn on_next(&self, event: &PropertyChanged) {
        if let Some(shared) = Weak::upgrade(&self.shared) {
            shared.on_source_changed(self.source_key, event);
        }
    }
}

/// The bindable/observable-command role: an action plus optional guard whose
/// "state may have changed" signal is raised on demand or from tracked
/// sources.
pub struct CommandController<P: 'static> {
    shared: Arc<CommandShared<P>>,
}

impl<P> CommandController<P> {
    /// Create a command that is always executable.
    pub fn new(action: impl Fn(&P) + Send + Sync + 'static) -> Self {
        Self::build(Box::new(action), None)
    }

    /// Create a command gated by `guard`.
    pub fn with_guard(
        action: impl Fn(&P) + Send + Sync + 'static,
        guard: impl Fn(&P) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self::build(Box::new(action), Some(Box::new(guard)))
    }

    fn build(
        action: Box<dyn Fn(&P) + Send + Sync>,
        guard: Option<Box<dyn Fn(&P) -> bool + Send + Sync>>,
    ) -> Self {
        Self {
            shared: Arc::new(CommandShared {
                action,
                guard,
                state: Mutex::new(CommandState {
                    disposed: false,
                    dispatcher: None,
                    handlers: Vec::new(),
                    observers: ObserverSet::new(),
                    tracked: AHashMap::new(),
                }),
            }),
        }
    }

    /// Whether the command may execute for `parameter`.
    ///
    /// Evaluates the guard on every call; an absent guard means always true.
    #[must_use]
    pub fn can_execute(&self, parameter: &P) -> bool {
        match &self.shared.guard {
            Some(guard) => guard(parameter),
            None => true,
        }
    }

    /// Invoke the action. Errors with [`BindError::Disposed`] after
    /// disposal.
    pub fn execute(&self, parameter: &P) -> BindResult<()> {
        if lock(&self.shared.state).disposed {
            return Err(BindError::Disposed);
        }
        (self.shared.action)(parameter);
        Ok(())
    }

    /// Register `source` as a change source for state re-querying.
    ///
    /// `None` tracks every property; `Some(names)` tracks exactly those
    /// names. Re-tracking a source replaces its filter. An explicit empty
    /// name list removes the association entirely.
    pub fn track(&self, source: &ChangeNotifier, properties: Option<&[&str]>) {
        if matches!(properties, Some([])) {
            self.untrack(source);
            return;
        }
        let source_key = source.instance_key();
        let names = properties.map(|names| {
            names
                .iter()
                .map(|name| (*name).to_owned())
                .collect::<AHashSet<_>>()
        });
        let observer: Arc<dyn Observer<PropertyChanged>> = Arc::new(TrackingObserver {
            shared: Arc::downgrade(&self.shared),
            source_key,
        });
        let token = source.subscribe(observer);
        let replaced = {
            let mut state = lock(&self.shared.state);
            if state.disposed {
                drop(state);
                // The fresh token drops here, revoking the subscription.
                return;
            }
            state.tracked.insert(source_key, TrackedSource { token, names })
        };
        // A replaced registration revokes outside the lock.
        drop(replaced);
    }

    /// Remove the association with `source`; no-op when untracked.
    pub fn untrack(&self, source: &ChangeNotifier) {
        let removed = lock(&self.shared.state)
            .tracked
            .remove(&source.instance_key());
        drop(removed);
    }

    /// Raise the command's own state-changed signal.
    ///
    /// Routed through the captured dispatcher like every notification, then
    /// delivered to delegate handlers and subscribed observers.
    pub fn raise_state_changed(&self) {
        self.shared.raise();
    }

    /// Register a delegate-style handler on the conventional state-changed
    /// event. Handlers stay registered until `dispose()` clears them.
    pub fn on_state_changed(&self, handler: impl Fn() + Send + Sync + 'static) {
        let mut state = lock(&self.shared.state);
        if state.disposed {
            return;
        }
        state.handlers.push(Arc::new(handler));
        debug!(handlers = state.handlers.len(), "state-changed handler registered");
    }

    /// Register a push-style observer for state-changed notifications.
    pub fn subscribe(&self, observer: Arc<dyn Observer<CommandStateChanged>>) -> SubscriptionToken {
        let key = {
            let mut state = lock(&self.shared.state);
            if state.disposed {
                return SubscriptionToken::inert();
            }
            let key = state.observers.insert(observer);
            debug!(observers = state.observers.len(), "observer subscribed");
            key
        };
        let weak = Arc::downgrade(&self.shared);
        SubscriptionToken::new(move || {
            if let Some(shared) = Weak::upgrade(&weak) {
                lock(&shared.state).observers.remove(key);
            }
        })
    }

    /// Install or clear the captured dispatcher.
    pub fn set_dispatcher(&self, dispatcher: Option<Arc<dyn Dispatcher>>) {
        let mut state = lock(&self.shared.state);
        if state.disposed {
            return;
        }
        state.dispatcher = dispatcher;
    }

    /// Whether `dispose()` has run.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        lock(&self.shared.state).disposed
    }

    /// Detach from every tracked source, complete every observer, and leave
    /// the controller inert. Idempotent and infallible.
    pub fn dispose(&self) {
        let (tracked, observers) = {
            let mut state = lock(&self.shared.state);
            if state.disposed {
                return;
            }
            state.disposed = true;
            state.handlers.clear();
            (
                std::mem::take(&mut state.tracked),
                state.observers.drain(),
            )
        };
        // Token drops revoke the source subscriptions outside the lock.
        drop(tracked);
        for observer in &observers {
            observer.on_completed();
        }
    }
}

impl<P> fmt::Debug for CommandController<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = lock(&self.shared.state);
        f.debug_struct("CommandController")
            .field("guarded", &self.shared.guard.is_some())
            .field("disposed", &state.disposed)
            .field("tracked", &state.tracked.len())
            .field("observers", &state.observers.len())
            .finish()
    }
}
