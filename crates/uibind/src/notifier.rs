#![forbid(unsafe_code)]

//! Change notification for stored values and forwarded properties.
//!
//! A [`ChangeNotifier`] is embedded in a data object; the object defines its
//! properties in terms of [`get_value`]/[`set_value`] and the forwarded
//! variants. A write raises a notification exactly when the new value
//! differs from the prior value, through two channels: the conventional
//! delegate channel ([`on_changed`]) and push-style observers
//! ([`subscribe`]).
//!
//! # Invariants
//!
//! 1. A physically unchanged value never schedules a notification (the
//!    value-equality short-circuit).
//! 2. Per changed write: delegate handlers first (registration order), then
//!    observers, then the optional side-effect callback.
//! 3. Delivery happens over a snapshot taken under the instance lock and is
//!    invoked outside it, so a handler may re-enter subscribe/unsubscribe.
//! 4. After `dispose()` the notifier is inert: writes and raises do nothing
//!    and never error; repeated disposal is accepted.
//!
//! [`get_value`]: ChangeNotifier::get_value
//! [`set_value`]: ChangeNotifier::set_value
//! [`on_changed`]: ChangeNotifier::on_changed
//! [`subscribe`]: ChangeNotifier::subscribe

use std::fmt;
use std::sync::{Arc, Mutex, Weak};

use tracing::{debug, trace};

use uibind_core::accessor::{Bindable, accessors_of};
use uibind_core::dispatch::{Dispatcher, run_or_post};
use uibind_core::error::{BindError, BindResult};
use uibind_core::observer::{Observer, ObserverSet, SubscriptionToken};

use crate::lock;

/// The change record delivered per raised notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyChanged {
    name: Arc<str>,
}

impl PropertyChanged {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            name: Arc::from(name),
        }
    }

    /// The name of the property that changed.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// A delegate-style subscriber on the conventional change event.
pub type ChangedHandler = Arc<dyn Fn(&PropertyChanged) + Send + Sync>;

struct State {
    disposed: bool,
    dispatcher: Option<Arc<dyn Dispatcher>>,
    handlers: Vec<ChangedHandler>,
    observers: ObserverSet<PropertyChanged>,
}

struct Shared {
    state: Mutex<State>,
}

impl Shared {
    fn deliver(self: &Arc<Self>, event: &PropertyChanged) {
        let (handlers, observers) = {
            let state = lock(&self.state);
            if state.disposed {
                return;
            }
            (state.handlers.clone(), state.observers.snapshot())
        };
        trace!(property = event.name(), "property changed");
        for handler in &handlers {
            handler(event);
        }
        for observer in &observers {
            observer.on_next(event);
        }
    }
}

/// The bindable/observable-object role: owns subscriber lists and raises
/// change notifications through the shared dispatch discipline.
pub struct ChangeNotifier {
    shared: Arc<Shared>,
}

impl ChangeNotifier {
    /// Create a notifier with no captured dispatcher (all delivery inline).
    #[must_use]
    pub fn new() -> Self {
        Self::with_dispatcher(None)
    }

    /// Create a notifier that defers delivery to `dispatcher` whenever the
    /// raising thread is not already on its context.
    #[must_use]
    pub fn with_dispatcher(dispatcher: Option<Arc<dyn Dispatcher>>) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    disposed: false,
                    dispatcher,
                    handlers: Vec::new(),
                    observers: ObserverSet::new(),
                }),
            }),
        }
    }

    /// Identity of this notifier instance, for reference-keyed maps.
    pub(crate) fn instance_key(&self) -> usize {
        Arc::as_ptr(&self.shared) as usize
    }

    /// Read a stored value. Pure; safe in any state.
    #[must_use]
    pub fn get_value<V: Clone>(&self, storage: &V) -> V {
        storage.clone()
    }

    /// Read a forwarded property from `target`, or `default` when the target
    /// is absent (no accessor resolution happens for an absent target).
    pub fn get_forwarded<T: Bindable, V: 'static>(
        &self,
        target: Option<&T>,
        property: &str,
        default: V,
    ) -> BindResult<V> {
        if property.is_empty() {
            return Err(BindError::InvalidArgument("property name must be non-empty"));
        }
        let Some(target) = target else {
            return Ok(default);
        };
        accessors_of::<T>(property)?.get_as(target)
    }

    /// Write a stored value, raising a notification for `property` when the
    /// value actually changes.
    pub fn set_value<V: PartialEq>(
        &self,
        storage: &mut V,
        value: V,
        property: &str,
    ) -> BindResult<()> {
        self.set_value_with(storage, value, property, || {})
    }

    /// As [`set_value`], running `on_changed` after the notification when
    /// the value changed. Observers see the new state before the callback.
    ///
    /// [`set_value`]: ChangeNotifier::set_value
    pub fn set_value_with<V: PartialEq>(
        &self,
        storage: &mut V,
        value: V,
        property: &str,
        on_changed: impl FnOnce(),
    ) -> BindResult<()> {
        if property.is_empty() {
            return Err(BindError::InvalidArgument("property name must be non-empty"));
        }
        if self.is_disposed() {
            return Ok(());
        }
        if *storage == value {
            return Ok(());
        }
        *storage = value;
        self.raise(property);
        on_changed();
        Ok(())
    }

    /// Write a forwarded property on `target`, raising a notification for
    /// `outer_property` when the value actually changes.
    ///
    /// An absent target makes the call a complete no-op. A resolved pair
    /// missing the read or write half raises
    /// [`BindError::AccessorUnavailable`].
    pub fn set_forwarded<T: Bindable, V: PartialEq + 'static>(
        &self,
        target: Option<&mut T>,
        property: &str,
        value: V,
        outer_property: &str,
    ) -> BindResult<()> {
        self.set_forwarded_with(target, property, value, outer_property, || {})
    }

    /// As [`set_forwarded`], running `on_changed` after the notification.
    ///
    /// [`set_forwarded`]: ChangeNotifier::set_forwarded
    pub fn set_forwarded_with<T: Bindable, V: PartialEq + 'static>(
        &self,
        target: Option<&mut T>,
        property: &str,
        value: V,
        outer_property: &str,
        on_changed: impl FnOnce(),
    ) -> BindResult<()> {
        if property.is_empty() || outer_property.is_empty() {
            return Err(BindError::InvalidArgument("property name must be non-empty"));
        }
        if self.is_disposed() {
            return Ok(());
        }
        let Some(target) = target else {
            return Ok(());
        };
        let pair = accessors_of::<T>(property)?;
        let current: V = pair.get_as(target)?;
        if current == value {
            return Ok(());
        }
        pair.set_to(target, value)?;
        self.raise(outer_property);
        on_changed();
        Ok(())
    }

    /// Raise a change notification for `property` directly.
    ///
    /// The raise primitive behind `set_*`; embedding types use it for manual
    /// notification. Errors on an empty name; silently inert once disposed.
    pub fn notify(&self, property: &str) -> BindResult<()> {
        if property.is_empty() {
            return Err(BindError::InvalidArgument("property name must be non-empty"));
        }
        self.raise(property);
        Ok(())
    }

    /// Register a delegate-style handler on the conventional change event.
    ///
    /// Handlers stay registered until `dispose()` clears them.
    pub fn on_changed(&self, handler: impl Fn(&PropertyChanged) + Send + Sync + 'static) {
        let mut state = lock(&self.shared.state);
        if state.disposed {
            return;
        }
        state.handlers.push(Arc::new(handler));
        debug!(handlers = state.handlers.len(), "change handler registered");
    }

    /// Register a push-style observer for every future change notification.
    ///
    /// The returned token revokes exactly this registration; disposing it
    /// twice is safe. Subscribing after disposal yields an inert token.
    pub fn subscribe(&self, observer: Arc<dyn Observer<PropertyChanged>>) -> SubscriptionToken {
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

    /// The currently captured dispatcher, if any.
    #[must_use]
    pub fn dispatcher(&self) -> Option<Arc<dyn Dispatcher>> {
        lock(&self.shared.state).dispatcher.clone()
    }

    /// Whether `dispose()` has run.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        lock(&self.shared.state).disposed
    }

    /// Release every subscription: clears delegate handlers, completes every
    /// observer, and leaves the notifier permanently inert. Idempotent and
    /// infallible.
    pub fn dispose(&self) {
        let observers = {
            let mut state = lock(&self.shared.state);
            if state.disposed {
                return;
            }
            state.disposed = true;
            state.handlers.clear();
            state.observers.drain()
        };
        for observer in &observers {
            observer.on_completed();
        }
    }

    fn raise(&self, property: &str) {
        let dispatcher = {
            let state = lock(&self.shared.state);
            if state.disposed {
                return;
            }
            state.dispatcher.clone()
        };
        let event = PropertyChanged::new(property);
        let shared = Arc::clone(&self.shared);
        run_or_post(dispatcher.as_ref(), move || shared.deliver(&event));
    }
}

impl Default for ChangeNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ChangeNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = lock(&self.shared.state);
        f.debug_struct("ChangeNotifier")
            .field("disposed", &state.disposed)
            .field("handlers", &state.handlers.len())
            .field("observers", &state.observers.len())
            .finish()
    }
}
