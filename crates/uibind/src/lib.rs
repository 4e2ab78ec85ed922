#![forbid(unsafe_code)]

//! Property-change notification and command binding for UI-facing data
//! objects.
//!
//! Three primitives, sharing one dispatch discipline:
//!
//! - [`ChangeNotifier`]: mark stored values or forwarded properties as
//!   observable; a change notification fires exactly when a write actually
//!   changes the value.
//! - [`CommandController`]: an action plus optional guard whose "can
//!   execute" state is re-queried automatically when tracked source
//!   properties change.
//! - [`EventBroker`]: a typed, channel-keyed publish/subscribe registry for
//!   ad-hoc cross-component signaling.
//!
//! A notification is delivered inline on the raising thread, or posted to a
//! captured [`Dispatcher`] (a UI loop, say) when the raiser is not already
//! on its context. Consumers subscribe through a delegate-style event or
//! through push-style observers with disposable [`SubscriptionToken`]s.
//!
//! # Example
//!
//! ```
//! use uibind::ChangeNotifier;
//!
//! struct Counter {
//!     notifier: ChangeNotifier,
//!     value: i32,
//! }
//!
//! impl Counter {
//!     fn set(&mut self, value: i32) {
//!         self.notifier
//!             .set_value(&mut self.value, value, "value")
//!             .expect("non-empty property name");
//!     }
//! }
//!
//! let mut counter = Counter {
//!     notifier: ChangeNotifier::new(),
//!     value: 0,
//! };
//! counter.notifier.on_changed(|event| {
//!     assert_eq!(event.name(), "value");
//! });
//! counter.set(1); // raises exactly one notification
//! counter.set(1); // no-op: the value did not change
//! ```

pub mod broker;
pub mod command;
pub mod notifier;

pub use broker::{BrokerHandler, EventBroker};
pub use command::{CommandController, CommandStateChanged, StateChangedHandler};
pub use notifier::{ChangeNotifier, ChangedHandler, PropertyChanged};

pub use uibind_core::accessor::{AccessorPair, Bindable, PropertyRegistry, accessors_of};
pub use uibind_core::dispatch::{Dispatcher, PostedCallback, QueueDispatcher, run_or_post};
pub use uibind_core::error::{AccessorSide, BindError, BindResult, HandlerError};
pub use uibind_core::observer::{Observer, ObserverSet, SubscriptionToken};

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a mutex, recovering the guard if a panicking holder poisoned it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
