#![forbid(unsafe_code)]

//! Core primitives for the uibind notification engine: the error taxonomy,
//! the dispatcher capability, observer/subscription machinery, and the
//! reflection-free property accessor cache.
//!
//! The public surface (`ChangeNotifier`, `CommandController`, `EventBroker`)
//! lives in the `uibind` crate and is built on these leaves.

pub mod accessor;
pub mod dispatch;
pub mod error;
pub mod observer;

pub use accessor::{AccessorPair, Bindable, PropertyRegistry, accessors_of};
pub use dispatch::{Dispatcher, PostedCallback, QueueDispatcher, run_or_post};
pub use error::{AccessorSide, BindError, BindResult, HandlerError};
pub use observer::{Observer, ObserverSet, SubscriptionToken};

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a mutex, recovering the guard if a panicking holder poisoned it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
