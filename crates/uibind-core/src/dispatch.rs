#![forbid(unsafe_code)]

//! Execution-context capability for deferred notification delivery.
//!
//! A notification raised by a notifier or command is either delivered inline
//! on the calling thread or posted to a captured [`Dispatcher`] (typically a
//! UI loop). The core never implements message loops itself; it treats the
//! dispatcher purely as an opaque capability.
//!
//! # Invariants
//!
//! 1. `post` is fire-and-forget: no return value, no completion signal.
//! 2. [`run_or_post`] runs the callback inline when no dispatcher is
//!    captured or the caller is already on the dispatcher's context.
//! 3. Posting never blocks the caller.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::thread::{self, ThreadId};

use tracing::trace;

use crate::lock;

/// A callback scheduled for later execution on a captured context.
pub type PostedCallback = Box<dyn FnOnce() + Send>;

/// An execution context that can run callbacks on some captured logical
/// thread or loop.
pub trait Dispatcher: Send + Sync {
    /// Whether the caller is already executing on this dispatcher's context.
    fn is_current(&self) -> bool;

    /// Schedule `callback` for later execution on the captured context.
    fn post(&self, callback: PostedCallback);
}

/// Deliver `callback` inline or defer it, per the shared dispatch rule.
///
/// Inline when `dispatcher` is `None` or the caller is already on its
/// context; otherwise posted (asynchronous, fire-and-forget).
pub fn run_or_post(dispatcher: Option<&Arc<dyn Dispatcher>>, callback: impl FnOnce() + Send + 'static) {
    match dispatcher {
        Some(dispatcher) if !dispatcher.is_current() => {
            trace!("deferring delivery to captured dispatcher");
            dispatcher.post(Box::new(callback));
        }
        _ => callback(),
    }
}

/// A queue-backed [`Dispatcher`] owned by the thread that created it.
///
/// `post` enqueues; the owning thread drains with [`run_pending`]. Suitable
/// for simple event loops and for deterministic tests of the deferred
/// delivery path.
///
/// [`run_pending`]: QueueDispatcher::run_pending
pub struct QueueDispatcher {
    owner: ThreadId,
    queue: Mutex<VecDeque<PostedCallback>>,
}

impl QueueDispatcher {
    /// Create a dispatcher whose context is the calling thread.
    #[must_use]
    pub fn new() -> Self {
        Self {
            owner: thread::current().id(),
            queue: Mutex::new(VecDeque::new()),
        }
    }

    /// Run every callback posted so far, in posting order.
    ///
    /// Returns the number of callbacks executed. Callbacks posted while
    /// draining are left for the next call.
    pub fn run_pending(&self) -> usize {
        let drained: Vec<PostedCallback> = lock(&self.queue).drain(..).collect();
        let count = drained.len();
        for callback in drained {
            callback();
        }
        count
    }

    /// Number of callbacks waiting to run.
    #[must_use]
    pub fn pending(&self) -> usize {
        lock(&self.queue).len()
    }
}

impl Default for QueueDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher for QueueDispatcher {
    fn is_current(&self) -> bool {
        thread::current().id() == self.owner
    }

    fn post(&self, callback: PostedCallback) {
        lock(&self.queue).push_back(callback);
    }
}

impl fmt::Debug for QueueDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueDispatcher")
            .field("owner", &self.owner)
            .field("pending", &self.pending())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn run_or_post_inline_without_dispatcher() {
        let ran = Arc::new(AtomicUsize::new(0));
        let r = Arc::clone(&ran);
        run_or_post(None, move || {
            r.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn run_or_post_inline_when_current() {
        let dispatcher: Arc<dyn Dispatcher> = Arc::new(QueueDispatcher::new());
        let ran = Arc::new(AtomicUsize::new(0));
        let r = Arc::clone(&ran);
        run_or_post(Some(&dispatcher), move || {
            r.fetch_add(1, Ordering::SeqCst);
        });
        // Same thread as the owner: no deferral.
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn posts_from_other_thread_and_drains_in_order() {
        let dispatcher = Arc::new(QueueDispatcher::new());
        let seen = Arc::new(Mutex::new(Vec::new()));

        let d: Arc<dyn Dispatcher> = Arc::clone(&dispatcher) as Arc<dyn Dispatcher>;
        let s = Arc::clone(&seen);
        thread::spawn(move || {
            assert!(!d.is_current());
            for i in 0..3 {
                let s = Arc::clone(&s);
                run_or_post(Some(&d), move || {
                    lock(&s).push(i);
                });
            }
        })
        .join()
        .expect("poster thread panicked");

        assert_eq!(dispatcher.pending(), 3);
        assert!(lock(&seen).is_empty(), "nothing delivered before draining");
        assert_eq!(dispatcher.run_pending(), 3);
        assert_eq!(*lock(&seen), vec![0, 1, 2]);
        assert_eq!(dispatcher.run_pending(), 0);
    }
}
