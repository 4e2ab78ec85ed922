#![forbid(unsafe_code)]

//! Error taxonomy shared by every uibind component.
//!
//! Argument and state errors are raised synchronously to the immediate
//! caller and are never retried or swallowed. `dispose()` on any component
//! never fails, so resource cleanup always completes.

use std::fmt;

use thiserror::Error;

/// A boxed error produced by a user-supplied broker handler.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Convenience alias used across the crate.
pub type BindResult<T> = Result<T, BindError>;

/// Which half of an accessor pair an operation required.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessorSide {
    /// The read accessor.
    Get,
    /// The write accessor.
    Set,
}

impl fmt::Display for AccessorSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Get => f.write_str("get"),
            Self::Set => f.write_str("set"),
        }
    }
}

/// Errors raised by notifiers, commands, the accessor cache, and the broker.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BindError {
    /// A required name or reference parameter was absent or empty.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// No property with the given name exists anywhere in the target type's
    /// declared chain.
    #[error("property `{property}` not found on `{type_name}`")]
    MemberNotFound {
        /// The target type the lookup ran against.
        type_name: &'static str,
        /// The property name that failed to resolve.
        property: String,
    },

    /// The property exists but lacks the accessor half required by the
    /// operation, or the registered value type does not match the requested
    /// one.
    #[error("property `{property}` on `{type_name}` has no usable {side} accessor")]
    AccessorUnavailable {
        /// The target type the accessor pair was resolved for.
        type_name: &'static str,
        /// The property the pair was resolved for.
        property: String,
        /// The half that was missing or mismatched.
        side: AccessorSide,
    },

    /// The component was disposed before the call.
    #[error("component has been disposed")]
    Disposed,

    /// One or more subscriber handlers failed during a single publish.
    ///
    /// Every handler still runs; the failures are collected and reported
    /// together after delivery completes.
    #[error("{} handler(s) failed during publish to `{channel}`", .errors.len())]
    PublishFailed {
        /// The channel the publish targeted.
        channel: String,
        /// The collected handler failures, in delivery order.
        errors: Vec<HandlerError>,
    },
}
