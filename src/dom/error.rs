//! Error type for programmer-error-class failures.
//!
//! Failed lookups are never errors: every query returns `Option` or an
//! empty sequence. `DomError` is reserved for conditions that indicate a
//! caller bug or an internally inconsistent value.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomError {
    /// An accessibility value outside the known enumeration.
    #[error("unsupported accessibility value: {0:#x}")]
    UnsupportedAccessibility(u32),

    /// A required argument was missing or malformed.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// Extension binding was requested for a method without a receiver parameter.
    #[error("method '{0}' has no receiver parameter and cannot be bound as an extension")]
    NotAnExtensionMethod(String),

    /// The registry has no scope with this identity.
    #[error("unknown scope: {0}")]
    UnknownScope(String),
}

pub type Result<T> = std::result::Result<T, DomError>;
