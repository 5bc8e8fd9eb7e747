//! Common error infrastructure for sim-core.
//!
//! Every error enum in the crate implements [`SimError`] so hosts can tell
//! routine rule feedback apart from integrity failures without matching on
//! individual variants.
//!
//! # Propagation
//!
//! - **Validation** failures are recovered inside a tick: the offending
//!   command or event is dropped and reported as a
//!   [`Rejection`](crate::engine::Rejection).
//! - **Integrity** failures (hash chain, state hash, RNG state, determinism
//!   invariant) are never recovered locally; continuing would produce an
//!   unauditable trajectory.

/// Severity level of an error, used for categorization and recovery strategies.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorSeverity {
    /// Invalid caller input; recoverable by supplying corrected input.
    ///
    /// Examples: `next_int(0)`, a command from an unknown actor.
    Validation,

    /// Authoritative data failed an integrity check.
    ///
    /// Examples: chain head mismatch, malformed persisted RNG state, a float
    /// in world state. Everything downstream of the failure is untrusted.
    Integrity,

    /// Rule-pack code or kernel wiring misbehaved.
    ///
    /// Examples: a reducer returned an error, duplicate system ids.
    Internal,
}

impl ErrorSeverity {
    /// Returns a human-readable description of this severity level.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Integrity => "integrity",
            Self::Internal => "internal",
        }
    }

    /// Returns true if the failed operation can be retried with corrected input.
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::Validation)
    }
}

/// Common trait for all sim-core errors.
pub trait SimError: core::fmt::Display + core::fmt::Debug {
    /// Returns the severity level of this error.
    fn severity(&self) -> ErrorSeverity;

    /// Returns a static identifier for this error variant, stable across
    /// releases and suitable for metrics or test assertions.
    fn error_code(&self) -> &'static str;
}
