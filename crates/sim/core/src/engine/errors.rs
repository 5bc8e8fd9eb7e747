//! Error types for the tick pipeline.

use serde::Serialize;

use crate::canonical::EncodeError;
use crate::error::{ErrorSeverity, SimError};
use crate::event::Cause;
use crate::rng::RngError;
use crate::state::{EntityId, TickIndex};
use crate::validation::DeterminismViolation;

/// Identifies which stage of the tick pipeline produced an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TickPhase {
    ValidateCommands,
    Propose,
    ValidateEvents,
    Apply,
    Hash,
}

impl TickPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            TickPhase::ValidateCommands => "validate_commands",
            TickPhase::Propose => "propose",
            TickPhase::ValidateEvents => "validate_events",
            TickPhase::Apply => "apply",
            TickPhase::Hash => "hash",
        }
    }
}

/// Failure raised by a system during the propose phase.
#[derive(Debug, thiserror::Error)]
pub enum SystemError {
    #[error(transparent)]
    Rng(#[from] RngError),

    #[error("{0}")]
    Rule(String),
}

impl SystemError {
    pub fn rule(message: impl Into<String>) -> Self {
        Self::Rule(message.into())
    }
}

/// Invariant violation raised by a reducer. Fails the whole tick.
#[derive(Debug, thiserror::Error)]
pub enum ReducerError {
    #[error("entity {0} not found")]
    MissingEntity(EntityId),

    #[error("malformed payload: {0}")]
    InvalidPayload(String),

    #[error("{0}")]
    Invariant(String),
}

impl ReducerError {
    pub fn invalid_payload(reason: impl Into<String>) -> Self {
        Self::InvalidPayload(reason.into())
    }

    pub fn invariant(reason: impl Into<String>) -> Self {
        Self::Invariant(reason.into())
    }
}

/// A command or proposed event dropped by phase-local validation.
///
/// Routine rule feedback: the tick proceeds without the item and the
/// rejection is returned alongside the tick outcome.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Rejection {
    #[error("command {command_id} rejected: {reason}")]
    #[serde(rename_all = "camelCase")]
    Command { command_id: String, reason: String },

    #[error("event {event_type} rejected: {reason}")]
    #[serde(rename_all = "camelCase")]
    Event {
        event_type: String,
        proposed_by: Cause,
        reason: String,
    },
}

impl SimError for Rejection {
    fn severity(&self) -> ErrorSeverity {
        ErrorSeverity::Validation
    }

    fn error_code(&self) -> &'static str {
        match self {
            Self::Command { .. } => "command_rejected",
            Self::Event { .. } => "event_rejected",
        }
    }
}

/// Errors that abort a tick. The input envelope is never modified.
#[derive(Debug, thiserror::Error)]
pub enum KernelError {
    #[error("input state hash mismatch at tick {tick_index}: envelope says {expected}, state hashes to {actual}")]
    StateHashMismatch {
        tick_index: TickIndex,
        expected: String,
        actual: String,
    },

    #[error("tick index {tick_index} has no successor")]
    TickIndexOverflow { tick_index: TickIndex },

    #[error("persisted RNG stream {stream_id} is corrupt: {source}")]
    CorruptRngStream {
        stream_id: String,
        #[source]
        source: RngError,
    },

    #[error("system {system_id} failed: {source}")]
    SystemFailed {
        system_id: String,
        #[source]
        source: SystemError,
    },

    #[error("tick proposed {proposed} events, limit is {limit}")]
    MaxEventsExceeded { limit: usize, proposed: usize },

    #[error("reducer for {event_type} failed at ordinal {ordinal}: {source}")]
    ReducerFailed {
        event_type: String,
        ordinal: u32,
        #[source]
        source: ReducerError,
    },

    #[error("{} failed: {source}", .phase.as_str())]
    Determinism {
        phase: TickPhase,
        #[source]
        source: DeterminismViolation,
    },

    #[error("system id {0} registered twice")]
    DuplicateSystem(String),

    #[error("reducer for {0} registered twice")]
    DuplicateReducer(String),

    #[error(transparent)]
    Encode(#[from] EncodeError),
}

impl SimError for KernelError {
    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::StateHashMismatch { .. }
            | Self::TickIndexOverflow { .. }
            | Self::CorruptRngStream { .. }
            | Self::Determinism { .. } => ErrorSeverity::Integrity,
            Self::SystemFailed { .. }
            | Self::MaxEventsExceeded { .. }
            | Self::ReducerFailed { .. }
            | Self::DuplicateSystem(_)
            | Self::DuplicateReducer(_)
            | Self::Encode(_) => ErrorSeverity::Internal,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            Self::StateHashMismatch { .. } => "state_hash_mismatch",
            Self::TickIndexOverflow { .. } => "tick_index_overflow",
            Self::CorruptRngStream { .. } => "invalid_rng_state",
            Self::SystemFailed { .. } => "system_failed",
            Self::MaxEventsExceeded { .. } => "max_events_exceeded",
            Self::ReducerFailed { .. } => "reducer_failed",
            Self::Determinism { .. } => "determinism_violation",
            Self::DuplicateSystem(_) => "duplicate_system",
            Self::DuplicateReducer(_) => "duplicate_reducer",
            Self::Encode(_) => "encode",
        }
    }
}
