//! Unified error types surfaced by the runtime API.
//!
//! Wraps kernel, chain and worker-coordination failures so hosts can bubble
//! them up with consistent context.
use thiserror::Error;
use tokio::sync::oneshot;

use sim_core::{ChainError, EncodeError, ErrorSeverity, KernelError, SimError, TickIndex};

pub type Result<T> = std::result::Result<T, RuntimeError>;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Kernel(#[from] KernelError),

    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error("world {0} is already hosted")]
    WorldExists(String),

    #[error("world {0} is not hosted")]
    UnknownWorld(String),

    #[error("kernel version mismatch: running {expected}, envelope built by {actual}")]
    KernelVersionMismatch { expected: String, actual: String },

    #[error("world rules digest mismatch: expected {expected}, running {actual}")]
    RulesDigestMismatch { expected: String, actual: String },

    #[error("replay input covers {inputs} ticks but the log has {records} records")]
    LogLengthMismatch { inputs: usize, records: usize },

    #[error("state diverged at tick {tick_index}: expected {expected}, replay produced {actual}")]
    StateDivergence {
        tick_index: TickIndex,
        expected: String,
        actual: String,
    },

    #[error("world worker command channel closed")]
    CommandChannelClosed,

    #[error("world worker reply channel closed")]
    ReplyChannelClosed(#[source] oneshot::error::RecvError),

    #[error("world worker join failed")]
    WorkerJoin(#[source] tokio::task::JoinError),
}

impl SimError for RuntimeError {
    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Kernel(e) => e.severity(),
            Self::Chain(e) => e.severity(),
            Self::Encode(e) => e.severity(),
            Self::WorldExists(_) | Self::UnknownWorld(_) => ErrorSeverity::Validation,
            Self::KernelVersionMismatch { .. }
            | Self::RulesDigestMismatch { .. }
            | Self::LogLengthMismatch { .. }
            | Self::StateDivergence { .. } => ErrorSeverity::Integrity,
            Self::CommandChannelClosed | Self::ReplyChannelClosed(_) | Self::WorkerJoin(_) => {
                ErrorSeverity::Internal
            }
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            Self::Kernel(e) => e.error_code(),
            Self::Chain(e) => e.error_code(),
            Self::Encode(e) => e.error_code(),
            Self::WorldExists(_) => "world_exists",
            Self::UnknownWorld(_) => "unknown_world",
            Self::KernelVersionMismatch { .. } => "kernel_version_mismatch",
            Self::RulesDigestMismatch { .. } => "rules_digest_mismatch",
            Self::LogLengthMismatch { .. } => "log_length_mismatch",
            Self::StateDivergence { .. } => "state_divergence",
            Self::CommandChannelClosed => "command_channel_closed",
            Self::ReplyChannelClosed(_) => "reply_channel_closed",
            Self::WorkerJoin(_) => "worker_join",
        }
    }
}
