//! Deterministic, event-sourced tick kernel.
//!
//! `sim-core` executes one discrete tick at a time over an authoritative
//! [`WorldState`] so that independent replicas fed the same input produce
//! byte-identical state, events and hash-chain heads. All state mutation
//! flows through [`engine::Kernel`]: commands are validated, systems propose
//! events, events are validated, reducers apply them, and the result is
//! hashed and appended to the world's chain.
//!
//! Leaf modules ([`canonical`], [`hash`], [`rng`], [`validation`], [`chain`])
//! are usable on their own by verifiers that never run a tick.
pub mod canonical;
pub mod chain;
pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod hash;
pub mod rng;
pub mod state;
pub mod validation;

pub use canonical::{EncodeError, canonical_json, encode};
pub use chain::{
    ChainError, HashChain, TickRecord, compute_batch_hash, compute_genesis_hash,
    compute_next_head, first_divergence, verify, verify_record_links,
};
pub use config::{KERNEL_VERSION, KernelConfig};
pub use engine::{
    CommandValidator, EventValidator, FnSystem, Kernel, KernelBuilder, KernelError, Reducer, ReducerError,
    ReducerRegistry, Rejection, System, SystemContext, SystemError, SystemRegistry, TickOutcome,
    TickPhase, system_fn,
};
pub use error::{ErrorSeverity, SimError};
pub use event::{
    Attribution, COMMAND_APPLIED, Cause, EventIdFields, PlayerCommand, ProposedEvent, SimEvent,
};
pub use hash::{
    compute_event_id, compute_state_hash, compute_world_rules_digest, sha256_hex,
};
pub use rng::{DeterministicRng, RNG_ALGORITHM, RngError, RngState};
pub use state::{EntityId, EntityRecord, PackDescriptor, TickIndex, WorldEnvelope, WorldState};
pub use validation::{DeterminismViolation, validate};
