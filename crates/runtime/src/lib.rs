//! Host runtime for the deterministic tick kernel.
//!
//! This crate wraps [`sim_core::Kernel`] with the pieces a long-running
//! process needs: per-world ownership with an append-only tick log, replay
//! verification, and an async host that advances many worlds concurrently
//! while serializing ticks within each one.
//!
//! Modules are organized by responsibility:
//! - [`world`] owns one world's envelope and log
//! - [`log`] keeps the append-only record of committed ticks
//! - [`replay`] verifies recorded logs, with or without re-execution
//! - [`host`] runs worlds on tokio tasks behind cloneable handles
//! - [`config`] and [`logging`] provide ambient setup
pub mod config;
pub mod error;
pub mod host;
pub mod log;
pub mod logging;
pub mod replay;
pub mod world;

pub use config::RuntimeConfig;
pub use error::{Result, RuntimeError};
pub use host::{TickEvent, WorldHandle, WorldHost};
pub use log::TickLog;
pub use logging::setup_logging;
pub use replay::{ReplaySummary, ReplayVerifier, verify_event_log};
pub use world::World;
