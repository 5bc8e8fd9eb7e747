//! A single hosted world: envelope, rule set and tick log.

use std::sync::Arc;

use tracing::{info, warn};

use sim_core::{
    HashChain, KERNEL_VERSION, Kernel, PlayerCommand, SimError, TickIndex, TickOutcome, TickRecord,
    WorldEnvelope,
};

use crate::error::{Result, RuntimeError};
use crate::log::TickLog;

/// Owns one world's authoritative envelope and advances it in place.
///
/// Ticks are serialized by `&mut self`; independent worlds share nothing but
/// the immutable [`Kernel`].
pub struct World {
    envelope: WorldEnvelope,
    kernel: Arc<Kernel>,
    log: TickLog,
}

impl World {
    /// Hosts `envelope`, continuing its chain from the current head.
    ///
    /// Fails if the envelope was built by another kernel version or its
    /// stored rules digest does not match its packs.
    pub fn new(envelope: WorldEnvelope, kernel: Arc<Kernel>) -> Result<Self> {
        check_running_rules(&envelope)?;
        let start = HashChain::resume(envelope.chain_head.clone(), envelope.tick_index());
        Ok(Self {
            envelope,
            kernel,
            log: TickLog::new(start),
        })
    }

    pub fn world_id(&self) -> &str {
        &self.envelope.world_id
    }

    /// Index of the next tick.
    pub fn tick_index(&self) -> TickIndex {
        self.envelope.tick_index()
    }

    pub fn rules_digest(&self) -> &str {
        &self.envelope.world_rules_digest
    }

    /// Runs one tick. On error the world is left exactly as it was.
    pub fn tick(&mut self, commands: &[PlayerCommand]) -> Result<TickOutcome> {
        let outcome = match self.kernel.step(&self.envelope, commands) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(
                    target: "sim::world",
                    world = %self.envelope.world_id,
                    tick = self.envelope.tick_index(),
                    code = e.error_code(),
                    severity = e.severity().as_str(),
                    "tick failed: {e}"
                );
                return Err(e.into());
            }
        };

        self.log
            .append(outcome.record.clone(), outcome.events.clone())?;
        self.envelope = outcome.envelope.clone();

        info!(
            target: "sim::world",
            world = %self.envelope.world_id,
            tick = outcome.tick_index(),
            events = outcome.events.len(),
            rejections = outcome.rejections.len(),
            chain_head = %outcome.chain_head(),
            "tick committed"
        );
        Ok(outcome)
    }

    /// Current envelope (read-only).
    pub fn snapshot(&self) -> &WorldEnvelope {
        &self.envelope
    }

    pub fn records(&self) -> &[TickRecord] {
        self.log.records()
    }

    pub fn log(&self) -> &TickLog {
        &self.log
    }
}

/// Checks that `envelope` belongs to the running kernel: same kernel version,
/// and a stored rules digest that matches its packs.
pub(crate) fn check_running_rules(envelope: &WorldEnvelope) -> Result<()> {
    if envelope.kernel_version != KERNEL_VERSION {
        return Err(RuntimeError::KernelVersionMismatch {
            expected: KERNEL_VERSION.to_string(),
            actual: envelope.kernel_version.clone(),
        });
    }

    let running = envelope.running_rules_digest()?;
    if running != envelope.world_rules_digest {
        return Err(RuntimeError::RulesDigestMismatch {
            expected: running,
            actual: envelope.world_rules_digest.clone(),
        });
    }
    Ok(())
}
