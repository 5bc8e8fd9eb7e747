//! Replay verification.
//!
//! Two levels of checking, matching what the verifier is willing to trust:
//!
//! - [`verify_event_log`] trusts nobody's execution but needs the recorded
//!   event batches: it recomputes every batch hash and chain head.
//! - [`ReplayVerifier`] re-executes the recorded command inputs under the
//!   local rule set and compares every produced record with the claimed one,
//!   stopping at the first divergent tick.

use std::sync::Arc;

use tracing::{debug, info, warn};

use sim_core::{
    ChainError, HashChain, Kernel, PlayerCommand, SimEvent, TickIndex, TickRecord, WorldEnvelope,
    verify, verify_record_links,
};

use crate::error::{Result, RuntimeError};
use crate::world::{World, check_running_rules};

/// Checks record linkage and recomputes each record's batch hash from the
/// recorded events. Returns the chain after the last record.
pub fn verify_event_log(
    start: &HashChain,
    records: &[TickRecord],
    batches: &[Vec<SimEvent>],
) -> Result<HashChain> {
    if records.len() != batches.len() {
        return Err(RuntimeError::LogLengthMismatch {
            inputs: batches.len(),
            records: records.len(),
        });
    }

    let end = verify_record_links(start, records)?;
    for (record, events) in records.iter().zip(batches) {
        verify(
            events,
            &record.prev_chain_head,
            &record.chain_head,
            record.tick_index,
        )?;
    }
    Ok(end)
}

/// Summary of a successful replay.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReplaySummary {
    pub ticks: usize,
    pub next_tick: TickIndex,
    pub chain_head: String,
    pub state_hash: String,
}

/// Re-executes a command log and compares it with a claimed record log.
pub struct ReplayVerifier {
    kernel: Arc<Kernel>,
}

impl ReplayVerifier {
    pub fn new(kernel: Arc<Kernel>) -> Self {
        Self { kernel }
    }

    /// Fails unless the starting envelope was built by the running kernel
    /// version, its stored digest matches its packs, and that digest is
    /// `expected_digest`.
    pub fn check_rules(&self, genesis: &WorldEnvelope, expected_digest: &str) -> Result<()> {
        check_running_rules(genesis)?;
        if genesis.world_rules_digest != expected_digest {
            return Err(RuntimeError::RulesDigestMismatch {
                expected: expected_digest.to_string(),
                actual: genesis.world_rules_digest.clone(),
            });
        }
        Ok(())
    }

    /// Replays `inputs[i]` as tick `genesis.tick_index() + i` and compares
    /// the result with `expected[i]`.
    ///
    /// Nothing is executed unless [`check_rules`](Self::check_rules) passes
    /// for `expected_digest`. The claimed log is then checked for internal
    /// linkage. A chain head
    /// mismatch is reported as [`ChainError::HashChainMismatch`] for the
    /// first divergent tick; matching heads with different state hashes as
    /// [`RuntimeError::StateDivergence`].
    pub fn replay(
        &self,
        genesis: &WorldEnvelope,
        expected_digest: &str,
        inputs: &[Vec<PlayerCommand>],
        expected: &[TickRecord],
    ) -> Result<ReplaySummary> {
        self.check_rules(genesis, expected_digest)?;
        if inputs.len() != expected.len() {
            return Err(RuntimeError::LogLengthMismatch {
                inputs: inputs.len(),
                records: expected.len(),
            });
        }

        let start = HashChain::resume(genesis.chain_head.clone(), genesis.tick_index());
        verify_record_links(&start, expected)?;

        let mut world = World::new(genesis.clone(), Arc::clone(&self.kernel))?;
        for (commands, claimed) in inputs.iter().zip(expected) {
            let outcome = world.tick(commands)?;
            let actual = &outcome.record;

            if actual.chain_head != claimed.chain_head {
                warn!(
                    target: "sim::replay",
                    tick = claimed.tick_index,
                    "chain head diverged"
                );
                return Err(ChainError::HashChainMismatch {
                    tick_index: claimed.tick_index,
                    expected: claimed.chain_head.clone(),
                    actual: actual.chain_head.clone(),
                }
                .into());
            }
            if actual.state_hash != claimed.state_hash {
                warn!(
                    target: "sim::replay",
                    tick = claimed.tick_index,
                    "state hash diverged"
                );
                return Err(RuntimeError::StateDivergence {
                    tick_index: claimed.tick_index,
                    expected: claimed.state_hash.clone(),
                    actual: actual.state_hash.clone(),
                });
            }
            debug!(target: "sim::replay", tick = claimed.tick_index, "tick matches");
        }

        let envelope = world.snapshot();
        info!(
            target: "sim::replay",
            world = %envelope.world_id,
            ticks = inputs.len(),
            "replay verified"
        );

        Ok(ReplaySummary {
            ticks: inputs.len(),
            next_tick: envelope.tick_index(),
            chain_head: envelope.chain_head.clone(),
            state_hash: envelope.state_hash.clone(),
        })
    }
}
