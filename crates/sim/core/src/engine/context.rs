//! Execution context handed to systems during the propose phase.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::event::{Attribution, Cause, PlayerCommand, ProposedEvent};
use crate::rng::DeterministicRng;
use crate::state::{EntityRecord, TickIndex, WorldState};

/// Read-only view of the pre-tick state plus the two things a system may do:
/// draw from RNG streams and propose events.
///
/// Every system in a tick sees the same snapshot; proposals from earlier
/// systems are not visible to later ones.
pub struct SystemContext<'a> {
    system_id: &'a str,
    world_id: &'a str,
    world_seed: &'a str,
    state: &'a WorldState,
    commands: &'a [PlayerCommand],
    rng_streams: &'a mut BTreeMap<String, DeterministicRng>,
    proposals: &'a mut Vec<ProposedEvent>,
}

impl<'a> SystemContext<'a> {
    pub(crate) fn new(
        system_id: &'a str,
        world_id: &'a str,
        world_seed: &'a str,
        state: &'a WorldState,
        commands: &'a [PlayerCommand],
        rng_streams: &'a mut BTreeMap<String, DeterministicRng>,
        proposals: &'a mut Vec<ProposedEvent>,
    ) -> Self {
        Self {
            system_id,
            world_id,
            world_seed,
            state,
            commands,
            rng_streams,
            proposals,
        }
    }

    pub fn system_id(&self) -> &str {
        self.system_id
    }

    pub fn world_id(&self) -> &str {
        self.world_id
    }

    /// Index of the tick being executed.
    pub fn tick_index(&self) -> TickIndex {
        self.state.tick_index
    }

    /// Pre-tick state snapshot.
    pub fn state(&self) -> &'a WorldState {
        self.state
    }

    /// Commands that passed validation this tick, in input order.
    pub fn commands(&self) -> &'a [PlayerCommand] {
        self.commands
    }

    pub fn entity(&self, id: &str) -> Option<&'a EntityRecord> {
        self.state.entity(id)
    }

    /// Live entities of one type, sorted by id.
    pub fn entities_by_type(
        &self,
        entity_type: &'a str,
    ) -> impl Iterator<Item = &'a EntityRecord> + use<'a> {
        self.state.entities_by_type(entity_type)
    }

    /// All live entities, sorted by id.
    pub fn entities_sorted(&self) -> impl Iterator<Item = &'a EntityRecord> + use<'a> {
        self.state.entities_sorted()
    }

    /// Returns the named RNG stream, creating it from the world seed on
    /// first use. Its state is persisted into the post-tick world state.
    pub fn rng(&mut self, stream_id: &str) -> &mut DeterministicRng {
        let world_seed = self.world_seed;
        self.rng_streams
            .entry(stream_id.to_string())
            .or_insert_with(|| DeterministicRng::create(world_seed, stream_id))
    }

    /// Proposes an event caused by this system.
    pub fn propose_event(
        &mut self,
        event_type: impl Into<String>,
        payload: Value,
        attribution: Attribution,
    ) {
        let caused_by = Cause::system(self.system_id);
        self.propose(ProposedEvent {
            event_type: event_type.into(),
            payload,
            attribution,
            caused_by,
        });
    }

    /// Proposes an event with an explicit cause (scheduled jobs, world
    /// triggers, ...).
    pub fn propose(&mut self, event: ProposedEvent) {
        self.proposals.push(event);
    }
}
