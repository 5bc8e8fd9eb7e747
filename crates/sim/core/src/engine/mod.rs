//! Tick execution pipeline.
//!
//! The [`Kernel`] is the only component that produces a new authoritative
//! [`WorldState`]. Each call to [`Kernel::step`] runs one tick through a
//! fixed phase order:
//!
//! 1. **validate commands**: illegal commands are dropped and reported
//! 2. **propose**: systems run in priority order over the pre-tick snapshot
//! 3. **validate events**: inconsistent proposals are dropped and reported
//! 4. **apply**: one reducer per event type mutates a working copy
//! 5. **hash**: state hash, batch hash and chain head are computed
//!
//! The input envelope is borrowed immutably and the working copy is only
//! returned on success, so a failing tick leaves no trace.

mod context;
mod errors;
mod registry;

pub use context::SystemContext;
pub use errors::{KernelError, ReducerError, Rejection, SystemError, TickPhase};
pub use registry::{
    CommandValidator, EventValidator, FnSystem, Reducer, ReducerRegistry, System, SystemRegistry,
    system_fn,
};

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde_json::json;
use tracing::{debug, warn};

use crate::chain::{HashChain, TickRecord, compute_batch_hash};
use crate::config::KernelConfig;
use crate::event::{
    Attribution, COMMAND_APPLIED, Cause, EventIdFields, PlayerCommand, ProposedEvent, SimEvent,
};
use crate::hash::{compute_event_id, compute_state_hash};
use crate::rng::DeterministicRng;
use crate::state::{TickIndex, WorldEnvelope, WorldState};
use crate::validation::validate;

/// Complete result of one tick.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TickOutcome {
    /// Post-tick envelope: new state, state hash and chain head.
    pub envelope: WorldEnvelope,
    /// Applied events in ordinal order.
    pub events: Vec<SimEvent>,
    /// Commands and events dropped by validation, in the order encountered.
    pub rejections: Vec<Rejection>,
    /// Log record for this tick.
    pub record: TickRecord,
}

impl TickOutcome {
    pub fn tick_index(&self) -> TickIndex {
        self.record.tick_index
    }

    pub fn state(&self) -> &WorldState {
        &self.envelope.state
    }

    pub fn state_hash(&self) -> &str {
        &self.record.state_hash
    }

    pub fn batch_hash(&self) -> &str {
        &self.record.events_batch_hash
    }

    pub fn chain_head(&self) -> &str {
        &self.record.chain_head
    }

    /// First dropped command or event, for tooling that reports routine rule
    /// feedback separately from failed ticks.
    pub fn first_rejection(&self) -> Option<&Rejection> {
        self.rejections.first()
    }
}

/// Deterministic tick executor with its registered rule set.
pub struct Kernel {
    config: KernelConfig,
    systems: SystemRegistry,
    reducers: ReducerRegistry,
    command_validators: Vec<Arc<dyn CommandValidator>>,
    event_validators: Vec<Arc<dyn EventValidator>>,
}

impl Kernel {
    pub fn builder() -> KernelBuilder {
        KernelBuilder::default()
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    pub fn systems(&self) -> &SystemRegistry {
        &self.systems
    }

    pub fn reducers(&self) -> &ReducerRegistry {
        &self.reducers
    }

    /// Executes exactly one tick.
    ///
    /// Returns the next envelope together with the applied events, the
    /// rejections and the log record. On error `envelope` is untouched and
    /// no partial result is observable.
    pub fn step(
        &self,
        envelope: &WorldEnvelope,
        commands: &[PlayerCommand],
    ) -> Result<TickOutcome, KernelError> {
        let state = &envelope.state;
        let tick_index = state.tick_index;

        if self.config.verify_input_state_hash {
            let actual = compute_state_hash(state)?;
            if actual != envelope.state_hash {
                return Err(KernelError::StateHashMismatch {
                    tick_index,
                    expected: envelope.state_hash.clone(),
                    actual,
                });
            }
        }

        let next_tick = tick_index
            .checked_add(1)
            .ok_or(KernelError::TickIndexOverflow { tick_index })?;
        let mut rng_streams = restore_streams(state)?;
        let mut rejections = Vec::new();

        // Phase 1
        let accepted = self.validate_commands(state, commands, &mut rejections);
        debug!(
            target: "sim::kernel",
            tick = tick_index,
            accepted = accepted.len(),
            rejected = rejections.len(),
            "validated commands"
        );

        // Phase 2
        let proposals = self.propose(envelope, &accepted, &mut rng_streams)?;
        debug!(
            target: "sim::kernel",
            tick = tick_index,
            proposed = proposals.len(),
            "proposal phase complete"
        );

        // Phase 3
        let validated = self.validate_events(state, proposals, &mut rejections);
        let events = assign_ids(&envelope.world_id, tick_index, validated)?;

        // Phase 4
        let mut next = state.clone();
        self.apply(&mut next, &events)?;
        for (stream_id, rng) in &rng_streams {
            next.rng_streams.insert(stream_id.clone(), rng.state());
        }
        next.tick_index = next_tick;

        // Phase 5
        if self.config.validate_state {
            validate(&next, "state").map_err(|source| KernelError::Determinism {
                phase: TickPhase::Hash,
                source,
            })?;
        }
        let state_hash = compute_state_hash(&next)?;
        let batch_hash = compute_batch_hash(&events)?;
        let mut chain = HashChain::resume(envelope.chain_head.clone(), tick_index);
        let chain_head = chain.advance(&batch_hash).to_string();

        debug!(
            target: "sim::kernel",
            tick = tick_index,
            events = events.len(),
            state_hash = %state_hash,
            chain_head = %chain_head,
            "tick applied"
        );

        let record = TickRecord {
            world_id: envelope.world_id.clone(),
            tick_index,
            prev_chain_head: envelope.chain_head.clone(),
            events_batch_hash: batch_hash,
            chain_head: chain_head.clone(),
            state_hash: state_hash.clone(),
        };

        let envelope = WorldEnvelope {
            world_id: envelope.world_id.clone(),
            world_seed: envelope.world_seed.clone(),
            kernel_version: envelope.kernel_version.clone(),
            world_template_pack: envelope.world_template_pack.clone(),
            rules_pack_set: envelope.rules_pack_set.clone(),
            world_rules_digest: envelope.world_rules_digest.clone(),
            state_hash,
            chain_head,
            state: next,
        };

        Ok(TickOutcome {
            envelope,
            events,
            rejections,
            record,
        })
    }

    /// Drops illegal commands. Survivors become `player.command_applied`
    /// proposals in the propose phase.
    fn validate_commands(
        &self,
        state: &WorldState,
        commands: &[PlayerCommand],
        rejections: &mut Vec<Rejection>,
    ) -> Vec<PlayerCommand> {
        let mut seen = BTreeSet::new();
        let mut accepted = Vec::with_capacity(commands.len());

        for command in commands {
            let verdict = if !seen.insert(command.command_id.as_str()) {
                Err("duplicate command id in tick".to_string())
            } else {
                self.check_command(state, command)
            };

            match verdict {
                Ok(()) => accepted.push(command.clone()),
                Err(reason) => {
                    warn!(
                        target: "sim::kernel",
                        tick = state.tick_index,
                        command_id = %command.command_id,
                        %reason,
                        "command rejected"
                    );
                    rejections.push(Rejection::Command {
                        command_id: command.command_id.clone(),
                        reason,
                    });
                }
            }
        }

        accepted
    }

    fn check_command(&self, state: &WorldState, command: &PlayerCommand) -> Result<(), String> {
        if !state.is_live(&command.actor) {
            return Err(format!("unknown actor {}", command.actor));
        }
        validate(&command.payload, "payload").map_err(|e| e.to_string())?;
        for validator in &self.command_validators {
            validator.validate(state, command)?;
        }
        Ok(())
    }

    /// Runs every system over the pre-tick snapshot.
    ///
    /// Command translations come first, then each system's proposals in
    /// system order.
    fn propose(
        &self,
        envelope: &WorldEnvelope,
        commands: &[PlayerCommand],
        rng_streams: &mut BTreeMap<String, DeterministicRng>,
    ) -> Result<Vec<ProposedEvent>, KernelError> {
        let limit = self.config.max_events_per_tick;
        let mut proposals: Vec<ProposedEvent> = commands.iter().map(command_applied).collect();
        check_limit(limit, proposals.len())?;

        for system in self.systems.iter() {
            let mut ctx = SystemContext::new(
                system.id(),
                &envelope.world_id,
                &envelope.world_seed,
                &envelope.state,
                commands,
                rng_streams,
                &mut proposals,
            );
            system
                .run(&mut ctx)
                .map_err(|source| KernelError::SystemFailed {
                    system_id: system.id().to_string(),
                    source,
                })?;
            check_limit(limit, proposals.len())?;
        }

        Ok(proposals)
    }

    fn validate_events(
        &self,
        state: &WorldState,
        proposals: Vec<ProposedEvent>,
        rejections: &mut Vec<Rejection>,
    ) -> Vec<ProposedEvent> {
        let mut validated = Vec::with_capacity(proposals.len());

        for mut event in proposals {
            event.attribution = event.attribution.normalized();

            match self.check_event(state, &event) {
                Ok(()) => validated.push(event),
                Err(reason) => {
                    warn!(
                        target: "sim::kernel",
                        tick = state.tick_index,
                        event_type = %event.event_type,
                        %reason,
                        "event rejected"
                    );
                    rejections.push(Rejection::Event {
                        event_type: event.event_type,
                        proposed_by: event.caused_by,
                        reason,
                    });
                }
            }
        }

        validated
    }

    fn check_event(&self, state: &WorldState, event: &ProposedEvent) -> Result<(), String> {
        if event.event_type.is_empty() {
            return Err("empty event type".to_string());
        }
        if let Some(missing) = event
            .attribution
            .referenced_entities()
            .find(|id| !state.is_live(id))
        {
            return Err(format!("references missing entity {missing}"));
        }
        validate(&event.payload, "payload").map_err(|e| e.to_string())?;
        validate(&event.attribution, "attribution").map_err(|e| e.to_string())?;
        for validator in &self.event_validators {
            validator.validate(state, event)?;
        }
        Ok(())
    }

    /// Applies events in ordinal order. Types without a reducer are recorded
    /// but change nothing.
    fn apply(&self, state: &mut WorldState, events: &[SimEvent]) -> Result<(), KernelError> {
        for event in events {
            let Some(reducer) = self.reducers.get(&event.event_type) else {
                debug!(
                    target: "sim::kernel",
                    event_type = %event.event_type,
                    ordinal = event.ordinal,
                    "no reducer registered"
                );
                continue;
            };

            reducer
                .apply(state, event)
                .map_err(|source| KernelError::ReducerFailed {
                    event_type: event.event_type.clone(),
                    ordinal: event.ordinal,
                    source,
                })?;
        }
        Ok(())
    }
}

/// Collects systems, reducers and validators, then builds a [`Kernel`].
#[derive(Default)]
pub struct KernelBuilder {
    config: KernelConfig,
    systems: Vec<Arc<dyn System>>,
    reducers: Vec<(String, Arc<dyn Reducer>)>,
    command_validators: Vec<Arc<dyn CommandValidator>>,
    event_validators: Vec<Arc<dyn EventValidator>>,
}

impl KernelBuilder {
    pub fn config(mut self, config: KernelConfig) -> Self {
        self.config = config;
        self
    }

    pub fn system(mut self, system: impl System + 'static) -> Self {
        self.systems.push(Arc::new(system));
        self
    }

    pub fn reducer(mut self, event_type: impl Into<String>, reducer: impl Reducer + 'static) -> Self {
        self.reducers.push((event_type.into(), Arc::new(reducer)));
        self
    }

    pub fn command_validator(mut self, validator: impl CommandValidator + 'static) -> Self {
        self.command_validators.push(Arc::new(validator));
        self
    }

    pub fn event_validator(mut self, validator: impl EventValidator + 'static) -> Self {
        self.event_validators.push(Arc::new(validator));
        self
    }

    /// Registers everything in declaration order. Fails on duplicate system
    /// ids or duplicate reducer event types.
    pub fn build(self) -> Result<Kernel, KernelError> {
        let mut systems = SystemRegistry::new();
        for system in self.systems {
            systems.register(system)?;
        }

        let mut reducers = ReducerRegistry::new();
        for (event_type, reducer) in self.reducers {
            reducers.register(event_type, reducer)?;
        }

        Ok(Kernel {
            config: self.config,
            systems,
            reducers,
            command_validators: self.command_validators,
            event_validators: self.event_validators,
        })
    }
}

fn restore_streams(state: &WorldState) -> Result<BTreeMap<String, DeterministicRng>, KernelError> {
    state
        .rng_streams
        .iter()
        .map(|(stream_id, saved)| {
            DeterministicRng::restore(saved)
                .map(|rng| (stream_id.clone(), rng))
                .map_err(|source| KernelError::CorruptRngStream {
                    stream_id: stream_id.clone(),
                    source,
                })
        })
        .collect()
}

fn command_applied(command: &PlayerCommand) -> ProposedEvent {
    ProposedEvent {
        event_type: COMMAND_APPLIED.to_string(),
        payload: json!({
            "commandId": command.command_id,
            "commandType": command.command_type,
            "commandPayload": command.payload,
        }),
        attribution: Attribution::actor(command.actor.clone()),
        caused_by: Cause::player(command.command_id.clone()),
    }
}

fn check_limit(limit: usize, proposed: usize) -> Result<(), KernelError> {
    if proposed > limit {
        return Err(KernelError::MaxEventsExceeded { limit, proposed });
    }
    Ok(())
}

/// Assigns dense ordinals and content-derived ids to the validated batch.
fn assign_ids(
    world_id: &str,
    tick_index: TickIndex,
    validated: Vec<ProposedEvent>,
) -> Result<Vec<SimEvent>, KernelError> {
    validated
        .into_iter()
        .enumerate()
        .map(|(index, event)| {
            // bounded by max_events_per_tick
            let ordinal = u32::try_from(index).map_err(|_| KernelError::MaxEventsExceeded {
                limit: u32::MAX as usize,
                proposed: index,
            })?;

            let event_id = compute_event_id(&EventIdFields {
                world_id,
                tick_index,
                ordinal,
                event_type: &event.event_type,
                payload: &event.payload,
                caused_by: &event.caused_by,
                attribution: std::borrow::Cow::Borrowed(&event.attribution),
            })?;

            Ok(SimEvent {
                event_id,
                tick_index,
                ordinal,
                event_type: event.event_type,
                payload: event.payload,
                caused_by: event.caused_by,
                attribution: event.attribution,
            })
        })
        .collect()
}
