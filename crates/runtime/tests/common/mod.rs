//! Shared fixture: a world of counters bumped by a seeded system.
#![allow(dead_code)]

use serde_json::{Value, json};
use sim_core::{
    Attribution, COMMAND_APPLIED, EntityRecord, Kernel, PackDescriptor, PlayerCommand,
    ReducerError, SimEvent, SystemContext, SystemError, WorldEnvelope, WorldState, system_fn,
};

pub const COUNT: &str = "core.count";

pub fn world(world_id: &str) -> WorldEnvelope {
    let state = WorldState::new()
        .with_entity(EntityRecord::new("counter.a", "counter", 0).with_component(COUNT, json!(0)))
        .with_entity(EntityRecord::new("counter.b", "counter", 0).with_component(COUNT, json!(0)));

    WorldEnvelope::genesis(
        world_id,
        format!("{world_id}-seed"),
        PackDescriptor::new("pack.world.counters", "1.0.0", "aa", 0),
        vec![PackDescriptor::new("pack.rules.counting", "1.0.0", "bb", 0)],
        state,
    )
    .unwrap()
}

fn bump_system(ctx: &mut SystemContext<'_>) -> Result<(), SystemError> {
    let state = ctx.state();
    for counter in state.entities_by_type("counter") {
        let amount = ctx.rng("core.bump").next_int(10)?;
        ctx.propose_event(
            "counter.bumped",
            json!({ "amount": amount }),
            Attribution::actor(counter.id.clone()),
        );
    }
    Ok(())
}

fn add(state: &mut WorldState, id: &str, amount: i64) -> Result<(), ReducerError> {
    let counter = state
        .entity_mut(id)
        .ok_or_else(|| ReducerError::MissingEntity(id.to_string()))?;
    let count = counter.component(COUNT).and_then(Value::as_i64).unwrap_or(0);
    counter.set_component(COUNT, json!(count + amount));
    Ok(())
}

fn actor(event: &SimEvent) -> Result<String, ReducerError> {
    event
        .attribution
        .actor_ids
        .as_ref()
        .and_then(|ids| ids.first())
        .cloned()
        .ok_or_else(|| ReducerError::invalid_payload("missing actor"))
}

/// `add` commands add their `amount` to the issuing counter; `explode`
/// commands pass validation but fail in their reducer.
pub fn kernel() -> Kernel {
    Kernel::builder()
        .system(system_fn("core.bump", 0, bump_system))
        .command_validator(|_: &WorldState, command: &PlayerCommand| {
            match command.command_type.as_str() {
                "add" | "explode" => Ok(()),
                other => Err(format!("unknown command type {other}")),
            }
        })
        .reducer("counter.bumped", |state: &mut WorldState, event: &SimEvent| -> Result<(), ReducerError> {
            let amount = event.payload["amount"]
                .as_i64()
                .ok_or_else(|| ReducerError::invalid_payload("amount"))?;
            add(state, &actor(event)?, amount)
        })
        .reducer(COMMAND_APPLIED, |state: &mut WorldState, event: &SimEvent| -> Result<(), ReducerError> {
            match event.payload["commandType"].as_str() {
                Some("explode") => Err(ReducerError::invariant("counter exploded")),
                _ => {
                    let amount = event.payload["commandPayload"]["amount"]
                        .as_i64()
                        .ok_or_else(|| ReducerError::invalid_payload("amount"))?;
                    add(state, &actor(event)?, amount)
                }
            }
        })
        .build()
        .unwrap()
}

pub fn add_command(tick: u64, actor: &str, amount: i64) -> PlayerCommand {
    PlayerCommand::new(
        format!("add-{tick}-{actor}"),
        actor,
        "add",
        json!({ "amount": amount }),
        tick,
    )
}

pub fn explode_command(tick: u64) -> PlayerCommand {
    PlayerCommand::new(format!("explode-{tick}"), "counter.a", "explode", json!({}), tick)
}

pub fn count(envelope: &WorldEnvelope, id: &str) -> i64 {
    envelope
        .state
        .entity(id)
        .and_then(|e| e.component(COUNT))
        .and_then(Value::as_i64)
        .unwrap_or(0)
}

/// Command inputs for `ticks` ticks: counter.a adds 100 on every third tick.
pub fn script(ticks: u64) -> Vec<Vec<PlayerCommand>> {
    (0..ticks)
        .map(|tick| {
            if tick % 3 == 0 {
                vec![add_command(tick, "counter.a", 100)]
            } else {
                Vec::new()
            }
        })
        .collect()
}
