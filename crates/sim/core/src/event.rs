//! Events, causes, attribution and player commands.
//!
//! A [`SimEvent`] is an immutable fact asserted during a tick. It is proposed
//! by a system (or translated from a [`PlayerCommand`]), validated, consumed
//! exactly once by a reducer, and then only ever read or hashed.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::state::{EntityId, TickIndex};

/// Event type emitted for every accepted player command.
pub const COMMAND_APPLIED: &str = "player.command_applied";

/// An immutable fact asserted during a tick.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimEvent {
    /// `sha256(canonical({worldId, tickIndex, ordinal, type, payload, causedBy, attribution}))`.
    pub event_id: String,
    pub tick_index: TickIndex,
    /// Position within the tick's applied batch, dense from zero.
    pub ordinal: u32,
    #[serde(rename = "type")]
    pub event_type: String,
    pub payload: Value,
    pub caused_by: Cause,
    pub attribution: Attribution,
}

/// What produced an event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Cause {
    #[serde(rename_all = "camelCase")]
    Player {
        command_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        action_id: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    System {
        system_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        note: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Scheduled {
        schedule_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        note: Option<String>,
    },
    World {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        note: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Migration { migration_id: String },
}

impl Cause {
    pub fn player(command_id: impl Into<String>) -> Self {
        Self::Player {
            command_id: command_id.into(),
            action_id: None,
        }
    }

    pub fn system(system_id: impl Into<String>) -> Self {
        Self::System {
            system_id: system_id.into(),
            note: None,
        }
    }
}

/// Who and what an event is about.
///
/// Id arrays are stored sorted; [`Attribution::normalized`] is applied by the
/// kernel before an event is hashed or recorded.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attribution {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor_ids: Option<Vec<EntityId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub place_ids: Option<Vec<EntityId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_ids: Option<Vec<EntityId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_entity_ids: Option<Vec<EntityId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    /// 0..=1000
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason_key: Option<String>,
}

impl Attribution {
    /// Attribution naming a single actor.
    pub fn actor(id: impl Into<EntityId>) -> Self {
        Self {
            actor_ids: Some(vec![id.into()]),
            ..Self::default()
        }
    }

    /// Returns a copy with every id array sorted lexicographically.
    pub fn normalized(&self) -> Self {
        fn sorted(ids: &Option<Vec<EntityId>>) -> Option<Vec<EntityId>> {
            ids.as_ref().map(|ids| {
                let mut ids = ids.clone();
                ids.sort_unstable();
                ids
            })
        }

        Self {
            actor_ids: sorted(&self.actor_ids),
            place_ids: sorted(&self.place_ids),
            target_ids: sorted(&self.target_ids),
            target_entity_ids: sorted(&self.target_entity_ids),
            job_id: self.job_id.clone(),
            severity: self.severity,
            reason_key: self.reason_key.clone(),
        }
    }

    /// Entity ids the kernel checks for existence during event validation.
    ///
    /// Place ids are excluded: places may be static map data rather than
    /// entities.
    pub fn referenced_entities(&self) -> impl Iterator<Item = &EntityId> {
        [&self.actor_ids, &self.target_ids, &self.target_entity_ids]
            .into_iter()
            .flatten()
            .flatten()
    }
}

/// External input to a tick. Exists only for one tick's input set.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerCommand {
    pub command_id: String,
    pub actor: EntityId,
    #[serde(rename = "type")]
    pub command_type: String,
    pub payload: Value,
    pub issued_at_tick: TickIndex,
}

impl PlayerCommand {
    pub fn new(
        command_id: impl Into<String>,
        actor: impl Into<EntityId>,
        command_type: impl Into<String>,
        payload: Value,
        issued_at_tick: TickIndex,
    ) -> Self {
        Self {
            command_id: command_id.into(),
            actor: actor.into(),
            command_type: command_type.into(),
            payload,
            issued_at_tick,
        }
    }
}

/// A candidate event before validation assigns it an ordinal and id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProposedEvent {
    pub event_type: String,
    pub payload: Value,
    pub attribution: Attribution,
    pub caused_by: Cause,
}

/// The exact field set hashed into an event id.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventIdFields<'a> {
    pub world_id: &'a str,
    pub tick_index: TickIndex,
    pub ordinal: u32,
    #[serde(rename = "type")]
    pub event_type: &'a str,
    pub payload: &'a Value,
    pub caused_by: &'a Cause,
    pub attribution: Cow<'a, Attribution>,
}
