//! Authoritative world state representation.
//!
//! This module owns the data structures that describe entities, RNG stream
//! states and world-level fields. Hosts clone or query this state but mutate
//! it exclusively through reducers run by the kernel.
//!
//! Every container here is ordered (`BTreeMap`, `Vec`) so iteration order
//! is a function of content alone.
mod envelope;

pub use envelope::{PackDescriptor, WorldEnvelope};

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::rng::RngState;

/// Stable entity identifier.
pub type EntityId = String;

/// Monotonic tick counter.
pub type TickIndex = u64;

/// Canonical snapshot of the deterministic world.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorldState {
    /// Index of the next tick to execute; equals the number of ticks applied.
    pub tick_index: TickIndex,
    /// All entities, live and tombstoned, keyed by id.
    #[serde(default)]
    pub entities: BTreeMap<EntityId, EntityRecord>,
    /// Persisted RNG stream states keyed by stream id.
    #[serde(default)]
    pub rng_streams: BTreeMap<String, RngState>,
    /// World-level fields owned by rule packs (calendars, counters, ...).
    #[serde(default)]
    pub globals: BTreeMap<String, Value>,
}

impl WorldState {
    /// Creates an empty state at tick zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces an entity, returning the previous record.
    pub fn insert_entity(&mut self, record: EntityRecord) -> Option<EntityRecord> {
        self.entities.insert(record.id.clone(), record)
    }

    /// Builder-style [`insert_entity`](Self::insert_entity).
    pub fn with_entity(mut self, record: EntityRecord) -> Self {
        self.insert_entity(record);
        self
    }

    /// Returns a live (not tombstoned) entity.
    pub fn entity(&self, id: &str) -> Option<&EntityRecord> {
        self.entities.get(id).filter(|entity| entity.is_live())
    }

    /// Mutable access to a live entity.
    pub fn entity_mut(&mut self, id: &str) -> Option<&mut EntityRecord> {
        self.entities.get_mut(id).filter(|entity| entity.is_live())
    }

    /// True if the entity exists and has not been tombstoned.
    pub fn is_live(&self, id: &str) -> bool {
        self.entity(id).is_some()
    }

    /// Live entities in id order.
    pub fn entities_sorted(&self) -> impl Iterator<Item = &EntityRecord> {
        self.entities.values().filter(|entity| entity.is_live())
    }

    /// Live entities of one type in id order.
    pub fn entities_by_type<'a>(
        &'a self,
        entity_type: &'a str,
    ) -> impl Iterator<Item = &'a EntityRecord> {
        self.entities_sorted()
            .filter(move |entity| entity.entity_type == entity_type)
    }

    /// Marks an entity deleted at `tick`. Returns false if it was not live.
    ///
    /// Tombstoned records stay in the hashed state so history remains
    /// addressable.
    pub fn tombstone(&mut self, id: &str, tick: TickIndex) -> bool {
        match self.entity_mut(id) {
            Some(entity) => {
                entity.deleted_tick = Some(tick);
                true
            }
            None => false,
        }
    }

    pub fn global(&self, key: &str) -> Option<&Value> {
        self.globals.get(key)
    }

    pub fn set_global(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.globals.insert(key.into(), value)
    }
}

/// A typed bag of named components.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityRecord {
    pub id: EntityId,
    #[serde(rename = "type")]
    pub entity_type: String,
    pub created_tick: TickIndex,
    /// Tombstone; absent while the entity is live.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_tick: Option<TickIndex>,
    /// Namespaced components, e.g. `core.needs`.
    #[serde(default)]
    pub components: BTreeMap<String, Value>,
}

impl EntityRecord {
    pub fn new(
        id: impl Into<EntityId>,
        entity_type: impl Into<String>,
        created_tick: TickIndex,
    ) -> Self {
        Self {
            id: id.into(),
            entity_type: entity_type.into(),
            created_tick,
            deleted_tick: None,
            components: BTreeMap::new(),
        }
    }

    /// Builder-style component insertion.
    pub fn with_component(mut self, key: impl Into<String>, value: Value) -> Self {
        self.components.insert(key.into(), value);
        self
    }

    pub fn component(&self, key: &str) -> Option<&Value> {
        self.components.get(key)
    }

    pub fn set_component(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.components.insert(key.into(), value)
    }

    pub fn is_live(&self) -> bool {
        self.deleted_tick.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn town() -> WorldState {
        WorldState::new()
            .with_entity(EntityRecord::new("npc.ida", "npc", 0))
            .with_entity(EntityRecord::new("place.mill", "place", 0))
            .with_entity(EntityRecord::new("npc.bo", "npc", 0))
            .with_entity(EntityRecord::new("npc.al", "npc", 0))
    }

    #[test]
    fn entities_by_type_is_sorted_by_id() {
        let state = town();
        let ids: Vec<&str> = state
            .entities_by_type("npc")
            .map(|e| e.id.as_str())
            .collect();
        assert_eq!(ids, vec!["npc.al", "npc.bo", "npc.ida"]);
    }

    #[test]
    fn tombstoned_entities_are_hidden_but_kept() {
        let mut state = town();
        assert!(state.tombstone("npc.bo", 5));
        assert!(!state.tombstone("npc.bo", 6));

        assert!(state.entity("npc.bo").is_none());
        assert!(!state.is_live("npc.bo"));
        assert_eq!(state.entities_by_type("npc").count(), 2);
        assert_eq!(state.entities["npc.bo"].deleted_tick, Some(5));
    }

    #[test]
    fn live_entity_serializes_without_tombstone_field() {
        let record = EntityRecord::new("npc.ida", "npc", 2).with_component("core.needs", json!({ "hunger": 10 }));
        let encoded = crate::canonical::canonical_json(&record).unwrap();
        assert_eq!(
            encoded,
            r#"{"components":{"core.needs":{"hunger":10}},"createdTick":2,"id":"npc.ida","type":"npc"}"#
        );
    }
}
