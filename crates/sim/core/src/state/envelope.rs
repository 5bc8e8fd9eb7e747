//! World envelope: state plus the identity and integrity metadata around it.

use serde::{Deserialize, Serialize};

use super::{TickIndex, WorldState};
use crate::canonical::EncodeError;
use crate::chain::compute_genesis_hash;
use crate::config::KERNEL_VERSION;
use crate::hash::{compute_state_hash, compute_world_rules_digest};

/// Identifies one loaded content pack.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackDescriptor {
    /// e.g. `pack.core.starter_rules.v1`
    pub pack_id: String,
    pub version: String,
    /// sha256 of the pack bundle.
    pub content_hash: String,
    /// Deterministic load order.
    pub order: u32,
}

impl PackDescriptor {
    pub fn new(
        pack_id: impl Into<String>,
        version: impl Into<String>,
        content_hash: impl Into<String>,
        order: u32,
    ) -> Self {
        Self {
            pack_id: pack_id.into(),
            version: version.into(),
            content_hash: content_hash.into(),
            order,
        }
    }
}

/// Everything a replica needs to continue or audit a world.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorldEnvelope {
    pub world_id: String,
    /// Seed for every RNG stream in this world.
    pub world_seed: String,
    pub kernel_version: String,
    pub world_template_pack: PackDescriptor,
    /// Sorted by `(order, packId)`.
    pub rules_pack_set: Vec<PackDescriptor>,
    pub world_rules_digest: String,
    /// `sha256(canonical(state))` for `state` as stored here.
    pub state_hash: String,
    /// Hash chain head after the last applied tick (genesis hash before the first).
    pub chain_head: String,
    pub state: WorldState,
}

impl WorldEnvelope {
    /// Builds the envelope for a new world.
    ///
    /// The chain starts at `sha256(world_id)`; the rules digest binds the
    /// running kernel version to the given packs.
    pub fn genesis(
        world_id: impl Into<String>,
        world_seed: impl Into<String>,
        world_template_pack: PackDescriptor,
        mut rules_pack_set: Vec<PackDescriptor>,
        state: WorldState,
    ) -> Result<Self, EncodeError> {
        let world_id = world_id.into();

        rules_pack_set.sort_by(|a, b| {
            a.order
                .cmp(&b.order)
                .then_with(|| a.pack_id.cmp(&b.pack_id))
        });

        let world_rules_digest =
            compute_world_rules_digest(KERNEL_VERSION, &world_template_pack, &rules_pack_set)?;
        let state_hash = compute_state_hash(&state)?;
        let chain_head = compute_genesis_hash(&world_id);

        Ok(Self {
            world_id,
            world_seed: world_seed.into(),
            kernel_version: KERNEL_VERSION.to_string(),
            world_template_pack,
            rules_pack_set,
            world_rules_digest,
            state_hash,
            chain_head,
            state,
        })
    }

    /// Rules digest this envelope's packs produce under the running kernel.
    ///
    /// Equal to `world_rules_digest` only if the envelope was built by this
    /// kernel version for exactly these packs.
    pub fn running_rules_digest(&self) -> Result<String, EncodeError> {
        compute_world_rules_digest(KERNEL_VERSION, &self.world_template_pack, &self.rules_pack_set)
    }

    /// Index of the next tick this envelope will execute.
    pub fn tick_index(&self) -> TickIndex {
        self.state.tick_index
    }
}
