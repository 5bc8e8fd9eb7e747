//! SHA-256 digests over canonical encodings.
//!
//! Every identifier and integrity value in the kernel is
//! `sha256_hex(canonical_json(x))` for some `x`. Digests are rendered as
//! 64 lowercase hex characters and handled as text from then on.

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::canonical::{EncodeError, canonical_json};
use crate::event::EventIdFields;
use crate::state::{PackDescriptor, WorldState};

/// Hashes UTF-8 text with SHA-256, returning lowercase hex.
pub fn sha256_hex(data: &str) -> String {
    let digest = Sha256::digest(data.as_bytes());
    hex::encode(digest)
}

/// `sha256(canonical_json(state))`.
pub fn compute_state_hash(state: &WorldState) -> Result<String, EncodeError> {
    Ok(sha256_hex(&canonical_json(state)?))
}

/// Content-derived event identifier.
///
/// Attribution arrays are normalized (sorted) before hashing so the id does
/// not depend on the order a system listed actors or places in.
pub fn compute_event_id(fields: &EventIdFields<'_>) -> Result<String, EncodeError> {
    let normalized = EventIdFields {
        attribution: std::borrow::Cow::Owned(fields.attribution.normalized()),
        ..fields.clone()
    };
    Ok(sha256_hex(&canonical_json(&normalized)?))
}

/// Digest over the kernel version and every loaded rule pack.
///
/// Two parties compare this out-of-band before trusting a chain-head
/// comparison: identical inputs under different rules legitimately diverge.
pub fn compute_world_rules_digest(
    kernel_version: &str,
    world_template_pack: &PackDescriptor,
    rules_pack_set: &[PackDescriptor],
) -> Result<String, EncodeError> {
    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    struct RulesDigestInput<'a> {
        kernel_version: &'a str,
        world_template_pack: &'a PackDescriptor,
        rules_pack_set: &'a [PackDescriptor],
    }

    let input = RulesDigestInput {
        kernel_version,
        world_template_pack,
        rules_pack_set,
    };
    Ok(sha256_hex(&canonical_json(&input)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Attribution, Cause};
    use serde_json::json;
    use std::borrow::Cow;

    #[test]
    fn sha256_of_empty_string_matches_known_vector() {
        assert_eq!(
            sha256_hex(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(
            sha256_hex("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn digests_are_lowercase_hex_of_fixed_width() {
        let digest = sha256_hex("w1");
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
    }

    #[test]
    fn event_id_ignores_attribution_order() {
        let payload = json!({ "amount": 3 });
        let cause = Cause::system("core.economy");
        let forward = Attribution {
            actor_ids: Some(vec!["npc.a".into(), "npc.b".into()]),
            ..Attribution::default()
        };
        let backward = Attribution {
            actor_ids: Some(vec!["npc.b".into(), "npc.a".into()]),
            ..Attribution::default()
        };

        let make = |attribution| EventIdFields {
            world_id: "w1",
            tick_index: 4,
            ordinal: 0,
            event_type: "core.stockpile.delta",
            payload: &payload,
            caused_by: &cause,
            attribution,
        };

        let a = compute_event_id(&make(Cow::Borrowed(&forward))).unwrap();
        let b = compute_event_id(&make(Cow::Borrowed(&backward))).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn rules_digest_changes_with_pack_version() {
        let template = PackDescriptor::new("pack.world.town", "1.0.0", "aa", 0);
        let rules_v1 = [PackDescriptor::new("pack.rules.core", "1.0.0", "bb", 1)];
        let rules_v2 = [PackDescriptor::new("pack.rules.core", "1.0.1", "bb", 1)];

        let d1 = compute_world_rules_digest("0.1.0", &template, &rules_v1).unwrap();
        let d2 = compute_world_rules_digest("0.1.0", &template, &rules_v2).unwrap();
        let d1_again = compute_world_rules_digest("0.1.0", &template, &rules_v1).unwrap();

        assert_ne!(d1, d2);
        assert_eq!(d1, d1_again);
    }
}
