//! Append-only hash chain over per-tick event batches.
//!
//! ```text
//! genesis   = sha256(world_id)
//! batch_n   = sha256(canonical(events_n))
//! head_n    = sha256(head_{n-1} ++ batch_n)      // hex text, not raw bytes
//! ```
//!
//! Heads are concatenated as 64-character lowercase hex strings before
//! hashing. This is bit-compatible only because both inputs are fixed-width
//! hex of the same digest; replicas must keep the text form.
//!
//! A mismatch at tick `n` invalidates every later head but says nothing about
//! ticks before `n`. [`first_divergence`] bisects two record logs for the
//! first tick that disagrees.

use serde::{Deserialize, Serialize};

use crate::canonical::{EncodeError, canonical_json};
use crate::error::{ErrorSeverity, SimError};
use crate::hash::sha256_hex;
use crate::state::TickIndex;

/// Chain integrity failures. Never recovered locally.
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error("hash chain mismatch at tick {tick_index}: expected {expected}, got {actual}")]
    HashChainMismatch {
        tick_index: TickIndex,
        expected: String,
        actual: String,
    },

    #[error("record for tick {tick_index} does not link to the previous head: expected {expected}, got {actual}")]
    BrokenLink {
        tick_index: TickIndex,
        expected: String,
        actual: String,
    },

    #[error("tick gap: expected tick {expected}, got {actual}")]
    TickGap {
        expected: TickIndex,
        actual: TickIndex,
    },

    #[error(transparent)]
    Encode(#[from] EncodeError),
}

impl SimError for ChainError {
    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Encode(_) => ErrorSeverity::Internal,
            _ => ErrorSeverity::Integrity,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            Self::HashChainMismatch { .. } => "hash_chain_mismatch",
            Self::BrokenLink { .. } => "broken_link",
            Self::TickGap { .. } => "tick_gap",
            Self::Encode(_) => "encode",
        }
    }
}

/// `sha256(world_id)`; the previous head for tick 0.
pub fn compute_genesis_hash(world_id: &str) -> String {
    sha256_hex(world_id)
}

/// `sha256(canonical(events))`. An empty batch hashes `[]`.
pub fn compute_batch_hash<T: Serialize>(events: &[T]) -> Result<String, EncodeError> {
    Ok(sha256_hex(&canonical_json(events)?))
}

/// `sha256(prev_head ++ batch_hash)` over the hex text.
pub fn compute_next_head(prev_head: &str, batch_hash: &str) -> String {
    let mut joined = String::with_capacity(prev_head.len() + batch_hash.len());
    joined.push_str(prev_head);
    joined.push_str(batch_hash);
    sha256_hex(&joined)
}

/// Recomputes the head for `events` and compares it with `expected_head`.
pub fn verify<T: Serialize>(
    events: &[T],
    prev_head: &str,
    expected_head: &str,
    tick_index: TickIndex,
) -> Result<(), ChainError> {
    let actual = compute_next_head(prev_head, &compute_batch_hash(events)?);
    if actual != expected_head {
        return Err(ChainError::HashChainMismatch {
            tick_index,
            expected: expected_head.to_string(),
            actual,
        });
    }
    Ok(())
}

/// Running chain position: the current head and how many ticks it covers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HashChain {
    pub head: String,
    /// Number of ticks folded in; also the index of the next tick.
    pub length: TickIndex,
}

impl HashChain {
    pub fn genesis(world_id: &str) -> Self {
        Self {
            head: compute_genesis_hash(world_id),
            length: 0,
        }
    }

    /// Resumes a chain from a persisted head.
    pub fn resume(head: impl Into<String>, length: TickIndex) -> Self {
        Self {
            head: head.into(),
            length,
        }
    }

    /// Folds one batch hash into the chain and returns the new head.
    pub fn advance(&mut self, batch_hash: &str) -> &str {
        self.head = compute_next_head(&self.head, batch_hash);
        self.length += 1;
        &self.head
    }
}

/// Per-tick log record: enough for a verifier that trusts the rules digest
/// to check linkage without re-executing the tick.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TickRecord {
    pub world_id: String,
    pub tick_index: TickIndex,
    pub prev_chain_head: String,
    pub events_batch_hash: String,
    pub chain_head: String,
    pub state_hash: String,
}

impl TickRecord {
    /// Checks `chain_head == sha256(prev_chain_head ++ events_batch_hash)`.
    pub fn check_head(&self) -> Result<(), ChainError> {
        let actual = compute_next_head(&self.prev_chain_head, &self.events_batch_hash);
        if actual != self.chain_head {
            return Err(ChainError::HashChainMismatch {
                tick_index: self.tick_index,
                expected: self.chain_head.clone(),
                actual,
            });
        }
        Ok(())
    }
}

/// Walks `records` forward from `start`, checking tick continuity, head
/// linkage and each record's own head. Returns the chain after the last
/// record.
pub fn verify_record_links(start: &HashChain, records: &[TickRecord]) -> Result<HashChain, ChainError> {
    let mut chain = start.clone();

    for record in records {
        if record.tick_index != chain.length {
            return Err(ChainError::TickGap {
                expected: chain.length,
                actual: record.tick_index,
            });
        }
        if record.prev_chain_head != chain.head {
            return Err(ChainError::BrokenLink {
                tick_index: record.tick_index,
                expected: chain.head,
                actual: record.prev_chain_head.clone(),
            });
        }
        record.check_head()?;
        chain.advance(&record.events_batch_hash);
    }

    Ok(chain)
}

/// Position of the first record whose chain head differs between two logs.
///
/// When both logs are internally linked, heads are cumulative: equality at
/// position `i` implies equality at every earlier position and the search
/// bisects. Otherwise (an unverified or forged log) the heads are compared
/// one by one. A log that is a strict prefix of the other diverges at the
/// shorter length.
pub fn first_divergence(expected: &[TickRecord], actual: &[TickRecord]) -> Option<usize> {
    let shared = expected.len().min(actual.len());

    if !(is_linked(expected) && is_linked(actual)) {
        return expected
            .iter()
            .zip(actual)
            .position(|(e, a)| e.chain_head != a.chain_head)
            .or((expected.len() != actual.len()).then_some(shared));
    }

    let (mut low, mut high) = (0, shared);

    while low < high {
        let mid = low + (high - low) / 2;
        if expected[mid].chain_head == actual[mid].chain_head {
            low = mid + 1;
        } else {
            high = mid;
        }
    }

    if low < shared || expected.len() != actual.len() {
        Some(low)
    } else {
        None
    }
}

/// True if every record's head is derived from its own fields and each
/// record starts from its predecessor's head.
fn is_linked(records: &[TickRecord]) -> bool {
    records.iter().all(|r| r.check_head().is_ok())
        && records
            .windows(2)
            .all(|pair| pair[1].prev_chain_head == pair[0].chain_head)
}
