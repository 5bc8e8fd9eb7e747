//! Deterministic, stream-partitioned random number generation.
//!
//! Every stream is addressed by `(world_seed, stream_id)` and owns its own
//! 128-bit state, so concurrent worlds and independent subsystems never share
//! a mutable generator. The state round-trips through [`RngState`] verbatim
//! and is persisted in [`WorldState::rng_streams`](crate::state::WorldState).
//!
//! # Determinism
//!
//! Output depends only on the seed pair and the call sequence. Only wrapping
//! integer arithmetic is used; no floating point, no hardware entropy.
//!
//! # References
//!
//! - xoroshiro128**: <https://prng.di.unimi.it/xoroshiro128starstar.c>
//! - FNV-1a: <http://www.isthe.com/chongo/tech/comp/fnv/>

use serde::{Deserialize, Serialize};

use crate::error::{ErrorSeverity, SimError};
use crate::validation::MAX_SAFE_INTEGER;

/// Algorithm tag written into every serialized [`RngState`].
pub const RNG_ALGORITHM: &str = "xoroshiro128**";

/// Serialized generator state: `{algo, s0, s1}` with 16-digit lowercase hex words.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RngState {
    pub algo: String,
    pub s0: String,
    pub s1: String,
}

/// Errors raised by RNG restore and sampling.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RngError {
    /// Persisted state is malformed.
    #[error("invalid RNG state: {reason}")]
    InvalidState { reason: String },

    /// Sampling bound is not in `1..=2^53-1`.
    #[error("invalid range: bound {max} outside 1..={}", MAX_SAFE_INTEGER)]
    InvalidRange { max: i64 },
}

impl SimError for RngError {
    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::InvalidState { .. } => ErrorSeverity::Integrity,
            Self::InvalidRange { .. } => ErrorSeverity::Validation,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidState { .. } => "invalid_rng_state",
            Self::InvalidRange { .. } => "invalid_range",
        }
    }
}

/// xoroshiro128** generator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeterministicRng {
    s0: u64,
    s1: u64,
}

impl DeterministicRng {
    const FNV_OFFSET_BASIS: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x100000001b3;

    /// Derives a fresh stream from the world seed and stream id.
    ///
    /// `s0 = fnv1a("{seed}:{stream}")`, `s1 = fnv1a("{seed}:{stream}:s1")`.
    pub fn create(world_seed: &str, stream_id: &str) -> Self {
        let combined = format!("{world_seed}:{stream_id}");
        let s0 = Self::fnv1a(&combined);
        let s1 = Self::fnv1a(&format!("{combined}:s1"));
        Self { s0, s1 }
    }

    /// Restores a stream from its serialized state.
    pub fn restore(state: &RngState) -> Result<Self, RngError> {
        if state.algo != RNG_ALGORITHM {
            return Err(RngError::InvalidState {
                reason: format!("unsupported algorithm \"{}\"", state.algo),
            });
        }

        let s0 = Self::parse_word(&state.s0, "s0")?;
        let s1 = Self::parse_word(&state.s1, "s1")?;
        Ok(Self { s0, s1 })
    }

    /// Serializes the current state.
    pub fn state(&self) -> RngState {
        RngState {
            algo: RNG_ALGORITHM.to_string(),
            s0: format!("{:016x}", self.s0),
            s1: format!("{:016x}", self.s1),
        }
    }

    /// One xoroshiro128** step.
    pub fn next_u64(&mut self) -> u64 {
        let s0 = self.s0;
        let mut s1 = self.s1;
        let result = s0.wrapping_mul(5).rotate_left(7).wrapping_mul(9);

        s1 ^= s0;
        self.s0 = s0.rotate_left(24) ^ s1 ^ (s1 << 16);
        self.s1 = s1.rotate_left(37);

        result
    }

    /// Uniform integer in `[0, max)`.
    ///
    /// Rejection-samples against `2^64 - (2^64 mod max)` so the result has no
    /// modulo bias.
    pub fn next_int(&mut self, max: i64) -> Result<i64, RngError> {
        if max <= 0 || max > MAX_SAFE_INTEGER {
            return Err(RngError::InvalidRange { max });
        }

        let bound = max as u128;
        let span = 1u128 << 64;
        let threshold = span - (span % bound);

        let mut value = u128::from(self.next_u64());
        while value >= threshold {
            value = u128::from(self.next_u64());
        }

        // value % bound < max <= 2^53 - 1, so the narrowing is lossless
        Ok((value % bound) as i64)
    }

    /// Uniform integer in `[min, max)`.
    pub fn next_range(&mut self, min: i64, max: i64) -> Result<i64, RngError> {
        let width = max
            .checked_sub(min)
            .ok_or(RngError::InvalidRange { max: i64::MAX })?;
        Ok(min + self.next_int(width)?)
    }

    /// True with probability `numerator / denominator`.
    pub fn chance(&mut self, numerator: u32, denominator: u32) -> Result<bool, RngError> {
        Ok(self.next_int(i64::from(denominator))? < i64::from(numerator))
    }

    /// Uniformly picks one element; `None` for an empty slice.
    pub fn pick<'a, T>(&mut self, items: &'a [T]) -> Result<Option<&'a T>, RngError> {
        if items.is_empty() {
            return Ok(None);
        }
        let index = self.next_int(Self::len_as_bound(items.len())?)?;
        Ok(items.get(index as usize))
    }

    /// In-place Fisher–Yates shuffle, walking from the back.
    pub fn shuffle<T>(&mut self, items: &mut [T]) -> Result<(), RngError> {
        for i in (1..items.len()).rev() {
            let j = self.next_int(Self::len_as_bound(i + 1)?)? as usize;
            items.swap(i, j);
        }
        Ok(())
    }

    /// FNV-1a over UTF-16 code units, matching string hashing on hosts that
    /// index strings by code unit.
    fn fnv1a(text: &str) -> u64 {
        text.encode_utf16().fold(Self::FNV_OFFSET_BASIS, |hash, unit| {
            (hash ^ u64::from(unit)).wrapping_mul(Self::FNV_PRIME)
        })
    }

    fn parse_word(hex: &str, field: &str) -> Result<u64, RngError> {
        let well_formed =
            hex.len() == 16 && hex.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if !well_formed {
            return Err(RngError::InvalidState {
                reason: format!("{field} must be 16 lowercase hex characters"),
            });
        }

        u64::from_str_radix(hex, 16).map_err(|e| RngError::InvalidState {
            reason: format!("{field}: {e}"),
        })
    }

    fn len_as_bound(len: usize) -> Result<i64, RngError> {
        i64::try_from(len).map_err(|_| RngError::InvalidRange { max: i64::MAX })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn state(s0: &str, s1: &str) -> RngState {
        RngState {
            algo: RNG_ALGORITHM.to_string(),
            s0: s0.to_string(),
            s1: s1.to_string(),
        }
    }

    #[test]
    fn fnv1a_matches_reference_vectors() {
        assert_eq!(DeterministicRng::fnv1a(""), 0xcbf29ce484222325);
        assert_eq!(DeterministicRng::fnv1a("a"), 0xaf63dc4c8601ec8c);
    }

    #[test]
    fn single_step_matches_hand_computed_values() {
        let mut rng = DeterministicRng::restore(&state("0000000000000001", "0000000000000000")).unwrap();

        assert_eq!(rng.next_u64(), 5760);
        assert_eq!(
            rng.state(),
            state("0000000001010001", "0000002000000000")
        );
        assert_eq!(rng.next_u64(), 0x1696816800);
    }

    #[test]
    fn same_seed_and_stream_repeat_exactly() {
        let mut a = DeterministicRng::create("w1", "core.npc.ida");
        let mut b = DeterministicRng::create("w1", "core.npc.ida");
        let xs: Vec<u64> = (0..32).map(|_| a.next_u64()).collect();
        let ys: Vec<u64> = (0..32).map(|_| b.next_u64()).collect();
        assert_eq!(xs, ys);
    }

    #[test]
    fn streams_are_independent() {
        let mut a = DeterministicRng::create("w1", "core.weather");
        let mut b = DeterministicRng::create("w1", "core.rumor");
        assert_ne!(a.state(), b.state());
        assert_ne!(a.next_u64(), b.next_u64());
    }

    #[test]
    fn restore_rejects_malformed_state() {
        let bad_algo = RngState {
            algo: "pcg32".to_string(),
            ..state("0000000000000001", "0000000000000002")
        };
        let cases = [
            bad_algo,
            state("1", "0000000000000002"),
            state("000000000000000G", "0000000000000002"),
            state("0000000000000001", "00000000000000AB"),
            state("0000000000000001", "+000000000000002"),
        ];

        for case in cases {
            let err = DeterministicRng::restore(&case).unwrap_err();
            assert!(matches!(err, RngError::InvalidState { .. }), "{case:?}");
            assert_eq!(err.severity(), ErrorSeverity::Integrity);
        }
    }

    #[test]
    fn next_int_rejects_out_of_range_bounds() {
        let mut rng = DeterministicRng::create("w1", "s");
        for max in [0, -1, MAX_SAFE_INTEGER + 1, i64::MAX] {
            assert_eq!(rng.next_int(max), Err(RngError::InvalidRange { max }));
        }
        assert!(rng.next_int(MAX_SAFE_INTEGER).is_ok());
    }

    #[test]
    fn next_int_of_one_is_always_zero() {
        let mut rng = DeterministicRng::create("w1", "unit");
        for _ in 0..1000 {
            assert_eq!(rng.next_int(1).unwrap(), 0);
        }
    }

    #[test]
    fn next_int_is_roughly_uniform() {
        const BUCKETS: usize = 10;
        const DRAWS: usize = 100_000;

        let mut rng = DeterministicRng::create("uniformity", "buckets");
        let mut counts = [0usize; BUCKETS];
        for _ in 0..DRAWS {
            let v = rng.next_int(BUCKETS as i64).unwrap();
            counts[v as usize] += 1;
        }

        let expected = DRAWS / BUCKETS;
        for count in counts {
            assert!(
                count.abs_diff(expected) < expected / 20,
                "bucket count {count} too far from {expected}"
            );
        }
    }

    #[test]
    fn helpers_stay_in_bounds() {
        let mut rng = DeterministicRng::create("w1", "helpers");
        for _ in 0..500 {
            let v = rng.next_range(-5, 5).unwrap();
            assert!((-5..5).contains(&v));
        }
        assert!(rng.next_range(3, 3).is_err());
        assert!(rng.chance(1, 0).is_err());
        assert!(rng.chance(1, 1).unwrap());
        assert!(!rng.chance(0, 7).unwrap());

        let empty: [u8; 0] = [];
        assert_eq!(rng.pick(&empty).unwrap(), None);
        assert_eq!(rng.pick(&[42]).unwrap(), Some(&42));
    }

    #[test]
    fn shuffle_is_a_permutation_and_reproducible() {
        let mut a = DeterministicRng::create("w1", "deck");
        let mut b = DeterministicRng::create("w1", "deck");
        let mut xs: Vec<u32> = (0..52).collect();
        let mut ys = xs.clone();

        a.shuffle(&mut xs).unwrap();
        b.shuffle(&mut ys).unwrap();
        assert_eq!(xs, ys);

        let mut sorted = xs.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..52).collect::<Vec<_>>());
    }

    proptest! {
        #[test]
        fn restore_continues_the_same_sequence(
            seed in "[a-z0-9]{1,12}",
            stream in "[a-z.]{1,12}",
            warmup in 0usize..64,
            draws in 1usize..64,
        ) {
            let mut original = DeterministicRng::create(&seed, &stream);
            for _ in 0..warmup {
                original.next_u64();
            }

            let mut restored = DeterministicRng::restore(&original.state()).unwrap();
            for _ in 0..draws {
                prop_assert_eq!(original.next_u64(), restored.next_u64());
            }
        }

        #[test]
        fn next_int_never_reaches_bound(max in 1i64..=MAX_SAFE_INTEGER, seed in any::<u32>()) {
            let mut rng = DeterministicRng::create(&seed.to_string(), "bound");
            for _ in 0..16 {
                let v = rng.next_int(max).unwrap();
                prop_assert!((0..max).contains(&v));
            }
        }
    }
}
