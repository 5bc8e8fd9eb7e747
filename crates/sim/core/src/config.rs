/// Kernel version folded into every world rules digest.
pub const KERNEL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Kernel limits and integrity switches.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KernelConfig {
    /// Upper bound on proposed events (command translations included) per tick.
    /// Exceeding it fails the tick.
    pub max_events_per_tick: usize,
    /// Run the determinism validator over post-apply state before hashing.
    pub validate_state: bool,
    /// Recompute the input envelope's state hash before stepping and refuse
    /// to run on a mismatch.
    pub verify_input_state_hash: bool,
}

impl KernelConfig {
    // ===== runtime-tunable defaults =====
    pub const DEFAULT_MAX_EVENTS_PER_TICK: usize = 4096;

    pub fn new() -> Self {
        Self {
            max_events_per_tick: Self::DEFAULT_MAX_EVENTS_PER_TICK,
            validate_state: true,
            verify_input_state_hash: true,
        }
    }

    pub fn with_max_events_per_tick(mut self, max_events_per_tick: usize) -> Self {
        self.max_events_per_tick = max_events_per_tick;
        self
    }

    pub fn with_validate_state(mut self, validate_state: bool) -> Self {
        self.validate_state = validate_state;
        self
    }

    pub fn with_verify_input_state_hash(mut self, verify: bool) -> Self {
        self.verify_input_state_hash = verify;
        self
    }
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self::new()
    }
}
