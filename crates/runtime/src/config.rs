//! Runtime configuration.

use std::env;

use sim_core::KernelConfig;

/// Runtime configuration shared across the host and its world workers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Kernel limits; pass to [`sim_core::KernelBuilder::config`].
    pub kernel: KernelConfig,
    pub command_buffer_size: usize,
    pub event_buffer_size: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            kernel: KernelConfig::default(),
            command_buffer_size: 32,
            event_buffer_size: 100,
        }
    }
}

impl RuntimeConfig {
    /// Construct configuration from process environment variables.
    ///
    /// Environment variables:
    /// - `SIM_MAX_EVENTS_PER_TICK` - Proposal cap per tick (default: 4096)
    /// - `SIM_VALIDATE_STATE` - Run the determinism validator before hashing (default: true)
    /// - `SIM_VERIFY_INPUT_HASH` - Re-hash input state before each tick (default: true)
    /// - `SIM_COMMAND_BUFFER` - Per-world command queue size (default: 32)
    /// - `SIM_EVENT_BUFFER` - Per-world broadcast capacity (default: 100)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) over an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(limit) = read::<usize>(&lookup, "SIM_MAX_EVENTS_PER_TICK") {
            config.kernel.max_events_per_tick = limit.max(1);
        }
        if let Some(enabled) = read_bool(&lookup, "SIM_VALIDATE_STATE") {
            config.kernel.validate_state = enabled;
        }
        if let Some(enabled) = read_bool(&lookup, "SIM_VERIFY_INPUT_HASH") {
            config.kernel.verify_input_state_hash = enabled;
        }

        // Channel configuration
        if let Some(capacity) = read::<usize>(&lookup, "SIM_COMMAND_BUFFER") {
            config.command_buffer_size = capacity.max(1);
        }
        if let Some(capacity) = read::<usize>(&lookup, "SIM_EVENT_BUFFER") {
            config.event_buffer_size = capacity.max(1);
        }

        config
    }
}

fn read<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T>
where
    T: std::str::FromStr,
{
    lookup(key)?.trim().parse().ok()
}

fn read_bool(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<bool> {
    match lookup(key)?.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
