//! Tracing subscriber setup for hosts embedding the runtime.

use tracing_subscriber::EnvFilter;

/// Installs a stderr `fmt` subscriber filtered by `RUST_LOG`, falling back
/// to `default_directive` (e.g. `"info"` or `"sim=debug"`).
///
/// Returns false if a global subscriber was already installed, which makes
/// repeated calls from tests harmless.
pub fn setup_logging(default_directive: &str) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_install_is_a_no_op() {
        setup_logging("warn");
        assert!(!setup_logging("debug"));
    }
}
