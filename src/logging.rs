use std::sync::Once;

static INIT: Once = Once::new();

/// Default filter when `RUST_LOG` is unset.
const DEFAULT_FILTER: &str = "warn,schoold=info";

/// Installs the stderr logger. stdout carries protocol responses only, so
/// nothing may log there. Safe to call more than once.
pub fn init_logger() {
    INIT.call_once(|| {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(DEFAULT_FILTER))
            .target(env_logger::Target::Stderr)
            .format_timestamp_secs()
            .format_target(false)
            .init();
    });
}
