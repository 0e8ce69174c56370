use std::sync::Once;

static INIT: Once = Once::new();

/// Installs an `EnvFilter`-driven `tracing` subscriber for test output.
/// Mirrors the teacher's `init_tracing` helper, but scoped to tests only —
/// the crate itself never installs a global subscriber.
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init()
            .ok();
    });
}
