//! Logging setup for hosts and tests
//!
//! The crate only logs through the `log` facade. Per-frame detail (buckets,
//! octree maintenance, sort passes) is `trace`, attach/detach lifecycle is
//! `debug`, degraded paths such as a missing technique are `warn`.

/// Install `env_logger`, configured from `RUST_LOG`
pub fn init() {
    env_logger::init();
}

/// Install `env_logger` with an explicit filter such as `"scene_engine=debug"`
///
/// `RUST_LOG` still wins when it is set.
pub fn init_with_filter(filter: &str) {
    let mut builder = env_logger::Builder::new();
    builder.parse_filters(filter);
    if let Ok(env_filter) = std::env::var("RUST_LOG") {
        builder.parse_filters(&env_filter);
    }
    builder.init();
}

/// Capture log output in tests; later calls are ignored
pub fn init_for_tests() {
    let _ = env_logger::builder().is_test(true).try_init();
}
