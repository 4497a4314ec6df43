use tracing_subscriber::EnvFilter;

/// Installs a fmt subscriber for hosts that do not bring their own. `RUST_LOG`
/// wins over `default_filter`. Returns false when a global subscriber is
/// already set.
pub fn init_tracing(default_filter: &str) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .is_ok()
}
