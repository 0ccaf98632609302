use crate::config::AuthzConfig;
use tracing_subscriber::EnvFilter;

/// Install a fmt subscriber filtered at `config.log_level`.
///
/// Does nothing if a global subscriber is already set.
pub fn init_tracing(config: &AuthzConfig) {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
