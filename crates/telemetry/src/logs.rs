use tracing_subscriber::{EnvFilter, fmt};

/// Installs the process-wide log subscriber. Best-effort: if a subscriber is
/// already installed (tests, embedding hosts), the existing one wins.
pub fn setup_log_subscriber() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
