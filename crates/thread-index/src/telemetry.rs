use tracing_subscriber::{fmt, EnvFilter};

pub const DEFAULT_FILTER: &str = "info";

pub fn init_tracing() -> bool {
    init_tracing_with(DEFAULT_FILTER)
}

/// Install the global compact subscriber. A valid `RUST_LOG` overrides
/// `default_filter`. Returns false when a subscriber was already installed,
/// in which case the existing one stays in place.
pub fn init_tracing_with(default_filter: &str) -> bool {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_target(true)
        .with_thread_ids(true)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).is_ok()
}
