use tracing::metadata::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter, e.g. `KTRON_LOG=ktron=debug`.
pub const LOG_ENV: &str = "KTRON_LOG";

pub fn filter_from_env() -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .with_env_var(LOG_ENV)
        .from_env_lossy()
}

/// Install the global subscriber. Logs go to stderr so tables on stdout stay clean.
pub fn init() {
    tracing_subscriber::fmt()
        .with_env_filter(filter_from_env())
        .with_writer(std::io::stderr)
        .init();
}
