use tracing_subscriber::{EnvFilter, fmt};

/// Set to `json` for one JSON object per log line.
pub const LOG_FORMAT_ENV: &str = "NL2SQL_LOG_FORMAT";

/// Initializes tracing/logging based on environment variables.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let json = std::env::var(LOG_FORMAT_ENV)
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let subscriber = fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_thread_ids(false);

    if json {
        subscriber.json().flatten_event(true).init();
    } else {
        subscriber.init();
    }
}
