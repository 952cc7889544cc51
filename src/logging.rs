//! Logging set-up for the command-line front end.
//!
//! Everything goes to stderr so that generated scripts and JSON on stdout
//! stay clean.

use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "SIEVEFORM_LOG";

/// Pick the filter directive. Precedence: the `--log-level` flag, then
/// `SIEVEFORM_LOG`, then the settings file.
fn filter_directive(flag: Option<&str>, env: Option<String>, configured: &str) -> String {
    flag.map(str::to_string)
        .or(env.filter(|v| !v.trim().is_empty()))
        .unwrap_or_else(|| configured.to_string())
}

/// Install the global subscriber. A second call is a no-op; the first
/// subscriber wins.
pub fn init_logging(flag: Option<&str>, configured: &str) {
    let directive = filter_directive(flag, std::env::var(LOG_ENV).ok(), configured);
    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new("warn"));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}
