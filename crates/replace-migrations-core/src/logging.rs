//! Logging integration for replace-migrations.
//!
//! Provides helpers for configuring [`tracing`]-based logging from
//! [`Settings`](crate::settings::Settings) and for creating per-run spans.
//! Diagnostics always go to stderr so that stdout stays free for command
//! output.

use crate::settings::Settings;

/// Sets up the global tracing subscriber based on the given settings.
///
/// The log level is read from `settings.log_level` (e.g. "debug", "info",
/// "warn", "error"). In debug mode a pretty, human-readable format with file
/// and line numbers is used; otherwise a compact single-line format.
///
/// Installing a second subscriber is a no-op.
pub fn setup_logging(settings: &Settings) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_new(&settings.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    if settings.debug {
        fmt::Subscriber::builder()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .pretty()
            .try_init()
            .ok();
    } else {
        fmt::Subscriber::builder()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .compact()
            .try_init()
            .ok();
    }
}

/// Creates a tracing span for one command run.
///
/// # Examples
///
/// ```
/// use replace_migrations_core::logging::command_span;
///
/// let span = command_span("replaceallmigrations");
/// let _guard = span.enter();
/// tracing::info!("loading migrations");
/// ```
pub fn command_span(command: &str) -> tracing::Span {
    tracing::info_span!("command", name = command)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_logging_twice_is_harmless() {
        let settings = Settings {
            log_level: "not a valid filter[".to_string(),
            ..Settings::default()
        };
        setup_logging(&settings);
        setup_logging(&Settings::default());
    }

    #[test]
    fn test_command_span() {
        let span = command_span("replaceallmigrations");
        let _guard = span.enter();
        tracing::debug!("inside span");
    }
}
