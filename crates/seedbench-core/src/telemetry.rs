//! Tracing setup for the seedbench binary.
//!
//! Diagnostics go to stderr; stdout is reserved for command output (tables,
//! alignment JSON) so it can be piped.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Crates whose events pass the default filter.
const SEEDBENCH_TARGETS: [&str; 3] = ["seedbench", "seedbench_core", "seedbench_runner"];

/// Default directive when `RUST_LOG` is unset: seedbench crates at `level`,
/// everything else at `warn`.
pub fn default_directive(level: Level) -> String {
    let mut directive = String::from("warn");
    for target in SEEDBENCH_TARGETS {
        directive.push_str(&format!(",{target}={level}"));
    }
    directive.to_lowercase()
}

/// Install the global subscriber. Only the first call in a process has effect.
///
/// `json` switches to newline-delimited JSON with the current span list, so
/// `tag`/`seed` from the iteration span appear on every event.
pub fn init_tracing(json: bool, level: Level) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(level)));

    let registry = tracing_subscriber::registry().with(env_filter);
    let installed = if json {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(false)
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .try_init()
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .try_init()
    };
    if installed.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}
