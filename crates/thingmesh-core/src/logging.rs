//! Logging initialisation.

use tracing_subscriber::EnvFilter;

use crate::config::env_vars;

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins when set; otherwise thingmesh crates log at `info`
/// (`debug` when `verbose`). Set `THINGMESH_LOG_JSON=true` for JSON lines.
/// Calling this more than once is harmless.
pub fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("thingmesh={level}"))
            .add_directive(tracing::Level::WARN.into())
    });

    let result = if env_vars::log_json() {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .try_init()
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_thread_ids(false)
            .compact()
            .try_init()
    };

    if result.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}
