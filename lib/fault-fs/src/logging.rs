//! Diagnostic logging for the preload library.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Installs a stderr subscriber filtered by `directive`, e.g.
/// `fault_fs=debug`. Nothing is installed when `directive` is `None`, so a
/// process under test sees no extra output unless the harness asks for it.
///
/// Returns `false` if another subscriber was already installed.
pub fn init(directive: Option<&str>) -> bool {
    let Some(directive) = directive else {
        return false;
    };

    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_ansi(false)
        .with_thread_ids(true)
        .with_writer(std::io::stderr)
        .compact();

    let filter_layer = EnvFilter::builder().parse_lossy(directive);

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .try_init()
        .is_ok()
}
