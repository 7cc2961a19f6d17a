use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

/// Filter override, e.g. `QDRIVER_LOG=qdriver::engine=debug`.
pub const LOG_ENV: &str = "QDRIVER_LOG";
/// When set to a path, all debug output goes to that file instead of stderr.
pub const DEBUG_FILE_ENV: &str = "QDRIVER_DEBUG";

/// Install the global subscriber. Standard output is reserved for the report,
/// so logs never go there.
pub fn init(verbose: bool) {
    if let Some(file) = open_debug_file() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::new("debug"))
            .with_writer(Mutex::new(file))
            .with_ansi(false)
            .try_init();
        return;
    }

    let default_level = if verbose { "debug" } else { "warn" };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn open_debug_file() -> Option<std::fs::File> {
    std::env::var_os(DEBUG_FILE_ENV).and_then(|path| {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)
            .ok()
    })
}
