//! Diagnostics on stderr.
//!
//! User-facing results go to stdout through [`crate::output`]. Everything
//! emitted with `tracing` lands here: warnings always, selection and crop
//! decisions only with `--verbose`.

use tracing::Level;
use tracing_subscriber::fmt;

/// Install the global subscriber. Calling it twice is harmless.
pub fn init(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::WARN };
    let _ = fmt()
        .with_max_level(level)
        .with_target(false)
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_twice_does_not_panic() {
        init(true);
        init(false);
    }
}
