use log::SetLoggerError;

/// The environment variable that sets the log filter, in `env_logger` syntax.
pub const LOG_ENV: &str = "PAGEHEAP_LOG";

/// Attempt to init an env_logger for the heap, filtered by `PAGEHEAP_LOG` (falling back
/// to `RUST_LOG`, then to `info`). Does nothing if the "builtin_env_logger" feature is
/// disabled.
///
/// A runtime that has its own logger should disable the feature and install its
/// logger before building the heap. `log` messages from this crate are then routed there.
pub fn try_init() -> Result<(), SetLoggerError> {
    cfg_if::cfg_if! {
        if #[cfg(feature = "builtin_env_logger")] {
            let filter = std::env::var(LOG_ENV)
                .or_else(|_| std::env::var(env_logger::DEFAULT_FILTER_ENV))
                .unwrap_or_else(|_| "info".to_string());
            env_logger::Builder::new()
                .parse_filters(&filter)
                .format_timestamp_micros()
                .try_init()
        } else {
            Ok(())
        }
    }
}
