//! Logging helpers
//!
//! Thin wrapper over `env_logger`; `RUST_LOG` wins over the configured level.

/// Initialise the global logger
///
/// # Parameters
///
/// * `level` - default filter used when `RUST_LOG` is not set
pub fn init_logger(level: &str) {
    let env = env_logger::Env::default()
        .filter_or("RUST_LOG", level);

    // A second initialisation (tests, embedders) is not an error for us.
    let _ = env_logger::Builder::from_env(env)
        .format_timestamp_millis()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logger_twice() {
        init_logger("debug");
        init_logger("info");
    }
}
