//! Logger setup for the sigfs binaries
//!
//! `SIGFS_LOG_LEVEL` (an integer, 0-6) selects verbosity at startup and
//! takes precedence over `RUST_LOG`: 0 is silent, 6 is full tracing.

use log::LevelFilter;

/// Initialize the process-wide logger.
///
/// Safe to call more than once; only the first call takes effect.
pub fn init() {
    let mut builder = env_logger::Builder::new();
    builder.filter_level(LevelFilter::Info);
    builder.parse_default_env();

    if let Ok(value) = std::env::var("SIGFS_LOG_LEVEL") {
        builder.filter_level(level_from_env(&value));
    }

    let _ = builder.try_init();
}

fn level_from_env(value: &str) -> LevelFilter {
    match value.trim().parse::<u8>() {
        Ok(0) => LevelFilter::Off,
        Ok(1) | Ok(2) => LevelFilter::Error,
        Ok(3) => LevelFilter::Warn,
        Ok(4) => LevelFilter::Info,
        Ok(5) => LevelFilter::Debug,
        Ok(_) => LevelFilter::Trace,
        Err(_) => LevelFilter::Info,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_mapping() {
        assert_eq!(level_from_env("0"), LevelFilter::Off);
        assert_eq!(level_from_env("1"), LevelFilter::Error);
        assert_eq!(level_from_env("3"), LevelFilter::Warn);
        assert_eq!(level_from_env("4"), LevelFilter::Info);
        assert_eq!(level_from_env("5"), LevelFilter::Debug);
        assert_eq!(level_from_env("6"), LevelFilter::Trace);
        assert_eq!(level_from_env("garbage"), LevelFilter::Info);
    }
}
