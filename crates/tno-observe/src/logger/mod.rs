mod config;
mod error;
mod format;
mod log;

pub use config::LoggerConfig;
pub use error::LoggerError;
pub use format::LoggerFormat;

/// Installs the global subscriber described by `cfg`. Records are written to stderr.
///
/// Fails with [`LoggerError::AlreadyInitialized`] if a global subscriber already exists.
pub fn logger_init(cfg: &LoggerConfig) -> Result<(), LoggerError> {
    log::install(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_directives() {
        assert!(log::mk_filter("info").is_ok());
        assert!(log::mk_filter("warn,tno.exec=debug").is_ok());
        assert!(matches!(
            log::mk_filter("info,tno=notalevel"),
            Err(LoggerError::InvalidLogLevel(_))
        ));
    }

    #[test]
    fn invalid_level_fails_before_install() {
        let cfg = LoggerConfig::new(LoggerFormat::Json, "tno=verbose");
        assert!(matches!(
            logger_init(&cfg),
            Err(LoggerError::InvalidLogLevel(_))
        ));
    }

    // The only test in this crate that installs a global subscriber.
    #[test]
    fn second_init_is_rejected() {
        let cfg = LoggerConfig::new(LoggerFormat::Text, "debug");
        logger_init(&cfg).unwrap();
        tracing::debug!(target: "tno.observe", "logger ready");

        assert!(matches!(
            logger_init(&cfg),
            Err(LoggerError::AlreadyInitialized)
        ));
    }
}
