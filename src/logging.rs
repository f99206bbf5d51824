use tracing::{debug, error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// A named, fluent logger handed to each actor.
///
/// Four levels: `debug`, `info`, `log`, `error`. Every call returns the
/// logger so reporting can be chained. Emission goes through `tracing`, so
/// whatever subscriber the host process installed decides the sink; the
/// default from [`init`] writes compact lines to stdout.
#[derive(Debug, Clone)]
pub struct Logger {
    name: String,
}

impl Logger {
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn debug(&self, message: impl AsRef<str>) -> &Self {
        debug!(logger = %self.name, "{}", message.as_ref());
        self
    }

    pub fn info(&self, message: impl AsRef<str>) -> &Self {
        info!(logger = %self.name, "{}", message.as_ref());
        self
    }

    /// Plain operational logging, one step above `info` in intent but emitted
    /// at the same severity.
    pub fn log(&self, message: impl AsRef<str>) -> &Self {
        info!(logger = %self.name, "{}", message.as_ref());
        self
    }

    pub fn error(&self, message: impl AsRef<str>) -> &Self {
        error!(logger = %self.name, "{}", message.as_ref());
        self
    }
}

/// Install the default subscriber: env-filtered, compact, stdout.
///
/// Safe to call more than once; later calls are no-ops if a global
/// subscriber is already set.
pub fn init(default_level: &str) {
    let _ = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .with_writer(std::io::stdout)
        .compact()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fluent_chaining() {
        let logger = Logger::named("test");
        logger.debug("one").info("two").log("three").error("four");
        assert_eq!(logger.name(), "test");
    }
}
