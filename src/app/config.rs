//! Process-level settings for the binary

/// Settings that come from the command line rather than the config file
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Verbosity level for logging
    pub verbose: u8,
    /// Filter used when no `-v` flag is given
    pub default_filter: String,
}

impl AppConfig {
    pub fn new(verbose: u8, default_filter: impl Into<String>) -> Self {
        Self {
            verbose,
            default_filter: default_filter.into(),
        }
    }

    /// Get the log filter based on verbosity
    pub fn log_level(&self) -> &str {
        match self.verbose {
            0 => &self.default_filter,
            1 => "debug",
            2 => "trace",
            _ => "trace,hyper=debug,tower=debug",
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::new(0, "info")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_overrides_configured_filter() {
        assert_eq!(AppConfig::new(0, "warn,cyclepay=info").log_level(), "warn,cyclepay=info");
        assert_eq!(AppConfig::new(1, "warn").log_level(), "debug");
        assert_eq!(AppConfig::new(2, "warn").log_level(), "trace");
        assert!(AppConfig::new(5, "warn").log_level().starts_with("trace,"));
    }
}
