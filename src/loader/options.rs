//! Loader options

use std::time::Duration;

/// Default wait for a concurrent `init()`
pub const DEFAULT_INIT_TIMEOUT: Duration = Duration::from_secs(30);

/// Options accepted by a [`super::MetaDataLoader`]
#[derive(Debug, Clone, PartialEq)]
pub struct LoaderOptions {
    /// Publish into the loader directory after initialization
    pub should_register: bool,
    /// Log each source as it loads
    pub verbose: bool,
    /// Fail initialization when the loaded graph does not validate
    pub strict: bool,
    pub init_timeout: Duration,
    pub retry_attempts: u32,
    pub retry_delay: Duration,
    /// Source locations, informational for the sources that read them
    pub source_uris: Vec<String>,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            should_register: false,
            verbose: false,
            strict: true,
            init_timeout: DEFAULT_INIT_TIMEOUT,
            retry_attempts: 3,
            retry_delay: Duration::from_millis(100),
            source_uris: Vec::new(),
        }
    }
}

impl LoaderOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_register(mut self, should_register: bool) -> Self {
        self.should_register = should_register;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn with_init_timeout(mut self, timeout: Duration) -> Self {
        self.init_timeout = timeout;
        self
    }

    pub fn with_retry(mut self, attempts: u32, delay: Duration) -> Self {
        self.retry_attempts = attempts;
        self.retry_delay = delay;
        self
    }

    pub fn with_source_uri(mut self, uri: impl Into<String>) -> Self {
        self.source_uris.push(uri.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = LoaderOptions::default();
        assert_eq!(options.init_timeout, Duration::from_secs(30));
        assert!(options.strict);
        assert!(!options.should_register);
    }

    #[test]
    fn test_builder_chain() {
        let options = LoaderOptions::new()
            .with_register(true)
            .with_retry(5, Duration::from_millis(10))
            .with_source_uri("model/acme.json");
        assert!(options.should_register);
        assert_eq!(options.retry_attempts, 5);
        assert_eq!(options.source_uris, vec!["model/acme.json".to_string()]);
    }
}
