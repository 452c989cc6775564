//! Hub configuration

use std::time::Duration;

/// Configuration options for the hub
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Upper bound on any single durable-store round trip
    ///
    /// A stalled store call must not wedge the connection-accept path;
    /// an elapsed timeout surfaces as `Error::StoreUnavailable`.
    pub store_timeout: Duration,

    /// Length of the human-enterable screen code
    pub code_length: usize,

    /// How many fresh random draws to attempt when a generated code
    /// collides with the unique index
    pub code_attempts: u32,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            store_timeout: Duration::from_secs(5),
            code_length: 5,
            code_attempts: 8,
        }
    }
}

impl HubConfig {
    /// Set the store round-trip timeout
    pub fn store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    /// Set the screen code length
    pub fn code_length(mut self, length: usize) -> Self {
        self.code_length = length;
        self
    }

    /// Set the code-generation retry budget
    pub fn code_attempts(mut self, attempts: u32) -> Self {
        self.code_attempts = attempts;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = HubConfig::default();

        assert_eq!(config.store_timeout, Duration::from_secs(5));
        assert_eq!(config.code_length, 5);
        assert_eq!(config.code_attempts, 8);
    }

    #[test]
    fn test_builder_chaining() {
        let config = HubConfig::default()
            .store_timeout(Duration::from_millis(250))
            .code_length(6)
            .code_attempts(3);

        assert_eq!(config.store_timeout, Duration::from_millis(250));
        assert_eq!(config.code_length, 6);
        assert_eq!(config.code_attempts, 3);
    }
}
