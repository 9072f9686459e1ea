use std::time::Duration;

use secrecy::SecretString;

use crate::client::consts::{BASE_URL, CONNECT_TIMEOUT_SECS, DEFAULT_CAPACITY, GEMINI_API_KEY};

/// Transport settings for a [`LiveSession`](crate::LiveSession).
pub struct ClientConfig {
    base_url: String,
    api_key: SecretString,
    capacity: usize,
    connect_timeout: Duration,
}

pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl Default for ClientConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: ClientConfig::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.config.base_url = base_url.to_string();
        self
    }

    pub fn with_api_key(mut self, api_key: &str) -> Self {
        self.config.api_key = SecretString::from(api_key.to_string());
        self
    }

    /// Size of the outbound queue and of the event broadcast buffer.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.config.capacity = capacity.max(1);
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    pub fn build(self) -> ClientConfig {
        self.config
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientConfig {
    /// Defaults, with the API key taken from `GEMINI_API_KEY` when set.
    pub fn new() -> Self {
        Self {
            base_url: BASE_URL.to_string(),
            api_key: std::env::var(GEMINI_API_KEY).unwrap_or_default().into(),
            capacity: DEFAULT_CAPACITY,
            connect_timeout: Duration::from_secs(CONNECT_TIMEOUT_SECS),
        }
    }

    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::new()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn api_key(&self) -> &SecretString {
        &self.api_key
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }
}
