use std::env;
use std::time::Duration;

/// Defaults for `application::retry_manager::RetryConfig` (§4.2). Individual callers (e.g.
/// `OrderExecutor`) may still hardcode a stricter policy for their own operation.
#[derive(Debug, Clone)]
pub struct RetryEnvConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryEnvConfig {
    fn default() -> Self {
        Self { max_retries: 3, base_delay_ms: 1_000, max_delay_ms: 60_000 }
    }
}

impl RetryEnvConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(v) = env::var("RETRY_MAX_RETRIES") {
            if let Ok(parsed) = v.parse() {
                config.max_retries = parsed;
            }
        }
        if let Ok(v) = env::var("RETRY_BASE_DELAY_MS") {
            if let Ok(parsed) = v.parse() {
                config.base_delay_ms = parsed;
            }
        }
        if let Ok(v) = env::var("RETRY_MAX_DELAY_MS") {
            if let Ok(parsed) = v.parse() {
                config.max_delay_ms = parsed;
            }
        }
        config
    }

    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}
