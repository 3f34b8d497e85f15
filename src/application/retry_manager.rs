use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::domain::errors::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryStrategy {
    Fixed,
    Linear,
    Exponential,
    Custom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ErrorClassification {
    Retryable,
    NonRetryable,
    Special,
}

/// Invoked for errors classified `SPECIAL` (§4.2), e.g. the timestamp-skew handler that calls
/// `Exchange::sync_time`.
#[async_trait]
pub trait SpecialErrorHandler: Send + Sync {
    async fn handle(&self, error: &CoreError);
}

pub struct RetryConfig {
    pub max_retries: u32,
    pub strategy: RetryStrategy,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub custom_delays: Vec<Duration>,
    /// Error kind names (`CoreError::kind_name`) explicitly retryable.
    pub retryable_kinds: HashSet<&'static str>,
    /// Checked first: explicitly non-retryable kind names win over everything else.
    pub non_retryable_kinds: HashSet<&'static str>,
    pub special_handlers: HashMap<&'static str, Arc<dyn SpecialErrorHandler>>,
    pub log_attempts: bool,
}

impl RetryConfig {
    pub fn new(strategy: RetryStrategy, max_retries: u32) -> Self {
        Self {
            max_retries,
            strategy,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            custom_delays: Vec::new(),
            retryable_kinds: HashSet::new(),
            non_retryable_kinds: HashSet::new(),
            special_handlers: HashMap::new(),
            log_attempts: true,
        }
    }
}

#[derive(Debug, Clone)]
struct RetryAttempt {
    attempt_number: u32,
    error_kind: String,
    delay: Duration,
    timestamp: DateTime<Utc>,
}

#[derive(Debug, Default, Clone)]
pub struct RetryStatistics {
    pub total_attempts: usize,
    pub total_delay: Duration,
    pub avg_delay: Duration,
    pub exception_counts: HashMap<String, u64>,
}

/// General-purpose retry wrapper (§4.2): classifies each failure, retries `RETRYABLE`/`SPECIAL`
/// errors per the configured backoff strategy, and re-raises immediately on `NON_RETRYABLE`.
pub struct RetryManager {
    config: RetryConfig,
    history: Mutex<Vec<RetryAttempt>>,
}

impl RetryManager {
    pub fn new(config: RetryConfig) -> Self {
        Self { config, history: Mutex::new(Vec::new()) }
    }

    pub async fn execute<F, Fut, T>(&self, mut operation: F) -> Result<T, CoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CoreError>>,
    {
        let mut last_error: Option<CoreError> = None;

        for attempt in 1..=self.config.max_retries.max(1) {
            if self.config.log_attempts && attempt > 1 {
                info!(attempt, max = self.config.max_retries, "retry attempt");
            }

            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    let classification = self.classify(&err);

                    if classification == ErrorClassification::NonRetryable {
                        if self.config.log_attempts {
                            error!(kind = err.kind_name(), %err, "non-retryable error");
                        }
                        return Err(err);
                    }

                    if classification == ErrorClassification::Special {
                        if let Some(handler) = self.config.special_handlers.get(err.kind_name()) {
                            handler.handle(&err).await;
                        }
                    }

                    if attempt >= self.config.max_retries {
                        if self.config.log_attempts {
                            error!(
                                attempts = self.config.max_retries,
                                kind = err.kind_name(),
                                %err,
                                "operation failed after exhausting retries"
                            );
                        }
                        return Err(err);
                    }

                    let delay = self.calculate_delay(attempt);
                    self.history.lock().await.push(RetryAttempt {
                        attempt_number: attempt,
                        error_kind: err.kind_name().to_string(),
                        delay,
                        timestamp: Utc::now(),
                    });

                    if self.config.log_attempts {
                        warn!(
                            attempt,
                            max = self.config.max_retries,
                            kind = err.kind_name(),
                            %err,
                            delay_ms = delay.as_millis() as u64,
                            "retryable error, backing off"
                        );
                    }

                    last_error = Some(err);
                    tokio::time::sleep(delay).await;
                }
            }
        }

        Err(last_error.unwrap_or_else(|| CoreError::InternalInvariant("retry loop exited without a result".into())))
    }

    /// Non-retryable kinds win first (so an explicit deny-list always overrides a retryable
    /// classification for the same kind), then special handlers, then the retryable set,
    /// defaulting to non-retryable — matching the original classifier's precedence.
    fn classify(&self, error: &CoreError) -> ErrorClassification {
        let kind = error.kind_name();
        if self.config.non_retryable_kinds.contains(kind) {
            return ErrorClassification::NonRetryable;
        }
        if self.config.special_handlers.contains_key(kind) {
            return ErrorClassification::Special;
        }
        if self.config.retryable_kinds.contains(kind) {
            return ErrorClassification::Retryable;
        }
        ErrorClassification::NonRetryable
    }

    fn calculate_delay(&self, attempt: u32) -> Duration {
        let delay = match self.config.strategy {
            RetryStrategy::Fixed => self.config.base_delay,
            RetryStrategy::Linear => self.config.base_delay * attempt,
            RetryStrategy::Exponential => self.config.base_delay * 2u32.saturating_pow(attempt - 1),
            RetryStrategy::Custom => {
                let idx = (attempt as usize).saturating_sub(1);
                self.config
                    .custom_delays
                    .get(idx)
                    .copied()
                    .or_else(|| self.config.custom_delays.last().copied())
                    .unwrap_or(self.config.base_delay)
            }
        };
        delay.min(self.config.max_delay)
    }

    pub async fn get_statistics(&self) -> RetryStatistics {
        let history = self.history.lock().await;
        if history.is_empty() {
            return RetryStatistics::default();
        }
        let total_delay: Duration = history.iter().map(|a| a.delay).sum();
        let mut exception_counts = HashMap::new();
        for attempt in history.iter() {
            *exception_counts.entry(attempt.error_kind.clone()).or_insert(0u64) += 1;
        }
        RetryStatistics {
            total_attempts: history.len(),
            total_delay,
            avg_delay: total_delay / history.len() as u32,
            exception_counts,
        }
    }

    pub async fn reset_statistics(&self) {
        self.history.lock().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn config_with(strategy: RetryStrategy, max_retries: u32) -> RetryConfig {
        let mut cfg = RetryConfig::new(strategy, max_retries);
        cfg.base_delay = Duration::from_millis(1);
        cfg.max_delay = Duration::from_millis(100);
        cfg.retryable_kinds.insert("network");
        cfg.non_retryable_kinds.insert("validation");
        cfg
    }

    #[tokio::test]
    async fn retries_retryable_error_until_success() {
        let manager = RetryManager::new(config_with(RetryStrategy::Fixed, 3));
        let attempts = AtomicU32::new(0);
        let result = manager
            .execute(|| {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(CoreError::Network("down".into()))
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_error_fails_immediately() {
        let manager = RetryManager::new(config_with(RetryStrategy::Fixed, 5));
        let attempts = AtomicU32::new(0);
        let result: Result<(), CoreError> = manager
            .execute(|| {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err(CoreError::Validation("bad input".into())) }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1, "non-retryable should not retry");
    }

    #[tokio::test]
    async fn special_handler_invoked_before_retry() {
        struct Recorder(Arc<AtomicU32>);
        #[async_trait]
        impl SpecialErrorHandler for Recorder {
            async fn handle(&self, _error: &CoreError) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }
        let calls = Arc::new(AtomicU32::new(0));
        let mut cfg = config_with(RetryStrategy::Fixed, 2);
        cfg.special_handlers.insert("exchange", Arc::new(Recorder(Arc::clone(&calls))));
        let manager = RetryManager::new(cfg);

        let attempts = AtomicU32::new(0);
        let _: Result<(), CoreError> = manager
            .execute(|| {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err(CoreError::Exchange("timestamp for this request is outside".into())) }
            })
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn exponential_backoff_doubles_and_caps_at_max_delay() {
        let manager = RetryManager::new(config_with(RetryStrategy::Exponential, 10));
        assert_eq!(manager.calculate_delay(1), Duration::from_millis(1));
        assert_eq!(manager.calculate_delay(2), Duration::from_millis(2));
        assert_eq!(manager.calculate_delay(3), Duration::from_millis(4));
        assert_eq!(manager.calculate_delay(20), Duration::from_millis(100), "capped at max_delay");
    }
}
