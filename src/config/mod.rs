//! Engine configuration (§1.1). Loaded via `dotenvy` + environment variables, following the
//! reference project's `Config::from_env()` convention, organized by component.

mod event_bus_config;
mod indicator_config;
mod position_config;
mod retry_config;
mod take_profit_config;

pub use event_bus_config::EventBusEnvConfig;
pub use indicator_config::IndicatorEnvConfig;
pub use position_config::PositionEnvConfig;
pub use retry_config::RetryEnvConfig;
pub use take_profit_config::TakeProfitEnvConfig;

use anyhow::{Context, Result};

/// Aggregates every component-tunable parameter named across §4.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub event_bus: EventBusEnvConfig,
    pub retry: RetryEnvConfig,
    pub indicators: IndicatorEnvConfig,
    pub position: PositionEnvConfig,
    pub take_profit: TakeProfitEnvConfig,
}

impl EngineConfig {
    /// Loads `.env` (if present) then reads every sub-config from the environment, falling back
    /// to each sub-config's `Default` for unset variables.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            event_bus: EventBusEnvConfig::from_env(),
            retry: RetryEnvConfig::from_env(),
            indicators: IndicatorEnvConfig::from_env().context("failed to load indicator config")?,
            position: PositionEnvConfig::from_env(),
            take_profit: TakeProfitEnvConfig::from_env().context("failed to load take-profit config")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_env_falls_back_to_defaults_when_unset() {
        let config = EngineConfig::from_env().expect("defaults must be valid");
        assert_eq!(config.event_bus.max_queue_size, 10_000);
        assert_eq!(config.indicators.pip_size, rust_decimal_macros::dec!(0.0001));
    }
}
