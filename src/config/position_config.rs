use std::env;
use std::time::Duration;

/// Periodic-task intervals for position reconciliation and permission re-validation
/// (§4.16, §4.19).
#[derive(Debug, Clone, Copy)]
pub struct PositionEnvConfig {
    pub position_monitor_interval_secs: u64,
    pub permission_cache_ttl_secs: u64,
    pub permission_revalidate_interval_secs: u64,
    pub max_consecutive_permission_errors: u32,
}

impl Default for PositionEnvConfig {
    fn default() -> Self {
        Self {
            position_monitor_interval_secs: 60,
            permission_cache_ttl_secs: 3_600,
            permission_revalidate_interval_secs: 3_600,
            max_consecutive_permission_errors: 3,
        }
    }
}

impl PositionEnvConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(v) = env::var("POSITION_MONITOR_INTERVAL_SECS") {
            if let Ok(parsed) = v.parse() {
                config.position_monitor_interval_secs = parsed;
            }
        }
        if let Ok(v) = env::var("PERMISSION_CACHE_TTL_SECS") {
            if let Ok(parsed) = v.parse() {
                config.permission_cache_ttl_secs = parsed;
            }
        }
        if let Ok(v) = env::var("PERMISSION_REVALIDATE_INTERVAL_SECS") {
            if let Ok(parsed) = v.parse() {
                config.permission_revalidate_interval_secs = parsed;
            }
        }
        if let Ok(v) = env::var("MAX_CONSECUTIVE_PERMISSION_ERRORS") {
            if let Ok(parsed) = v.parse() {
                config.max_consecutive_permission_errors = parsed;
            }
        }
        config
    }

    pub fn position_monitor_interval(&self) -> Duration {
        Duration::from_secs(self.position_monitor_interval_secs)
    }

    pub fn permission_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.permission_cache_ttl_secs)
    }

    pub fn permission_revalidate_interval(&self) -> Duration {
        Duration::from_secs(self.permission_revalidate_interval_secs)
    }
}
