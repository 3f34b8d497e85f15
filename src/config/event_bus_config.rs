use std::env;

/// Tunables for `application::event_bus::EventBus` (§4.1).
#[derive(Debug, Clone, Copy)]
pub struct EventBusEnvConfig {
    pub max_queue_size: usize,
}

impl Default for EventBusEnvConfig {
    fn default() -> Self {
        Self { max_queue_size: 10_000 }
    }
}

impl EventBusEnvConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(v) = env::var("EVENT_BUS_MAX_QUEUE_SIZE") {
            if let Ok(parsed) = v.parse() {
                config.max_queue_size = parsed;
            }
        }
        config
    }
}
