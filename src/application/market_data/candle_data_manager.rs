use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::application::market_data::candle_store::CandleStore;
use crate::domain::market::candle::Candle;
use crate::domain::market::timeframe::Timeframe;

/// Host resource gauges (§4.5) modeled as an injectable port rather than shelling out to
/// OS-specific APIs — only the interface matters to this core, per the out-of-scope collaborator
/// rule for external telemetry.
#[async_trait]
pub trait ResourceSampler: Send + Sync {
    async fn cpu_pct(&self) -> f64;
    async fn memory_pct(&self) -> f64;
    async fn process_memory_mb(&self) -> f64;
}

/// Fixed-value sampler for tests and environments without a real telemetry backend.
pub struct ConstantResourceSampler {
    pub cpu_pct: f64,
    pub memory_pct: f64,
    pub process_memory_mb: f64,
}

#[async_trait]
impl ResourceSampler for ConstantResourceSampler {
    async fn cpu_pct(&self) -> f64 {
        self.cpu_pct
    }
    async fn memory_pct(&self) -> f64 {
        self.memory_pct
    }
    async fn process_memory_mb(&self) -> f64 {
        self.process_memory_mb
    }
}

#[derive(Debug, Clone)]
pub struct SymbolConfig {
    pub timeframes: Vec<Timeframe>,
    pub added_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy)]
pub struct ResourceSample {
    pub cpu_pct: f64,
    pub memory_pct: f64,
    pub memory_mb: f64,
    pub process_memory_mb: f64,
    pub candle_storage_mb: f64,
    pub total_candles: usize,
    pub active_symbols: usize,
    pub active_timeframes: usize,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct DashboardState {
    pub symbols: HashMap<String, SymbolConfig>,
    pub storage: crate::application::market_data::candle_store::CandleStoreStats,
    pub processor: crate::application::market_data::realtime_processor::ProcessorStats,
    pub latest_resource_sample: Option<ResourceSample>,
    pub uptime: Duration,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryUsageSummary {
    /// `(symbol, timeframe) -> (candle_count, estimated_mb)`.
    pub per_series: HashMap<(String, Timeframe), (usize, f64)>,
}

const CPU_WARNING_THRESHOLD_PCT: f64 = 80.0;
const MEMORY_WARNING_THRESHOLD_PCT: f64 = 80.0;

/// Multi-symbol/timeframe orchestration over `CandleStore`/`RealtimeCandleProcessor`, plus
/// periodic resource monitoring (§4.5).
pub struct CandleDataManager {
    store: Arc<CandleStore>,
    processor: Arc<crate::application::market_data::realtime_processor::RealtimeCandleProcessor>,
    sampler: Arc<dyn ResourceSampler>,
    symbols: RwLock<HashMap<String, SymbolConfig>>,
    started_at: DateTime<Utc>,
    running: Arc<AtomicBool>,
    latest_sample: Arc<RwLock<Option<ResourceSample>>>,
    monitor_task: RwLock<Option<JoinHandle<()>>>,
}

impl CandleDataManager {
    pub fn new(
        store: Arc<CandleStore>,
        processor: Arc<crate::application::market_data::realtime_processor::RealtimeCandleProcessor>,
        sampler: Arc<dyn ResourceSampler>,
    ) -> Self {
        Self {
            store,
            processor,
            sampler,
            symbols: RwLock::new(HashMap::new()),
            started_at: Utc::now(),
            running: Arc::new(AtomicBool::new(false)),
            latest_sample: Arc::new(RwLock::new(None)),
            monitor_task: RwLock::new(None),
        }
    }

    /// `replace=true` overwrites the symbol's timeframe set; otherwise timeframes are merged.
    pub async fn add_symbol(&self, symbol: &str, timeframes: Vec<Timeframe>, replace: bool) {
        let symbol = symbol.to_uppercase();
        let mut symbols = self.symbols.write().await;
        match symbols.get_mut(&symbol) {
            Some(existing) if !replace => {
                let mut set: HashSet<Timeframe> = existing.timeframes.iter().copied().collect();
                set.extend(timeframes);
                existing.timeframes = set.into_iter().collect();
            }
            Some(existing) => existing.timeframes = timeframes,
            None => {
                symbols.insert(symbol, SymbolConfig { timeframes, added_at: Utc::now() });
            }
        }
    }

    /// Removes the whole symbol if `timeframes` is empty, else only the listed timeframes.
    /// Returns whether anything was actually removed.
    pub async fn remove_symbol(&self, symbol: &str, timeframes: Vec<Timeframe>, clear_data: bool) -> bool {
        let symbol = symbol.to_uppercase();
        let mut symbols = self.symbols.write().await;
        let Some(config) = symbols.get_mut(&symbol) else { return false };

        let removed = if timeframes.is_empty() {
            symbols.remove(&symbol);
            if clear_data {
                self.store.clear(Some(&symbol), None).await;
            }
            true
        } else {
            let before = config.timeframes.len();
            config.timeframes.retain(|tf| !timeframes.contains(tf));
            let removed_any = config.timeframes.len() != before;
            if clear_data {
                for tf in &timeframes {
                    self.store.clear(Some(&symbol), Some(*tf)).await;
                }
            }
            if config.timeframes.is_empty() {
                symbols.remove(&symbol);
            }
            removed_any
        };
        removed
    }

    pub async fn get_symbols(&self) -> Vec<String> {
        self.symbols.read().await.keys().cloned().collect()
    }

    pub async fn get_timeframes(&self, symbol: &str) -> Vec<Timeframe> {
        let symbol = symbol.to_uppercase();
        let mut tfs = self
            .symbols
            .read()
            .await
            .get(&symbol)
            .map(|c| c.timeframes.clone())
            .unwrap_or_default();
        tfs.sort_by_key(|tf| tf.to_minutes());
        tfs
    }

    pub async fn get_symbol_config(&self, symbol: &str) -> Option<SymbolConfig> {
        self.symbols.read().await.get(&symbol.to_uppercase()).cloned()
    }

    pub async fn get_candles(&self, symbol: &str, timeframe: Timeframe, limit: Option<usize>) -> Vec<Candle> {
        self.store.get_candles(symbol, timeframe, limit).await
    }

    pub async fn get_latest_candle(&self, symbol: &str, timeframe: Timeframe) -> Option<Candle> {
        self.store.get_latest(symbol, timeframe).await
    }

    pub async fn get_dashboard_state(&self) -> DashboardState {
        DashboardState {
            symbols: self.symbols.read().await.clone(),
            storage: self.store.get_stats().await,
            processor: self.processor.get_stats().await,
            latest_resource_sample: *self.latest_sample.read().await,
            uptime: (Utc::now() - self.started_at).to_std().unwrap_or_default(),
        }
    }

    pub async fn get_memory_usage_summary(&self) -> MemoryUsageSummary {
        let mut summary = MemoryUsageSummary::default();
        let symbols = self.symbols.read().await;
        for (symbol, config) in symbols.iter() {
            for &tf in &config.timeframes {
                let count = self.store.get_candle_count(symbol, tf).await;
                let mb = (count * 200) as f64 / (1024.0 * 1024.0);
                summary.per_series.insert((symbol.clone(), tf), (count, mb));
            }
        }
        summary
    }

    /// Triggers deferred-allocation cleanup; `aggressive` additionally drops the oldest half of
    /// each series. Returns an estimate of freed bytes.
    pub async fn optimize_memory(&self, aggressive: bool) -> usize {
        if !aggressive {
            return 0;
        }
        let stats_before = self.store.get_stats().await;
        let symbols = self.symbols.read().await.clone();
        for (symbol, config) in symbols.iter() {
            for &tf in &config.timeframes {
                let count = self.store.get_candle_count(&symbol, tf).await;
                let keep = count / 2;
                let candles = self.store.get_candles(&symbol, tf, Some(keep)).await;
                self.store.clear(Some(&symbol), Some(tf)).await;
                for candle in candles {
                    self.store.add_candle(candle).await;
                }
            }
        }
        let stats_after = self.store.get_stats().await;
        stats_before.total_candles.saturating_sub(stats_after.total_candles) * 200
    }

    /// Starts the periodic resource-monitoring task. Idempotent.
    pub async fn start_monitoring(self: &Arc<Self>, interval: Duration) {
        if self.running.swap(true, AtomicOrdering::SeqCst) {
            return;
        }
        let manager = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            while manager.running.load(AtomicOrdering::SeqCst) {
                ticker.tick().await;
                manager.sample_resources().await;
            }
        });
        *self.monitor_task.write().await = Some(handle);
    }

    pub async fn stop_monitoring(&self) {
        if !self.running.swap(false, AtomicOrdering::SeqCst) {
            return;
        }
        if let Some(handle) = self.monitor_task.write().await.take() {
            handle.abort();
        }
    }

    async fn sample_resources(&self) {
        let cpu_pct = self.sampler.cpu_pct().await;
        let memory_pct = self.sampler.memory_pct().await;
        let process_memory_mb = self.sampler.process_memory_mb().await;
        let storage_stats = self.store.get_stats().await;
        let symbols = self.symbols.read().await;

        let sample = ResourceSample {
            cpu_pct,
            memory_pct,
            memory_mb: storage_stats.memory_mb,
            process_memory_mb,
            candle_storage_mb: storage_stats.memory_mb,
            total_candles: storage_stats.total_candles,
            active_symbols: symbols.len(),
            active_timeframes: symbols.values().map(|c| c.timeframes.len()).sum(),
            timestamp: Utc::now(),
        };

        if cpu_pct > CPU_WARNING_THRESHOLD_PCT {
            warn!(cpu_pct, "candle data manager: high CPU usage");
        }
        if memory_pct > MEMORY_WARNING_THRESHOLD_PCT {
            warn!(memory_pct, "candle data manager: high memory usage");
        }

        *self.latest_sample.write().await = Some(sample);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::event_bus::EventBus;
    use crate::application::market_data::realtime_processor::RealtimeCandleProcessor;
    use rust_decimal_macros::dec;

    async fn manager() -> CandleDataManager {
        let store = Arc::new(CandleStore::new(1000));
        let bus = Arc::new(EventBus::new(100));
        let processor = Arc::new(RealtimeCandleProcessor::new(Arc::clone(&store), bus, dec!(0.10)));
        let sampler = Arc::new(ConstantResourceSampler { cpu_pct: 10.0, memory_pct: 20.0, process_memory_mb: 50.0 });
        CandleDataManager::new(store, processor, sampler)
    }

    #[tokio::test]
    async fn add_symbol_merges_timeframes_by_default() {
        let manager = manager().await;
        manager.add_symbol("btcusdt", vec![Timeframe::OneMin], false).await;
        manager.add_symbol("btcusdt", vec![Timeframe::OneHour], false).await;
        let tfs = manager.get_timeframes("BTCUSDT").await;
        assert_eq!(tfs.len(), 2);
    }

    #[tokio::test]
    async fn add_symbol_replace_overwrites_timeframes() {
        let manager = manager().await;
        manager.add_symbol("btcusdt", vec![Timeframe::OneMin, Timeframe::OneHour], false).await;
        manager.add_symbol("btcusdt", vec![Timeframe::FourHour], true).await;
        let tfs = manager.get_timeframes("BTCUSDT").await;
        assert_eq!(tfs, vec![Timeframe::FourHour]);
    }

    #[tokio::test]
    async fn remove_symbol_with_empty_list_removes_everything() {
        let manager = manager().await;
        manager.add_symbol("btcusdt", vec![Timeframe::OneMin], false).await;
        assert!(manager.remove_symbol("BTCUSDT", vec![], false).await);
        assert!(manager.get_symbols().await.is_empty());
    }
}
