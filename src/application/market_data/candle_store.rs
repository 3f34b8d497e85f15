use std::collections::{HashMap, VecDeque};

use tokio::sync::RwLock;
use tracing::warn;

use crate::domain::market::candle::{Candle, SeriesKey};

/// Estimated per-candle memory footprint used for `get_stats` reporting (§4.3).
const ESTIMATED_BYTES_PER_CANDLE: usize = 200;

#[derive(Debug, Default, Clone, Copy)]
pub struct CandleStoreStats {
    pub total_candles: usize,
    pub storage_count: usize,
    pub memory_mb: f64,
}

struct Series {
    candles: VecDeque<Candle>,
}

/// Bounded per-(symbol, timeframe) ordered candle store with O(1) latest access (§4.3).
/// Candles within a series are strictly increasing in timestamp and normalized to their
/// timeframe boundary (enforced upstream by `Candle::new`).
pub struct CandleStore {
    max_candles: usize,
    series: RwLock<HashMap<SeriesKey, Series>>,
}

impl CandleStore {
    pub fn new(max_candles: usize) -> Self {
        Self { max_candles: max_candles.max(1), series: RwLock::new(HashMap::new()) }
    }

    /// Appends iff the candle is strictly newer than the series' latest. Duplicates (identical
    /// normalized timestamp and close) and out-of-order candles are rejected. Evicts the oldest
    /// candle once `max_candles` is exceeded.
    pub async fn add_candle(&self, candle: Candle) -> bool {
        let key = SeriesKey::new(candle.symbol.clone(), candle.timeframe);
        let mut series = self.series.write().await;
        let entry = series.entry(key).or_insert_with(|| Series { candles: VecDeque::new() });

        if let Some(last) = entry.candles.back() {
            if candle.timestamp_ms < last.timestamp_ms {
                warn!(symbol = %candle.symbol, "rejected out-of-order candle");
                return false;
            }
            if candle.timestamp_ms == last.timestamp_ms && candle.close == last.close {
                return false;
            }
            if candle.timestamp_ms == last.timestamp_ms {
                return false;
            }
        }

        entry.candles.push_back(candle);
        if entry.candles.len() > self.max_candles {
            entry.candles.pop_front();
        }
        true
    }

    pub async fn get_candles(&self, symbol: &str, timeframe: crate::domain::market::timeframe::Timeframe, limit: Option<usize>) -> Vec<Candle> {
        let key = SeriesKey::new(symbol, timeframe);
        let series = self.series.read().await;
        let Some(entry) = series.get(&key) else { return Vec::new() };
        match limit {
            Some(n) if n < entry.candles.len() => {
                entry.candles.iter().skip(entry.candles.len() - n).cloned().collect()
            }
            _ => entry.candles.iter().cloned().collect(),
        }
    }

    pub async fn get_latest(&self, symbol: &str, timeframe: crate::domain::market::timeframe::Timeframe) -> Option<Candle> {
        let key = SeriesKey::new(symbol, timeframe);
        self.series.read().await.get(&key).and_then(|s| s.candles.back().cloned())
    }

    pub async fn get_candle_count(&self, symbol: &str, timeframe: crate::domain::market::timeframe::Timeframe) -> usize {
        let key = SeriesKey::new(symbol, timeframe);
        self.series.read().await.get(&key).map(|s| s.candles.len()).unwrap_or(0)
    }

    /// Clears the named series, or everything when both args are `None`.
    pub async fn clear(&self, symbol: Option<&str>, timeframe: Option<crate::domain::market::timeframe::Timeframe>) {
        let mut series = self.series.write().await;
        match (symbol, timeframe) {
            (Some(symbol), Some(timeframe)) => {
                series.remove(&SeriesKey::new(symbol, timeframe));
            }
            (Some(symbol), None) => {
                series.retain(|k, _| k.symbol != symbol.to_uppercase());
            }
            _ => series.clear(),
        }
    }

    pub async fn get_stats(&self) -> CandleStoreStats {
        let series = self.series.read().await;
        let total_candles: usize = series.values().map(|s| s.candles.len()).sum();
        CandleStoreStats {
            total_candles,
            storage_count: series.len(),
            memory_mb: (total_candles * ESTIMATED_BYTES_PER_CANDLE) as f64 / (1024.0 * 1024.0),
        }
    }
}
