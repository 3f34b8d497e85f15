use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use rust_decimal::Decimal;
use tokio::sync::RwLock;
use tracing::debug;

use crate::application::event_bus::EventBus;
use crate::application::market_data::candle_store::CandleStore;
use crate::domain::events::{CandleClosedPayload, Event, EventPayload, EventType};
use crate::domain::market::candle::{Candle, SeriesKey};
use crate::domain::market::timeframe::Timeframe;

/// Raw `CandleReceived` payload before the timeframe string has been parsed/validated.
#[derive(Debug, Clone)]
pub struct RawCandleTick {
    pub symbol: Option<String>,
    pub timeframe: Option<String>,
    pub timestamp_ms: Option<i64>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessorStats {
    pub candles_processed: u64,
    pub candles_closed: u64,
    pub duplicates_filtered: u64,
    pub outliers_filtered: u64,
}

struct StreamState {
    last_seen_ts: i64,
    last_close: Decimal,
    in_progress: Candle,
}

/// Translates raw candle ticks into a clean stream of closed candles and `CandleClosed`
/// events (§4.4). The first tick for a (symbol, timeframe) never closes anything — it only
/// seeds the in-progress candle.
pub struct RealtimeCandleProcessor {
    store: Arc<CandleStore>,
    event_bus: Arc<EventBus>,
    outlier_threshold_pct: Decimal,
    streams: RwLock<HashMap<SeriesKey, StreamState>>,
    stats: RwLock<ProcessorStats>,
}

impl RealtimeCandleProcessor {
    pub fn new(store: Arc<CandleStore>, event_bus: Arc<EventBus>, outlier_threshold_pct: Decimal) -> Self {
        Self {
            store,
            event_bus,
            outlier_threshold_pct,
            streams: RwLock::new(HashMap::new()),
            stats: RwLock::new(ProcessorStats::default()),
        }
    }

    /// Returns `true` if the tick was accepted (whether or not it closed a prior candle).
    pub async fn process(&self, tick: RawCandleTick) -> bool {
        let (Some(symbol), Some(timeframe_str), Some(timestamp_ms)) =
            (tick.symbol.clone(), tick.timeframe.clone(), tick.timestamp_ms)
        else {
            return false;
        };
        let Ok(timeframe) = Timeframe::from_str(&timeframe_str) else {
            return false;
        };
        let Ok(candle) = Candle::new(
            symbol,
            timeframe,
            timestamp_ms,
            tick.open,
            tick.high,
            tick.low,
            tick.close,
            tick.volume,
            false,
        ) else {
            return false;
        };

        let key = SeriesKey::new(candle.symbol.clone(), candle.timeframe);
        let mut streams = self.streams.write().await;

        if let Some(state) = streams.get(&key) {
            if candle.timestamp_ms == state.last_seen_ts && candle.close == state.last_close {
                self.stats.write().await.duplicates_filtered += 1;
                return false;
            }
            if !state.last_close.is_zero() {
                let delta = (candle.close - state.last_close).abs() / state.last_close;
                if delta > self.outlier_threshold_pct {
                    self.stats.write().await.outliers_filtered += 1;
                    return false;
                }
            }
        }

        self.stats.write().await.candles_processed += 1;

        let closed_previous = match streams.get(&key) {
            Some(state) if state.last_seen_ts != candle.timestamp_ms => Some(state.in_progress.clone()),
            _ => None,
        };

        if let Some(mut closed) = closed_previous {
            closed = closed.with_closed(true);
            self.store.add_candle(closed.clone()).await;
            self.stats.write().await.candles_closed += 1;
            let event = Event::new(
                7,
                EventType::CandleClosed,
                EventPayload::CandleClosed(CandleClosedPayload {
                    symbol: closed.symbol.clone(),
                    timeframe: closed.timeframe,
                    timestamp_ms: closed.timestamp_ms,
                }),
                "realtime_candle_processor",
            );
            self.event_bus.publish(event).await;
            debug!(symbol = %closed.symbol, ?closed.timeframe, "candle closed");
        }

        streams.insert(
            key,
            StreamState { last_seen_ts: candle.timestamp_ms, last_close: candle.close, in_progress: candle },
        );
        true
    }

    pub async fn get_stats(&self) -> ProcessorStats {
        *self.stats.read().await
    }

    pub async fn active_streams(&self) -> usize {
        self.streams.read().await.len()
    }
}
