use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::market::timeframe::Timeframe;

/// A single OHLCV bar for one (symbol, timeframe), immutable once closed (§3).
///
/// Invariant: `low <= min(open, close) <= max(open, close) <= high`, `volume >= 0`, and
/// `timestamp_ms` is normalized to the timeframe boundary. Prices and volume are `Decimal`
/// per the crate-wide rule that only strengths, percentages, and timing use floats (§9).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub timestamp_ms: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    pub is_closed: bool,
}

/// Error returned by `Candle::new` when OHLCV values violate the ordering/sign invariant.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
#[error("invalid candle OHLCV: open={open} high={high} low={low} close={close} volume={volume}")]
pub struct InvalidCandle {
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

impl Candle {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        symbol: impl Into<String>,
        timeframe: Timeframe,
        timestamp_ms: i64,
        open: Decimal,
        high: Decimal,
        low: Decimal,
        close: Decimal,
        volume: Decimal,
        is_closed: bool,
    ) -> Result<Self, InvalidCandle> {
        let min_oc = open.min(close);
        let max_oc = open.max(close);
        if low > min_oc || max_oc > high || volume < Decimal::ZERO {
            return Err(InvalidCandle { open, high, low, close, volume });
        }
        Ok(Self {
            symbol: symbol.into().to_uppercase(),
            timeframe,
            timestamp_ms: timeframe.period_start(timestamp_ms),
            open,
            high,
            low,
            close,
            volume,
            is_closed,
        })
    }

    pub fn with_closed(mut self, is_closed: bool) -> Self {
        self.is_closed = is_closed;
        self
    }
}

/// A key identifying one candle stream: a symbol crossed with a timeframe.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SeriesKey {
    pub symbol: String,
    pub timeframe: Timeframe,
}

impl SeriesKey {
    pub fn new(symbol: impl Into<String>, timeframe: Timeframe) -> Self {
        Self { symbol: symbol.into().to_uppercase(), timeframe }
    }
}
