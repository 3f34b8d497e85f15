use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::market::timeframe::Timeframe;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LiquidityType {
    BuySide,
    SellSide,
}

/// Lifecycle of a `LiquidityLevel` (§3): `Active` on creation, `Partial` after a touch that
/// didn't close through, `Swept` terminal on close-through, `Expired` terminal on staleness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LiquidityState {
    Active,
    Partial,
    Swept,
    Expired,
}

impl LiquidityState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, LiquidityState::Swept | LiquidityState::Expired)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiquidityLevel {
    pub level_type: LiquidityType,
    pub price: Decimal,
    pub origin_timestamp_ms: i64,
    pub origin_candle_index: usize,
    pub symbol: String,
    pub timeframe: Timeframe,
    pub touch_count: u32,
    /// `[0, 100]`
    pub strength: Decimal,
    pub volume_profile: Decimal,
    pub state: LiquidityState,
    pub last_touch_ts: Option<i64>,
    pub swept_ts: Option<i64>,
}

impl LiquidityLevel {
    pub fn new(
        level_type: LiquidityType,
        price: Decimal,
        origin_timestamp_ms: i64,
        origin_candle_index: usize,
        symbol: impl Into<String>,
        timeframe: Timeframe,
        strength: Decimal,
        volume_profile: Decimal,
    ) -> Self {
        Self {
            level_type,
            price,
            origin_timestamp_ms,
            origin_candle_index,
            symbol: symbol.into(),
            timeframe,
            touch_count: 0,
            strength,
            volume_profile,
            state: LiquidityState::Active,
            last_touch_ts: None,
            swept_ts: None,
        }
    }

    pub fn is_active_or_partial(&self) -> bool {
        matches!(self.state, LiquidityState::Active | LiquidityState::Partial)
    }

    /// Transitions ACTIVE -> PARTIAL on a touch-without-close-through; increments touch_count.
    /// No-op once the level has reached a terminal state (§4.7).
    pub fn mark_touched(&mut self, ts: i64) {
        if self.state.is_terminal() {
            return;
        }
        self.touch_count += 1;
        self.last_touch_ts = Some(ts);
        self.state = LiquidityState::Partial;
    }

    /// Terminal transition on close-through (§4.7). No-op once terminal — a SWEPT level never
    /// transitions to any other state.
    pub fn mark_swept(&mut self, ts: i64) {
        if self.state.is_terminal() {
            return;
        }
        self.state = LiquidityState::Swept;
        self.swept_ts = Some(ts);
    }

    /// Ages the level out once it has gone stale without being touched or swept (§4.7
    /// supplement, grounded in `original_source/src/indicators/liquidity_zone.py`).
    pub fn expire(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        self.state = LiquidityState::Expired;
    }

    pub fn origin_datetime(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.origin_timestamp_ms).unwrap_or_else(Utc::now)
    }
}
