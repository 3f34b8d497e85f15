use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A fractal swing high/low detected by `SwingDetector` (§4.6). Derived; never mutated after
/// creation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SwingPoint {
    pub price: Decimal,
    pub timestamp_ms: i64,
    pub candle_index: usize,
    pub is_high: bool,
    /// The lookback `N` that produced this swing.
    pub strength: usize,
    pub volume: Decimal,
}

impl SwingPoint {
    pub fn new(
        price: Decimal,
        timestamp_ms: i64,
        candle_index: usize,
        is_high: bool,
        strength: usize,
        volume: Decimal,
    ) -> Self {
        Self { price, timestamp_ms, candle_index, is_high, strength, volume }
    }
}
