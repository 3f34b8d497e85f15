use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::market::liquidity::LiquidityLevel;
use crate::domain::market::market_state::MarketStateData;
use crate::domain::market::sweep::LiquiditySweep;
use crate::domain::market::timeframe::Timeframe;
use crate::domain::market::structure_break::BreakOfMarketStructure;
use crate::domain::trading::order::{Order, OrderStatusChange};
use crate::domain::trading::position::Position;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    CandleReceived,
    CandleClosed,
    MarketStructureChange,
    MarketStructureBreak,
    LiquiditySweepDetected,
    OrderPlaced,
    OrderFilled,
    OrderCancelled,
    PositionOpened,
    PositionUpdated,
    PositionClosed,
    ExchangeError,
    ErrorOccurred,
    SystemStart,
    SystemStop,
}

/// Raw candle tick as received from the exchange feed, before `RealtimeCandleProcessor`
/// decides whether it closes a bar (§4.3, §6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandleReceivedPayload {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub timestamp_ms: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandleClosedPayload {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub timestamp_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketStructureChangePayload {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub previous: Option<MarketStateData>,
    pub current: MarketStateData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeErrorPayload {
    pub symbol: Option<String>,
    pub operation: String,
    pub message: String,
    pub event: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderStatusEventPayload {
    pub order: Order,
    pub change: Option<OrderStatusChange>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionEventPayload {
    pub position: Position,
}

/// Typed payload for each outbound `EventType` (§4, §6). Variant name matches `EventType`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EventPayload {
    CandleReceived(CandleReceivedPayload),
    CandleClosed(CandleClosedPayload),
    MarketStructureChange(MarketStructureChangePayload),
    MarketStructureBreak(BreakOfMarketStructure),
    LiquiditySweepDetected(LiquiditySweep),
    LiquidityLevelUpdated(LiquidityLevel),
    OrderPlaced(OrderStatusEventPayload),
    OrderFilled(OrderStatusEventPayload),
    OrderCancelled(OrderStatusEventPayload),
    PositionOpened(PositionEventPayload),
    PositionUpdated(PositionEventPayload),
    PositionClosed(PositionEventPayload),
    ExchangeError(ExchangeErrorPayload),
    ErrorOccurred(ExchangeErrorPayload),
    SystemStart { reason: String },
    SystemStop { reason: String },
}

/// Event envelope dispatched on the bus (§4.1, §6): `{priority, event_type, timestamp, data,
/// source}`. Priority is clamped to `[0, 10]` by `Event::new`; higher drains first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub priority: u8,
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    pub data: EventPayload,
    pub source: String,
}

impl Event {
    pub fn new(priority: u8, event_type: EventType, data: EventPayload, source: impl Into<String>) -> Self {
        Self {
            priority: priority.min(10),
            event_type,
            timestamp: Utc::now(),
            data,
            source: source.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_is_clamped_to_ten() {
        let event = Event::new(
            15,
            EventType::SystemStart,
            EventPayload::SystemStart { reason: "boot".into() },
            "test",
        );
        assert_eq!(event.priority, 10);
    }
}
