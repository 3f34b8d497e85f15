use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::trading::order::PositionSide;

/// `Open` is the only non-terminal status; at most one `Open` position may exist per symbol
/// (§3, §4.15).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionStatus {
    Open,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: String,
    pub symbol: String,
    pub strategy: String,
    pub side: PositionSide,
    pub size: Decimal,
    pub entry_price: Decimal,
    pub current_price: Decimal,
    pub leverage: u32,
    pub unrealized_pnl: Decimal,
    pub unrealized_pnl_percent: f64,
    pub realized_pnl: Decimal,
    pub total_fees: Decimal,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
    pub status: PositionStatus,
    pub opened_ts: i64,
    pub closed_ts: Option<i64>,
}

impl Position {
    pub fn open(
        id: impl Into<String>,
        symbol: impl Into<String>,
        strategy: impl Into<String>,
        side: PositionSide,
        size: Decimal,
        entry_price: Decimal,
        leverage: u32,
        stop_loss: Option<Decimal>,
        take_profit: Option<Decimal>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            symbol: symbol.into(),
            strategy: strategy.into(),
            side,
            size,
            entry_price,
            current_price: entry_price,
            leverage: leverage.max(1),
            unrealized_pnl: Decimal::ZERO,
            unrealized_pnl_percent: 0.0,
            realized_pnl: Decimal::ZERO,
            total_fees: Decimal::ZERO,
            stop_loss,
            take_profit,
            status: PositionStatus::Open,
            opened_ts: now.timestamp_millis(),
            closed_ts: None,
        }
    }

    /// PnL at `current_price`: LONG is `(price - entry) * size`, SHORT is the negation.
    /// Percent is relative to the margin used, `(entry * size) / leverage`.
    pub fn calculate_pnl(&self, current_price: Decimal) -> (Decimal, f64) {
        if self.status == PositionStatus::Closed {
            return (self.realized_pnl, self.unrealized_pnl_percent);
        }
        let price_diff = current_price - self.entry_price;
        let pnl = match self.side {
            PositionSide::Long => price_diff * self.size,
            PositionSide::Short => -price_diff * self.size,
        };
        let position_value = (self.entry_price * self.size) / Decimal::from(self.leverage);
        let pnl_percent = if position_value > Decimal::ZERO {
            (pnl / position_value * Decimal::ONE_HUNDRED)
                .to_string()
                .parse::<f64>()
                .unwrap_or(0.0)
        } else {
            0.0
        };
        (pnl, pnl_percent)
    }

    /// Marks to `current_price` and refreshes `unrealized_pnl`/`unrealized_pnl_percent`.
    /// No-op once closed.
    pub fn mark(&mut self, current_price: Decimal) {
        if self.status == PositionStatus::Closed {
            return;
        }
        self.current_price = current_price;
        let (pnl, pnl_percent) = self.calculate_pnl(current_price);
        self.unrealized_pnl = pnl;
        self.unrealized_pnl_percent = pnl_percent;
    }

    /// Adjusts size for a partial fill (scale-in positive, scale-out negative). Rejects changes
    /// that would bring size to zero or below — full closure goes through `close`.
    pub fn adjust_size(&mut self, size_change: Decimal) -> bool {
        if self.status == PositionStatus::Closed {
            return false;
        }
        let new_size = self.size + size_change;
        if new_size <= Decimal::ZERO {
            return false;
        }
        self.size = new_size;
        true
    }

    /// Realizes PnL against exit price and fees, transitioning to `Closed`. No-op if already
    /// closed — closed is a sink state.
    pub fn close(&mut self, exit_price: Decimal, fees: Decimal, now_ms: i64) {
        if self.status == PositionStatus::Closed {
            return;
        }
        let (pnl, _) = self.calculate_pnl(exit_price);
        self.realized_pnl = pnl - fees;
        self.total_fees += fees;
        self.current_price = exit_price;
        self.unrealized_pnl = Decimal::ZERO;
        self.unrealized_pnl_percent = 0.0;
        self.status = PositionStatus::Closed;
        self.closed_ts = Some(now_ms);
    }

    pub fn is_open(&self) -> bool {
        self.status == PositionStatus::Open
    }
}
