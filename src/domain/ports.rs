//! Exchange capability port (§6): an explicit trait boundary instead of duck-typing around a
//! concrete SDK client. `infrastructure::exchange` provides the concrete adapters.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::trading::order::{OrderSide, OrderStatus, OrderType, PositionSide, TimeInForce};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExchangePositionSide {
    Long,
    Short,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeBalance {
    pub asset: String,
    pub free: Decimal,
    pub locked: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangePosition {
    pub symbol: String,
    pub side: ExchangePositionSide,
    pub contracts: Decimal,
    pub entry_price: Decimal,
    pub mark_price: Decimal,
    pub leverage: u32,
}

#[derive(Debug, Clone, Default)]
pub struct CreateOrderParams {
    pub stop_price: Option<Decimal>,
    pub position_side: Option<PositionSide>,
    pub time_in_force: Option<TimeInForce>,
    pub reduce_only: bool,
    pub post_only: bool,
    pub client_order_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeOrder {
    pub id: String,
    pub client_order_id: Option<String>,
    pub status: OrderStatus,
    pub symbol: String,
    pub order_type: OrderType,
    pub side: OrderSide,
    pub price: Option<Decimal>,
    pub amount: Decimal,
    pub filled: Decimal,
    pub remaining: Decimal,
    pub average: Option<Decimal>,
    pub timestamp: DateTime<Utc>,
    pub fee: Decimal,
}

/// Raw execution report as relayed by the exchange's WebSocket user-data stream (§6). Field
/// names mirror the wire format (`X` broker status, `z`/`Z` cumulative filled qty/quote).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub e: String,
    pub i: String,
    pub c: Option<String>,
    pub x_status: String,
    pub z: Decimal,
    pub z_quote: Decimal,
}

#[async_trait]
pub trait Exchange: Send + Sync {
    async fn fetch_balance(&self) -> Result<Vec<ExchangeBalance>>;
    async fn fetch_open_orders(&self, symbol: Option<&str>) -> Result<Vec<ExchangeOrder>>;
    async fn fetch_positions(&self) -> Result<Vec<ExchangePosition>>;

    async fn create_order(
        &self,
        symbol: &str,
        order_type: OrderType,
        side: OrderSide,
        amount: Decimal,
        price: Option<Decimal>,
        params: CreateOrderParams,
    ) -> Result<ExchangeOrder>;

    async fn cancel_order(&self, id: &str, symbol: &str) -> Result<ExchangeOrder>;
    async fn fetch_order(&self, id: &str, symbol: &str) -> Result<ExchangeOrder>;

    /// Resynchronizes local clock skew against the exchange's server time; invoked by the
    /// timestamp special-handler in the retry classifier (§4.2, §4.13).
    async fn sync_time(&self) -> Result<()>;
}
