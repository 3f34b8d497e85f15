use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    Market,
    Limit,
    StopLoss,
    TakeProfit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn opposite(&self) -> Self {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionSide {
    Long,
    Short,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeInForce {
    Gtc,
    Ioc,
    Fok,
}

/// Order lifecycle status (§3, §4.14). `Filled | Cancelled | Failed | Expired` are sink
/// states: once reached, an order never transitions again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Pending,
    Placed,
    PartiallyFilled,
    Filled,
    Cancelled,
    Failed,
    Expired,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Cancelled | OrderStatus::Failed | OrderStatus::Expired
        )
    }
}

/// One entry in an order's status history, appended on every mutation (§4.14).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderStatusChange {
    pub old_status: OrderStatus,
    pub new_status: OrderStatus,
    pub filled_qty: Decimal,
    pub average_price: Option<Decimal>,
    pub timestamp_ms: i64,
    pub error: Option<String>,
}

/// A not-yet-submitted order request, validated by `OrderExecutor` (§4.13) before dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub client_order_id: Option<String>,
    pub symbol: String,
    pub order_type: OrderType,
    pub side: OrderSide,
    pub quantity: Decimal,
    pub price: Option<Decimal>,
    pub stop_price: Option<Decimal>,
    pub position_side: Option<PositionSide>,
    pub time_in_force: TimeInForce,
    pub reduce_only: bool,
    pub post_only: bool,
}

impl OrderRequest {
    pub fn market(symbol: impl Into<String>, side: OrderSide, quantity: Decimal) -> Self {
        Self {
            client_order_id: Some(Uuid::new_v4().to_string()),
            symbol: symbol.into(),
            order_type: OrderType::Market,
            side,
            quantity,
            price: None,
            stop_price: None,
            position_side: None,
            time_in_force: TimeInForce::Gtc,
            reduce_only: false,
            post_only: false,
        }
    }
}

/// Tracked order (§3). `order_id` is assigned once the exchange accepts the request; before
/// that the request is only identified by `client_order_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: String,
    pub client_order_id: Option<String>,
    pub symbol: String,
    pub order_type: OrderType,
    pub side: OrderSide,
    pub quantity: Decimal,
    pub price: Option<Decimal>,
    pub stop_price: Option<Decimal>,
    pub position_side: Option<PositionSide>,
    pub time_in_force: TimeInForce,
    pub reduce_only: bool,
    pub post_only: bool,
    pub status: OrderStatus,
    pub filled_qty: Decimal,
    pub average_price: Option<Decimal>,
    pub status_history: Vec<OrderStatusChange>,
    pub created_ts: i64,
    pub updated_ts: i64,
}

impl Order {
    pub fn from_request(order_id: impl Into<String>, request: &OrderRequest, now: DateTime<Utc>) -> Self {
        let ts = now.timestamp_millis();
        Self {
            order_id: order_id.into(),
            client_order_id: request.client_order_id.clone(),
            symbol: request.symbol.clone(),
            order_type: request.order_type,
            side: request.side,
            quantity: request.quantity,
            price: request.price,
            stop_price: request.stop_price,
            position_side: request.position_side,
            time_in_force: request.time_in_force,
            reduce_only: request.reduce_only,
            post_only: request.post_only,
            status: OrderStatus::Pending,
            filled_qty: Decimal::ZERO,
            average_price: None,
            status_history: Vec::new(),
            created_ts: ts,
            updated_ts: ts,
        }
    }

    pub fn is_filled(&self) -> bool {
        self.status == OrderStatus::Filled
    }

    /// Applies a status transition, appending a history row. No-op if the order is already in
    /// a terminal state — terminal states are sink states (§3, §4.14).
    pub fn transition(
        &mut self,
        new_status: OrderStatus,
        filled_qty: Decimal,
        average_price: Option<Decimal>,
        now_ms: i64,
        error: Option<String>,
    ) {
        if self.status.is_terminal() {
            return;
        }
        let old_status = self.status;
        self.status_history.push(OrderStatusChange {
            old_status,
            new_status,
            filled_qty,
            average_price,
            timestamp_ms: now_ms,
            error,
        });
        self.status = new_status;
        self.filled_qty = filled_qty;
        if average_price.is_some() {
            self.average_price = average_price;
        }
        self.updated_ts = now_ms;
    }
}
