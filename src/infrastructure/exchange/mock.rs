//! Simulated exchange adapter implementing `domain::ports::Exchange` (§6). Fills every order
//! immediately at a configurable price, walks a synthetic mark price per symbol, and can be
//! told to fail the next N calls — useful for exercising `RetryManager`/`OrderExecutor` without
//! a live venue.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::RwLock;

use crate::domain::ports::{CreateOrderParams, Exchange, ExchangeBalance, ExchangeOrder, ExchangePosition, ExchangePositionSide};
use crate::domain::trading::order::{OrderSide, OrderStatus, OrderType, PositionSide};

#[derive(Debug, Clone)]
struct OpenPosition {
    side: PositionSide,
    contracts: Decimal,
    entry_price: Decimal,
    leverage: u32,
}

/// Fills immediately at the caller-supplied price (or the tracked mark price for market
/// orders). Call `fail_next` to inject exchange errors for retry/error-path tests.
pub struct MockExchange {
    mark_prices: RwLock<HashMap<String, Decimal>>,
    balances: RwLock<Vec<ExchangeBalance>>,
    positions: RwLock<HashMap<String, OpenPosition>>,
    open_orders: RwLock<Vec<ExchangeOrder>>,
    order_seq: AtomicU64,
    fail_next: Arc<std::sync::atomic::AtomicUsize>,
    fail_message: RwLock<String>,
}

impl MockExchange {
    pub fn new(initial_prices: HashMap<String, Decimal>) -> Self {
        Self {
            mark_prices: RwLock::new(initial_prices),
            balances: RwLock::new(vec![ExchangeBalance { asset: "USDT".into(), free: Decimal::new(100_000, 0), locked: Decimal::ZERO }]),
            positions: RwLock::new(HashMap::new()),
            open_orders: RwLock::new(Vec::new()),
            order_seq: AtomicU64::new(0),
            fail_next: Arc::new(std::sync::atomic::AtomicUsize::new(0)),
            fail_message: RwLock::new("exchange error".into()),
        }
    }

    /// Sets the mark price a market order or `fetch_positions` snapshot will use for `symbol`.
    pub async fn set_mark_price(&self, symbol: &str, price: Decimal) {
        self.mark_prices.write().await.insert(symbol.to_string(), price);
    }

    /// Makes the next `count` mutating calls fail with `message`, simulating exchange outages.
    pub async fn fail_next(&self, count: usize, message: impl Into<String>) {
        *self.fail_message.write().await = message.into();
        self.fail_next.store(count, Ordering::SeqCst);
    }

    async fn maybe_fail(&self) -> Result<()> {
        let remaining = self.fail_next.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_next.fetch_sub(1, Ordering::SeqCst);
            let message = self.fail_message.read().await.clone();
            return Err(anyhow!(message));
        }
        Ok(())
    }

    fn next_id(&self) -> String {
        format!("mock-{}", self.order_seq.fetch_add(1, Ordering::SeqCst))
    }
}

#[async_trait]
impl Exchange for MockExchange {
    async fn fetch_balance(&self) -> Result<Vec<ExchangeBalance>> {
        self.maybe_fail().await?;
        Ok(self.balances.read().await.clone())
    }

    async fn fetch_open_orders(&self, symbol: Option<&str>) -> Result<Vec<ExchangeOrder>> {
        self.maybe_fail().await?;
        let orders = self.open_orders.read().await;
        Ok(orders.iter().filter(|o| symbol.map_or(true, |s| o.symbol == s)).cloned().collect())
    }

    async fn fetch_positions(&self) -> Result<Vec<ExchangePosition>> {
        self.maybe_fail().await?;
        let prices = self.mark_prices.read().await;
        let positions = self.positions.read().await;
        Ok(positions
            .iter()
            .map(|(symbol, pos)| ExchangePosition {
                symbol: symbol.clone(),
                side: match pos.side {
                    PositionSide::Long => ExchangePositionSide::Long,
                    PositionSide::Short => ExchangePositionSide::Short,
                },
                contracts: pos.contracts,
                entry_price: pos.entry_price,
                mark_price: prices.get(symbol).copied().unwrap_or(pos.entry_price),
                leverage: pos.leverage,
            })
            .collect())
    }

    async fn create_order(&self, symbol: &str, order_type: OrderType, side: OrderSide, amount: Decimal, price: Option<Decimal>, params: CreateOrderParams) -> Result<ExchangeOrder> {
        self.maybe_fail().await?;

        let fill_price = match order_type {
            OrderType::Market => self.mark_prices.read().await.get(symbol).copied().unwrap_or(price.unwrap_or(Decimal::ZERO)),
            _ => price.unwrap_or_else(|| Decimal::ZERO),
        };

        if !params.reduce_only {
            let mut positions = self.positions.write().await;
            let position_side = params.position_side.unwrap_or(match side {
                OrderSide::Buy => PositionSide::Long,
                OrderSide::Sell => PositionSide::Short,
            });
            positions
                .entry(symbol.to_string())
                .and_modify(|p| p.contracts += amount)
                .or_insert(OpenPosition { side: position_side, contracts: amount, entry_price: fill_price, leverage: 1 });
        }

        Ok(ExchangeOrder {
            id: params.client_order_id.clone().unwrap_or_else(|| self.next_id()),
            client_order_id: params.client_order_id,
            status: OrderStatus::Filled,
            symbol: symbol.to_string(),
            order_type,
            side,
            price,
            amount,
            filled: amount,
            remaining: Decimal::ZERO,
            average: Some(fill_price),
            timestamp: Utc::now(),
            fee: Decimal::ZERO,
        })
    }

    async fn cancel_order(&self, id: &str, symbol: &str) -> Result<ExchangeOrder> {
        self.maybe_fail().await?;
        let mut orders = self.open_orders.write().await;
        if let Some(pos) = orders.iter().position(|o| o.id == id) {
            let mut order = orders.remove(pos);
            order.status = OrderStatus::Cancelled;
            return Ok(order);
        }
        Ok(ExchangeOrder {
            id: id.to_string(),
            client_order_id: None,
            status: OrderStatus::Cancelled,
            symbol: symbol.to_string(),
            order_type: OrderType::Market,
            side: OrderSide::Buy,
            price: None,
            amount: Decimal::ZERO,
            filled: Decimal::ZERO,
            remaining: Decimal::ZERO,
            average: None,
            timestamp: Utc::now(),
            fee: Decimal::ZERO,
        })
    }

    async fn fetch_order(&self, id: &str, symbol: &str) -> Result<ExchangeOrder> {
        self.maybe_fail().await?;
        if let Some(order) = self.open_orders.read().await.iter().find(|o| o.id == id).cloned() {
            return Ok(order);
        }
        // Every order fills synchronously in `create_order`, so a lookup miss means it was
        // already filled and not retained; report it as such rather than erroring.
        Ok(ExchangeOrder {
            id: id.to_string(),
            client_order_id: None,
            status: OrderStatus::Filled,
            symbol: symbol.to_string(),
            order_type: OrderType::Market,
            side: OrderSide::Buy,
            price: None,
            amount: Decimal::ZERO,
            filled: Decimal::ZERO,
            remaining: Decimal::ZERO,
            average: None,
            timestamp: Utc::now(),
            fee: Decimal::ZERO,
        })
    }

    async fn sync_time(&self) -> Result<()> {
        self.maybe_fail().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn market_order_fills_at_tracked_mark_price() {
        let exchange = MockExchange::new(HashMap::from([("BTCUSDT".to_string(), dec!(50000))]));
        let order = exchange.create_order("BTCUSDT", OrderType::Market, OrderSide::Buy, dec!(1), None, CreateOrderParams::default()).await.unwrap();
        assert_eq!(order.status, OrderStatus::Filled);
        assert_eq!(order.average, Some(dec!(50000)));
    }

    #[tokio::test]
    async fn fail_next_injects_errors_for_the_configured_count() {
        let exchange = MockExchange::new(HashMap::new());
        exchange.fail_next(2, "simulated outage").await;

        assert!(exchange.sync_time().await.is_err());
        assert!(exchange.sync_time().await.is_err());
        assert!(exchange.sync_time().await.is_ok());
    }

    #[tokio::test]
    async fn create_order_opens_a_tracked_position_unless_reduce_only() {
        let exchange = MockExchange::new(HashMap::from([("BTCUSDT".to_string(), dec!(100))]));
        exchange.create_order("BTCUSDT", OrderType::Market, OrderSide::Buy, dec!(2), None, CreateOrderParams::default()).await.unwrap();

        let positions = exchange.fetch_positions().await.unwrap();
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].contracts, dec!(2));

        let reduce_only = CreateOrderParams { reduce_only: true, ..Default::default() };
        exchange.create_order("BTCUSDT", OrderType::Market, OrderSide::Sell, dec!(2), None, reduce_only).await.unwrap();
        assert_eq!(exchange.fetch_positions().await.unwrap()[0].contracts, dec!(2), "reduce-only orders don't adjust the tracked position");
    }
}
