use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::application::event_bus::EventBus;
use crate::application::retry_manager::{RetryConfig, RetryManager, RetryStrategy};
use crate::domain::errors::CoreError;
use crate::domain::events::{Event, EventPayload, EventType, ExchangeErrorPayload, OrderStatusEventPayload};
use crate::domain::ports::{CreateOrderParams, Exchange, ExchangeOrder};
use crate::domain::trading::order::{Order, OrderRequest, OrderSide, OrderStatus, OrderType, TimeInForce};

#[derive(Debug, Default, Clone, Copy)]
struct LatencyStats {
    count: u64,
    total: Duration,
}

/// Validated order submission with classified retry through `RetryManager` (§4.13).
pub struct OrderExecutor {
    exchange: Arc<dyn Exchange>,
    event_bus: Option<EventBus>,
    retry_manager: RetryManager,
    order_history: Mutex<Vec<Order>>,
    latency: Mutex<HashMap<(String, OrderType, OrderSide), LatencyStats>>,
}

impl OrderExecutor {
    pub fn new(exchange: Arc<dyn Exchange>, event_bus: Option<EventBus>) -> Self {
        let mut config = RetryConfig::new(RetryStrategy::Custom, 3);
        config.custom_delays = vec![Duration::from_secs(1), Duration::from_secs(2), Duration::from_secs(5)];
        config.retryable_kinds.insert("NetworkError");
        config.non_retryable_kinds.insert("ValidationError");
        config.non_retryable_kinds.insert("InsufficientFundsError");
        config.non_retryable_kinds.insert("OrderNotFoundError");
        // Bare ExchangeError is non-retryable by default (per the design-notes carve-out);
        // `attempt_once` reclassifies a timestamp/recvwindow-flavored one to NetworkError before
        // it ever reaches this classifier, which is what actually makes it retryable.
        config.non_retryable_kinds.insert("ExchangeError");

        Self {
            exchange,
            event_bus,
            retry_manager: RetryManager::new(config),
            order_history: Mutex::new(Vec::new()),
            latency: Mutex::new(HashMap::new()),
        }
    }

    fn validate(request: &OrderRequest) -> Result<(), CoreError> {
        if request.symbol.trim().is_empty() {
            return Err(CoreError::Validation("symbol is required".into()));
        }
        if request.quantity <= rust_decimal::Decimal::ZERO {
            return Err(CoreError::Validation(format!("quantity must be positive: {}", request.quantity)));
        }
        match request.order_type {
            OrderType::Limit => {
                if !matches!(request.price, Some(p) if p > rust_decimal::Decimal::ZERO) {
                    return Err(CoreError::Validation("LIMIT order requires a valid price".into()));
                }
            }
            OrderType::StopLoss | OrderType::TakeProfit => {
                if !matches!(request.stop_price, Some(p) if p > rust_decimal::Decimal::ZERO) {
                    return Err(CoreError::Validation(format!(
                        "{:?} order requires a valid stop_price",
                        request.order_type
                    )));
                }
            }
            OrderType::Market => {}
        }
        if request.post_only && request.time_in_force != TimeInForce::Gtc {
            return Err(CoreError::Validation("post-only orders must use GTC time in force".into()));
        }
        Ok(())
    }

    /// Maps an `anyhow::Error` from the `Exchange` boundary back to a `CoreError` when the
    /// adapter raised one directly; otherwise treats it as a generic transient network failure
    /// (the retryable catch-all per §4.13).
    fn classify(err: anyhow::Error) -> CoreError {
        match err.downcast::<CoreError>() {
            Ok(core_err) => core_err,
            Err(err) => CoreError::Network(err.to_string()),
        }
    }

    async fn attempt_once(&self, request: &OrderRequest) -> Result<ExchangeOrder, CoreError> {
        let params = CreateOrderParams {
            stop_price: request.stop_price,
            position_side: request.position_side,
            time_in_force: Some(request.time_in_force),
            reduce_only: request.reduce_only,
            post_only: request.post_only,
            client_order_id: request.client_order_id.clone(),
        };

        let result = self
            .exchange
            .create_order(&request.symbol, request.order_type, request.side, request.quantity, request.price, params)
            .await;

        match result {
            Ok(order) => Ok(order),
            Err(err) => {
                let core_err = Self::classify(err);
                if let CoreError::Exchange(_) = &core_err {
                    if core_err.is_time_sync_hint() {
                        warn!(%core_err, "timestamp error detected, synchronizing clock");
                        if let Err(sync_err) = self.exchange.sync_time().await {
                            error!(%sync_err, "failed to synchronize timestamp");
                        }
                        return Err(CoreError::Network(core_err.to_string()));
                    }
                }
                Err(core_err)
            }
        }
    }

    async fn record_latency(&self, request: &OrderRequest, elapsed: Duration) {
        let key = (request.symbol.clone(), request.order_type, request.side);
        let mut latency = self.latency.lock().await;
        let stats = latency.entry(key).or_default();
        stats.count += 1;
        stats.total += elapsed;
    }

    async fn publish(&self, event: Event) {
        if let Some(bus) = &self.event_bus {
            bus.publish(event).await;
        }
    }

    /// Builds a locally-tracked `Order` for a request that never reached (or never succeeded
    /// against) the exchange, so cancellation/failure events still carry a full order record.
    fn local_order(request: &OrderRequest) -> Order {
        let id = request.client_order_id.clone().unwrap_or_else(|| Uuid::new_v4().to_string());
        Order::from_request(id, request, Utc::now())
    }

    async fn emit_cancelled(&self, request: &OrderRequest, message: String) {
        let mut order = Self::local_order(request);
        order.transition(OrderStatus::Cancelled, rust_decimal::Decimal::ZERO, None, Utc::now().timestamp_millis(), Some(message));
        let change = order.status_history.last().cloned();
        self.publish(Event::new(
            6,
            EventType::OrderCancelled,
            EventPayload::OrderCancelled(OrderStatusEventPayload { order, change }),
            "order_executor",
        ))
        .await;
    }

    async fn emit_exchange_error(&self, request: &OrderRequest, message: String) {
        self.publish(Event::new(
            9,
            EventType::ExchangeError,
            EventPayload::ExchangeError(ExchangeErrorPayload {
                symbol: Some(request.symbol.clone()),
                operation: "order_execution".into(),
                message,
                event: None,
            }),
            "order_executor",
        ))
        .await;
    }

    async fn emit_internal_error(&self, request: &OrderRequest, message: String) {
        self.publish(Event::new(
            8,
            EventType::ErrorOccurred,
            EventPayload::ErrorOccurred(ExchangeErrorPayload {
                symbol: Some(request.symbol.clone()),
                operation: "order_execution".into(),
                message,
                event: None,
            }),
            "order_executor",
        ))
        .await;
    }

    /// Validates, submits (with classified retry), records latency/history, and emits the
    /// outcome event (§4.13).
    pub async fn execute(&self, request: OrderRequest) -> Result<Order, CoreError> {
        if let Err(err) = Self::validate(&request) {
            error!(%err, "order validation failed");
            self.emit_cancelled(&request, err.to_string()).await;
            return Err(err);
        }

        let start = Instant::now();
        let result = self.retry_manager.execute(|| self.attempt_once(&request)).await;

        match result {
            Ok(exchange_order) => {
                self.record_latency(&request, start.elapsed()).await;

                let mut order = Order::from_request(exchange_order.id.clone(), &request, Utc::now());
                let now_ms = exchange_order.timestamp.timestamp_millis();
                order.transition(OrderStatus::Placed, exchange_order.filled, exchange_order.average, now_ms, None);

                self.publish(Event::new(
                    7,
                    EventType::OrderPlaced,
                    EventPayload::OrderPlaced(OrderStatusEventPayload { order: order.clone(), change: order.status_history.last().cloned() }),
                    "order_executor",
                ))
                .await;

                if exchange_order.status == OrderStatus::Filled {
                    order.transition(OrderStatus::Filled, exchange_order.filled, exchange_order.average, now_ms, None);
                    info!(order_id = %order.order_id, "order filled immediately");
                    self.publish(Event::new(
                        7,
                        EventType::OrderFilled,
                        EventPayload::OrderFilled(OrderStatusEventPayload { order: order.clone(), change: order.status_history.last().cloned() }),
                        "order_executor",
                    ))
                    .await;
                }

                self.order_history.lock().await.push(order.clone());
                info!(order_id = %order.order_id, status = ?order.status, "order executed");
                Ok(order)
            }
            Err(core_err) => {
                match &core_err {
                    CoreError::Validation(_) | CoreError::InsufficientFunds { .. } | CoreError::OrderNotFound(_) => {
                        self.emit_cancelled(&request, core_err.to_string()).await;
                    }
                    CoreError::Network(_) | CoreError::Exchange(_) => {
                        self.emit_exchange_error(&request, core_err.to_string()).await;
                    }
                    CoreError::InternalInvariant(_) => {
                        self.emit_internal_error(&request, core_err.to_string()).await;
                    }
                }
                Err(core_err)
            }
        }
    }

    pub async fn order_history(&self) -> Vec<Order> {
        self.order_history.lock().await.clone()
    }

    pub async fn clear_history(&self) {
        self.order_history.lock().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::{ExchangeBalance, ExchangePosition};
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct AlwaysSucceeds;

    #[async_trait]
    impl Exchange for AlwaysSucceeds {
        async fn fetch_balance(&self) -> anyhow::Result<Vec<ExchangeBalance>> {
            Ok(vec![])
        }
        async fn fetch_open_orders(&self, _symbol: Option<&str>) -> anyhow::Result<Vec<ExchangeOrder>> {
            Ok(vec![])
        }
        async fn fetch_positions(&self) -> anyhow::Result<Vec<ExchangePosition>> {
            Ok(vec![])
        }
        async fn create_order(
            &self,
            symbol: &str,
            order_type: OrderType,
            side: OrderSide,
            amount: rust_decimal::Decimal,
            price: Option<rust_decimal::Decimal>,
            _params: CreateOrderParams,
        ) -> anyhow::Result<ExchangeOrder> {
            Ok(ExchangeOrder {
                id: "ex-1".into(),
                client_order_id: None,
                status: OrderStatus::Filled,
                symbol: symbol.into(),
                order_type,
                side,
                price,
                amount,
                filled: amount,
                remaining: rust_decimal::Decimal::ZERO,
                average: price,
                timestamp: Utc::now(),
                fee: rust_decimal::Decimal::ZERO,
            })
        }
        async fn cancel_order(&self, id: &str, symbol: &str) -> anyhow::Result<ExchangeOrder> {
            self.create_order(symbol, OrderType::Market, OrderSide::Sell, dec!(0), None, CreateOrderParams::default())
                .await
                .map(|mut o| {
                    o.id = id.into();
                    o
                })
        }
        async fn fetch_order(&self, id: &str, symbol: &str) -> anyhow::Result<ExchangeOrder> {
            self.cancel_order(id, symbol).await
        }
        async fn sync_time(&self) -> anyhow::Result<()> {
            Ok(())
        }
    }

    struct AlwaysTimestampError {
        calls: AtomicU32,
        syncs: AtomicU32,
    }

    #[async_trait]
    impl Exchange for AlwaysTimestampError {
        async fn fetch_balance(&self) -> anyhow::Result<Vec<ExchangeBalance>> {
            Ok(vec![])
        }
        async fn fetch_open_orders(&self, _symbol: Option<&str>) -> anyhow::Result<Vec<ExchangeOrder>> {
            Ok(vec![])
        }
        async fn fetch_positions(&self) -> anyhow::Result<Vec<ExchangePosition>> {
            Ok(vec![])
        }
        async fn create_order(
            &self,
            _symbol: &str,
            _order_type: OrderType,
            _side: OrderSide,
            _amount: rust_decimal::Decimal,
            _price: Option<rust_decimal::Decimal>,
            _params: CreateOrderParams,
        ) -> anyhow::Result<ExchangeOrder> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(anyhow::anyhow!(CoreError::Exchange("Timestamp for this request is outside recvWindow".into())))
        }
        async fn cancel_order(&self, _id: &str, _symbol: &str) -> anyhow::Result<ExchangeOrder> {
            unimplemented!()
        }
        async fn fetch_order(&self, _id: &str, _symbol: &str) -> anyhow::Result<ExchangeOrder> {
            unimplemented!()
        }
        async fn sync_time(&self) -> anyhow::Result<()> {
            self.syncs.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct AlwaysBareExchangeError {
        calls: AtomicU32,
    }

    #[async_trait]
    impl Exchange for AlwaysBareExchangeError {
        async fn fetch_balance(&self) -> anyhow::Result<Vec<ExchangeBalance>> {
            Ok(vec![])
        }
        async fn fetch_open_orders(&self, _symbol: Option<&str>) -> anyhow::Result<Vec<ExchangeOrder>> {
            Ok(vec![])
        }
        async fn fetch_positions(&self) -> anyhow::Result<Vec<ExchangePosition>> {
            Ok(vec![])
        }
        async fn create_order(
            &self,
            _symbol: &str,
            _order_type: OrderType,
            _side: OrderSide,
            _amount: rust_decimal::Decimal,
            _price: Option<rust_decimal::Decimal>,
            _params: CreateOrderParams,
        ) -> anyhow::Result<ExchangeOrder> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(anyhow::anyhow!(CoreError::Exchange("insufficient margin for symbol".into())))
        }
        async fn cancel_order(&self, _id: &str, _symbol: &str) -> anyhow::Result<ExchangeOrder> {
            unimplemented!()
        }
        async fn fetch_order(&self, _id: &str, _symbol: &str) -> anyhow::Result<ExchangeOrder> {
            unimplemented!()
        }
        async fn sync_time(&self) -> anyhow::Result<()> {
            unimplemented!("bare exchange errors must not trigger a resync")
        }
    }

    #[tokio::test]
    async fn rejects_market_order_with_zero_quantity() {
        let executor = OrderExecutor::new(Arc::new(AlwaysSucceeds), None);
        let request = OrderRequest::market("BTCUSDT", OrderSide::Buy, rust_decimal::Decimal::ZERO);
        let err = executor.execute(request).await.unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[tokio::test]
    async fn successful_market_order_is_recorded_and_marked_filled() {
        let executor = OrderExecutor::new(Arc::new(AlwaysSucceeds), None);
        let request = OrderRequest::market("BTCUSDT", OrderSide::Buy, dec!(1));
        let order = executor.execute(request).await.unwrap();
        assert_eq!(order.status, OrderStatus::Filled);
        assert_eq!(executor.order_history().await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn timestamp_hinting_exchange_error_triggers_sync_and_exhausts_retries() {
        let exchange = Arc::new(AlwaysTimestampError { calls: AtomicU32::new(0), syncs: AtomicU32::new(0) });
        let executor = OrderExecutor::new(exchange.clone(), None);
        let request = OrderRequest::market("BTCUSDT", OrderSide::Buy, dec!(1));
        let err = executor.execute(request).await.unwrap_err();
        assert!(matches!(err, CoreError::Network(_)));
        assert!(exchange.syncs.load(Ordering::SeqCst) >= 1);
        assert!(exchange.calls.load(Ordering::SeqCst) > 1, "should have retried after resync");
    }

    #[tokio::test]
    async fn bare_exchange_error_is_non_retryable() {
        let exchange = Arc::new(AlwaysBareExchangeError { calls: AtomicU32::new(0) });
        let executor = OrderExecutor::new(exchange.clone(), None);
        let request = OrderRequest::market("BTCUSDT", OrderSide::Buy, dec!(1));
        let err = executor.execute(request).await.unwrap_err();
        assert!(matches!(err, CoreError::Exchange(_)));
        assert_eq!(exchange.calls.load(Ordering::SeqCst), 1, "bare ExchangeError must not retry");
    }
}
