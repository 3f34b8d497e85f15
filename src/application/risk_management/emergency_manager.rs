use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::application::event_bus::EventBus;
use crate::application::risk_management::order_executor::OrderExecutor;
use crate::application::risk_management::position_manager::PositionManager;
use crate::domain::events::{Event, EventPayload, EventType};
use crate::domain::trading::order::{OrderRequest, OrderSide, TimeInForce};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmergencyStatus {
    Normal,
    Liquidating,
    Paused,
}

#[derive(Debug, Clone)]
pub struct LiquidationDetail {
    pub symbol: String,
    pub succeeded: bool,
    pub order_id: Option<String>,
    pub price: Option<Decimal>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct LiquidationResult {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub details: Vec<LiquidationDetail>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct EmergencyStats {
    pub total_liquidations: u64,
    pub successful_liquidations: u64,
    pub failed_liquidations: u64,
    pub last_liquidation_ts: Option<i64>,
}

/// Three-state liquidation machine: `NORMAL -> LIQUIDATING -> PAUSED`, resumed explicitly
/// (§4.17). `orders_blocked` is a separate flag external submitters gate on.
pub struct EmergencyManager {
    position_manager: Arc<PositionManager>,
    order_executor: Arc<OrderExecutor>,
    event_bus: Option<EventBus>,
    status: RwLock<EmergencyStatus>,
    orders_blocked: AtomicBool,
    stats: RwLock<EmergencyStats>,
}

impl EmergencyManager {
    pub fn new(position_manager: Arc<PositionManager>, order_executor: Arc<OrderExecutor>, event_bus: Option<EventBus>) -> Self {
        Self {
            position_manager,
            order_executor,
            event_bus,
            status: RwLock::new(EmergencyStatus::Normal),
            orders_blocked: AtomicBool::new(false),
            stats: RwLock::new(EmergencyStats::default()),
        }
    }

    async fn publish(&self, priority: u8, reason: String) {
        if let Some(bus) = &self.event_bus {
            bus.publish(Event::new(priority, EventType::SystemStop, EventPayload::SystemStop { reason }, "emergency_manager")).await;
        }
    }

    /// Refuses if already liquidating. Transitions NORMAL/PAUSED -> LIQUIDATING, blocks new
    /// orders, submits a reduce-only market close for every open position, then transitions to
    /// PAUSED regardless of per-position outcome.
    pub async fn emergency_liquidate_all(&self, reason: &str) -> LiquidationResult {
        {
            let mut status = self.status.write().await;
            if *status == EmergencyStatus::Liquidating {
                warn!("emergency liquidation already in progress");
                return LiquidationResult::default();
            }
            *status = EmergencyStatus::Liquidating;
        }
        self.orders_blocked.store(true, Ordering::SeqCst);

        error!(reason, "EMERGENCY LIQUIDATION INITIATED");
        self.publish(10, format!("emergency_liquidation_started: {reason}")).await;

        let positions = self.position_manager.get_open_positions().await;
        if positions.is_empty() {
            info!("no open positions to liquidate");
            *self.status.write().await = EmergencyStatus::Paused;
            return LiquidationResult::default();
        }

        let total = positions.len();
        let mut successful = 0usize;
        let mut failed = 0usize;
        let mut details = Vec::with_capacity(total);

        for position in positions {
            let order_side = match position.side {
                crate::domain::trading::order::PositionSide::Long => OrderSide::Sell,
                crate::domain::trading::order::PositionSide::Short => OrderSide::Buy,
            };

            let request = OrderRequest {
                client_order_id: Some(Uuid::new_v4().to_string()),
                symbol: position.symbol.clone(),
                order_type: crate::domain::trading::order::OrderType::Market,
                side: order_side,
                quantity: position.size,
                price: None,
                stop_price: None,
                position_side: Some(position.side),
                time_in_force: TimeInForce::Gtc,
                reduce_only: true,
                post_only: false,
            };

            match self.order_executor.execute(request).await {
                Ok(order) if order.is_filled() => {
                    let exit_price = order.average_price.or(order.price).unwrap_or(position.current_price);
                    let _ = self
                        .position_manager
                        .close_position(&position.symbol, exit_price, Some(&format!("Emergency liquidation: {reason}")), Decimal::ZERO)
                        .await;
                    info!(symbol = %position.symbol, order_id = %order.order_id, "position liquidated");
                    successful += 1;
                    details.push(LiquidationDetail { symbol: position.symbol.clone(), succeeded: true, order_id: Some(order.order_id), price: Some(exit_price), error: None });
                }
                Ok(order) => {
                    error!(symbol = %position.symbol, status = ?order.status, "liquidation order not filled");
                    failed += 1;
                    details.push(LiquidationDetail { symbol: position.symbol.clone(), succeeded: false, order_id: Some(order.order_id), price: None, error: Some(format!("order not filled: {:?}", order.status)) });
                }
                Err(err) => {
                    error!(symbol = %position.symbol, %err, "liquidation order failed");
                    failed += 1;
                    details.push(LiquidationDetail { symbol: position.symbol.clone(), succeeded: false, order_id: None, price: None, error: Some(err.to_string()) });
                }
            }
        }

        {
            let mut stats = self.stats.write().await;
            stats.total_liquidations += total as u64;
            stats.successful_liquidations += successful as u64;
            stats.failed_liquidations += failed as u64;
            stats.last_liquidation_ts = Some(Utc::now().timestamp_millis());
        }

        *self.status.write().await = EmergencyStatus::Paused;
        error!(total, successful, failed, "EMERGENCY LIQUIDATION COMPLETED");
        self.publish(10, format!("emergency_liquidation_completed: total={total} successful={successful} failed={failed}")).await;

        LiquidationResult { total, successful, failed, details }
    }

    pub fn block_new_orders(&self) {
        self.orders_blocked.store(true, Ordering::SeqCst);
        warn!("new orders are now blocked");
    }

    pub fn unblock_orders(&self) {
        self.orders_blocked.store(false, Ordering::SeqCst);
        info!("new orders are now unblocked");
    }

    pub fn is_orders_blocked(&self) -> bool {
        self.orders_blocked.load(Ordering::SeqCst)
    }

    pub async fn status(&self) -> EmergencyStatus {
        *self.status.read().await
    }

    pub async fn is_paused(&self) -> bool {
        *self.status.read().await == EmergencyStatus::Paused
    }

    /// Returns to NORMAL. Only valid from PAUSED; otherwise a no-op.
    pub async fn resume(&self) {
        let mut status = self.status.write().await;
        if *status != EmergencyStatus::Paused {
            warn!(status = ?*status, "cannot resume from this status");
            return;
        }
        *status = EmergencyStatus::Normal;
        self.orders_blocked.store(false, Ordering::SeqCst);
        info!("system resumed to normal operation");
    }

    pub async fn stats(&self) -> EmergencyStats {
        *self.stats.read().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::{CreateOrderParams, Exchange, ExchangeBalance, ExchangeOrder, ExchangePosition};
    use crate::domain::repositories::PositionRepository;
    use crate::domain::trading::order::{OrderStatus, OrderType, PositionSide};
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use tokio::sync::Mutex;

    struct FillsEverything;

    #[async_trait]
    impl Exchange for FillsEverything {
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
            amount: Decimal,
            price: Option<Decimal>,
            _params: CreateOrderParams,
        ) -> anyhow::Result<ExchangeOrder> {
            Ok(ExchangeOrder {
                id: Uuid::new_v4().to_string(),
                client_order_id: None,
                status: OrderStatus::Filled,
                symbol: symbol.into(),
                order_type,
                side,
                price,
                amount,
                filled: amount,
                remaining: Decimal::ZERO,
                average: Some(dec!(100)),
                timestamp: Utc::now(),
                fee: Decimal::ZERO,
            })
        }
        async fn cancel_order(&self, id: &str, symbol: &str) -> anyhow::Result<ExchangeOrder> {
            self.create_order(symbol, OrderType::Market, OrderSide::Sell, dec!(0), None, CreateOrderParams::default()).await.map(|mut o| {
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

    #[derive(Default)]
    struct InMemoryPositions {
        saved: Mutex<Vec<crate::domain::trading::position::Position>>,
    }

    #[async_trait]
    impl PositionRepository for InMemoryPositions {
        async fn save(&self, position: &crate::domain::trading::position::Position) -> anyhow::Result<()> {
            self.saved.lock().await.push(position.clone());
            Ok(())
        }
        async fn find_open_by_symbol(&self, _symbol: &str) -> anyhow::Result<Option<crate::domain::trading::position::Position>> {
            Ok(None)
        }
        async fn find_all_open(&self) -> anyhow::Result<Vec<crate::domain::trading::position::Position>> {
            Ok(vec![])
        }
        async fn find_by_id(&self, _position_id: &str) -> anyhow::Result<Option<crate::domain::trading::position::Position>> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn liquidates_all_open_positions_and_pauses() {
        let position_manager = Arc::new(PositionManager::new(Arc::new(InMemoryPositions::default()), None));
        position_manager.open_position("BTCUSDT", "default", PositionSide::Long, dec!(1), dec!(100), 1, None, None).await.unwrap();
        position_manager.open_position("ETHUSDT", "default", PositionSide::Short, dec!(2), dec!(50), 1, None, None).await.unwrap();

        let order_executor = Arc::new(OrderExecutor::new(Arc::new(FillsEverything), None));
        let manager = EmergencyManager::new(position_manager.clone(), order_executor, None);

        let result = manager.emergency_liquidate_all("test").await;
        assert_eq!(result.total, 2);
        assert_eq!(result.successful, 2);
        assert_eq!(result.failed, 0);
        assert!(manager.is_paused().await);
        assert!(position_manager.get_open_positions().await.is_empty());
    }

    #[tokio::test]
    async fn second_call_while_liquidating_is_refused() {
        let position_manager = Arc::new(PositionManager::new(Arc::new(InMemoryPositions::default()), None));
        let order_executor = Arc::new(OrderExecutor::new(Arc::new(FillsEverything), None));
        let manager = EmergencyManager::new(position_manager, order_executor, None);

        *manager.status.write().await = EmergencyStatus::Liquidating;
        let result = manager.emergency_liquidate_all("test").await;
        assert_eq!(result.total, 0);
    }

    #[tokio::test]
    async fn resume_requires_paused_state() {
        let position_manager = Arc::new(PositionManager::new(Arc::new(InMemoryPositions::default()), None));
        let order_executor = Arc::new(OrderExecutor::new(Arc::new(FillsEverything), None));
        let manager = EmergencyManager::new(position_manager, order_executor, None);

        manager.resume().await;
        assert_eq!(manager.status().await, EmergencyStatus::Normal);
    }
}
