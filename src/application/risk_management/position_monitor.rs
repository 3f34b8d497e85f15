use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::application::event_bus::EventBus;
use crate::application::risk_management::position_manager::PositionManager;
use crate::domain::events::{Event, EventPayload, EventType, ExchangeErrorPayload};
use crate::domain::ports::{Exchange, ExchangePositionSide};
use crate::domain::trading::order::PositionSide;

#[derive(Debug, Clone, PartialEq)]
pub enum ReconciliationConflict {
    /// Local and exchange agree a position is open but size or entry price has drifted.
    Drifted { symbol: String, local_size: Decimal, exchange_size: Decimal, local_entry: Decimal, exchange_entry: Decimal },
    /// Tracked locally as OPEN but the exchange no longer reports it.
    Orphaned { symbol: String },
}

#[derive(Debug, Clone, Default)]
pub struct ReconciliationReport {
    pub recovered: usize,
    pub conflicts: Vec<ReconciliationConflict>,
}

fn drift_tolerance() -> Decimal {
    Decimal::new(1, 2) // 0.01
}

/// Periodic reconciliation between locally-tracked open positions and the exchange's own
/// position list (§4.16). Runs `recover_positions` once at startup, then `sync_positions` on a
/// `sync_interval` tick; conflicts are surfaced as events, never auto-resolved.
pub struct PositionMonitor {
    exchange: Arc<dyn Exchange>,
    position_manager: Arc<PositionManager>,
    event_bus: Option<EventBus>,
    sync_interval: Duration,
    sync_task: RwLock<Option<tokio::task::JoinHandle<()>>>,
}

impl PositionMonitor {
    pub fn new(exchange: Arc<dyn Exchange>, position_manager: Arc<PositionManager>, event_bus: Option<EventBus>, sync_interval: Duration) -> Self {
        Self { exchange, position_manager, event_bus, sync_interval, sync_task: RwLock::new(None) }
    }

    async fn emit_conflict(&self, conflict: &ReconciliationConflict) {
        let Some(bus) = &self.event_bus else { return };
        let (symbol, message) = match conflict {
            ReconciliationConflict::Drifted { symbol, local_size, exchange_size, local_entry, exchange_entry } => (
                symbol.clone(),
                format!("position drift on {symbol}: local size={local_size} entry={local_entry}, exchange size={exchange_size} entry={exchange_entry}"),
            ),
            ReconciliationConflict::Orphaned { symbol } => (symbol.clone(), format!("local position {symbol} is OPEN but absent from the exchange")),
        };
        bus.publish(Event::new(
            7,
            EventType::ExchangeError,
            EventPayload::ExchangeError(ExchangeErrorPayload { symbol: Some(symbol), operation: "position_reconciliation".into(), message, event: Some("position_conflict".into()) }),
            "position_monitor",
        ))
        .await;
    }

    fn exchange_side(side: ExchangePositionSide) -> PositionSide {
        match side {
            ExchangePositionSide::Long => PositionSide::Long,
            ExchangePositionSide::Short => PositionSide::Short,
        }
    }

    /// Recovers positions the exchange holds but the engine has no local record of, and flags
    /// drift/orphan conflicts for the rest. Intended to run once at startup.
    pub async fn recover_positions(&self) -> ReconciliationReport {
        let exchange_positions = match self.exchange.fetch_positions().await {
            Ok(positions) => positions,
            Err(err) => {
                warn!(%err, "failed to fetch exchange positions for recovery");
                return ReconciliationReport::default();
            }
        };

        let local_positions = self.position_manager.get_open_positions().await;
        let mut report = ReconciliationReport::default();

        for ex in &exchange_positions {
            if self.position_manager.has_open_position(&ex.symbol).await {
                continue;
            }
            let side = Self::exchange_side(ex.side);
            match self
                .position_manager
                .open_position(ex.symbol.clone(), "recovered", side, ex.contracts, ex.entry_price, ex.leverage.max(1), None, None)
                .await
            {
                Ok(_) => {
                    let _ = self.position_manager.update_position(&ex.symbol, ex.mark_price, None).await;
                    info!(symbol = %ex.symbol, "recovered untracked exchange position");
                    report.recovered += 1;
                }
                Err(err) => warn!(symbol = %ex.symbol, %err, "failed to recover exchange position"),
            }
        }

        for local in &local_positions {
            let Some(ex) = exchange_positions.iter().find(|e| e.symbol == local.symbol) else {
                let conflict = ReconciliationConflict::Orphaned { symbol: local.symbol.clone() };
                self.emit_conflict(&conflict).await;
                report.conflicts.push(conflict);
                continue;
            };

            let size_drift = if ex.contracts != Decimal::ZERO { ((local.size - ex.contracts) / ex.contracts).abs() } else { Decimal::ZERO };
            let entry_drift = if ex.entry_price != Decimal::ZERO { ((local.entry_price - ex.entry_price) / ex.entry_price).abs() } else { Decimal::ZERO };

            if size_drift > drift_tolerance() || entry_drift > drift_tolerance() {
                let conflict = ReconciliationConflict::Drifted {
                    symbol: local.symbol.clone(),
                    local_size: local.size,
                    exchange_size: ex.contracts,
                    local_entry: local.entry_price,
                    exchange_entry: ex.entry_price,
                };
                self.emit_conflict(&conflict).await;
                report.conflicts.push(conflict);
            }
        }

        report
    }

    /// Updates mark prices for every locally-open position from the exchange's current
    /// snapshot. Does not detect or resolve conflicts.
    pub async fn sync_positions(&self) -> usize {
        let exchange_positions = match self.exchange.fetch_positions().await {
            Ok(positions) => positions,
            Err(err) => {
                warn!(%err, "failed to fetch exchange positions for sync");
                return 0;
            }
        };

        let mut synced = 0;
        for ex in &exchange_positions {
            if self.position_manager.has_open_position(&ex.symbol).await {
                if self.position_manager.update_position(&ex.symbol, ex.mark_price, None).await.ok().flatten().is_some() {
                    synced += 1;
                }
            }
        }
        synced
    }

    /// Spawns the periodic sync loop. A second call while already running is a no-op.
    pub async fn start(self: &Arc<Self>) {
        let mut task = self.sync_task.write().await;
        if task.is_some() {
            return;
        }
        let monitor = Arc::clone(self);
        let interval = self.sync_interval;
        *task = Some(tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                monitor.sync_positions().await;
            }
        }));
        info!(interval_secs = self.sync_interval.as_secs(), "position monitor sync loop started");
    }

    pub async fn stop(&self) {
        if let Some(task) = self.sync_task.write().await.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::{CreateOrderParams, ExchangeBalance, ExchangeOrder};
    use crate::domain::repositories::PositionRepository;
    use crate::domain::trading::order::{OrderSide, OrderType};
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use tokio::sync::Mutex;

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

    struct FixedPositions(Vec<ExchangePosition>);

    #[async_trait]
    impl Exchange for FixedPositions {
        async fn fetch_balance(&self) -> anyhow::Result<Vec<ExchangeBalance>> {
            Ok(vec![])
        }
        async fn fetch_open_orders(&self, _symbol: Option<&str>) -> anyhow::Result<Vec<ExchangeOrder>> {
            Ok(vec![])
        }
        async fn fetch_positions(&self) -> anyhow::Result<Vec<ExchangePosition>> {
            Ok(self.0.clone())
        }
        async fn create_order(
            &self,
            _symbol: &str,
            _order_type: OrderType,
            _side: OrderSide,
            _amount: Decimal,
            _price: Option<Decimal>,
            _params: CreateOrderParams,
        ) -> anyhow::Result<ExchangeOrder> {
            unimplemented!()
        }
        async fn cancel_order(&self, _id: &str, _symbol: &str) -> anyhow::Result<ExchangeOrder> {
            unimplemented!()
        }
        async fn fetch_order(&self, _id: &str, _symbol: &str) -> anyhow::Result<ExchangeOrder> {
            unimplemented!()
        }
        async fn sync_time(&self) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn recovers_untracked_exchange_position() {
        let position_manager = Arc::new(PositionManager::new(Arc::new(InMemoryPositions::default()), None));
        let exchange = Arc::new(FixedPositions(vec![ExchangePosition {
            symbol: "BTCUSDT".into(),
            side: ExchangePositionSide::Long,
            contracts: dec!(1),
            entry_price: dec!(100),
            mark_price: dec!(105),
            leverage: 2,
        }]));
        let monitor = PositionMonitor::new(exchange, position_manager.clone(), None, Duration::from_secs(60));

        let report = monitor.recover_positions().await;
        assert_eq!(report.recovered, 1);
        assert!(report.conflicts.is_empty());
        assert!(position_manager.has_open_position("BTCUSDT").await);
    }

    #[tokio::test]
    async fn flags_size_drift_beyond_tolerance() {
        let position_manager = Arc::new(PositionManager::new(Arc::new(InMemoryPositions::default()), None));
        position_manager.open_position("BTCUSDT", "default", PositionSide::Long, dec!(1), dec!(100), 1, None, None).await.unwrap();

        let exchange = Arc::new(FixedPositions(vec![ExchangePosition {
            symbol: "BTCUSDT".into(),
            side: ExchangePositionSide::Long,
            contracts: dec!(2),
            entry_price: dec!(100),
            mark_price: dec!(100),
            leverage: 1,
        }]));
        let monitor = PositionMonitor::new(exchange, position_manager, None, Duration::from_secs(60));

        let report = monitor.recover_positions().await;
        assert_eq!(report.recovered, 0);
        assert_eq!(report.conflicts.len(), 1);
        assert!(matches!(report.conflicts[0], ReconciliationConflict::Drifted { .. }));
    }

    #[tokio::test]
    async fn flags_orphaned_local_position() {
        let position_manager = Arc::new(PositionManager::new(Arc::new(InMemoryPositions::default()), None));
        position_manager.open_position("ETHUSDT", "default", PositionSide::Long, dec!(1), dec!(100), 1, None, None).await.unwrap();

        let exchange = Arc::new(FixedPositions(vec![]));
        let monitor = PositionMonitor::new(exchange, position_manager, None, Duration::from_secs(60));

        let report = monitor.recover_positions().await;
        assert_eq!(report.conflicts.len(), 1);
        assert!(matches!(report.conflicts[0], ReconciliationConflict::Orphaned { .. }));
    }

    #[tokio::test]
    async fn sync_updates_mark_price_without_reporting_conflicts() {
        let position_manager = Arc::new(PositionManager::new(Arc::new(InMemoryPositions::default()), None));
        position_manager.open_position("BTCUSDT", "default", PositionSide::Long, dec!(1), dec!(100), 1, None, None).await.unwrap();

        let exchange = Arc::new(FixedPositions(vec![ExchangePosition {
            symbol: "BTCUSDT".into(),
            side: ExchangePositionSide::Long,
            contracts: dec!(1),
            entry_price: dec!(100),
            mark_price: dec!(120),
            leverage: 1,
        }]));
        let monitor = PositionMonitor::new(exchange, position_manager.clone(), None, Duration::from_secs(60));

        let synced = monitor.sync_positions().await;
        assert_eq!(synced, 1);
        let position = position_manager.get_position("BTCUSDT").await.unwrap();
        assert_eq!(position.current_price, dec!(120));
    }
}
