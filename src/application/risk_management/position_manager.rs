use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use tracing::{error, info};
use uuid::Uuid;

use crate::application::event_bus::EventBus;
use crate::domain::errors::CoreError;
use crate::domain::events::{Event, EventPayload, EventType, PositionEventPayload};
use crate::domain::repositories::PositionRepository;
use crate::domain::trading::order::PositionSide;
use crate::domain::trading::position::Position;

/// At most one OPEN position per symbol (§4.15). All mutations persist to the repository
/// before the in-memory map is updated and an event is emitted.
pub struct PositionManager {
    repository: Arc<dyn PositionRepository>,
    event_bus: Option<EventBus>,
    open_positions: RwLock<HashMap<String, Position>>,
}

impl PositionManager {
    pub fn new(repository: Arc<dyn PositionRepository>, event_bus: Option<EventBus>) -> Self {
        Self { repository, event_bus, open_positions: RwLock::new(HashMap::new()) }
    }

    async fn persist(&self, position: &Position) -> Result<(), CoreError> {
        self.repository.save(position).await.map_err(|err| CoreError::InternalInvariant(err.to_string()))
    }

    async fn publish(&self, priority: u8, event_type: EventType, payload: EventPayload) {
        if let Some(bus) = &self.event_bus {
            bus.publish(Event::new(priority, event_type, payload, "position_manager")).await;
        }
    }

    /// Rejects a duplicate OPEN position for the same symbol.
    pub async fn open_position(
        &self,
        symbol: impl Into<String>,
        strategy: impl Into<String>,
        side: PositionSide,
        size: Decimal,
        entry_price: Decimal,
        leverage: u32,
        stop_loss: Option<Decimal>,
        take_profit: Option<Decimal>,
    ) -> Result<Position, CoreError> {
        let symbol = symbol.into();
        {
            let open = self.open_positions.read().await;
            if open.contains_key(&symbol) {
                return Err(CoreError::Validation(format!("position already open for {symbol}")));
            }
        }

        let position = Position::open(Uuid::new_v4().to_string(), symbol.clone(), strategy, side, size, entry_price, leverage, stop_loss, take_profit, Utc::now());
        self.persist(&position).await?;
        self.open_positions.write().await.insert(symbol, position.clone());

        info!(symbol = %position.symbol, side = ?position.side, size = %position.size, "position opened");
        self.publish(7, EventType::PositionOpened, EventPayload::PositionOpened(PositionEventPayload { position: position.clone() })).await;
        Ok(position)
    }

    /// Recomputes unrealized PnL at `current_price`, optionally applying a size delta (partial
    /// fill). Emits `PositionUpdated` only when size changed or price moved by more than 0.1%.
    pub async fn update_position(&self, symbol: &str, current_price: Decimal, size_change: Option<Decimal>) -> Result<Option<Position>, CoreError> {
        let mut open = self.open_positions.write().await;
        let Some(position) = open.get_mut(symbol) else { return Ok(None) };

        let prev_price = position.current_price;
        let mut size_changed = false;
        if let Some(delta) = size_change {
            if delta != Decimal::ZERO {
                size_changed = position.adjust_size(delta);
            }
        }
        position.mark(current_price);

        let price_moved = if prev_price != Decimal::ZERO {
            ((current_price - prev_price) / prev_price).abs() > Decimal::new(1, 3)
        } else {
            true
        };

        let updated = position.clone();
        drop(open);

        self.persist(&updated).await?;
        if size_changed || price_moved {
            self.publish(5, EventType::PositionUpdated, EventPayload::PositionUpdated(PositionEventPayload { position: updated.clone() })).await;
        }
        Ok(Some(updated))
    }

    /// Realizes PnL, transitions to CLOSED, persists, emits `PositionClosed`, and removes the
    /// symbol from the open map.
    pub async fn close_position(&self, symbol: &str, exit_price: Decimal, reason: Option<&str>, fees: Decimal) -> Result<Option<Position>, CoreError> {
        let mut open = self.open_positions.write().await;
        let Some(mut position) = open.remove(symbol) else { return Ok(None) };
        drop(open);

        position.close(exit_price, fees, Utc::now().timestamp_millis());
        self.persist(&position).await?;

        info!(symbol, realized_pnl = %position.realized_pnl, reason = reason.unwrap_or("unspecified"), "position closed");
        self.publish(8, EventType::PositionClosed, EventPayload::PositionClosed(PositionEventPayload { position: position.clone() })).await;
        Ok(Some(position))
    }

    /// Marks every symbol present in `prices` to its new price; returns the count updated.
    pub async fn update_all_positions(&self, prices: &HashMap<String, Decimal>) -> usize {
        let mut updated = 0;
        for (symbol, price) in prices {
            match self.update_position(symbol, *price, None).await {
                Ok(Some(_)) => updated += 1,
                Ok(None) => {}
                Err(err) => error!(symbol, %err, "failed to update position"),
            }
        }
        updated
    }

    pub async fn get_open_positions(&self) -> Vec<Position> {
        self.open_positions.read().await.values().cloned().collect()
    }

    pub async fn get_position(&self, symbol: &str) -> Option<Position> {
        self.open_positions.read().await.get(symbol).cloned()
    }

    pub async fn has_open_position(&self, symbol: &str) -> bool {
        self.open_positions.read().await.contains_key(symbol)
    }
}
