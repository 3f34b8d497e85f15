//! In-process repository adapters (§6). Thread-safe, RAM-backed implementations of
//! `domain::repositories::{OrderRepository, PositionRepository}` — suitable for development and
//! single-instance deployments; data does not survive a restart.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::repositories::{OrderRepository, PositionRepository};
use crate::domain::trading::order::{Order, OrderStatus};
use crate::domain::trading::position::{Position, PositionStatus};

#[derive(Default)]
pub struct InMemoryOrderRepository {
    orders: Arc<RwLock<Vec<Order>>>,
}

impl InMemoryOrderRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn save(&self, order: &Order) -> Result<()> {
        let mut orders = self.orders.write().await;
        if let Some(existing) = orders.iter_mut().find(|o| o.order_id == order.order_id) {
            *existing = order.clone();
        } else {
            orders.push(order.clone());
        }
        Ok(())
    }

    async fn find_by_id(&self, order_id: &str) -> Result<Option<Order>> {
        Ok(self.orders.read().await.iter().find(|o| o.order_id == order_id).cloned())
    }

    async fn find_by_symbol(&self, symbol: &str) -> Result<Vec<Order>> {
        Ok(self.orders.read().await.iter().filter(|o| o.symbol == symbol).cloned().collect())
    }

    async fn find_active(&self) -> Result<Vec<Order>> {
        Ok(self.orders.read().await.iter().filter(|o| !o.status.is_terminal() || o.status == OrderStatus::PartiallyFilled).cloned().collect())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.orders.read().await.len())
    }
}

#[derive(Default)]
pub struct InMemoryPositionRepository {
    positions: Arc<RwLock<Vec<Position>>>,
}

impl InMemoryPositionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PositionRepository for InMemoryPositionRepository {
    async fn save(&self, position: &Position) -> Result<()> {
        let mut positions = self.positions.write().await;
        if let Some(existing) = positions.iter_mut().find(|p| p.id == position.id) {
            *existing = position.clone();
        } else {
            positions.push(position.clone());
        }
        Ok(())
    }

    async fn find_open_by_symbol(&self, symbol: &str) -> Result<Option<Position>> {
        Ok(self.positions.read().await.iter().find(|p| p.symbol == symbol && p.status == PositionStatus::Open).cloned())
    }

    async fn find_all_open(&self) -> Result<Vec<Position>> {
        Ok(self.positions.read().await.iter().filter(|p| p.status == PositionStatus::Open).cloned().collect())
    }

    async fn find_by_id(&self, position_id: &str) -> Result<Option<Position>> {
        Ok(self.positions.read().await.iter().find(|p| p.id == position_id).cloned())
    }
}
