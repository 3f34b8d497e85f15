//! Repository pattern abstractions (§6). `domain::repositories` defines the traits;
//! `infrastructure::repositories::in_memory` is the in-process adapter this core ships with.
//! A SQL-backed adapter would implement the same traits alongside it, behind the same traits.

use anyhow::Result;
use async_trait::async_trait;

use crate::domain::trading::order::Order;
use crate::domain::trading::position::Position;

#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn save(&self, order: &Order) -> Result<()>;
    async fn find_by_id(&self, order_id: &str) -> Result<Option<Order>>;
    async fn find_by_symbol(&self, symbol: &str) -> Result<Vec<Order>>;
    async fn find_active(&self) -> Result<Vec<Order>>;
    async fn count(&self) -> Result<usize>;
}

#[async_trait]
pub trait PositionRepository: Send + Sync {
    async fn save(&self, position: &Position) -> Result<()>;
    async fn find_open_by_symbol(&self, symbol: &str) -> Result<Option<Position>>;
    async fn find_all_open(&self) -> Result<Vec<Position>>;
    async fn find_by_id(&self, position_id: &str) -> Result<Option<Position>>;
}
