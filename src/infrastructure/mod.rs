//! Adapters implementing the domain ports (§6): `exchange` backs `domain::ports::Exchange`,
//! `repositories` backs `domain::repositories::{OrderRepository, PositionRepository}`. A
//! SQL-backed repository adapter would live alongside `repositories::in_memory` here, behind the
//! same traits.

pub mod exchange;
pub mod repositories;

pub use exchange::MockExchange;
pub use repositories::{InMemoryOrderRepository, InMemoryPositionRepository};
