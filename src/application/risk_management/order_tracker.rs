use std::collections::{HashMap, VecDeque};

use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::application::event_bus::EventBus;
use crate::domain::events::{Event, EventPayload, EventType, ExchangeErrorPayload, OrderStatusEventPayload};
use crate::domain::ports::ExecutionReport;
use crate::domain::trading::order::{Order, OrderRequest, OrderStatus, OrderStatusChange};

#[derive(Debug, Default, Clone, Copy)]
pub struct OrderTrackerStats {
    pub total_tracked: u64,
    pub currently_active: usize,
    pub total_filled: u64,
    pub total_failed: u64,
    pub total_cancelled: u64,
    pub events_published: u64,
}

/// Tracks the state machine of every order from submission to a terminal status, mapping
/// broker execution reports onto it and emitting the corresponding lifecycle event (§4.14).
pub struct OrderTracker {
    event_bus: Option<EventBus>,
    max_history_size: usize,
    active_orders: RwLock<HashMap<String, Order>>,
    client_id_map: RwLock<HashMap<String, String>>,
    completed_orders: RwLock<VecDeque<Order>>,
    stats: RwLock<OrderTrackerStats>,
}

impl OrderTracker {
    pub fn new(event_bus: Option<EventBus>, max_history_size: usize) -> Self {
        Self {
            event_bus,
            max_history_size,
            active_orders: RwLock::new(HashMap::new()),
            client_id_map: RwLock::new(HashMap::new()),
            completed_orders: RwLock::new(VecDeque::new()),
            stats: RwLock::new(OrderTrackerStats::default()),
        }
    }

    /// Starts tracking a freshly-placed order. A duplicate `order_id` is a no-op, returning
    /// the order already on file.
    pub async fn track_order(&self, order_id: impl Into<String>, request: &OrderRequest) -> Order {
        let order_id = order_id.into();
        if let Some(existing) = self.active_orders.read().await.get(&order_id) {
            warn!(order_id = %order_id, "order already tracked");
            return existing.clone();
        }

        let order = Order::from_request(order_id.clone(), request, Utc::now());

        if let Some(client_id) = &order.client_order_id {
            self.client_id_map.write().await.insert(client_id.clone(), order_id.clone());
        }
        self.active_orders.write().await.insert(order_id.clone(), order.clone());

        {
            let mut stats = self.stats.write().await;
            stats.total_tracked += 1;
            stats.currently_active = self.active_orders.read().await.len();
        }

        info!(order_id = %order_id, symbol = %order.symbol, "started tracking order");
        self.publish(7, EventType::OrderPlaced, EventPayload::OrderPlaced(OrderStatusEventPayload { order: order.clone(), change: None })).await;
        order
    }

    /// Applies a status transition and emits the matching lifecycle event, finalizing
    /// (moving to history) once the order reaches a terminal state.
    pub async fn update_order_status(
        &self,
        order_id: &str,
        new_status: OrderStatus,
        filled_qty: Decimal,
        average_price: Option<Decimal>,
        error_message: Option<String>,
    ) -> Option<Order> {
        let mut active = self.active_orders.write().await;
        let order = active.get_mut(order_id)?;
        let now_ms = Utc::now().timestamp_millis();
        order.transition(new_status, filled_qty, average_price, now_ms, error_message);
        let updated = order.clone();
        drop(active);

        info!(order_id = %order_id, status = ?updated.status, "order status updated");
        self.publish_status_event(&updated).await;

        if updated.status.is_terminal() {
            self.finalize_order(order_id).await;
        }

        Some(updated)
    }

    /// Ingests a broker WebSocket `executionReport`, mapping its status letter onto
    /// `OrderStatus` and routing through `update_order_status` (§4.14, §6).
    pub async fn update_from_execution_report(&self, report: &ExecutionReport) {
        if report.e != "executionReport" {
            return;
        }

        let order_id = if self.active_orders.read().await.contains_key(&report.i) {
            report.i.clone()
        } else if let Some(client_id) = &report.c {
            self.client_id_map.read().await.get(client_id).cloned().unwrap_or_else(|| report.i.clone())
        } else {
            report.i.clone()
        };

        let new_status = match report.x_status.as_str() {
            "NEW" => OrderStatus::Placed,
            "PARTIALLY_FILLED" => OrderStatus::PartiallyFilled,
            "FILLED" => OrderStatus::Filled,
            "CANCELED" | "CANCELLED" => OrderStatus::Cancelled,
            "REJECTED" => OrderStatus::Failed,
            "EXPIRED" => OrderStatus::Expired,
            _ => OrderStatus::Pending,
        };

        let average_price = if report.z > Decimal::ZERO { Some(report.z_quote / report.z) } else { None };

        self.update_order_status(&order_id, new_status, report.z, average_price, None).await;
    }

    async fn publish_status_event(&self, order: &Order) {
        let change = order.status_history.last().cloned();
        match order.status {
            OrderStatus::Filled => {
                self.publish(8, EventType::OrderFilled, EventPayload::OrderFilled(OrderStatusEventPayload { order: order.clone(), change })).await;
                self.stats.write().await.total_filled += 1;
            }
            OrderStatus::Cancelled | OrderStatus::Expired => {
                self.publish(6, EventType::OrderCancelled, EventPayload::OrderCancelled(OrderStatusEventPayload { order: order.clone(), change })).await;
                self.stats.write().await.total_cancelled += 1;
            }
            OrderStatus::Failed => {
                let message = change.as_ref().and_then(|c: &OrderStatusChange| c.error.clone()).unwrap_or_default();
                self.publish(
                    9,
                    EventType::ErrorOccurred,
                    EventPayload::ErrorOccurred(ExchangeErrorPayload { symbol: Some(order.symbol.clone()), operation: "order_tracking".into(), message, event: None }),
                )
                .await;
                self.stats.write().await.total_failed += 1;
            }
            _ => {}
        }
    }

    async fn publish(&self, priority: u8, event_type: EventType, payload: EventPayload) {
        if let Some(bus) = &self.event_bus {
            bus.publish(Event::new(priority, event_type, payload, "order_tracker")).await;
            self.stats.write().await.events_published += 1;
        }
    }

    async fn finalize_order(&self, order_id: &str) {
        let mut active = self.active_orders.write().await;
        let Some(order) = active.remove(order_id) else { return };
        drop(active);

        if let Some(client_id) = &order.client_order_id {
            self.client_id_map.write().await.remove(client_id);
        }

        let mut completed = self.completed_orders.write().await;
        completed.push_back(order.clone());
        while completed.len() > self.max_history_size {
            completed.pop_front();
        }
        drop(completed);

        self.stats.write().await.currently_active = self.active_orders.read().await.len();
        info!(order_id = %order_id, status = ?order.status, "order finalized");
    }

    pub async fn get_order(&self, order_id: &str) -> Option<Order> {
        if let Some(order) = self.active_orders.read().await.get(order_id) {
            return Some(order.clone());
        }
        self.completed_orders.read().await.iter().rev().find(|o| o.order_id == order_id).cloned()
    }

    pub async fn get_order_by_client_id(&self, client_order_id: &str) -> Option<Order> {
        let order_id = self.client_id_map.read().await.get(client_order_id).cloned()?;
        self.get_order(&order_id).await
    }

    pub async fn active_orders(&self, symbol: Option<&str>) -> Vec<Order> {
        self.active_orders
            .read()
            .await
            .values()
            .filter(|o| symbol.map_or(true, |s| o.symbol == s))
            .cloned()
            .collect()
    }

    pub async fn completed_orders(&self, symbol: Option<&str>, limit: Option<usize>) -> Vec<Order> {
        let completed = self.completed_orders.read().await;
        let mut out: Vec<Order> = completed.iter().filter(|o| symbol.map_or(true, |s| o.symbol == s)).cloned().collect();
        if let Some(limit) = limit {
            let start = out.len().saturating_sub(limit);
            out = out.split_off(start);
        }
        out
    }

    pub async fn stats(&self) -> OrderTrackerStats {
        *self.stats.read().await
    }

    pub async fn clear_history(&self) {
        self.completed_orders.write().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::trading::order::OrderSide;
    use rust_decimal_macros::dec;

    fn request() -> OrderRequest {
        OrderRequest::market("BTCUSDT", OrderSide::Buy, dec!(1))
    }

    #[tokio::test]
    async fn tracking_then_filling_moves_order_to_history() {
        let tracker = OrderTracker::new(None, 10);
        let order = tracker.track_order("o-1", &request()).await;
        assert_eq!(order.status, OrderStatus::Pending);

        let updated = tracker.update_order_status("o-1", OrderStatus::Filled, dec!(1), Some(dec!(50000)), None).await.unwrap();
        assert_eq!(updated.status, OrderStatus::Filled);
        assert!(tracker.get_order("o-1").await.is_some());
        assert!(tracker.active_orders(None).await.is_empty());
        assert_eq!(tracker.stats().await.total_filled, 1);
    }

    #[tokio::test]
    async fn execution_report_fill_computes_average_price() {
        let tracker = OrderTracker::new(None, 10);
        tracker.track_order("o-2", &request()).await;

        let report = ExecutionReport {
            e: "executionReport".into(),
            i: "o-2".into(),
            c: None,
            x_status: "FILLED".into(),
            z: dec!(2),
            z_quote: dec!(100000),
        };
        tracker.update_from_execution_report(&report).await;

        let order = tracker.get_order("o-2").await.unwrap();
        assert_eq!(order.status, OrderStatus::Filled);
        assert_eq!(order.average_price, Some(dec!(50000)));
    }

    #[tokio::test]
    async fn duplicate_track_is_a_no_op() {
        let tracker = OrderTracker::new(None, 10);
        let first = tracker.track_order("o-3", &request()).await;
        let second = tracker.track_order("o-3", &request()).await;
        assert_eq!(first.order_id, second.order_id);
        assert_eq!(tracker.stats().await.total_tracked, 1);
    }
}
