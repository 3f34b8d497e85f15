use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::application::event_bus::EventBus;
use crate::domain::events::{Event, EventPayload, EventType, ExchangeErrorPayload};
use crate::domain::ports::Exchange;

#[derive(Debug, Clone, Copy, Default)]
pub struct PermissionStatus {
    pub read: bool,
    pub trade: bool,
    pub last_checked: Option<DateTime<Utc>>,
    pub last_changed: Option<DateTime<Utc>>,
    pub check_count: u64,
    pub error_count: u64,
}

impl PermissionStatus {
    fn has_changed(&self, read: bool, trade: bool) -> bool {
        self.read != read || self.trade != trade
    }

    fn apply(&mut self, read: bool, trade: bool, now: DateTime<Utc>) -> bool {
        let changed = self.has_changed(read, trade);
        if changed {
            self.last_changed = Some(now);
        }
        self.read = read;
        self.trade = trade;
        self.last_checked = Some(now);
        self.check_count += 1;
        changed
    }
}

/// TTL-cached `{read, trade}` capability with periodic re-validation (§4.19). Probes are
/// isolated: an exception from either probe is interpreted as that specific permission being
/// denied, not as a verification failure.
pub struct PermissionVerifier {
    exchange: Arc<dyn Exchange>,
    event_bus: Option<EventBus>,
    cache_ttl: Duration,
    revalidate_interval: Duration,
    max_consecutive_errors: u32,
    status: RwLock<PermissionStatus>,
    last_checked_at: RwLock<Option<tokio::time::Instant>>,
    consecutive_errors: RwLock<u32>,
    validation_task: RwLock<Option<JoinHandle<()>>>,
}

impl PermissionVerifier {
    pub fn new(exchange: Arc<dyn Exchange>, event_bus: Option<EventBus>, cache_ttl: Duration, revalidate_interval: Duration) -> Self {
        Self {
            exchange,
            event_bus,
            cache_ttl,
            revalidate_interval,
            max_consecutive_errors: 3,
            status: RwLock::new(PermissionStatus::default()),
            last_checked_at: RwLock::new(None),
            consecutive_errors: RwLock::new(0),
            validation_task: RwLock::new(None),
        }
    }

    fn is_cache_valid(last_checked_at: Option<tokio::time::Instant>, ttl: Duration) -> bool {
        match last_checked_at {
            Some(checked) => checked.elapsed() < ttl,
            None => false,
        }
    }

    /// Verifies `{read, trade}`, serving the cache unless `force_refresh` or the TTL elapsed.
    pub async fn verify_permissions(&self, force_refresh: bool) -> (bool, bool) {
        let now = Utc::now();
        {
            let status = self.status.read().await;
            let last_checked_at = *self.last_checked_at.read().await;
            if !force_refresh && Self::is_cache_valid(last_checked_at, self.cache_ttl) {
                debug!("using cached permissions");
                return (status.read, status.trade);
            }
        }

        info!("performing fresh permission verification");
        let read_permission = self.exchange.fetch_balance().await.is_ok();
        let trade_permission = self.exchange.fetch_open_orders(None).await.is_ok();

        let previous = {
            let status = self.status.read().await;
            (status.read, status.trade)
        };

        let changed = {
            let mut status = self.status.write().await;
            status.apply(read_permission, trade_permission, now)
        };
        *self.last_checked_at.write().await = Some(tokio::time::Instant::now());

        let mut consecutive = self.consecutive_errors.write().await;
        if !read_permission || !trade_permission {
            *consecutive += 1;
        } else {
            *consecutive = 0;
        }
        let consecutive_errors = *consecutive;
        drop(consecutive);

        info!(read = read_permission, trade = trade_permission, "permissions verified");

        if consecutive_errors == self.max_consecutive_errors {
            warn!(consecutive_errors, "reached max consecutive permission verification failures");
            self.emit(8, "permission_verification_failures", format!("{consecutive_errors} consecutive permission verification failures")).await;
        }

        if changed {
            self.emit(
                8,
                "permissions_changed",
                format!("read: {} -> {}, trade: {} -> {}", previous.0, read_permission, previous.1, trade_permission),
            )
            .await;
        }

        if !read_permission && !trade_permission {
            self.emit(7, "insufficient_permissions", "both read and trade permissions are denied".into()).await;
        }

        (read_permission, trade_permission)
    }

    async fn emit(&self, priority: u8, event: &str, message: String) {
        if let Some(bus) = &self.event_bus {
            bus.publish(Event::new(
                priority,
                EventType::ExchangeError,
                EventPayload::ExchangeError(ExchangeErrorPayload { symbol: None, operation: "permission_verification".into(), message, event: Some(event.to_string()) }),
                "permission_verifier",
            ))
            .await;
        }
    }

    pub async fn status(&self) -> PermissionStatus {
        *self.status.read().await
    }

    pub async fn has_read_permission(&self) -> bool {
        self.status.read().await.read
    }

    pub async fn has_trade_permission(&self) -> bool {
        self.status.read().await.trade
    }

    /// Spawns the periodic re-validation task. A second call while already running is a no-op.
    pub async fn start_periodic_validation(self: &Arc<Self>) {
        let mut task = self.validation_task.write().await;
        if task.is_some() {
            debug!("periodic validation already running");
            return;
        }
        let verifier = Arc::clone(self);
        let interval = self.revalidate_interval;
        *task = Some(tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                verifier.verify_permissions(true).await;
            }
        }));
        info!(interval_secs = interval.as_secs(), "periodic permission validation started");
    }

    pub async fn stop_periodic_validation(&self) {
        if let Some(task) = self.validation_task.write().await.take() {
            task.abort();
        }
        info!("periodic permission validation stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::{CreateOrderParams, ExchangeBalance, ExchangeOrder, ExchangePosition};
    use crate::domain::trading::order::{OrderSide, OrderType};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct Probe {
        read_ok: AtomicBool,
        trade_ok: AtomicBool,
    }

    #[async_trait]
    impl Exchange for Probe {
        async fn fetch_balance(&self) -> anyhow::Result<Vec<ExchangeBalance>> {
            if self.read_ok.load(Ordering::SeqCst) { Ok(vec![]) } else { Err(anyhow::anyhow!("denied")) }
        }
        async fn fetch_open_orders(&self, _symbol: Option<&str>) -> anyhow::Result<Vec<ExchangeOrder>> {
            if self.trade_ok.load(Ordering::SeqCst) { Ok(vec![]) } else { Err(anyhow::anyhow!("denied")) }
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
    async fn fresh_verification_grants_both_permissions() {
        let exchange = Arc::new(Probe { read_ok: AtomicBool::new(true), trade_ok: AtomicBool::new(true) });
        let verifier = PermissionVerifier::new(exchange, None, Duration::from_secs(3600), Duration::from_secs(3600));
        let (read, trade) = verifier.verify_permissions(false).await;
        assert!(read && trade);
        assert_eq!(verifier.status().await.check_count, 1);
    }

    #[tokio::test]
    async fn denied_trade_permission_is_reflected_without_error() {
        let exchange = Arc::new(Probe { read_ok: AtomicBool::new(true), trade_ok: AtomicBool::new(false) });
        let verifier = PermissionVerifier::new(exchange, None, Duration::from_secs(3600), Duration::from_secs(3600));
        let (read, trade) = verifier.verify_permissions(false).await;
        assert!(read);
        assert!(!trade);
    }

    #[tokio::test]
    async fn cached_result_is_served_within_ttl() {
        let exchange = Arc::new(Probe { read_ok: AtomicBool::new(true), trade_ok: AtomicBool::new(true) });
        let verifier = PermissionVerifier::new(exchange.clone(), None, Duration::from_secs(3600), Duration::from_secs(3600));
        verifier.verify_permissions(false).await;
        exchange.read_ok.store(false, Ordering::SeqCst);
        let (read, _) = verifier.verify_permissions(false).await;
        assert!(read, "cached value should still be reported");
        assert_eq!(verifier.status().await.check_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cache_expires_once_ttl_elapses() {
        let exchange = Arc::new(Probe { read_ok: AtomicBool::new(true), trade_ok: AtomicBool::new(true) });
        let verifier = PermissionVerifier::new(exchange.clone(), None, Duration::from_secs(60), Duration::from_secs(3600));
        verifier.verify_permissions(false).await;
        exchange.read_ok.store(false, Ordering::SeqCst);

        tokio::time::advance(Duration::from_secs(61)).await;

        let (read, _) = verifier.verify_permissions(false).await;
        assert!(!read, "TTL has elapsed, so the denial must be reflected");
        assert_eq!(verifier.status().await.check_count, 2);
    }
}
