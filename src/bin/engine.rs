use std::collections::HashMap;
use std::sync::Arc;

use rust_decimal_macros::dec;
use structure_core::application::event_bus::EventBus;
use structure_core::application::market_data::candle_data_manager::{CandleDataManager, ConstantResourceSampler};
use structure_core::application::market_data::candle_store::CandleStore;
use structure_core::application::market_data::realtime_processor::RealtimeCandleProcessor;
use structure_core::application::risk_management::emergency_manager::EmergencyManager;
use structure_core::application::risk_management::order_executor::OrderExecutor;
use structure_core::application::risk_management::order_tracker::OrderTracker;
use structure_core::application::risk_management::permission_verifier::PermissionVerifier;
use structure_core::application::risk_management::position_manager::PositionManager;
use structure_core::application::risk_management::position_monitor::PositionMonitor;
use structure_core::application::risk_management::take_profit_calculator::TakeProfitCalculator;
use structure_core::config::EngineConfig;
use structure_core::domain::ports::Exchange;
use structure_core::infrastructure::repositories::InMemoryPositionRepository;
use structure_core::infrastructure::MockExchange;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let config = EngineConfig::from_env()?;
    info!(max_queue_size = config.event_bus.max_queue_size, "loaded engine configuration");

    let event_bus = EventBus::new(config.event_bus.max_queue_size);
    event_bus.start().await;

    let candle_store = Arc::new(CandleStore::new(config.indicators.max_candles));
    let processor = Arc::new(RealtimeCandleProcessor::new(
        candle_store.clone(),
        Arc::new(event_bus.clone()),
        config.indicators.outlier_threshold_pct,
    ));
    let sampler = Arc::new(ConstantResourceSampler { cpu_pct: 0.0, memory_pct: 0.0, process_memory_mb: 0.0 });
    let candle_manager = Arc::new(CandleDataManager::new(candle_store, processor, sampler));
    candle_manager.start_monitoring(config.position.position_monitor_interval()).await;

    let exchange: Arc<dyn Exchange> = Arc::new(MockExchange::new(HashMap::from([
        ("BTCUSDT".to_string(), dec!(50000)),
    ])));

    let position_repository = Arc::new(InMemoryPositionRepository::new());

    let order_executor = Arc::new(OrderExecutor::new(exchange.clone(), Some(event_bus.clone())));
    let order_tracker = Arc::new(OrderTracker::new(Some(event_bus.clone()), 10_000));
    let position_manager = Arc::new(PositionManager::new(position_repository, Some(event_bus.clone())));
    let emergency_manager = Arc::new(EmergencyManager::new(position_manager.clone(), order_executor.clone(), Some(event_bus.clone())));
    let position_monitor = Arc::new(PositionMonitor::new(
        exchange.clone(),
        position_manager.clone(),
        Some(event_bus.clone()),
        config.position.position_monitor_interval(),
    ));
    let permission_verifier = Arc::new(PermissionVerifier::new(
        exchange.clone(),
        Some(event_bus.clone()),
        config.position.permission_cache_ttl(),
        config.position.permission_revalidate_interval(),
    ));
    let take_profit_calculator = TakeProfitCalculator::new(
        config.take_profit.min_risk_reward_ratio,
        TakeProfitCalculator::default_percentages(),
        config.take_profit.min_distance_pct,
        config.take_profit.max_distance_pct,
        config.take_profit.precision,
    )?;

    let recovery = position_monitor.recover_positions().await;
    info!(recovered = recovery.recovered, conflicts = recovery.conflicts.len(), "startup position recovery complete");

    position_monitor.start().await;
    permission_verifier.start_periodic_validation().await;

    let tracker_stats = order_tracker.stats().await;
    info!(
        orders_tracked = tracker_stats.currently_active,
        min_rr = %take_profit_calculator.min_risk_reward_ratio(),
        "engine ready"
    );

    // The emergency manager is held ready for an external trigger (e.g. a signal handler or
    // admin command); this binary does not expose one itself.
    let _ = emergency_manager;

    std::future::pending::<()>().await;
    Ok(())
}
