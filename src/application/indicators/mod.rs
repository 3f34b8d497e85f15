//! Market-structure indicator stack (§4.6-4.12): swing detection feeds liquidity zones and
//! trend recognition, which in turn feed break-of-structure detection and the market-state
//! composite, finally integrated across timeframes.

pub mod swing_detector;
pub mod liquidity_zone_engine;
pub mod liquidity_sweep_detector;
pub mod trend_recognition;
pub mod market_structure_break_detector;
pub mod market_state_tracker;
pub mod multi_timeframe_analyzer;

pub use swing_detector::SwingDetector;
pub use liquidity_zone_engine::LiquidityZoneEngine;
pub use liquidity_sweep_detector::LiquiditySweepDetector;
pub use trend_recognition::TrendRecognitionEngine;
pub use market_structure_break_detector::MarketStructureBreakDetector;
pub use market_state_tracker::MarketStateTracker;
pub use multi_timeframe_analyzer::MultiTimeframeAnalyzer;
