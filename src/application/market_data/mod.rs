// Candle pipeline
pub mod candle_data_manager;
pub mod candle_store;
pub mod realtime_processor;
