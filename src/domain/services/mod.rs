pub mod conflict_detector;
pub mod coordinator;
pub mod decision_cache;
pub mod executor;
pub mod metrics;
pub mod profit_evaluator;
pub mod symbol_queue;
