//! Adaptive cache and query telemetry.
//!
//! - [`QueryCache`]: bounded TTL cache with LRU, FIFO or TTL-oldest eviction
//! - [`QueryTelemetry`]: running latency aggregates per query
//! - [`QueryAdvisor`]: rule-based optimization hints

pub mod advisor;
pub mod policy;
pub mod store;
pub mod telemetry;

pub use advisor::{
    ExplainInfo, MissingIndexRule, MissingLimitRule, NPlusOneRule, OptimizationRule, QueryAdvisor,
    QueryShape, Suggestion, WildcardProjectionRule,
};
pub use policy::EvictionPolicy;
pub use store::{CacheStats, QueryCache};
pub use telemetry::{PerformanceSnapshot, QueryMetric, QueryTelemetry};
