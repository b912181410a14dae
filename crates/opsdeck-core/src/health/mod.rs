//! Operations health.
//!
//! The [`HealthAggregator`] polls every component concurrently, each
//! sub-check under its own deadline, and turns the result into a
//! [`HealthReport`] with threshold alerts. Scans record alerts in the
//! [`AlertLog`] and a summary point in the [`TrendHistory`]; the
//! [`Monitor`] runs scans on an interval.

pub mod aggregator;
pub mod alerts;
pub mod monitor;
pub mod report;
pub mod trends;

pub use aggregator::{HealthAggregator, HealthSources};
pub use alerts::{Alert, AlertLog, AlertSeverity};
pub use monitor::Monitor;
pub use report::{AlertCandidate, DatabaseReport, HealthReport, PerformanceReport};
pub use trends::{TrendHistory, TrendPoint};
