//! Query latency telemetry.
//!
//! Keeps a running aggregate per distinct query text. Queries are keyed by
//! their whitespace-normalized text, so formatting differences collapse into
//! one metric.

use std::collections::HashMap;
use std::time::Instant;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Running aggregate for one query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryMetric {
    /// Normalized query text.
    pub query: String,
    /// Number of recorded executions.
    pub count: u64,
    /// Sum of execution times in milliseconds.
    pub total_time: f64,
    /// `total_time / count`.
    pub avg_time: f64,
    /// Slowest execution in milliseconds.
    pub max_time: f64,
    /// When the query was last recorded.
    pub last_seen: DateTime<Utc>,
}

/// Aggregate performance over all recorded queries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceSnapshot {
    /// Average execution time across every call, in milliseconds.
    pub query_time: f64,
    /// Total recorded executions.
    pub total_queries: u64,
    /// Executions per second since start or the last reset.
    pub throughput: f64,
}

/// Collects per-query latency aggregates.
pub struct QueryTelemetry {
    metrics: RwLock<HashMap<String, QueryMetric>>,
    window_start: RwLock<Instant>,
}

impl QueryTelemetry {
    /// Create an empty collector.
    pub fn new() -> Self {
        Self {
            metrics: RwLock::new(HashMap::new()),
            window_start: RwLock::new(Instant::now()),
        }
    }

    /// Record one execution of `query` taking `duration_ms`.
    pub fn record(&self, query: &str, duration_ms: f64) {
        let key = normalize_query(query);
        let now = Utc::now();

        let mut metrics = self.metrics.write();
        let metric = metrics.entry(key.clone()).or_insert_with(|| QueryMetric {
            query: key,
            count: 0,
            total_time: 0.0,
            avg_time: 0.0,
            max_time: 0.0,
            last_seen: now,
        });
        metric.count += 1;
        metric.total_time += duration_ms;
        metric.avg_time = metric.total_time / metric.count as f64;
        metric.max_time = metric.max_time.max(duration_ms);
        metric.last_seen = now;
    }

    /// Aggregate for one query, if recorded.
    pub fn get(&self, query: &str) -> Option<QueryMetric> {
        self.metrics.read().get(&normalize_query(query)).cloned()
    }

    /// Queries whose average time exceeds `threshold_ms`, slowest first.
    pub fn slow_queries(&self, threshold_ms: f64) -> Vec<QueryMetric> {
        let mut slow: Vec<QueryMetric> = self
            .metrics
            .read()
            .values()
            .filter(|m| m.avg_time > threshold_ms)
            .cloned()
            .collect();
        slow.sort_by(|a, b| b.avg_time.total_cmp(&a.avg_time));
        slow
    }

    /// The `n` queries with the highest total time.
    pub fn top(&self, n: usize) -> Vec<QueryMetric> {
        let mut all: Vec<QueryMetric> = self.metrics.read().values().cloned().collect();
        all.sort_by(|a, b| b.total_time.total_cmp(&a.total_time));
        all.truncate(n);
        all
    }

    /// Overall averages and throughput.
    pub fn snapshot(&self) -> PerformanceSnapshot {
        let elapsed = self.window_start.read().elapsed().as_secs_f64();
        let metrics = self.metrics.read();

        let total_queries: u64 = metrics.values().map(|m| m.count).sum();
        let total_time: f64 = metrics.values().map(|m| m.total_time).sum();

        PerformanceSnapshot {
            query_time: if total_queries > 0 {
                total_time / total_queries as f64
            } else {
                0.0
            },
            total_queries,
            throughput: total_queries as f64 / elapsed.max(1.0),
        }
    }

    /// Drop every aggregate and restart the throughput window.
    pub fn reset(&self) {
        self.metrics.write().clear();
        *self.window_start.write() = Instant::now();
    }

    /// Number of distinct queries recorded.
    pub fn len(&self) -> usize {
        self.metrics.read().len()
    }

    /// Check if nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for QueryTelemetry {
    fn default() -> Self {
        Self::new()
    }
}

fn normalize_query(query: &str) -> String {
    query.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_running_average() {
        let telemetry = QueryTelemetry::new();
        telemetry.record("SELECT * FROM projects", 1200.0);
        telemetry.record("SELECT * FROM projects", 800.0);

        let metric = telemetry.get("SELECT * FROM projects").unwrap();
        assert_eq!(metric.count, 2);
        assert!((metric.avg_time - 1000.0).abs() < f64::EPSILON);
        assert!((metric.max_time - 1200.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_whitespace_normalized_key() {
        let telemetry = QueryTelemetry::new();
        telemetry.record("SELECT id\n  FROM ideas", 10.0);
        telemetry.record("SELECT id FROM ideas", 20.0);
        assert_eq!(telemetry.len(), 1);
        assert_eq!(telemetry.get("SELECT  id FROM   ideas").unwrap().count, 2);
    }

    #[test]
    fn test_slow_queries_sorted_desc() {
        let telemetry = QueryTelemetry::new();
        telemetry.record("q1", 150.0);
        telemetry.record("q2", 900.0);
        telemetry.record("q3", 50.0);
        telemetry.record("q4", 400.0);

        let slow: Vec<String> = telemetry
            .slow_queries(100.0)
            .into_iter()
            .map(|m| m.query)
            .collect();
        assert_eq!(slow, vec!["q2", "q4", "q1"]);
    }

    #[test]
    fn test_snapshot_and_reset() {
        let telemetry = QueryTelemetry::new();
        assert_eq!(telemetry.snapshot().query_time, 0.0);

        telemetry.record("a", 100.0);
        telemetry.record("a", 300.0);
        telemetry.record("b", 200.0);

        let snapshot = telemetry.snapshot();
        assert_eq!(snapshot.total_queries, 3);
        assert!((snapshot.query_time - 200.0).abs() < f64::EPSILON);
        assert!(snapshot.throughput > 0.0);

        assert_eq!(telemetry.top(1)[0].query, "a");

        telemetry.reset();
        assert!(telemetry.is_empty());
        assert_eq!(telemetry.snapshot().total_queries, 0);
    }
}
