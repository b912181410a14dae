//! Bounded, persisted history of health scans.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::report::HealthReport;
use crate::backup::HealthStatus;
use crate::error::Error;
use crate::store::{Collection, StateStore, TRENDS_TREE};

/// One scan summarized for trending.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendPoint {
    /// When the scan ran.
    pub timestamp: DateTime<Utc>,
    /// Overall status.
    pub status: HealthStatus,
    /// Average query time in milliseconds.
    pub query_time: f64,
    /// Cache hit rate.
    pub cache_hit_rate: f64,
    /// Queries per second.
    pub throughput: f64,
    /// Active connections, if the check succeeded.
    pub connections: Option<u64>,
    /// Alerts in the report.
    pub alert_count: usize,
}

impl From<&HealthReport> for TrendPoint {
    fn from(report: &HealthReport) -> Self {
        Self {
            timestamp: report.generated_at,
            status: report.status,
            query_time: report.performance.query_time,
            cache_hit_rate: report.performance.cache_hit_rate,
            throughput: report.performance.throughput,
            connections: report.database.connections,
            alert_count: report.alerts.len(),
        }
    }
}

/// Ring of the most recent trend points.
pub struct TrendHistory {
    points: RwLock<VecDeque<TrendPoint>>,
    records: Collection,
    capacity: usize,
}

impl TrendHistory {
    /// Open the history, keeping at most `capacity` points.
    pub fn open(store: &StateStore, capacity: usize) -> Result<Self, Error> {
        let records = store.collection(TRENDS_TREE)?;
        records.truncate_front(capacity)?;
        let points = records.load_all::<TrendPoint>()?.into();
        Ok(Self {
            points: RwLock::new(points),
            records,
            capacity,
        })
    }

    /// Append a point, dropping the oldest past capacity.
    pub fn push(&self, point: TrendPoint) -> Result<(), Error> {
        if self.capacity == 0 {
            return Ok(());
        }

        let mut points = self.points.write();
        self.records.append(&point)?;
        self.records.truncate_front(self.capacity)?;

        points.push_back(point);
        while points.len() > self.capacity {
            points.pop_front();
        }
        Ok(())
    }

    /// The most recent `limit` points, oldest first.
    pub fn list(&self, limit: Option<usize>) -> Vec<TrendPoint> {
        let points = self.points.read();
        let skip = limit.map_or(0, |n| points.len().saturating_sub(n));
        points.iter().skip(skip).cloned().collect()
    }

    /// Number of retained points.
    pub fn len(&self) -> usize {
        self.points.read().len()
    }

    /// Check if no points are retained.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(alert_count: usize) -> TrendPoint {
        TrendPoint {
            timestamp: Utc::now(),
            status: HealthStatus::Healthy,
            query_time: 0.0,
            cache_hit_rate: 0.0,
            throughput: 0.0,
            connections: Some(1),
            alert_count,
        }
    }

    #[test]
    fn test_bounded_newest_last() {
        let store = StateStore::temporary().unwrap();
        let trends = TrendHistory::open(&store, 3).unwrap();
        for i in 0..5 {
            trends.push(point(i)).unwrap();
        }

        let counts: Vec<usize> = trends.list(None).iter().map(|p| p.alert_count).collect();
        assert_eq!(counts, vec![2, 3, 4]);

        let last: Vec<usize> = trends.list(Some(2)).iter().map(|p| p.alert_count).collect();
        assert_eq!(last, vec![3, 4]);
    }

    #[test]
    fn test_reload_respects_capacity() {
        let store = StateStore::temporary().unwrap();
        {
            let trends = TrendHistory::open(&store, 10).unwrap();
            for i in 0..6 {
                trends.push(point(i)).unwrap();
            }
        }

        let trends = TrendHistory::open(&store, 4).unwrap();
        assert_eq!(trends.len(), 4);
        assert_eq!(trends.list(None)[0].alert_count, 2);
    }
}
