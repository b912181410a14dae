//! Persisted alert log.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::Error;
use crate::ids::generate_id;
use crate::store::{Collection, StateStore, ALERTS_TREE};

/// Alert severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    /// Needs attention.
    Warning,
    /// Needs immediate attention.
    Critical,
}

impl std::fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertSeverity::Warning => write!(f, "warning"),
            AlertSeverity::Critical => write!(f, "critical"),
        }
    }
}

/// A raised alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    /// Unique id.
    pub id: String,
    /// Alert text; the de-duplication key.
    pub message: String,
    /// Highest severity seen.
    pub severity: AlertSeverity,
    /// When the alert was first raised.
    pub first_seen: DateTime<Utc>,
    /// When the alert was last raised.
    pub last_seen: DateTime<Utc>,
    /// How many scans raised it.
    pub occurrences: u64,
    /// Whether an operator resolved it.
    pub resolved: bool,
    /// When it was resolved.
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Alerts raised by health scans, oldest first.
///
/// Raising a message that matches an unresolved alert bumps that alert
/// instead of creating a new one. Beyond `retention` alerts, the oldest
/// resolved ones are dropped; unresolved alerts are always kept.
pub struct AlertLog {
    alerts: RwLock<Vec<Alert>>,
    records: Collection,
    retention: usize,
}

impl AlertLog {
    /// Open the log, loading persisted alerts.
    pub fn open(store: &StateStore, retention: usize) -> Result<Self, Error> {
        let records = store.collection(ALERTS_TREE)?;
        let mut alerts = records.load_all::<Alert>()?;
        prune(&records, &mut alerts, retention)?;
        Ok(Self {
            alerts: RwLock::new(alerts),
            records,
            retention,
        })
    }

    /// Raise an alert.
    pub fn raise(&self, message: &str, severity: AlertSeverity) -> Result<Alert, Error> {
        let now = Utc::now();
        let mut alerts = self.alerts.write();

        if let Some(existing) = alerts
            .iter_mut()
            .find(|a| !a.resolved && a.message == message)
        {
            let mut updated = existing.clone();
            updated.last_seen = now;
            updated.occurrences += 1;
            updated.severity = updated.severity.max(severity);
            self.records.put(&updated.id, &updated)?;
            *existing = updated.clone();
            return Ok(updated);
        }

        let alert = Alert {
            id: generate_id("alert"),
            message: message.to_string(),
            severity,
            first_seen: now,
            last_seen: now,
            occurrences: 1,
            resolved: false,
            resolved_at: None,
        };
        self.records.put(&alert.id, &alert)?;
        alerts.push(alert.clone());
        prune(&self.records, &mut alerts, self.retention)?;

        warn!(alert_id = %alert.id, severity = %severity, message, "alert raised");
        Ok(alert)
    }

    /// List alerts, optionally including resolved ones.
    pub fn list(&self, include_resolved: bool) -> Vec<Alert> {
        self.alerts
            .read()
            .iter()
            .filter(|a| include_resolved || !a.resolved)
            .cloned()
            .collect()
    }

    /// Look up an alert.
    pub fn get(&self, alert_id: &str) -> Option<Alert> {
        self.alerts.read().iter().find(|a| a.id == alert_id).cloned()
    }

    /// Mark an alert resolved.
    pub fn resolve(&self, alert_id: &str) -> Result<Alert, Error> {
        let mut alerts = self.alerts.write();
        let alert = alerts
            .iter_mut()
            .find(|a| a.id == alert_id)
            .ok_or_else(|| Error::not_found("alert", alert_id))?;
        if alert.resolved {
            return Err(Error::invalid_state("resolve", alert_id, "resolved"));
        }

        let mut updated = alert.clone();
        updated.resolved = true;
        updated.resolved_at = Some(Utc::now());
        self.records.put(&updated.id, &updated)?;
        *alert = updated.clone();
        prune(&self.records, &mut alerts, self.retention)?;

        info!(alert_id, "alert resolved");
        Ok(updated)
    }

    /// Number of unresolved alerts.
    pub fn active_count(&self) -> usize {
        self.alerts.read().iter().filter(|a| !a.resolved).count()
    }

    /// Number of retained alerts, resolved included.
    pub fn len(&self) -> usize {
        self.alerts.read().len()
    }

    /// Check if no alerts are retained.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Drop the oldest resolved alerts until at most `retention` remain.
fn prune(records: &Collection, alerts: &mut Vec<Alert>, retention: usize) -> Result<(), Error> {
    let mut excess = alerts.len().saturating_sub(retention);
    if excess == 0 {
        return Ok(());
    }

    let mut dropped = Vec::new();
    alerts.retain(|a| {
        if excess > 0 && a.resolved {
            excess -= 1;
            dropped.push(a.id.clone());
            false
        } else {
            true
        }
    });

    for id in &dropped {
        records.remove(id)?;
    }
    debug!(dropped = dropped.len(), "resolved alerts pruned");
    Ok(())
}
