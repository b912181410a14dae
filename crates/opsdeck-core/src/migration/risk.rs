//! Risk assessment for migration plans.
//!
//! Each check is a [`RiskRule`]. The default rules match on script text;
//! a rule backed by a real SQL parser can replace them without touching
//! the orchestrator.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::model::{normalize_sql, Migration};
use crate::config::RiskThresholds;

/// Statements treated as destructive.
const DESTRUCTIVE_PATTERNS: &[&str] = &[
    "DROP TABLE",
    "DROP COLUMN",
    "DROP SCHEMA",
    "DROP DATABASE",
    "TRUNCATE",
];

/// Heuristic danger classification of a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    /// No risk factors.
    Low,
    /// One moderate risk factor.
    Medium,
    /// A destructive operation or several risk factors.
    High,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "low"),
            RiskLevel::Medium => write!(f, "medium"),
            RiskLevel::High => write!(f, "high"),
        }
    }
}

/// A single risk factor found by a rule.
#[derive(Debug, Clone, PartialEq)]
pub struct RiskFinding {
    /// How severe this factor is on its own.
    pub severity: RiskLevel,
    /// What was found.
    pub issue: String,
    /// What to do about it.
    pub recommendation: String,
}

/// Overall risk of a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    /// Overall level.
    pub level: RiskLevel,
    /// One entry per finding.
    pub issues: Vec<String>,
    /// One entry per finding.
    pub recommendations: Vec<String>,
}

/// Inputs available to risk rules.
pub struct PlanContext<'a> {
    /// Migrations in the plan, in execution order.
    pub migrations: &'a [Migration],
    /// Sum of estimated durations.
    pub total_duration: Duration,
    /// Longest dependency chain reachable from the plan.
    pub dependency_depth: usize,
}

/// A pluggable risk check.
pub trait RiskRule: Send + Sync {
    /// Short rule name used in logs.
    fn name(&self) -> &'static str;

    /// Evaluate the plan, returning a finding if the rule fires.
    fn evaluate(&self, ctx: &PlanContext<'_>) -> Option<RiskFinding>;
}

/// Flags destructive drop or truncate statements in up scripts.
pub struct DestructiveOperationRule;

impl RiskRule for DestructiveOperationRule {
    fn name(&self) -> &'static str {
        "destructive_operation"
    }

    fn evaluate(&self, ctx: &PlanContext<'_>) -> Option<RiskFinding> {
        let offenders: Vec<&str> = ctx
            .migrations
            .iter()
            .filter(|m| {
                let script = normalize_sql(&m.up_script);
                DESTRUCTIVE_PATTERNS.iter().any(|p| script.contains(p))
            })
            .map(|m| m.name.as_str())
            .collect();

        if offenders.is_empty() {
            return None;
        }

        Some(RiskFinding {
            severity: RiskLevel::High,
            issue: format!("Destructive operations detected in: {}", offenders.join(", ")),
            recommendation: "Take a verified backup of affected tables before deploying".to_string(),
        })
    }
}

/// Flags plans whose estimated duration exceeds a threshold.
pub struct DurationRule {
    /// Threshold above which the rule fires.
    pub max_duration: Duration,
}

impl RiskRule for DurationRule {
    fn name(&self) -> &'static str {
        "long_duration"
    }

    fn evaluate(&self, ctx: &PlanContext<'_>) -> Option<RiskFinding> {
        if ctx.total_duration <= self.max_duration {
            return None;
        }

        Some(RiskFinding {
            severity: RiskLevel::Medium,
            issue: format!(
                "Estimated duration {}s exceeds {}s",
                ctx.total_duration.as_secs(),
                self.max_duration.as_secs()
            ),
            recommendation: "Schedule the deployment in a maintenance window".to_string(),
        })
    }
}

/// Flags deep dependency chains.
pub struct DependencyDepthRule {
    /// Depth above which the rule fires.
    pub max_depth: usize,
}

impl RiskRule for DependencyDepthRule {
    fn name(&self) -> &'static str {
        "dependency_depth"
    }

    fn evaluate(&self, ctx: &PlanContext<'_>) -> Option<RiskFinding> {
        if ctx.dependency_depth <= self.max_depth {
            return None;
        }

        Some(RiskFinding {
            severity: RiskLevel::Medium,
            issue: format!(
                "Dependency chain depth {} exceeds {}",
                ctx.dependency_depth, self.max_depth
            ),
            recommendation: "Deploy the dependency chain in smaller stages".to_string(),
        })
    }
}

/// The built-in rule set.
pub fn default_rules(thresholds: &RiskThresholds) -> Vec<Box<dyn RiskRule>> {
    vec![
        Box::new(DestructiveOperationRule),
        Box::new(DurationRule {
            max_duration: thresholds.max_duration,
        }),
        Box::new(DependencyDepthRule {
            max_depth: thresholds.max_dependency_depth,
        }),
    ]
}

/// Run every rule and combine the findings.
///
/// The level is the most severe finding; two or more findings escalate
/// to high.
pub fn assess(rules: &[Box<dyn RiskRule>], ctx: &PlanContext<'_>) -> RiskAssessment {
    let findings: Vec<RiskFinding> = rules.iter().filter_map(|r| r.evaluate(ctx)).collect();

    let level = match findings.len() {
        0 => RiskLevel::Low,
        1 => findings[0].severity,
        _ => RiskLevel::High,
    };

    RiskAssessment {
        level,
        issues: findings.iter().map(|f| f.issue.clone()).collect(),
        recommendations: findings.into_iter().map(|f| f.recommendation).collect(),
    }
}

/// Length of the longest dependency chain starting from any of `roots`.
///
/// A migration without dependencies has depth 0. Unknown ids end a chain;
/// cycles are cut at the first revisit.
pub fn dependency_depth(roots: &[&str], all: &HashMap<String, Migration>) -> usize {
    fn visit<'a>(
        id: &'a str,
        all: &'a HashMap<String, Migration>,
        memo: &mut HashMap<&'a str, usize>,
        stack: &mut Vec<&'a str>,
    ) -> usize {
        if let Some(depth) = memo.get(id) {
            return *depth;
        }
        if stack.contains(&id) {
            return 0;
        }
        let Some(migration) = all.get(id) else {
            return 0;
        };

        stack.push(id);
        let depth = migration
            .dependencies
            .iter()
            .filter(|dep| all.contains_key(dep.as_str()))
            .map(|dep| 1 + visit(dep.as_str(), all, memo, stack))
            .max()
            .unwrap_or(0);
        stack.pop();

        memo.insert(id, depth);
        depth
    }

    let mut memo = HashMap::new();
    let mut stack = Vec::new();
    roots
        .iter()
        .filter_map(|id| all.get_key_value(*id))
        .map(|(key, _)| visit(key.as_str(), all, &mut memo, &mut stack))
        .max()
        .unwrap_or(0)
}
