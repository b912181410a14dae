//! Rule-based query optimization hints.
//!
//! Heuristics over the query text and whatever plan metadata the caller has.
//! They are not a planner; each rule can be replaced by a parser-backed one
//! without touching [`QueryAdvisor`].

use serde::{Deserialize, Serialize};

/// Plan metadata supplied alongside a query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExplainInfo {
    /// The plan uses at least one index scan.
    pub uses_index: bool,
    /// The plan contains a nested loop join.
    pub nested_loop: bool,
    /// Estimated rows returned, if known.
    pub estimated_rows: Option<u64>,
}

/// A single optimization hint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suggestion {
    /// Rule that produced the hint.
    pub rule: String,
    /// What to change.
    pub message: String,
}

/// A query being analyzed, with its text normalized for matching.
pub struct QueryShape<'a> {
    /// Uppercased, whitespace-collapsed query text.
    pub normalized: &'a str,
    /// Plan metadata.
    pub explain: &'a ExplainInfo,
}

impl QueryShape<'_> {
    fn has(&self, keyword: &str) -> bool {
        self.normalized.contains(keyword)
    }

    /// A `table.*` projection, followed by a space or another column.
    fn has_qualified_wildcard(&self) -> bool {
        let bytes = self.normalized.as_bytes();
        self.normalized
            .match_indices(".*")
            .any(|(i, _)| matches!(bytes.get(i + 2), Some(b' ' | b',')))
    }

    fn is_select(&self) -> bool {
        self.normalized.starts_with("SELECT ") || self.normalized.starts_with("WITH ")
    }
}

/// A pluggable optimization heuristic.
pub trait OptimizationRule: Send + Sync {
    /// Rule name.
    fn name(&self) -> &'static str;

    /// Produce a hint message if the rule applies.
    fn check(&self, query: &QueryShape<'_>) -> Option<String>;
}

/// Filtering without an index scan.
pub struct MissingIndexRule;

impl OptimizationRule for MissingIndexRule {
    fn name(&self) -> &'static str {
        "missing_index"
    }

    fn check(&self, query: &QueryShape<'_>) -> Option<String> {
        (query.has(" WHERE ") && !query.explain.uses_index).then(|| {
            "Add an index on the filtered columns; the plan does not use an index scan".to_string()
        })
    }
}

/// `SELECT *` projections.
pub struct WildcardProjectionRule;

impl OptimizationRule for WildcardProjectionRule {
    fn name(&self) -> &'static str {
        "wildcard_projection"
    }

    fn check(&self, query: &QueryShape<'_>) -> Option<String> {
        (query.has("SELECT *") || query.has_qualified_wildcard())
            .then(|| "List the needed columns explicitly instead of SELECT *".to_string())
    }
}

/// Joins executed as nested loops, the usual shape of N+1 access.
pub struct NPlusOneRule;

impl OptimizationRule for NPlusOneRule {
    fn name(&self) -> &'static str {
        "n_plus_one"
    }

    fn check(&self, query: &QueryShape<'_>) -> Option<String> {
        (query.has(" JOIN ") && query.explain.nested_loop).then(|| {
            "Batch related lookups; the join runs as a nested loop, which suggests N+1 access"
                .to_string()
        })
    }
}

/// Reads without a row limit.
pub struct MissingLimitRule;

impl OptimizationRule for MissingLimitRule {
    fn name(&self) -> &'static str {
        "missing_limit"
    }

    fn check(&self, query: &QueryShape<'_>) -> Option<String> {
        (query.is_select() && !query.has(" LIMIT ") && !query.has(" FETCH FIRST "))
            .then(|| "Add a LIMIT clause to bound the result set".to_string())
    }
}

/// The built-in rule set.
pub fn default_rules() -> Vec<Box<dyn OptimizationRule>> {
    vec![
        Box::new(MissingIndexRule),
        Box::new(WildcardProjectionRule),
        Box::new(NPlusOneRule),
        Box::new(MissingLimitRule),
    ]
}

/// Runs optimization rules against queries.
pub struct QueryAdvisor {
    rules: Vec<Box<dyn OptimizationRule>>,
}

impl QueryAdvisor {
    /// Create an advisor with the built-in rules.
    pub fn new() -> Self {
        Self {
            rules: default_rules(),
        }
    }

    /// Create an advisor with custom rules.
    pub fn with_rules(rules: Vec<Box<dyn OptimizationRule>>) -> Self {
        Self { rules }
    }

    /// Suggest optimizations for `query`.
    pub fn suggest_optimizations(&self, query: &str, explain: &ExplainInfo) -> Vec<Suggestion> {
        // Padding lets keyword checks match at either end.
        let normalized = format!(
            " {} ",
            query
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ")
                .to_uppercase()
        );
        let shape = QueryShape {
            normalized: normalized.trim_start(),
            explain,
        };

        self.rules
            .iter()
            .filter_map(|rule| {
                rule.check(&shape).map(|message| Suggestion {
                    rule: rule.name().to_string(),
                    message,
                })
            })
            .collect()
    }
}

impl Default for QueryAdvisor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules_for(query: &str, explain: ExplainInfo) -> Vec<String> {
        QueryAdvisor::new()
            .suggest_optimizations(query, &explain)
            .into_iter()
            .map(|s| s.rule)
            .collect()
    }

    #[test]
    fn test_wildcard_unindexed_unbounded() {
        let rules = rules_for(
            "select * from ideas where project_id = $1",
            ExplainInfo::default(),
        );
        assert_eq!(
            rules,
            vec!["missing_index", "wildcard_projection", "missing_limit"]
        );
    }

    #[test]
    fn test_clean_query_has_no_hints() {
        let rules = rules_for(
            "SELECT id, title FROM ideas WHERE project_id = $1 LIMIT 50",
            ExplainInfo {
                uses_index: true,
                ..Default::default()
            },
        );
        assert!(rules.is_empty());
    }

    #[test]
    fn test_nested_loop_join() {
        let rules = rules_for(
            "SELECT p.id, i.id FROM projects p JOIN ideas i ON i.project_id = p.id LIMIT 10",
            ExplainInfo {
                nested_loop: true,
                ..Default::default()
            },
        );
        assert_eq!(rules, vec!["n_plus_one"]);
    }

    #[test]
    fn test_custom_rules() {
        let advisor = QueryAdvisor::with_rules(vec![Box::new(MissingLimitRule)]);
        let hints = advisor.suggest_optimizations("SELECT * FROM t", &ExplainInfo::default());
        assert_eq!(hints.len(), 1);
        assert_eq!(hints[0].rule, "missing_limit");
    }

    #[test]
    fn test_limit_at_end_of_query() {
        let rules = rules_for("SELECT id FROM t LIMIT", ExplainInfo::default());
        assert!(!rules.contains(&"missing_limit".to_string()));
    }

    #[test]
    fn test_qualified_wildcard_in_column_list() {
        let explain = ExplainInfo {
            uses_index: true,
            ..Default::default()
        };
        for query in [
            "SELECT p.*, i.id FROM projects p JOIN ideas i ON i.project_id = p.id LIMIT 5",
            "SELECT p.*,i.id FROM projects p JOIN ideas i ON i.project_id = p.id LIMIT 5",
            "SELECT i.id, p.* FROM projects p JOIN ideas i ON i.project_id = p.id LIMIT 5",
        ] {
            assert_eq!(rules_for(query, explain.clone()), vec!["wildcard_projection"], "{query}");
        }

        let rules = rules_for("SELECT count(*) FROM ideas LIMIT 1", explain);
        assert!(rules.is_empty());
    }
}
