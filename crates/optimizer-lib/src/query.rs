//! Online learning over executed data-access queries
//!
//! Queries are normalized to a shape with literals replaced by `n`, then
//! timed per shape. Shapes that are both slow and frequent get naive index
//! suggestions pulled from their filter and join predicates.

use crate::config::OptimizerConfig;
use crate::models::QueryExecution;
use dashmap::DashMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::OnceLock;

fn string_literal() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"'[^']*'|"[^"]*""#).expect("valid literal regex"))
}

fn numeric_literal() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b\d+(?:\.\d+)?\b").expect("valid number regex"))
}

fn whitespace() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("valid whitespace regex"))
}

fn predicate_column() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"\b(?:where|and|or|on)\s+([a-z_][a-z0-9_]*(?:\.[a-z_][a-z0-9_]*)?)\s*(?:=|!=|<>|<=|>=|<|>|\bin\b|\blike\b|\bis\b|\bbetween\b)",
        )
        .expect("valid predicate regex")
    })
}

/// Reduce a query to its shape: literals become `n`, whitespace collapses,
/// everything is lowercased
pub fn normalize_query(query: &str) -> String {
    let without_strings = string_literal().replace_all(query, "N");
    let unquoted = without_strings.replace('`', "");
    let without_numbers = numeric_literal().replace_all(&unquoted, "N");
    whitespace()
        .replace_all(without_numbers.trim(), " ")
        .to_lowercase()
}

/// Columns referenced by `WHERE`, `AND`, `OR` and `JOIN ... ON` predicates
pub fn suggest_indexes(normalized: &str) -> Vec<String> {
    let mut columns: Vec<String> = Vec::new();
    for caps in predicate_column().captures_iter(normalized) {
        let column = caps[1].to_string();
        if column != "n" && !columns.contains(&column) {
            columns.push(column);
        }
    }
    columns
}

/// Accumulated statistics for one query shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryPattern {
    pub pattern: String,
    pub count: u64,
    pub total_ms: f64,
    pub avg_ms: f64,
    /// Filled once the pattern is slow and frequent
    pub suggested_indexes: Option<Vec<String>>,
    pub last_seen_ms: i64,
}

impl QueryPattern {
    fn new(pattern: String) -> Self {
        Self {
            pattern,
            count: 0,
            total_ms: 0.0,
            avg_ms: 0.0,
            suggested_indexes: None,
            last_seen_ms: 0,
        }
    }
}

/// Thresholds for flagging slow patterns
#[derive(Debug, Clone)]
pub struct QueryLearnerConfig {
    pub slow_query_ms: f64,
    pub min_count: u64,
}

impl Default for QueryLearnerConfig {
    fn default() -> Self {
        Self {
            slow_query_ms: 100.0,
            min_count: 10,
        }
    }
}

impl From<&OptimizerConfig> for QueryLearnerConfig {
    fn from(config: &OptimizerConfig) -> Self {
        Self {
            slow_query_ms: config.tuning.slow_query_ms,
            min_count: config.tuning.slow_query_min_count,
        }
    }
}

/// Per-shape query statistics
#[derive(Default)]
pub struct QueryPatternLearner {
    config: QueryLearnerConfig,
    patterns: DashMap<String, QueryPattern>,
}

impl QueryPatternLearner {
    pub fn new(config: QueryLearnerConfig) -> Self {
        Self {
            config,
            patterns: DashMap::new(),
        }
    }

    /// Fold one request's executed queries into the statistics
    ///
    /// Queries without their own duration get an even share of `total_ms`.
    /// Returns the patterns that became slow with this batch.
    pub fn learn(&self, executions: &[QueryExecution], total_ms: f64) -> Vec<QueryPattern> {
        if executions.is_empty() {
            return Vec::new();
        }
        let share = total_ms / executions.len() as f64;
        let now = chrono::Utc::now().timestamp_millis();
        let mut newly_slow = Vec::new();

        for execution in executions {
            let shape = normalize_query(&execution.query);
            if shape.is_empty() {
                continue;
            }
            let duration = execution.duration_ms.unwrap_or(share).max(0.0);

            let mut entry = self
                .patterns
                .entry(shape.clone())
                .or_insert_with(|| QueryPattern::new(shape.clone()));
            entry.count += 1;
            entry.total_ms += duration;
            entry.avg_ms = entry.total_ms / entry.count as f64;
            entry.last_seen_ms = now;

            if entry.avg_ms > self.config.slow_query_ms && entry.count >= self.config.min_count {
                if entry.suggested_indexes.is_none() {
                    entry.suggested_indexes = Some(suggest_indexes(&shape));
                    newly_slow.push(entry.clone());
                }
            } else {
                entry.suggested_indexes = None;
            }
        }
        newly_slow
    }

    /// All accumulated patterns keyed by normalized shape
    pub fn get_optimization_suggestions(&self) -> BTreeMap<String, QueryPattern> {
        self.patterns
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    pub fn get(&self, pattern: &str) -> Option<QueryPattern> {
        self.patterns.get(pattern).map(|p| p.clone())
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_replaces_literals() {
        assert_eq!(
            normalize_query("SELECT * FROM t WHERE id = 42"),
            "select * from t where id = n"
        );
        assert_eq!(
            normalize_query("SELECT  name FROM users\n WHERE email = 'a@b.c' AND age > 3.5"),
            "select name from users where email = n and age > n"
        );
        assert_eq!(normalize_query("SELECT * FROM `orders`"), "select * from orders");
    }

    #[test]
    fn test_digits_inside_identifiers_survive() {
        assert_eq!(
            normalize_query("SELECT * FROM logs2024 WHERE id = 7"),
            "select * from logs2024 where id = n"
        );
    }

    #[test]
    fn test_suggest_indexes_from_predicates() {
        let shape = normalize_query(
            "SELECT * FROM orders o JOIN users u ON u.id = o.user_id WHERE o.status = 'open' AND o.created_at > 5",
        );
        assert_eq!(
            suggest_indexes(&shape),
            vec!["u.id", "o.status", "o.created_at"]
        );
    }

    #[test]
    fn test_slow_frequent_pattern_is_flagged() {
        let learner = QueryPatternLearner::default();
        let mut flagged = Vec::new();
        for _ in 0..11 {
            flagged.extend(learner.learn(
                &[QueryExecution::new("SELECT * FROM t WHERE id = 42", 150.0)],
                150.0,
            ));
        }

        let suggestions = learner.get_optimization_suggestions();
        let pattern = &suggestions["select * from t where id = n"];
        assert_eq!(pattern.count, 11);
        assert!((pattern.avg_ms - 150.0).abs() < 1e-9);
        assert_eq!(pattern.suggested_indexes, Some(vec!["id".to_string()]));
        assert_eq!(flagged.len(), 1);
    }

    #[test]
    fn test_fast_pattern_gets_no_suggestion() {
        let learner = QueryPatternLearner::default();
        for _ in 0..20 {
            learner.learn(&[QueryExecution::new("SELECT 1", 5.0)], 5.0);
        }
        let pattern = learner.get("select n").unwrap();
        assert_eq!(pattern.count, 20);
        assert!(pattern.suggested_indexes.is_none());
    }

    #[test]
    fn test_missing_durations_split_total() {
        let learner = QueryPatternLearner::default();
        let executions = vec![
            QueryExecution {
                query: "SELECT * FROM a WHERE id = 1".to_string(),
                duration_ms: None,
            },
            QueryExecution {
                query: "SELECT * FROM b WHERE id = 2".to_string(),
                duration_ms: None,
            },
        ];
        learner.learn(&executions, 80.0);

        assert_eq!(learner.len(), 2);
        assert!((learner.get("select * from a where id = n").unwrap().avg_ms - 40.0).abs() < 1e-9);
    }
}
