//! Partition two row sets into matched pairs and one-sided rows.

use std::collections::{HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::core::{Row, RowSet};

use super::criteria::ResolvedCriteria;
use super::key::derive_key;

/// How rows sharing a key on the DB2 side are handled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// Keep the last DB2 row per key. Every DB1 row with that key matches it
    /// and DB2 rows whose key was consumed are never reported.
    #[default]
    LastWins,

    /// Each DB1 row consumes the first unconsumed DB2 row with its key.
    /// Leftovers on either side are reported as one-sided rows.
    Surface,
}

impl std::str::FromStr for DuplicatePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "last_wins" | "last-wins" => Ok(DuplicatePolicy::LastWins),
            "surface" => Ok(DuplicatePolicy::Surface),
            other => Err(format!(
                "invalid duplicate policy '{}': expected last_wins or surface",
                other
            )),
        }
    }
}

/// A DB1 row paired with the DB2 row sharing its key.
#[derive(Debug, Clone, PartialEq)]
pub struct RowMatch {
    pub db1: Row,
    pub db2: Row,
    pub key: String,
}

/// Output of [`match_rows`].
#[derive(Debug, Clone, Default)]
pub struct MatchOutcome {
    pub matches: Vec<RowMatch>,
    pub only_a: RowSet,
    pub only_b: RowSet,
}

/// Match rows by derived key. One-sided rows keep their fetch order.
pub fn match_rows(
    rows_a: &[Row],
    rows_b: &[Row],
    criteria: &ResolvedCriteria,
    policy: DuplicatePolicy,
) -> MatchOutcome {
    let keys_b: Vec<String> = rows_b.iter().map(|r| derive_key(r, criteria)).collect();

    match policy {
        DuplicatePolicy::LastWins => match_last_wins(rows_a, rows_b, &keys_b, criteria),
        DuplicatePolicy::Surface => match_surface(rows_a, rows_b, &keys_b, criteria),
    }
}

fn match_last_wins(
    rows_a: &[Row],
    rows_b: &[Row],
    keys_b: &[String],
    criteria: &ResolvedCriteria,
) -> MatchOutcome {
    let lookup: HashMap<&str, &Row> = keys_b
        .iter()
        .map(String::as_str)
        .zip(rows_b.iter())
        .collect();
    let mut consumed: HashSet<&str> = HashSet::new();
    let mut outcome = MatchOutcome::default();

    for row in rows_a {
        let key = derive_key(row, criteria);
        match lookup.get_key_value(key.as_str()) {
            Some((&stored_key, &target)) => {
                consumed.insert(stored_key);
                outcome.matches.push(RowMatch {
                    db1: row.clone(),
                    db2: target.clone(),
                    key,
                });
            }
            None => outcome.only_a.push(row.clone()),
        }
    }

    outcome.only_b = rows_b
        .iter()
        .zip(keys_b)
        .filter(|(_, key)| !consumed.contains(key.as_str()))
        .map(|(row, _)| row.clone())
        .collect();

    outcome
}

fn match_surface(
    rows_a: &[Row],
    rows_b: &[Row],
    keys_b: &[String],
    criteria: &ResolvedCriteria,
) -> MatchOutcome {
    let mut queues: HashMap<&str, VecDeque<usize>> = HashMap::new();
    for (idx, key) in keys_b.iter().enumerate() {
        queues.entry(key.as_str()).or_default().push_back(idx);
    }
    let mut consumed = vec![false; rows_b.len()];
    let mut outcome = MatchOutcome::default();

    for row in rows_a {
        let key = derive_key(row, criteria);
        match queues.get_mut(key.as_str()).and_then(VecDeque::pop_front) {
            Some(idx) => {
                consumed[idx] = true;
                outcome.matches.push(RowMatch {
                    db1: row.clone(),
                    db2: rows_b[idx].clone(),
                    key,
                });
            }
            None => outcome.only_a.push(row.clone()),
        }
    }

    outcome.only_b = rows_b
        .iter()
        .zip(consumed)
        .filter(|(_, used)| !used)
        .map(|(row, _)| row.clone())
        .collect();

    outcome
}
