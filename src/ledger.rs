//! Latest-target-per-analyst index

use crate::analyst::AnalystIdentity;
use crate::statement::{Statement, Target};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Ledger entry: an analyst's most recent target and the round it came from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Latest validated target
    pub target: Target,
    /// Round the target was committed in
    pub round: u32,
}

/// Per-session record of each analyst's most recent target
///
/// Holds at most one entry per analyst. The latest statement score is tracked
/// separately because a statement without a target still updates the
/// analyst's conviction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TargetLedger {
    entries: BTreeMap<AnalystIdentity, LedgerEntry>,
    latest_scores: BTreeMap<AnalystIdentity, u8>,
}

impl TargetLedger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a validated statement into the ledger
    pub fn apply(&mut self, statement: &Statement) {
        self.latest_scores.insert(statement.analyst, statement.score);
        if let Some(target) = &statement.target {
            self.entries.insert(
                statement.analyst,
                LedgerEntry {
                    target: target.clone(),
                    round: statement.round,
                },
            );
        }
    }

    /// Latest entry for an analyst
    pub fn get(&self, analyst: AnalystIdentity) -> Option<&LedgerEntry> {
        self.entries.get(&analyst)
    }

    /// Latest target for an analyst
    pub fn target(&self, analyst: AnalystIdentity) -> Option<&Target> {
        self.entries.get(&analyst).map(|e| &e.target)
    }

    /// Score of the analyst's most recent statement
    pub fn latest_score(&self, analyst: AnalystIdentity) -> Option<u8> {
        self.latest_scores.get(&analyst).copied()
    }

    /// Analysts from `roster` without a target yet
    pub fn missing(&self, roster: &[AnalystIdentity]) -> Vec<AnalystIdentity> {
        roster
            .iter()
            .filter(|a| !self.entries.contains_key(a))
            .copied()
            .collect()
    }

    /// Whether every analyst in `roster` has a target
    pub fn is_complete(&self, roster: &[AnalystIdentity]) -> bool {
        self.missing(roster).is_empty()
    }

    /// Number of analysts with a target
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no analyst has committed a target
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statement::StatementSource;
    use chrono::{NaiveDate, Utc};

    fn statement(analyst: AnalystIdentity, round: u32, score: u8, price: Option<f64>) -> Statement {
        Statement {
            analyst,
            round,
            text: String::new(),
            score,
            risks: vec![],
            sources: vec![],
            target: price.map(|price| Target {
                price,
                date: NaiveDate::from_ymd_opt(2027, 6, 30).unwrap(),
                date_label: "June 2027".into(),
                rationale: String::new(),
                confidence: score,
            }),
            source: StatementSource::Primary { adapter: "test".into() },
            repairs: vec![],
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_later_target_supersedes() {
        let mut ledger = TargetLedger::new();
        ledger.apply(&statement(AnalystIdentity::Growth, 1, 4, Some(90_000.0)));
        ledger.apply(&statement(AnalystIdentity::Growth, 2, 5, Some(95_000.0)));

        assert_eq!(ledger.len(), 1);
        let entry = ledger.get(AnalystIdentity::Growth).unwrap();
        assert_eq!(entry.target.price, 95_000.0);
        assert_eq!(entry.round, 2);
    }

    #[test]
    fn test_statement_without_target_keeps_entry_updates_score() {
        let mut ledger = TargetLedger::new();
        ledger.apply(&statement(AnalystIdentity::Balanced, 1, 4, Some(80_000.0)));
        ledger.apply(&statement(AnalystIdentity::Balanced, 2, 2, None));

        assert_eq!(ledger.target(AnalystIdentity::Balanced).unwrap().price, 80_000.0);
        assert_eq!(ledger.latest_score(AnalystIdentity::Balanced), Some(2));
    }

    #[test]
    fn test_missing_follows_roster_order() {
        let mut ledger = TargetLedger::new();
        ledger.apply(&statement(AnalystIdentity::Growth, 1, 4, Some(90_000.0)));

        assert_eq!(
            ledger.missing(&AnalystIdentity::ALL),
            vec![AnalystIdentity::Balanced, AnalystIdentity::MacroRisk]
        );
        assert!(!ledger.is_complete(&AnalystIdentity::ALL));
        assert!(ledger.is_complete(&[AnalystIdentity::Growth]));
    }
}
