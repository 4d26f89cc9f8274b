//! Statements and price targets produced during a debate

use crate::analyst::AnalystIdentity;
use crate::validation::{CorrectedOutput, Repair};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A validated price forecast
///
/// Targets are superseded, never edited: a later round's target replaces the
/// ledger entry while the earlier one stays in history through its statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    /// Target price, in the reference price's units
    pub price: f64,
    /// Target date
    pub date: NaiveDate,
    /// Human-readable calendar label, e.g. "June 2027"
    pub date_label: String,
    /// Free-text reasoning behind the number
    pub rationale: String,
    /// Confidence (the statement's 1-5 score)
    pub confidence: u8,
}

/// Where a statement's raw output came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StatementSource {
    /// The identity's registered adapter answered
    Primary {
        /// Adapter name
        adapter: String,
    },
    /// The rule-based fallback stood in
    Fallback {
        /// Why the primary was not used
        reason: String,
    },
}

impl StatementSource {
    /// Whether the fallback produced this statement
    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback { .. })
    }
}

/// One analyst's recorded output for one round
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    /// Speaking analyst
    pub analyst: AnalystIdentity,
    /// Round number (1-indexed)
    pub round: u32,
    /// Narrative text
    pub text: String,
    /// Conviction score, 1-5
    pub score: u8,
    /// Risks raised, in order
    pub risks: Vec<String>,
    /// Sources cited, in order
    pub sources: Vec<String>,
    /// Validated forecast, if the analyst committed to one
    pub target: Option<Target>,
    /// Provenance of the raw output
    pub source: StatementSource,
    /// Corrections applied during validation
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub repairs: Vec<Repair>,
    /// Creation time
    pub timestamp: DateTime<Utc>,
}

impl Statement {
    /// Build a statement from validated output
    pub fn from_corrected(
        analyst: AnalystIdentity,
        round: u32,
        corrected: CorrectedOutput,
        source: StatementSource,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            analyst,
            round,
            text: corrected.text,
            score: corrected.score,
            risks: corrected.risks,
            sources: corrected.sources,
            target: corrected.target,
            source,
            repairs: corrected.repairs,
            timestamp,
        }
    }

    /// Compact view handed to other analysts
    pub fn summary(&self) -> StatementSummary {
        StatementSummary {
            analyst: self.analyst,
            round: self.round,
            text: self.text.clone(),
            target_price: self.target.as_ref().map(|t| t.price),
            target_date: self.target.as_ref().map(|t| t.date_label.clone()),
        }
    }
}

/// Compact statement view: who said what, and which numbers they committed to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatementSummary {
    /// Speaking analyst
    pub analyst: AnalystIdentity,
    /// Round number
    pub round: u32,
    /// Narrative text
    pub text: String,
    /// Target price, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_price: Option<f64>,
    /// Target date label, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_date: Option<String>,
}
