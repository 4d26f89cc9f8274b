//! Consensus derivation
//!
//! Reduces the ledger's latest target per analyst into one agreed price,
//! a price range, a dispersion measure and a synthesized date.
//!
//! The date is built by rounding the mean year and the mean month
//! separately. This is not a calendar mean: December 2026 and February 2027
//! give July 2027, which lies outside both inputs.

use crate::analyst::AnalystIdentity;
use crate::config::ConsensusWeighting;
use crate::error::{Error, Result};
use crate::session::{DebateSession, SessionStore};
use crate::types::{Instrument, SessionId};
use crate::validation::{date_label, end_of_month, round_cents, year_month};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// One analyst's share of the consensus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contribution {
    /// Contributing analyst
    pub analyst: AnalystIdentity,
    /// Target price
    pub price: f64,
    /// Target date
    pub date: NaiveDate,
    /// Latest statement score
    pub confidence: u8,
    /// Weight applied in the average
    pub weight: f64,
    /// Round the target was set in
    pub round: u32,
}

/// Aggregate forecast for a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusResult {
    /// Session the result was derived from
    pub session_id: SessionId,
    /// Instrument under debate
    pub instrument: Instrument,
    /// Session reference price
    pub reference_price: f64,
    /// Agreed price
    pub average_price: f64,
    /// Lowest contributing target
    pub min_price: f64,
    /// Highest contributing target
    pub max_price: f64,
    /// `(max - min) / average`, as a percentage
    pub dispersion_pct: f64,
    /// Agreed price relative to the reference price, as a percentage
    pub upside_pct: f64,
    /// Synthesized target date
    pub target_date: NaiveDate,
    /// Calendar label of the target date
    pub target_date_label: String,
    /// Averaging policy used
    pub weighting: ConsensusWeighting,
    /// Analyst holding the highest target
    pub high_analyst: AnalystIdentity,
    /// Analyst holding the lowest target
    pub low_analyst: AnalystIdentity,
    /// Per-analyst inputs, in speaking order
    pub contributions: Vec<Contribution>,
    /// Short narrative summary
    pub rationale: String,
}

/// Derives [`ConsensusResult`]s from session ledgers
pub struct ConsensusEngine {
    store: Arc<SessionStore>,
    roster: Vec<AnalystIdentity>,
    weighting: ConsensusWeighting,
}

impl ConsensusEngine {
    /// Engine requiring a target from every analyst in `roster`
    pub fn new(store: Arc<SessionStore>, roster: Vec<AnalystIdentity>) -> Self {
        Self {
            store,
            roster,
            weighting: ConsensusWeighting::Equal,
        }
    }

    /// Set the averaging policy
    pub fn with_weighting(mut self, weighting: ConsensusWeighting) -> Self {
        self.weighting = weighting;
        self
    }

    /// Derive the consensus for a stored session
    pub async fn derive(&self, id: &SessionId) -> Result<ConsensusResult> {
        let handle = self.store.get(id)?;
        let session = handle.lock().await;
        self.derive_from(&session)
    }

    /// Derive the consensus from session state; depends only on the ledger
    pub fn derive_from(&self, session: &DebateSession) -> Result<ConsensusResult> {
        let missing = session.ledger.missing(&self.roster);
        if !missing.is_empty() {
            return Err(Error::ledger_incomplete(missing.as_slice()));
        }

        let mut contributions = Vec::with_capacity(self.roster.len());
        for analyst in &self.roster {
            let entry = session
                .ledger
                .get(*analyst)
                .ok_or_else(|| Error::ledger_incomplete(&[analyst]))?;
            let confidence = session
                .ledger
                .latest_score(*analyst)
                .unwrap_or(entry.target.confidence);
            let weight = match self.weighting {
                ConsensusWeighting::Equal => 1.0,
                ConsensusWeighting::Confidence => f64::from(confidence),
            };
            contributions.push(Contribution {
                analyst: *analyst,
                price: entry.target.price,
                date: entry.target.date,
                confidence,
                weight,
                round: entry.round,
            });
        }

        let total_weight: f64 = contributions.iter().map(|c| c.weight).sum();
        if contributions.is_empty() || total_weight <= 0.0 {
            return Err(Error::invalid_input("consensus needs at least one weighted target"));
        }
        let average_price =
            round_cents(contributions.iter().map(|c| c.price * c.weight).sum::<f64>() / total_weight);

        // Strict comparisons keep the earlier analyst on ties.
        let (mut low, mut high) = (0, 0);
        for (i, c) in contributions.iter().enumerate() {
            if c.price < contributions[low].price {
                low = i;
            }
            if c.price > contributions[high].price {
                high = i;
            }
        }
        let (low_analyst, min_price) = (contributions[low].analyst, contributions[low].price);
        let (high_analyst, max_price) = (contributions[high].analyst, contributions[high].price);
        let dispersion_pct = (max_price - min_price) / average_price * 100.0;
        let upside_pct = (average_price / session.reference_price - 1.0) * 100.0;

        let target_date = average_date(contributions.iter().map(|c| c.date))?;
        let target_date_label = date_label(target_date);

        let weighting_note = match self.weighting {
            ConsensusWeighting::Equal => "equal-weighted",
            ConsensusWeighting::Confidence => "confidence-weighted by latest scores",
        };
        let rationale = format!(
            "{} analysts agree on {:.2} ({}) for {} by {}, {:+.1}% versus the reference price. \
             {} set the high at {:.2} and {} the low at {:.2}; dispersion {:.1}%.",
            contributions.len(),
            average_price,
            weighting_note,
            session.instrument.symbol,
            target_date_label,
            upside_pct,
            high_analyst.label(),
            max_price,
            low_analyst.label(),
            min_price,
            dispersion_pct
        );

        debug!(session = %session.id, average_price, dispersion_pct, "Consensus derived");

        Ok(ConsensusResult {
            session_id: session.id.clone(),
            instrument: session.instrument.clone(),
            reference_price: session.reference_price,
            average_price,
            min_price,
            max_price,
            dispersion_pct,
            upside_pct,
            target_date,
            target_date_label,
            weighting: self.weighting,
            high_analyst,
            low_analyst,
            rationale,
            contributions,
        })
    }
}

/// Round the mean year and mean month independently, then take the last day
/// of the resulting month.
pub fn average_date(dates: impl IntoIterator<Item = NaiveDate>) -> Result<NaiveDate> {
    let (mut years, mut months, mut count) = (0.0, 0.0, 0.0);
    for date in dates {
        let (year, month) = year_month(date);
        years += f64::from(year);
        months += f64::from(month);
        count += 1.0;
    }
    if count == 0.0 {
        return Err(Error::invalid_input("no dates to average"));
    }

    let year = (years / count).round() as i32;
    let month = ((months / count).round() as u32).clamp(1, 12);
    end_of_month(year, month)
        .ok_or_else(|| Error::other(format!("cannot build a date for {}-{:02}", year, month)))
}
