//! Validation and deterministic correction of analyst output
//!
//! Rules are applied in a fixed order, independent of the narrative text:
//!
//! 1. score clamped to 1..=5, defaulting to 3
//! 2. prices at or below 1% of the reference are taken as mis-scaled by 1000
//! 3. prices still below 50% of the reference are replaced by a synthetic
//!    target drawn from the identity's bias interval
//! 4. prices above the identity's ceiling multiple are capped to its ceiling
//!    target
//! 5. target dates missing, unparseable or inside the identity's minimum
//!    horizon are replaced by a date beyond it
//! 6. risk and source lists default to empty
//!
//! Randomness comes from an explicitly seeded source so a fixed seed yields
//! exact, repeatable corrections.

use crate::adapter::RawOutput;
use crate::analyst::{AnalystIdentity, AnalystProfile};
use crate::config::CouncilConfig;
use crate::error::{Error, Result};
use crate::statement::Target;
use crate::types::{Clock, SystemClock};
use chrono::{Datelike, Months, NaiveDate};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};
use tracing::info;

/// Score used when the adapter reports none
pub const DEFAULT_SCORE: u8 = 3;

/// Prices at or below this fraction of the reference are rescaled
pub const UNIT_SCALE_THRESHOLD: f64 = 0.01;

/// Factor applied to mis-scaled prices
pub const UNIT_SCALE_FACTOR: f64 = 1000.0;

/// Prices below this fraction of the reference are replaced
pub const LOWER_BOUND_RATIO: f64 = 0.5;

/// A single correction applied during validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum Repair {
    /// No score reported
    ScoreDefaulted {
        /// Substituted score
        to: u8,
    },
    /// Score outside 1..=5
    ScoreClamped {
        /// Reported score
        from: i64,
        /// Clamped score
        to: u8,
    },
    /// Price multiplied to undo a unit mix-up
    PriceRescaled {
        /// Reported price
        from: f64,
        /// Rescaled price
        to: f64,
    },
    /// Implausibly low price replaced by a synthetic target
    PriceSubstituted {
        /// Price before substitution
        from: f64,
        /// Synthetic price
        to: f64,
    },
    /// Implausibly high price capped
    PriceCapped {
        /// Price before capping
        from: f64,
        /// Capped price
        to: f64,
    },
    /// Target date missing, unparseable or too close
    DateRepaired {
        /// Reported date text
        from: Option<String>,
        /// Synthesized date
        to: NaiveDate,
    },
}

/// Output that satisfies every validation rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectedOutput {
    /// Narrative text
    pub text: String,
    /// Score within 1..=5
    pub score: u8,
    /// Bounded target, present when the adapter reported a price
    pub target: Option<Target>,
    /// Risks, in order
    pub risks: Vec<String>,
    /// Sources, in order
    pub sources: Vec<String>,
    /// Corrections applied
    pub repairs: Vec<Repair>,
}

/// Validates raw adapter output against per-identity sanity bounds
pub struct ValidationEngine {
    profiles: BTreeMap<AnalystIdentity, AnalystProfile>,
    rng: Mutex<StdRng>,
    clock: Arc<dyn Clock>,
}

impl ValidationEngine {
    /// Engine with built-in profiles, the wall clock and an entropy seed
    pub fn new() -> Self {
        Self {
            profiles: AnalystIdentity::ALL
                .iter()
                .map(|identity| (*identity, identity.default_profile()))
                .collect(),
            rng: Mutex::new(StdRng::from_entropy()),
            clock: Arc::new(SystemClock),
        }
    }

    /// Engine using the configuration's profiles and seed
    pub fn from_config(config: &CouncilConfig, clock: Arc<dyn Clock>) -> Self {
        let mut engine = Self::new().with_clock(clock);
        for identity in AnalystIdentity::ALL {
            engine.profiles.insert(identity, config.profile(identity));
        }
        if let Some(seed) = config.seed {
            engine = engine.with_seed(seed);
        }
        engine
    }

    /// Use a fixed seed
    pub fn with_seed(self, seed: u64) -> Self {
        *self.rng.lock() = StdRng::seed_from_u64(seed);
        self
    }

    /// Use a specific clock
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Override one identity's profile, rejecting numbers that cannot keep
    /// targets within bounds
    pub fn with_profile(
        mut self,
        identity: AnalystIdentity,
        profile: AnalystProfile,
    ) -> Result<Self> {
        profile.validate(identity)?;
        self.profiles.insert(identity, profile);
        Ok(self)
    }

    /// Profile in effect for an identity
    pub fn profile(&self, identity: AnalystIdentity) -> AnalystProfile {
        self.profiles
            .get(&identity)
            .copied()
            .unwrap_or_else(|| identity.default_profile())
    }

    /// Correct a raw output so every numeric field is within bounds
    pub fn validate(
        &self,
        raw: &RawOutput,
        identity: AnalystIdentity,
        reference_price: f64,
    ) -> Result<CorrectedOutput> {
        if !(reference_price.is_finite() && reference_price > 0.0) {
            return Err(Error::invalid_input(format!(
                "reference price must be positive, got {}",
                reference_price
            )));
        }

        let profile = self.profile(identity);
        let mut repairs = Vec::new();

        let score = match raw.score {
            None => {
                repairs.push(Repair::ScoreDefaulted { to: DEFAULT_SCORE });
                DEFAULT_SCORE
            }
            Some(s) if !(1..=5).contains(&s) => {
                let clamped = s.clamp(1, 5) as u8;
                repairs.push(Repair::ScoreClamped { from: s, to: clamped });
                clamped
            }
            Some(s) => s as u8,
        };

        let target = match raw.target_price {
            Some(reported) => {
                let price = self.bound_price(reported, reference_price, &profile, &mut repairs);
                let date = self.bound_date(raw.target_date.as_deref(), &profile, &mut repairs);
                Some(Target {
                    price,
                    date,
                    date_label: date_label(date),
                    rationale: raw.rationale.clone().unwrap_or_default(),
                    confidence: score,
                })
            }
            None => None,
        };

        for repair in &repairs {
            info!(analyst = %identity, ?repair, "Validation repair applied");
        }

        Ok(CorrectedOutput {
            text: raw.text.clone(),
            score,
            target,
            risks: raw.risks.clone().unwrap_or_default(),
            sources: raw.sources.clone().unwrap_or_default(),
            repairs,
        })
    }

    fn bound_price(
        &self,
        reported: f64,
        reference: f64,
        profile: &AnalystProfile,
        repairs: &mut Vec<Repair>,
    ) -> f64 {
        let mut price = if reported.is_finite() { reported } else { 0.0 };

        if price > 0.0 && price <= reference * UNIT_SCALE_THRESHOLD {
            let rescaled = price * UNIT_SCALE_FACTOR;
            repairs.push(Repair::PriceRescaled { from: price, to: rescaled });
            price = rescaled;
        }

        if price < reference * LOWER_BOUND_RATIO {
            let bias = self.rng.lock().gen_range(profile.bias_min..=profile.bias_max);
            let synthetic = round_cents(reference * (1.0 + bias));
            repairs.push(Repair::PriceSubstituted { from: price, to: synthetic });
            price = synthetic;
        }

        if price > reference * profile.ceiling_multiple {
            let capped = round_cents(reference * profile.ceiling_target);
            repairs.push(Repair::PriceCapped { from: price, to: capped });
            price = capped;
        }

        price
    }

    fn bound_date(
        &self,
        reported: Option<&str>,
        profile: &AnalystProfile,
        repairs: &mut Vec<Repair>,
    ) -> NaiveDate {
        let today = self.clock.now().date_naive();
        let earliest = add_months(today, profile.min_horizon_months);

        match reported.and_then(parse_target_date) {
            Some(date) if date >= earliest => date,
            _ => {
                let spread = self.rng.lock().gen_range(0..=profile.horizon_spread_months);
                let synthetic = add_months(today, profile.min_horizon_months + spread);
                repairs.push(Repair::DateRepaired {
                    from: reported.map(str::to_string),
                    to: synthetic,
                });
                synthetic
            }
        }
    }
}

impl Default for ValidationEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Round to two decimal places
pub fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Calendar label used for target dates, e.g. "June 2027"
pub fn date_label(date: NaiveDate) -> String {
    date.format("%B %Y").to_string()
}

/// Add calendar months, clamping to the end of shorter months
pub fn add_months(date: NaiveDate, months: u32) -> NaiveDate {
    date.checked_add_months(Months::new(months))
        .unwrap_or(NaiveDate::MAX)
}

/// Last calendar day of a month
pub fn end_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    first.checked_add_months(Months::new(1))?.pred_opt()
}

/// Month names and abbreviations; the trailing boundary keeps words such
/// as "market" or "decade" from reading as months.
const MONTH: &str = r"(january|february|march|april|may|june|july|august|september|october|november|december|jan|feb|mar|apr|jun|jul|aug|sept|sep|oct|nov|dec)\b\.?";

struct DatePatterns {
    iso: Regex,
    day_first: Regex,
    month_day_year: Regex,
    day_month_year: Regex,
    month_year: Regex,
    quarter: Regex,
}

fn date_patterns() -> &'static DatePatterns {
    static PATTERNS: OnceLock<DatePatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let compile = |pattern: &str| {
            Regex::new(&pattern.replace("MONTH", MONTH)).expect("valid date pattern")
        };
        DatePatterns {
            iso: compile(r"\b(\d{4})\s*[-/.]\s*(\d{1,2})(?:\s*[-/.]\s*(\d{1,2}))?"),
            day_first: compile(r"\b(\d{1,2})[-/.](\d{1,2})[-/.](\d{4})\b"),
            month_day_year: compile(r"(?i)\bMONTH\s+(\d{1,2})(?:st|nd|rd|th)?,?\s+(\d{4})\b"),
            day_month_year: compile(r"(?i)\b(\d{1,2})(?:st|nd|rd|th)?\s+MONTH,?\s+(\d{4})\b"),
            month_year: compile(r"(?i)\bMONTH,?\s+(\d{4})\b"),
            quarter: compile(r"(?i)\bQ([1-4])\s*[-/]?\s*(\d{4})\b"),
        }
    })
}

fn num(caps: &Captures<'_>, i: usize) -> Option<u32> {
    caps.get(i)?.as_str().parse().ok()
}

fn year(caps: &Captures<'_>, i: usize) -> Option<i32> {
    caps.get(i)?.as_str().parse().ok()
}

fn month_number(name: &str) -> Option<u32> {
    let month = match name.get(..3)?.to_lowercase().as_str() {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(month)
}

/// Parse the date formats analysts commonly produce.
///
/// Accepts `2027-06-30`, `2027/06`, `30/06/2027` (numeric dates with the year
/// last are read day first), `June 30, 2027`, `30 June 2027`, `Dec 15 2027`,
/// `June 2027`, `Jun. 2027` and `Q2 2027`. Dates without a day resolve to the
/// last day of the month (or quarter), matching how "by June 2027" is read.
pub fn parse_target_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    let patterns = date_patterns();

    if let Some(caps) = patterns.iso.captures(text) {
        let (y, m) = (year(&caps, 1)?, num(&caps, 2)?);
        return match num(&caps, 3) {
            Some(day) => NaiveDate::from_ymd_opt(y, m, day),
            None => end_of_month(y, m),
        };
    }

    if let Some(caps) = patterns.day_first.captures(text) {
        return NaiveDate::from_ymd_opt(year(&caps, 3)?, num(&caps, 2)?, num(&caps, 1)?);
    }

    if let Some(caps) = patterns.month_day_year.captures(text) {
        return NaiveDate::from_ymd_opt(year(&caps, 3)?, month_number(&caps[1])?, num(&caps, 2)?);
    }

    if let Some(caps) = patterns.day_month_year.captures(text) {
        return NaiveDate::from_ymd_opt(year(&caps, 3)?, month_number(&caps[2])?, num(&caps, 1)?);
    }

    if let Some(caps) = patterns.month_year.captures(text) {
        return end_of_month(year(&caps, 2)?, month_number(&caps[1])?);
    }

    if let Some(caps) = patterns.quarter.captures(text) {
        return end_of_month(year(&caps, 2)?, num(&caps, 1)? * 3);
    }

    None
}

/// Year and month of a date, as used by consensus date averaging
pub fn year_month(date: NaiveDate) -> (i32, u32) {
    (date.year(), date.month())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FixedClock;
    use chrono::{TimeZone, Utc};

    const REF: f64 = 70_000.0;

    fn engine() -> ValidationEngine {
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2026, 1, 15, 12, 0, 0).unwrap());
        ValidationEngine::new()
            .with_clock(Arc::new(clock))
            .with_seed(7)
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, 15).unwrap()
    }

    #[test]
    fn test_in_bounds_output_untouched() {
        let raw = RawOutput::text("Constructive.")
            .with_score(4)
            .with_target(82_000.0, "2026-09-30")
            .with_rationale("Earnings momentum");

        let out = engine().validate(&raw, AnalystIdentity::Balanced, REF).unwrap();
        assert!(out.repairs.is_empty());
        let target = out.target.unwrap();
        assert_eq!(target.price, 82_000.0);
        assert_eq!(target.date, NaiveDate::from_ymd_opt(2026, 9, 30).unwrap());
        assert_eq!(target.date_label, "September 2026");
        assert_eq!(target.rationale, "Earnings momentum");
        assert_eq!(target.confidence, 4);
    }

    #[test]
    fn test_score_default_and_clamp() {
        let engine = engine();

        let out = engine.validate(&RawOutput::text("x"), AnalystIdentity::Growth, REF).unwrap();
        assert_eq!(out.score, 3);
        assert_eq!(out.repairs, vec![Repair::ScoreDefaulted { to: 3 }]);

        let out = engine
            .validate(&RawOutput::text("x").with_score(9), AnalystIdentity::Growth, REF)
            .unwrap();
        assert_eq!(out.score, 5);

        let out = engine
            .validate(&RawOutput::text("x").with_score(-2), AnalystIdentity::Growth, REF)
            .unwrap();
        assert_eq!(out.score, 1);
    }

    #[test]
    fn test_mis_scaled_price_rescaled_then_capped() {
        let raw = RawOutput::text("x").with_score(3).with_target(700.0, "2027-12-31");

        let out = engine().validate(&raw, AnalystIdentity::Balanced, REF).unwrap();
        assert_eq!(
            out.repairs,
            vec![
                Repair::PriceRescaled { from: 700.0, to: 700_000.0 },
                Repair::PriceCapped { from: 700_000.0, to: 84_000.0 },
            ]
        );
        assert_eq!(out.target.unwrap().price, 84_000.0);
    }

    #[test]
    fn test_cap_uses_identity_ceiling_target() {
        let mut profile = AnalystIdentity::Growth.default_profile();
        profile.ceiling_target = 1.5;
        let engine = engine().with_profile(AnalystIdentity::Growth, profile).unwrap();

        let raw = RawOutput::text("x").with_score(5).with_target(700.0, "2028-01-31");
        let out = engine.validate(&raw, AnalystIdentity::Growth, REF).unwrap();
        assert_eq!(out.target.unwrap().price, 105_000.0);
    }

    #[test]
    fn test_growth_tolerates_higher_targets() {
        let raw = RawOutput::text("x").with_score(5).with_target(300_000.0, "2028-01-31");

        let growth = engine().validate(&raw, AnalystIdentity::Growth, REF).unwrap();
        assert_eq!(growth.target.unwrap().price, 300_000.0);

        let risk = engine().validate(&raw, AnalystIdentity::MacroRisk, REF).unwrap();
        assert_eq!(risk.target.unwrap().price, 80_500.0);
    }

    #[test]
    fn test_low_price_substituted_within_bias() {
        let raw = RawOutput::text("x").with_score(2).with_target(20_000.0, "2027-03-31");

        for identity in AnalystIdentity::ALL {
            let profile = identity.default_profile();
            let out = engine().validate(&raw, identity, REF).unwrap();
            let price = out.target.unwrap().price;
            assert!(price >= round_cents(REF * (1.0 + profile.bias_min)) - 0.01);
            assert!(price <= round_cents(REF * (1.0 + profile.bias_max)) + 0.01);
            assert!(matches!(out.repairs[0], Repair::PriceSubstituted { from, .. } if from == 20_000.0));
        }
    }

    #[test]
    fn test_fixed_seed_is_repeatable() {
        let raw = RawOutput::text("x").with_score(3).with_target(-5.0, "");

        let a = engine().validate(&raw, AnalystIdentity::Growth, REF).unwrap();
        let b = engine().validate(&raw, AnalystIdentity::Growth, REF).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_non_finite_price_substituted() {
        let raw = RawOutput::text("x").with_score(3).with_target(f64::NAN, "2027-06");
        let out = engine().validate(&raw, AnalystIdentity::Balanced, REF).unwrap();
        let price = out.target.unwrap().price;
        assert!(price >= REF * 1.10 - 0.01 && price <= REF * 1.20 + 0.01);
    }

    #[test]
    fn test_date_inside_horizon_repaired() {
        let raw = RawOutput::text("x").with_score(3).with_target(80_000.0, "2026-03-31");

        let out = engine().validate(&raw, AnalystIdentity::Balanced, REF).unwrap();
        let date = out.target.unwrap().date;
        assert!(date >= add_months(today(), 6));
        assert!(date <= add_months(today(), 9));
        assert!(matches!(
            out.repairs.as_slice(),
            [Repair::DateRepaired { from: Some(f), .. }] if f == "2026-03-31"
        ));
    }

    #[test]
    fn test_missing_date_uses_identity_horizon() {
        let raw = RawOutput {
            text: "x".into(),
            score: Some(4),
            target_price: Some(90_000.0),
            ..RawOutput::default()
        };

        let out = engine().validate(&raw, AnalystIdentity::Growth, REF).unwrap();
        let date = out.target.unwrap().date;
        assert!(date >= add_months(today(), 12));
        assert!(date <= add_months(today(), 15));
    }

    #[test]
    fn test_no_price_means_no_target() {
        let raw = RawOutput::text("Waiting for earnings.").with_score(3);
        let out = engine().validate(&raw, AnalystIdentity::Balanced, REF).unwrap();
        assert!(out.target.is_none());
        assert!(out.risks.is_empty());
        assert!(out.sources.is_empty());
    }

    #[test]
    fn test_rejects_bad_reference_price() {
        let raw = RawOutput::text("x");
        assert!(engine().validate(&raw, AnalystIdentity::Balanced, 0.0).is_err());
        assert!(engine().validate(&raw, AnalystIdentity::Balanced, f64::NAN).is_err());
    }

    #[test]
    fn test_parse_target_date_formats() {
        let d = |y, m, day| NaiveDate::from_ymd_opt(y, m, day).unwrap();
        assert_eq!(parse_target_date("2027-06-15"), Some(d(2027, 6, 15)));
        assert_eq!(parse_target_date("2027/06"), Some(d(2027, 6, 30)));
        assert_eq!(parse_target_date("June 2027"), Some(d(2027, 6, 30)));
        assert_eq!(parse_target_date("by Feb. 2028"), Some(d(2028, 2, 29)));
        assert_eq!(parse_target_date("Q4 2027"), Some(d(2027, 12, 31)));
        assert_eq!(parse_target_date("2027-13"), None);
        assert_eq!(parse_target_date("next year"), None);
    }

    #[test]
    fn test_parse_dates_with_day_and_month_name() {
        let d = |y, m, day| NaiveDate::from_ymd_opt(y, m, day).unwrap();
        assert_eq!(parse_target_date("June 30, 2027"), Some(d(2027, 6, 30)));
        assert_eq!(parse_target_date("Dec 15 2027"), Some(d(2027, 12, 15)));
        assert_eq!(parse_target_date("Sept. 3rd, 2027"), Some(d(2027, 9, 3)));
        assert_eq!(parse_target_date("30 June 2027"), Some(d(2027, 6, 30)));
        assert_eq!(parse_target_date("30/06/2027"), Some(d(2027, 6, 30)));
        assert_eq!(parse_target_date("31.12.2027"), Some(d(2027, 12, 31)));
        assert_eq!(parse_target_date("June 31, 2027"), None);
    }

    #[test]
    fn test_prose_is_not_a_month() {
        assert_eq!(parse_target_date("market 2027"), None);
        assert_eq!(parse_target_date("a decade 2030"), None);
        assert_eq!(parse_target_date("mayhem 2027"), None);
    }

    #[test]
    fn test_dated_forecast_beyond_horizon_is_kept() {
        let raw = RawOutput::text("x").with_score(3).with_target(80_000.0, "June 30, 2027");
        let out = engine().validate(&raw, AnalystIdentity::Balanced, REF).unwrap();
        assert!(out.repairs.is_empty());
        assert_eq!(out.target.unwrap().date, NaiveDate::from_ymd_opt(2027, 6, 30).unwrap());
    }

    #[test]
    fn test_profile_override_is_validated() {
        let mut profile = AnalystIdentity::Balanced.default_profile();
        profile.ceiling_target = 0.3;
        assert!(engine().with_profile(AnalystIdentity::Balanced, profile).is_err());
    }
}
