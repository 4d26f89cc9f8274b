//! Analyst identities and their bias profiles
//!
//! Each identity carries the numbers the validation engine and the fallback
//! adapter lean on: how far above the reference price a substitute target
//! lands, where implausible targets get capped, and how far out a target
//! date must be.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the fixed personas taking part in a debate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalystIdentity {
    /// Conservative, valuation-anchored analyst
    Balanced,
    /// Aggressive, growth-oriented analyst
    Growth,
    /// Risk-focused macro analyst
    MacroRisk,
}

impl AnalystIdentity {
    /// Default debate order
    pub const ALL: [AnalystIdentity; 3] = [Self::Balanced, Self::Growth, Self::MacroRisk];

    /// Stable snake_case key
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Balanced => "balanced",
            Self::Growth => "growth",
            Self::MacroRisk => "macro_risk",
        }
    }

    /// Human-readable label
    pub fn label(&self) -> &'static str {
        match self {
            Self::Balanced => "Balanced Analyst",
            Self::Growth => "Growth Analyst",
            Self::MacroRisk => "Macro/Risk Analyst",
        }
    }

    /// Built-in profile for this identity
    pub fn default_profile(&self) -> AnalystProfile {
        match self {
            Self::Balanced => AnalystProfile {
                bias_min: 0.10,
                bias_max: 0.20,
                ceiling_multiple: 3.0,
                ceiling_target: 1.20,
                min_horizon_months: 6,
                horizon_spread_months: 3,
                default_score: 3,
            },
            Self::Growth => AnalystProfile {
                bias_min: 0.25,
                bias_max: 0.45,
                ceiling_multiple: 5.0,
                ceiling_target: 2.00,
                min_horizon_months: 12,
                horizon_spread_months: 3,
                default_score: 4,
            },
            Self::MacroRisk => AnalystProfile {
                bias_min: 0.05,
                bias_max: 0.15,
                ceiling_multiple: 3.0,
                ceiling_target: 1.15,
                min_horizon_months: 6,
                horizon_spread_months: 3,
                default_score: 2,
            },
        }
    }

    /// Short persona brief handed to language-model adapters
    pub fn persona(&self) -> &'static str {
        match self {
            Self::Balanced => {
                "You weigh valuation against fundamentals and prefer defensible, \
                 moderately positive targets."
            }
            Self::Growth => {
                "You focus on growth catalysts, adoption curves and upside scenarios, \
                 and you commit to ambitious but reasoned targets."
            }
            Self::MacroRisk => {
                "You examine rates, liquidity, regulation and downside scenarios, \
                 and you only grant modest upside."
            }
        }
    }
}

impl fmt::Display for AnalystIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for AnalystIdentity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace(['-', '/', ' '], "_").as_str() {
            "balanced" | "conservative" => Ok(Self::Balanced),
            "growth" | "aggressive" => Ok(Self::Growth),
            "macro_risk" | "macro" | "risk" => Ok(Self::MacroRisk),
            other => Err(Error::invalid_input(format!("unknown analyst identity: {}", other))),
        }
    }
}

/// Bias multipliers and bounds for one analyst identity
///
/// All ratios are relative to the session's reference price.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnalystProfile {
    /// Lower end of the upside interval used for substitute targets
    pub bias_min: f64,
    /// Upper end of the upside interval used for substitute targets
    pub bias_max: f64,
    /// Targets above `reference * ceiling_multiple` are implausible
    pub ceiling_multiple: f64,
    /// Implausible targets are capped to `reference * ceiling_target`
    pub ceiling_target: f64,
    /// Minimum forward horizon of a target date, in months
    pub min_horizon_months: u32,
    /// Extra months a synthesized date may land beyond the horizon
    pub horizon_spread_months: u32,
    /// Score used by the fallback adapter
    pub default_score: u8,
}

impl AnalystProfile {
    /// Midpoint of the bias interval
    pub fn bias_midpoint(&self) -> f64 {
        (self.bias_min + self.bias_max) / 2.0
    }

    /// Reject profiles whose numbers cannot produce a valid target
    pub fn validate(&self, identity: AnalystIdentity) -> Result<()> {
        let bad = |msg: &str| Err(Error::config(format!("profile {}: {}", identity, msg)));

        if !(self.bias_min.is_finite() && self.bias_max.is_finite()) {
            return bad("bias interval must be finite");
        }
        if self.bias_min < -0.5 || self.bias_min > self.bias_max {
            return bad("bias interval must satisfy -0.5 <= bias_min <= bias_max");
        }
        if !(self.ceiling_target >= 0.5) || !(self.ceiling_multiple > self.ceiling_target) {
            return bad("ceiling must satisfy 0.5 <= ceiling_target < ceiling_multiple");
        }
        if 1.0 + self.bias_max > self.ceiling_multiple {
            return bad("bias interval exceeds the ceiling multiple");
        }
        if self.min_horizon_months == 0 {
            return bad("minimum horizon must be at least one month");
        }
        if !(1..=5).contains(&self.default_score) {
            return bad("default score must be within 1..=5");
        }
        Ok(())
    }
}
