//! Raw structured output returned by agent adapters
//!
//! Language models are loose about number formats, so the numeric fields
//! accept either JSON numbers or strings such as `"$105,000"` or `"4/5"`.

use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};
use std::sync::OnceLock;

/// Unvalidated statement as produced by an adapter
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RawOutput {
    /// Narrative analysis
    #[serde(default, alias = "analysis", alias = "content")]
    pub text: String,
    /// Conviction score, expected within 1-5
    #[serde(default, deserialize_with = "lenient_score")]
    pub score: Option<i64>,
    /// Target price in the reference price's units
    #[serde(
        default,
        alias = "targetPrice",
        alias = "price",
        deserialize_with = "lenient_price"
    )]
    pub target_price: Option<f64>,
    /// Target date, e.g. "2027-06-30" or "June 2027"
    #[serde(default, alias = "targetDate", alias = "date")]
    pub target_date: Option<String>,
    /// Reasoning behind the target
    #[serde(default)]
    pub rationale: Option<String>,
    /// Key risks, most important first
    #[serde(default)]
    pub risks: Option<Vec<String>>,
    /// Sources or references
    #[serde(default)]
    pub sources: Option<Vec<String>>,
}

impl RawOutput {
    /// Output carrying only narrative text
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    /// Set the score
    pub fn with_score(mut self, score: i64) -> Self {
        self.score = Some(score);
        self
    }

    /// Set the target price and date
    pub fn with_target(mut self, price: f64, date: impl Into<String>) -> Self {
        self.target_price = Some(price);
        self.target_date = Some(date.into());
        self
    }

    /// Set the rationale
    pub fn with_rationale(mut self, rationale: impl Into<String>) -> Self {
        self.rationale = Some(rationale.into());
        self
    }

    /// Set the risk list
    pub fn with_risks(mut self, risks: Vec<String>) -> Self {
        self.risks = Some(risks);
        self
    }

    /// Set the source list
    pub fn with_sources(mut self, sources: Vec<String>) -> Self {
        self.sources = Some(sources);
        self
    }
}

fn number_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"-?\d[\d,]*(?:\.\d+)?").expect("valid number pattern"))
}

/// Pull the first number out of free text, ignoring currency symbols and
/// thousands separators.
pub fn parse_number(text: &str) -> Option<f64> {
    let found = number_pattern().find(text)?;
    found.as_str().replace(',', "").parse().ok()
}

fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) => parse_number(&s),
        _ => None,
    })
}

fn lenient_price<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    lenient_number(deserializer)
}

fn lenient_score<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_number(deserializer)?
        .filter(|n| n.is_finite())
        .map(|n| n.round() as i64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_number_variants() {
        assert_eq!(parse_number("$105,000"), Some(105000.0));
        assert_eq!(parse_number("about 84,250.50 USD"), Some(84250.5));
        assert_eq!(parse_number("4/5"), Some(4.0));
        assert_eq!(parse_number("n/a"), None);
    }

    #[test]
    fn test_deserialize_lenient_fields() {
        let json = r#"{
            "analysis": "Momentum is intact.",
            "score": "4/5",
            "targetPrice": "$95,000",
            "targetDate": "June 2027",
            "risks": ["Regulation"]
        }"#;
        let raw: RawOutput = serde_json::from_str(json).unwrap();
        assert_eq!(raw.text, "Momentum is intact.");
        assert_eq!(raw.score, Some(4));
        assert_eq!(raw.target_price, Some(95000.0));
        assert_eq!(raw.target_date.as_deref(), Some("June 2027"));
        assert_eq!(raw.risks, Some(vec!["Regulation".to_string()]));
        assert_eq!(raw.sources, None);
    }

    #[test]
    fn test_deserialize_missing_fields() {
        let raw: RawOutput = serde_json::from_str(r#"{"text": "Hold.", "score": null}"#).unwrap();
        assert_eq!(raw.score, None);
        assert_eq!(raw.target_price, None);
        assert_eq!(raw.rationale, None);
    }

    #[test]
    fn test_fractional_score_rounds() {
        let raw: RawOutput = serde_json::from_str(r#"{"text": "x", "score": 3.6}"#).unwrap();
        assert_eq!(raw.score, Some(4));
    }
}
