//! Rule-based fallback adapter
//!
//! Produces a plausible statement from the context alone. It never performs
//! I/O, so it is what a round falls back on when the primary adapter fails.

use super::{AgentAdapter, AgentContext, RawOutput};
use crate::analyst::{AnalystIdentity, AnalystProfile};
use crate::error::Result;
use crate::types::{Clock, SystemClock};
use crate::validation::{add_months, round_cents};
use async_trait::async_trait;
use std::sync::Arc;

/// Deterministic, identity-specific generator
pub struct RuleBasedAdapter {
    identity: AnalystIdentity,
    profile: AnalystProfile,
    clock: Arc<dyn Clock>,
    name: String,
}

impl RuleBasedAdapter {
    /// Fallback for an identity using its built-in profile
    pub fn new(identity: AnalystIdentity) -> Self {
        Self {
            identity,
            profile: identity.default_profile(),
            clock: Arc::new(SystemClock),
            name: format!("rule-based/{}", identity.as_str()),
        }
    }

    /// Use a specific profile
    pub fn with_profile(mut self, profile: AnalystProfile) -> Self {
        self.profile = profile;
        self
    }

    /// Use a specific clock
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Identity this fallback speaks for
    pub fn identity(&self) -> AnalystIdentity {
        self.identity
    }

    /// Produce output synchronously.
    ///
    /// The analyst keeps its previous target when it has one; otherwise the
    /// target sits at the middle of the identity's bias interval. The date is
    /// one month past the minimum horizon so it always clears validation.
    pub fn produce(&self, context: &AgentContext) -> RawOutput {
        let price = match &context.own_prior_target {
            Some(prior) => prior.price,
            None => round_cents(context.reference_price * (1.0 + self.profile.bias_midpoint())),
        };
        let date = add_months(
            self.clock.now().date_naive(),
            self.profile.min_horizon_months + 1,
        );

        let upside = (price / context.reference_price - 1.0) * 100.0;
        let name = &context.instrument.name;
        let (text, risks) = match self.identity {
            AnalystIdentity::Balanced => (
                format!(
                    "Weighing valuation against fundamentals, {} looks fairly priced with \
                     measured upside of {:.1}%. I hold my view pending clearer evidence.",
                    name, upside
                ),
                vec![
                    "Valuation compression".to_string(),
                    "Slowing earnings momentum".to_string(),
                ],
            ),
            AnalystIdentity::Growth => (
                format!(
                    "The growth runway for {} remains underappreciated; I see {:.1}% upside \
                     as adoption compounds.",
                    name, upside
                ),
                vec![
                    "Execution risk on expansion".to_string(),
                    "Sentiment reversal".to_string(),
                ],
            ),
            AnalystIdentity::MacroRisk => (
                format!(
                    "Macro conditions cap the upside for {}; a modest {:.1}% move is the \
                     most I would underwrite given rate and liquidity risk.",
                    name, upside
                ),
                vec![
                    "Tighter monetary policy".to_string(),
                    "Liquidity drawdown".to_string(),
                    "Regulatory shock".to_string(),
                ],
            ),
        };

        RawOutput::text(text)
            .with_score(self.profile.default_score as i64)
            .with_target(price, date.format("%Y-%m-%d").to_string())
            .with_rationale(format!(
                "{} fallback estimate anchored on the reference price of {:.2}",
                self.identity.label(),
                context.reference_price
            ))
            .with_risks(risks)
            .with_sources(vec!["rule-based fallback".to_string()])
    }
}

#[async_trait]
impl AgentAdapter for RuleBasedAdapter {
    async fn generate(&self, context: &AgentContext) -> Result<RawOutput> {
        Ok(self.produce(context))
    }

    fn name(&self) -> &str {
        &self.name
    }
}
