//! Agent adapters - the capability that turns debate context into analysis
//!
//! The core only depends on the [`AgentAdapter`] trait. Concrete adapters:
//!
//! - **RuleBasedAdapter**: deterministic fallback, no external calls
//! - **LlmAdapter**: renders the context into a chat completion
//! - **ChainedAdapter**: tries several adapters in order
//! - **ResilientAdapter**: timeout + fallback decorator used by the orchestrator
//!
//! # Example
//!
//! ```rust,ignore
//! use analyst_council::adapter::{AdapterRegistry, LlmAdapter};
//!
//! let registry = AdapterRegistry::new()
//!     .with(AnalystIdentity::Growth, Arc::new(LlmAdapter::new(AnalystIdentity::Growth, client)));
//! ```

pub mod fallback;
pub mod llm;
pub mod output;
pub mod resilient;

pub use fallback::RuleBasedAdapter;
pub use llm::LlmAdapter;
pub use output::{parse_number, RawOutput};
pub use resilient::{AdapterRegistry, ChainedAdapter, Invocation, ResilientAdapter};

use crate::analyst::AnalystIdentity;
use crate::error::Result;
use crate::statement::{StatementSummary, Target};
use crate::types::{Instrument, SessionId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Everything an analyst sees before speaking
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentContext {
    /// Session being debated
    pub session_id: SessionId,
    /// Analyst about to speak
    pub analyst: AnalystIdentity,
    /// Instrument under debate
    pub instrument: Instrument,
    /// Reference price for the session
    pub reference_price: f64,
    /// Round being produced (1-indexed)
    pub round: u32,
    /// Total rounds in the debate
    pub max_rounds: u32,
    /// Earlier statements, oldest first, including earlier speakers this round
    pub prior_statements: Vec<StatementSummary>,
    /// The analyst's own latest target, if any
    pub own_prior_target: Option<Target>,
}

impl AgentContext {
    /// Whether this is the last round of the debate
    pub fn is_final_round(&self) -> bool {
        self.round >= self.max_rounds
    }

    /// Statements by other analysts
    pub fn others(&self) -> impl Iterator<Item = &StatementSummary> {
        self.prior_statements
            .iter()
            .filter(move |s| s.analyst != self.analyst)
    }
}

/// Produces raw structured output for one analyst turn
#[async_trait]
pub trait AgentAdapter: Send + Sync {
    /// Generate the analyst's output for the given context
    async fn generate(&self, context: &AgentContext) -> Result<RawOutput>;

    /// Adapter name for provenance and logging
    fn name(&self) -> &str;
}
