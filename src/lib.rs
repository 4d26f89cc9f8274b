//! # Analyst Council
//!
//! Multi-round debate orchestration for price-forecasting analyst agents.
//!
//! Several analyst personas take turns discussing one instrument over a fixed
//! number of rounds. Every statement is validated against per-analyst sanity
//! bounds before it is stored, and the latest target of each analyst is
//! reduced into a single consensus forecast at the end.
//!
//! ## Features
//!
//! - **Failure isolation**: a failing, slow or panicking agent is replaced by
//!   a rule-based fallback; a round always yields one statement per analyst
//! - **Deterministic repair**: out-of-bounds prices and dates are corrected
//!   with an explicitly seeded random source
//! - **Idempotent rounds**: re-requesting a produced round replays it
//! - **Pluggable agents**: any [`AgentAdapter`], including the OpenRouter-backed
//!   [`LlmAdapter`]
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use analyst_council::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = Arc::new(OpenRouterClient::from_env()?);
//!     let registry = AdapterRegistry::new()
//!         .with(AnalystIdentity::Growth, Arc::new(LlmAdapter::new(AnalystIdentity::Growth, client)));
//!
//!     let council = DebateCouncil::new(registry)?;
//!     let id = SessionId::from("btc-debate");
//!     council
//!         .create_or_get_session(id.clone(), Instrument::new("BTC", "Bitcoin"), 70_000.0)
//!         .await?;
//!     council.run_remaining(&id).await?;
//!     println!("{}", council.get_consensus(&id).await?.rationale);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod adapter;
pub mod analyst;
pub mod config;
pub mod error;
pub mod ledger;
pub mod llm_client;
pub mod openrouter;
pub mod orchestrator;
pub mod session;
pub mod statement;
pub mod tracing_ext;
pub mod types;
pub mod validation;

// Re-exports for convenience
pub use adapter::{
    AdapterRegistry, AgentAdapter, AgentContext, ChainedAdapter, LlmAdapter, RawOutput,
    ResilientAdapter, RuleBasedAdapter,
};
pub use analyst::{AnalystIdentity, AnalystProfile};
pub use config::{ConsensusWeighting, CouncilConfig, OpenRouterConfig};
pub use error::{Error, Result};
pub use ledger::{LedgerEntry, TargetLedger};
pub use llm_client::LlmClient;
pub use openrouter::{CompletionRequest, CompletionResponse, Message, OpenRouterClient};
pub use orchestrator::{
    ConsensusEngine, ConsensusResult, DebateCouncil, DebateCouncilBuilder, RoundOrchestrator,
    SessionInfo,
};
pub use session::{DebateSession, SessionState, SessionStore};
pub use statement::{Statement, StatementSource, StatementSummary, Target};
pub use tracing_ext::{init_tracing, LogFormat};
pub use types::{Clock, FixedClock, Instrument, SessionId, SystemClock};
pub use validation::{CorrectedOutput, Repair, ValidationEngine};

/// Prelude module for common imports
pub mod prelude {
    pub use crate::adapter::{AdapterRegistry, AgentAdapter, AgentContext, LlmAdapter, RawOutput};
    pub use crate::analyst::AnalystIdentity;
    pub use crate::config::{ConsensusWeighting, CouncilConfig};
    pub use crate::error::{Error, Result};
    pub use crate::openrouter::OpenRouterClient;
    pub use crate::orchestrator::{ConsensusResult, DebateCouncil};
    pub use crate::statement::{Statement, Target};
    pub use crate::types::{Instrument, SessionId};
}
