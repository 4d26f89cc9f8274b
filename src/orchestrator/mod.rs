//! Orchestrator module - debate rounds and consensus
//!
//! # Components
//!
//! - **RoundOrchestrator**: runs one round, analysts strictly in sequence
//! - **ConsensusEngine**: reduces the ledger into a single forecast
//! - **DebateCouncil**: facade bundling both with the session store
//!
//! # Example
//!
//! ```rust,ignore
//! use analyst_council::prelude::*;
//!
//! let council = DebateCouncil::builder()
//!     .config(CouncilConfig::from_file("council.yaml")?)
//!     .registry(registry)
//!     .build()?;
//! council.create_or_get_session("page-42", Instrument::new("BTC", "Bitcoin"), 70_000.0).await?;
//! council.run_remaining(&"page-42".into()).await?;
//! let consensus = council.get_consensus(&"page-42".into()).await?;
//! ```

pub mod consensus;
pub mod council;
pub mod round;

// Re-exports
pub use consensus::{average_date, ConsensusEngine, ConsensusResult, Contribution};
pub use council::{DebateCouncil, DebateCouncilBuilder, SessionInfo};
pub use round::RoundOrchestrator;
