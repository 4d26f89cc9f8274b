//! Caller-facing facade over the session store, round orchestrator and
//! consensus engine

use super::consensus::{ConsensusEngine, ConsensusResult};
use super::round::RoundOrchestrator;
use crate::adapter::AdapterRegistry;
use crate::analyst::AnalystIdentity;
use crate::config::CouncilConfig;
use crate::error::{Error, Result};
use crate::session::{DebateSession, SessionState, SessionStore};
use crate::statement::Statement;
use crate::types::{Clock, Instrument, SessionId, SystemClock};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Snapshot of a session's progress
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionInfo {
    /// Session identifier
    pub id: SessionId,
    /// Instrument under debate
    pub instrument: Instrument,
    /// Reference price
    pub reference_price: f64,
    /// Lifecycle state
    pub state: SessionState,
    /// Completed rounds
    pub current_round: u32,
    /// Configured rounds
    pub max_rounds: u32,
    /// Statements recorded
    pub statements: usize,
    /// Last mutation
    pub updated_at: DateTime<Utc>,
}

impl From<&DebateSession> for SessionInfo {
    fn from(session: &DebateSession) -> Self {
        Self {
            id: session.id.clone(),
            instrument: session.instrument.clone(),
            reference_price: session.reference_price,
            state: session.state(),
            current_round: session.current_round,
            max_rounds: session.max_rounds,
            statements: session.history.len(),
            updated_at: session.updated_at,
        }
    }
}

/// Multi-round analyst debate council
pub struct DebateCouncil {
    config: CouncilConfig,
    store: Arc<SessionStore>,
    rounds: RoundOrchestrator,
    consensus: ConsensusEngine,
}

impl DebateCouncil {
    /// Create a builder
    pub fn builder() -> DebateCouncilBuilder {
        DebateCouncilBuilder::new()
    }

    /// Council with default configuration and the given adapters
    pub fn new(registry: AdapterRegistry) -> Result<Self> {
        Self::builder().registry(registry).build()
    }

    /// Configuration in effect
    pub fn config(&self) -> &CouncilConfig {
        &self.config
    }

    /// Analysts in speaking order
    pub fn roster(&self) -> Vec<AnalystIdentity> {
        self.rounds.roster()
    }

    /// Look up a session, creating it on first use. An existing session is
    /// returned unchanged.
    pub async fn create_or_get_session(
        &self,
        id: impl Into<SessionId>,
        instrument: Instrument,
        reference_price: f64,
    ) -> Result<SessionInfo> {
        let (handle, _) = self.store.create_or_get(
            id.into(),
            instrument,
            reference_price,
            self.config.max_rounds,
        )?;
        let session = handle.lock().await;
        Ok(SessionInfo::from(&*session))
    }

    /// Replace the reference price before the first round
    pub async fn set_reference_price(&self, id: &SessionId, price: f64) -> Result<()> {
        let handle = self.store.get(id)?;
        let mut session = handle.lock().await;
        session.set_reference_price(price, self.store.clock().now())?;
        info!(session = %id, price, "Reference price updated");
        Ok(())
    }

    /// Run one round; see [`RoundOrchestrator::run_round`]
    pub async fn run_round(&self, id: &SessionId, round: u32) -> Result<Vec<Statement>> {
        self.rounds.run_round(id, round).await
    }

    /// Run every remaining round and return them in order
    pub async fn run_remaining(&self, id: &SessionId) -> Result<Vec<Vec<Statement>>> {
        let (next, max) = {
            let handle = self.store.get(id)?;
            let session = handle.lock().await;
            (session.current_round + 1, session.max_rounds)
        };

        let mut rounds = Vec::new();
        for round in next..=max {
            rounds.push(self.rounds.run_round(id, round).await?);
        }
        Ok(rounds)
    }

    /// Full statement history, in speaking order
    pub async fn get_history(&self, id: &SessionId) -> Result<Vec<Statement>> {
        let handle = self.store.get(id)?;
        let session = handle.lock().await;
        Ok(session.history.clone())
    }

    /// Consensus over the latest targets
    pub async fn get_consensus(&self, id: &SessionId) -> Result<ConsensusResult> {
        self.consensus.derive(id).await
    }

    /// Lifecycle state of a session
    pub async fn session_state(&self, id: &SessionId) -> Result<SessionState> {
        Ok(self.session_info(id).await?.state)
    }

    /// Progress snapshot of a session
    pub async fn session_info(&self, id: &SessionId) -> Result<SessionInfo> {
        let handle = self.store.get(id)?;
        let session = handle.lock().await;
        Ok(SessionInfo::from(&*session))
    }

    /// Copy of the full session state, for hosts that persist sessions
    pub async fn snapshot(&self, id: &SessionId) -> Result<DebateSession> {
        let handle = self.store.get(id)?;
        let session = handle.lock().await;
        Ok(session.clone())
    }

    /// Ids of live sessions
    pub fn session_ids(&self) -> Vec<SessionId> {
        self.store.ids()
    }

    /// Destroy a session
    pub fn evict(&self, id: &SessionId) -> Result<()> {
        if self.store.evict(id) {
            Ok(())
        } else {
            Err(Error::session_not_found(id))
        }
    }

    /// Evict sessions idle for longer than `older_than`, or the configured
    /// idle TTL when `None`. Returns the number evicted.
    pub fn evict_idle(&self, older_than: Option<chrono::Duration>) -> Result<usize> {
        let ttl = older_than
            .or_else(|| self.config.idle_ttl())
            .ok_or_else(|| Error::config("no idle TTL given or configured"))?;
        Ok(self.store.evict_idle(ttl))
    }
}

/// Builder for [`DebateCouncil`]
pub struct DebateCouncilBuilder {
    config: CouncilConfig,
    registry: AdapterRegistry,
    clock: Arc<dyn Clock>,
    agent_timeout: Option<Duration>,
}

impl DebateCouncilBuilder {
    /// Create a new builder with default configuration and no adapters
    pub fn new() -> Self {
        Self {
            config: CouncilConfig::default(),
            registry: AdapterRegistry::new(),
            clock: Arc::new(SystemClock),
            agent_timeout: None,
        }
    }

    /// Set the configuration
    pub fn config(mut self, config: CouncilConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the primary adapters
    pub fn registry(mut self, registry: AdapterRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Set the clock
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Override the configured adapter timeout, e.g. with sub-second values
    pub fn agent_timeout(mut self, timeout: Duration) -> Self {
        self.agent_timeout = Some(timeout);
        self
    }

    /// Build the council
    pub fn build(self) -> Result<DebateCouncil> {
        let timeout = self.agent_timeout.unwrap_or_else(|| self.config.agent_timeout());
        let store = Arc::new(SessionStore::with_clock(self.clock));
        let rounds = RoundOrchestrator::with_timeout(store.clone(), &self.registry, &self.config, timeout)?;
        let consensus = ConsensusEngine::new(store.clone(), self.config.analysts.clone())
            .with_weighting(self.config.weighting);

        Ok(DebateCouncil {
            config: self.config,
            store,
            rounds,
            consensus,
        })
    }
}

impl Default for DebateCouncilBuilder {
    fn default() -> Self {
        Self::new()
    }
}
