//! Round execution
//!
//! Analysts speak strictly in sequence. Each one sees the committed history
//! plus whatever earlier speakers said in the same round. The round is only
//! written to the session once every analyst has a validated statement.

use crate::adapter::{AdapterRegistry, Invocation, ResilientAdapter};
use crate::analyst::AnalystIdentity;
use crate::config::CouncilConfig;
use crate::error::{Error, Result};
use crate::session::{DebateSession, SessionStore};
use crate::statement::Statement;
use crate::types::{Clock, SessionId};
use crate::validation::ValidationEngine;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Runs debate rounds against sessions in a [`SessionStore`]
pub struct RoundOrchestrator {
    store: Arc<SessionStore>,
    adapters: Vec<ResilientAdapter>,
    validator: Arc<ValidationEngine>,
    clock: Arc<dyn Clock>,
}

impl RoundOrchestrator {
    /// Assemble an orchestrator from already-resolved parts.
    ///
    /// `adapters` fixes the speaking order.
    pub fn new(
        store: Arc<SessionStore>,
        adapters: Vec<ResilientAdapter>,
        validator: Arc<ValidationEngine>,
    ) -> Self {
        let clock = store.clock();
        Self {
            store,
            adapters,
            validator,
            clock,
        }
    }

    /// Resolve adapters and the validation engine from configuration
    pub fn from_config(
        store: Arc<SessionStore>,
        registry: &AdapterRegistry,
        config: &CouncilConfig,
    ) -> Result<Self> {
        Self::with_timeout(store, registry, config, config.agent_timeout())
    }

    /// Like [`from_config`](Self::from_config) with an explicit adapter timeout
    pub fn with_timeout(
        store: Arc<SessionStore>,
        registry: &AdapterRegistry,
        config: &CouncilConfig,
        timeout: Duration,
    ) -> Result<Self> {
        config.validate()?;
        let clock = store.clock();
        let adapters = config
            .analysts
            .iter()
            .map(|identity| {
                registry.resolve(*identity, config.profile(*identity), timeout, clock.clone())
            })
            .collect();
        let validator = Arc::new(ValidationEngine::from_config(config, clock));
        Ok(Self::new(store, adapters, validator))
    }

    /// Analysts in speaking order
    pub fn roster(&self) -> Vec<AnalystIdentity> {
        self.adapters.iter().map(|a| a.identity()).collect()
    }

    /// Session store this orchestrator writes to
    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// Run round `round` of a session and return its statements in speaking order.
    ///
    /// Rounds already produced are replayed from history without invoking any
    /// adapter. Once the session is complete every later round number replays
    /// the final round.
    #[tracing::instrument(skip(self), fields(session = %id))]
    pub async fn run_round(&self, id: &SessionId, round: u32) -> Result<Vec<Statement>> {
        if round == 0 {
            return Err(Error::protocol("round numbers start at 1"));
        }

        let handle = self.store.get(id)?;
        let mut session = handle.lock().await;

        if round <= session.current_round {
            debug!("Round already produced, replaying");
            return Ok(session.round_statements(round));
        }
        if session.is_complete() {
            debug!(last = session.current_round, "Session complete, replaying final round");
            return Ok(session.round_statements(session.current_round));
        }
        if round != session.current_round + 1 {
            return Err(Error::round_out_of_order(session.current_round + 1, round));
        }

        let mut produced = Vec::with_capacity(self.adapters.len());
        for adapter in &self.adapters {
            let context = session.context_for(adapter.identity(), round, &produced);
            let invocation = adapter.invoke(&context).await;
            let statement = self.settle(&session, adapter.identity(), round, invocation)?;
            produced.push(statement);
        }

        session.commit_round(round, produced.clone(), self.clock.now())?;

        let fallbacks = produced.iter().filter(|s| s.source.is_fallback()).count();
        info!(
            statements = produced.len(),
            fallbacks,
            state = ?session.state(),
            "Round complete"
        );
        Ok(produced)
    }

    fn settle(
        &self,
        session: &DebateSession,
        analyst: AnalystIdentity,
        round: u32,
        invocation: Invocation,
    ) -> Result<Statement> {
        let corrected = self
            .validator
            .validate(&invocation.output, analyst, session.reference_price)?;
        Ok(Statement::from_corrected(
            analyst,
            round,
            corrected,
            invocation.source,
            self.clock.now(),
        ))
    }
}
