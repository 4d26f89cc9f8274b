//! Debate sessions and the in-memory session store
//!
//! A session owns its history, ledger, round counter and reference price.
//! The store hands out one async mutex per session so rounds for the same id
//! are serialized while different sessions proceed independently.

use crate::adapter::AgentContext;
use crate::analyst::AnalystIdentity;
use crate::error::{Error, Result};
use crate::ledger::TargetLedger;
use crate::statement::Statement;
use crate::types::{Clock, Instrument, SessionId, SystemClock};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Lifecycle state of a session
///
/// Eviction is terminal and happens outside the session: an evicted id is
/// simply absent from the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Instrument and price set, no rounds run
    Created,
    /// At least one round done, more to go
    InProgress,
    /// The configured number of rounds has been run
    Complete,
}

/// Mutable state of one debate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebateSession {
    /// Session identifier
    pub id: SessionId,
    /// Instrument under debate
    pub instrument: Instrument,
    /// Reference price targets are validated against
    pub reference_price: f64,
    /// Every statement so far, in speaking order
    pub history: Vec<Statement>,
    /// Latest target per analyst
    pub ledger: TargetLedger,
    /// Number of completed rounds
    pub current_round: u32,
    /// Rounds after which the session is complete
    pub max_rounds: u32,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp
    pub updated_at: DateTime<Utc>,
}

impl DebateSession {
    /// Create a session with no rounds run
    pub fn new(
        id: SessionId,
        instrument: Instrument,
        reference_price: f64,
        max_rounds: u32,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        validate_reference_price(reference_price)?;
        if max_rounds == 0 {
            return Err(Error::invalid_input("max_rounds must be at least 1"));
        }
        Ok(Self {
            id,
            instrument,
            reference_price,
            history: Vec::new(),
            ledger: TargetLedger::new(),
            current_round: 0,
            max_rounds,
            created_at: now,
            updated_at: now,
        })
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        if self.current_round == 0 {
            SessionState::Created
        } else if self.current_round >= self.max_rounds {
            SessionState::Complete
        } else {
            SessionState::InProgress
        }
    }

    /// Whether every configured round has run
    pub fn is_complete(&self) -> bool {
        self.state() == SessionState::Complete
    }

    /// Replace the reference price; only allowed before the first round
    pub fn set_reference_price(&mut self, price: f64, now: DateTime<Utc>) -> Result<()> {
        if self.current_round > 0 {
            return Err(Error::protocol(format!(
                "reference price of session {} is fixed once rounds have started",
                self.id
            )));
        }
        validate_reference_price(price)?;
        self.reference_price = price;
        self.updated_at = now;
        Ok(())
    }

    /// Statements recorded for one round, in speaking order
    pub fn round_statements(&self, round: u32) -> Vec<Statement> {
        self.history
            .iter()
            .filter(|s| s.round == round)
            .cloned()
            .collect()
    }

    /// Build the context an analyst sees before speaking.
    ///
    /// `pending` holds statements already produced earlier in the same round,
    /// which later speakers see alongside the committed history.
    pub fn context_for(
        &self,
        analyst: AnalystIdentity,
        round: u32,
        pending: &[Statement],
    ) -> AgentContext {
        AgentContext {
            session_id: self.id.clone(),
            analyst,
            instrument: self.instrument.clone(),
            reference_price: self.reference_price,
            round,
            max_rounds: self.max_rounds,
            prior_statements: self
                .history
                .iter()
                .chain(pending.iter())
                .map(Statement::summary)
                .collect(),
            own_prior_target: self.ledger.target(analyst).cloned(),
        }
    }

    /// Append a completed round and advance the round counter.
    ///
    /// The whole round is committed at once so an interrupted round leaves
    /// no partial statements behind.
    pub fn commit_round(
        &mut self,
        round: u32,
        statements: Vec<Statement>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if round != self.current_round + 1 || round > self.max_rounds {
            return Err(Error::round_out_of_order(self.current_round + 1, round));
        }
        if let Some(stray) = statements.iter().find(|s| s.round != round) {
            return Err(Error::invalid_input(format!(
                "statement from {} carries round {} while committing round {}",
                stray.analyst, stray.round, round
            )));
        }
        for statement in statements {
            self.ledger.apply(&statement);
            self.history.push(statement);
        }
        self.current_round = round;
        self.updated_at = now;
        Ok(())
    }
}

fn validate_reference_price(price: f64) -> Result<()> {
    if price.is_finite() && price > 0.0 {
        Ok(())
    } else {
        Err(Error::invalid_input(format!(
            "reference price must be a positive number, got {}",
            price
        )))
    }
}

/// Shared handle to a session guarded by its own lock
pub type SessionHandle = Arc<Mutex<DebateSession>>;

/// In-memory registry of debate sessions
pub struct SessionStore {
    sessions: DashMap<SessionId, SessionHandle>,
    clock: Arc<dyn Clock>,
}

impl SessionStore {
    /// Create an empty store on the wall clock
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create an empty store on a specific clock
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            sessions: DashMap::new(),
            clock,
        }
    }

    /// Look up a session, creating it on first use.
    ///
    /// An existing session is returned unchanged; the boolean reports whether
    /// the call created it.
    pub fn create_or_get(
        &self,
        id: SessionId,
        instrument: Instrument,
        reference_price: f64,
        max_rounds: u32,
    ) -> Result<(SessionHandle, bool)> {
        if let Some(existing) = self.sessions.get(&id) {
            return Ok((existing.value().clone(), false));
        }

        let session = DebateSession::new(
            id.clone(),
            instrument,
            reference_price,
            max_rounds,
            self.clock.now(),
        )?;

        let mut created = false;
        let handle = self
            .sessions
            .entry(id.clone())
            .or_insert_with(|| {
                created = true;
                Arc::new(Mutex::new(session))
            })
            .value()
            .clone();

        if created {
            info!(session = %id, "Debate session created");
        }
        Ok((handle, created))
    }

    /// Fetch a session handle
    pub fn get(&self, id: &SessionId) -> Result<SessionHandle> {
        self.sessions
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| Error::session_not_found(id))
    }

    /// Whether a session exists
    pub fn contains(&self, id: &SessionId) -> bool {
        self.sessions.contains_key(id)
    }

    /// Remove a session; returns whether it existed
    pub fn evict(&self, id: &SessionId) -> bool {
        let removed = self.sessions.remove(id).is_some();
        if removed {
            info!(session = %id, "Debate session evicted");
        }
        removed
    }

    /// Evict sessions untouched for longer than `older_than`.
    ///
    /// Sessions whose lock is held (a round is running) are not idle and are
    /// skipped. Returns the number of evicted sessions.
    pub fn evict_idle(&self, older_than: chrono::Duration) -> usize {
        let cutoff = self.clock.now() - older_than;

        let stale: Vec<SessionId> = self
            .sessions
            .iter()
            .filter(|entry| {
                entry
                    .value()
                    .try_lock()
                    .map(|session| session.updated_at < cutoff)
                    .unwrap_or(false)
            })
            .map(|entry| entry.key().clone())
            .collect();

        let count = stale.iter().filter(|id| self.evict(id)).count();
        debug!(evicted = count, "Idle session sweep finished");
        count
    }

    /// Ids of all live sessions
    pub fn ids(&self) -> Vec<SessionId> {
        let mut ids: Vec<_> = self.sessions.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Number of live sessions
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Clock used for timestamps
    pub fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statement::StatementSource;
    use crate::types::FixedClock;
    use chrono::TimeZone;

    fn btc() -> Instrument {
        Instrument::new("BTC", "Bitcoin")
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 15, 12, 0, 0).unwrap()
    }

    fn bare_statement(analyst: AnalystIdentity, round: u32) -> Statement {
        Statement {
            analyst,
            round,
            text: format!("{} round {}", analyst, round),
            score: 3,
            risks: vec![],
            sources: vec![],
            target: None,
            source: StatementSource::Fallback { reason: "test".into() },
            repairs: vec![],
            timestamp: start(),
        }
    }

    #[test]
    fn test_state_transitions() {
        let mut session = DebateSession::new("s".into(), btc(), 70_000.0, 2, start()).unwrap();
        assert_eq!(session.state(), SessionState::Created);

        session
            .commit_round(1, vec![bare_statement(AnalystIdentity::Balanced, 1)], start())
            .unwrap();
        assert_eq!(session.state(), SessionState::InProgress);

        session
            .commit_round(2, vec![bare_statement(AnalystIdentity::Balanced, 2)], start())
            .unwrap();
        assert_eq!(session.state(), SessionState::Complete);

        let err = session
            .commit_round(3, vec![bare_statement(AnalystIdentity::Balanced, 3)], start())
            .unwrap_err();
        assert!(err.is_protocol_misuse());
    }

    #[test]
    fn test_commit_rejects_skipped_round() {
        let mut session = DebateSession::new("s".into(), btc(), 70_000.0, 4, start()).unwrap();
        let err = session
            .commit_round(2, vec![bare_statement(AnalystIdentity::Growth, 2)], start())
            .unwrap_err();
        assert!(err.is_protocol_misuse());
        assert!(session.history.is_empty());
    }

    #[test]
    fn test_reference_price_fixed_after_first_round() {
        let mut session = DebateSession::new("s".into(), btc(), 70_000.0, 4, start()).unwrap();
        session.set_reference_price(71_500.0, start()).unwrap();
        assert_eq!(session.reference_price, 71_500.0);
        assert!(session.set_reference_price(-1.0, start()).is_err());

        session
            .commit_round(1, vec![bare_statement(AnalystIdentity::Growth, 1)], start())
            .unwrap();
        assert!(session.set_reference_price(72_000.0, start()).unwrap_err().is_protocol_misuse());
    }

    #[test]
    fn test_context_includes_pending_statements() {
        let mut session = DebateSession::new("s".into(), btc(), 70_000.0, 4, start()).unwrap();
        session
            .commit_round(1, vec![bare_statement(AnalystIdentity::Balanced, 1)], start())
            .unwrap();

        let pending = vec![bare_statement(AnalystIdentity::Balanced, 2)];
        let ctx = session.context_for(AnalystIdentity::Growth, 2, &pending);
        assert_eq!(ctx.prior_statements.len(), 2);
        assert_eq!(ctx.prior_statements[1].round, 2);
        assert!(ctx.own_prior_target.is_none());
        assert_eq!(ctx.reference_price, 70_000.0);
    }

    #[tokio::test]
    async fn test_create_or_get_returns_existing() {
        let store = SessionStore::new();
        let (first, created) = store
            .create_or_get("s1".into(), btc(), 70_000.0, 4)
            .unwrap();
        assert!(created);

        let (second, created) = store
            .create_or_get("s1".into(), Instrument::new("ETH", "Ether"), 3_000.0, 4)
            .unwrap();
        assert!(!created);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.lock().await.instrument.symbol, "BTC");
    }

    #[test]
    fn test_create_rejects_bad_price() {
        let store = SessionStore::new();
        assert!(store.create_or_get("s1".into(), btc(), 0.0, 4).is_err());
        assert!(store.is_empty());
    }

    #[test]
    fn test_get_unknown_session() {
        let store = SessionStore::new();
        let err = store.get(&"missing".into()).unwrap_err();
        assert!(matches!(err, Error::SessionNotFound(id) if id == "missing"));
    }

    #[tokio::test]
    async fn test_evict_idle_skips_recent_and_busy() {
        let clock = Arc::new(FixedClock::new(start()));
        let store = SessionStore::with_clock(clock.clone());
        store.create_or_get("old".into(), btc(), 70_000.0, 4).unwrap();
        let (busy, _) = store.create_or_get("busy".into(), btc(), 70_000.0, 4).unwrap();

        clock.advance(chrono::Duration::hours(2));
        store.create_or_get("fresh".into(), btc(), 70_000.0, 4).unwrap();

        let guard = busy.lock().await;
        let evicted = store.evict_idle(chrono::Duration::hours(1));
        drop(guard);

        assert_eq!(evicted, 1);
        assert_eq!(store.ids(), vec![SessionId::from("busy"), SessionId::from("fresh")]);
        assert!(store.evict(&"busy".into()));
        assert!(!store.evict(&"busy".into()));
    }
}
