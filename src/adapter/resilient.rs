//! Failure isolation around agent adapters
//!
//! [`ResilientAdapter`] is the single place where an adapter failure turns
//! into fallback output: errors, timeouts and panics all end up as a
//! rule-based statement tagged with the reason.

use super::{AgentAdapter, AgentContext, RawOutput, RuleBasedAdapter};
use crate::analyst::{AnalystIdentity, AnalystProfile};
use crate::error::{Error, Result};
use crate::statement::StatementSource;
use crate::types::Clock;
use async_trait::async_trait;
use futures::FutureExt;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Output of one guarded invocation together with its provenance
#[derive(Debug, Clone)]
pub struct Invocation {
    /// Raw output to validate
    pub output: RawOutput,
    /// Which adapter produced it
    pub source: StatementSource,
}

/// Timeout + fallback decorator for one analyst identity
pub struct ResilientAdapter {
    identity: AnalystIdentity,
    primary: Option<Arc<dyn AgentAdapter>>,
    fallback: RuleBasedAdapter,
    timeout: Duration,
}

impl ResilientAdapter {
    /// Guard `primary`, falling back to `fallback`
    pub fn new(
        identity: AnalystIdentity,
        primary: Option<Arc<dyn AgentAdapter>>,
        fallback: RuleBasedAdapter,
        timeout: Duration,
    ) -> Self {
        Self {
            identity,
            primary,
            fallback,
            timeout,
        }
    }

    /// Identity this adapter speaks for
    pub fn identity(&self) -> AnalystIdentity {
        self.identity
    }

    /// Whether a primary adapter is registered
    pub fn has_primary(&self) -> bool {
        self.primary.is_some()
    }

    /// Invoke the primary within the timeout; never fails
    pub async fn invoke(&self, context: &AgentContext) -> Invocation {
        let Some(primary) = &self.primary else {
            debug!(analyst = %self.identity, "No primary adapter registered, using fallback");
            return self.fall_back("no primary adapter registered".to_string(), context);
        };

        let call = AssertUnwindSafe(primary.generate(context)).catch_unwind();
        let failure = match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(Ok(output))) => {
                return Invocation {
                    output,
                    source: StatementSource::Primary {
                        adapter: primary.name().to_string(),
                    },
                }
            }
            Ok(Ok(Err(e))) => e,
            Ok(Err(_)) => Error::agent(format!("adapter {} panicked", primary.name())),
            Err(_) => Error::Timeout(format!(
                "adapter {} exceeded {:?}",
                primary.name(),
                self.timeout
            )),
        };

        warn!(
            analyst = %self.identity,
            round = context.round,
            adapter = primary.name(),
            error = %failure,
            "Agent failed, substituting fallback output"
        );
        self.fall_back(failure.to_string(), context)
    }

    fn fall_back(&self, reason: String, context: &AgentContext) -> Invocation {
        Invocation {
            output: self.fallback.produce(context),
            source: StatementSource::Fallback { reason },
        }
    }
}

/// Tries each inner adapter in order and returns the first success
///
/// Covers the common "primary model, then secondary model" arrangement.
pub struct ChainedAdapter {
    adapters: Vec<Arc<dyn AgentAdapter>>,
    name: String,
}

impl ChainedAdapter {
    /// Chain adapters, highest priority first
    pub fn new(adapters: Vec<Arc<dyn AgentAdapter>>) -> Self {
        let name = format!(
            "chain({})",
            adapters
                .iter()
                .map(|a| a.name())
                .collect::<Vec<_>>()
                .join(", ")
        );
        Self { adapters, name }
    }

    /// Append a lower-priority adapter
    pub fn then(mut self, adapter: Arc<dyn AgentAdapter>) -> Self {
        self.adapters.push(adapter);
        Self::new(self.adapters)
    }
}

#[async_trait]
impl AgentAdapter for ChainedAdapter {
    async fn generate(&self, context: &AgentContext) -> Result<RawOutput> {
        let mut last_error = Error::agent("adapter chain is empty");
        for adapter in &self.adapters {
            match adapter.generate(context).await {
                Ok(output) => return Ok(output),
                Err(e) => {
                    debug!(adapter = adapter.name(), error = %e, "Chained adapter failed, trying next");
                    last_error = e;
                }
            }
        }
        Err(last_error)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Map from analyst identity to its primary adapter
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    primaries: HashMap<AnalystIdentity, Arc<dyn AgentAdapter>>,
}

impl AdapterRegistry {
    /// Empty registry; every identity runs on its fallback
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace the primary for an identity
    pub fn register(&mut self, identity: AnalystIdentity, adapter: Arc<dyn AgentAdapter>) {
        self.primaries.insert(identity, adapter);
    }

    /// Builder form of [`register`](Self::register)
    pub fn with(mut self, identity: AnalystIdentity, adapter: Arc<dyn AgentAdapter>) -> Self {
        self.register(identity, adapter);
        self
    }

    /// Register the same adapter for several identities
    pub fn with_all(mut self, identities: &[AnalystIdentity], adapter: Arc<dyn AgentAdapter>) -> Self {
        for identity in identities {
            self.register(*identity, adapter.clone());
        }
        self
    }

    /// Primary adapter for an identity
    pub fn get(&self, identity: AnalystIdentity) -> Option<Arc<dyn AgentAdapter>> {
        self.primaries.get(&identity).cloned()
    }

    /// Compose the guarded adapter for an identity
    pub fn resolve(
        &self,
        identity: AnalystIdentity,
        profile: AnalystProfile,
        timeout: Duration,
        clock: Arc<dyn Clock>,
    ) -> ResilientAdapter {
        let fallback = RuleBasedAdapter::new(identity)
            .with_profile(profile)
            .with_clock(clock);
        ResilientAdapter::new(identity, self.get(identity), fallback, timeout)
    }
}
