//! Simulated four-round debate with a scripted panel
//!
//! No network access is needed: each analyst is played by a scripted adapter,
//! and the Growth analyst's agent is unavailable in round 1 so the fallback
//! steps in. Set `OPENROUTER_API_KEY` and pass `--live` to use real models.

use analyst_council::prelude::*;
use analyst_council::{init_tracing, LogFormat};
use async_trait::async_trait;
use std::sync::Arc;

/// Scripted analyst whose targets drift toward the others each round
struct ScriptedAnalyst;

#[async_trait]
impl AgentAdapter for ScriptedAnalyst {
    async fn generate(&self, context: &AgentContext) -> Result<RawOutput> {
        if context.analyst == AnalystIdentity::Growth && context.round == 1 {
            return Err(Error::agent("model endpoint unavailable"));
        }

        let opening = match context.analyst {
            AnalystIdentity::Balanced => 1.12,
            AnalystIdentity::Growth => 1.45,
            AnalystIdentity::MacroRisk => 0.95,
        };
        let peers: Vec<f64> = context.others().filter_map(|s| s.target_price).collect();
        let price = match (&context.own_prior_target, peers.is_empty()) {
            (Some(prior), false) => {
                let peer_mean = peers.iter().sum::<f64>() / peers.len() as f64;
                prior.price * 0.8 + peer_mean * 0.2
            }
            (Some(prior), true) => prior.price,
            (None, _) => context.reference_price * opening,
        };

        Ok(RawOutput::text(format!(
            "{} view for round {}: {} peers on record.",
            context.analyst.label(),
            context.round,
            peers.len()
        ))
        .with_score(if context.is_final_round() { 4 } else { 3 })
        .with_target(price, "June 2027")
        .with_rationale("Blend of own prior and peer targets")
        .with_risks(vec!["Liquidity".to_string()]))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing(LogFormat::Compact);

    println!("=== Analyst Council: Simulated Debate ===\n");

    let registry = if std::env::args().any(|a| a == "--live") {
        let client = Arc::new(OpenRouterClient::from_env()?);
        let mut registry = AdapterRegistry::new();
        for identity in AnalystIdentity::ALL {
            let adapter = LlmAdapter::from_config(identity, client.clone(), client.config());
            registry.register(identity, Arc::new(adapter));
        }
        registry
    } else {
        AdapterRegistry::new().with_all(&AnalystIdentity::ALL, Arc::new(ScriptedAnalyst))
    };

    let council = DebateCouncil::builder()
        .config(CouncilConfig::default().with_seed(42))
        .registry(registry)
        .build()?;

    let id = SessionId::from("demo-btc");
    council
        .create_or_get_session(id.clone(), Instrument::new("BTC", "Bitcoin"), 70_000.0)
        .await?;

    for round in 1..=council.config().max_rounds {
        println!("--- Round {} ---", round);
        for statement in council.run_round(&id, round).await? {
            let target = statement
                .target
                .as_ref()
                .map(|t| format!("{:.2} by {}", t.price, t.date_label))
                .unwrap_or_else(|| "no target".to_string());
            let origin = if statement.source.is_fallback() { " [fallback]" } else { "" };
            println!(
                "{}{} (score {}): {} -> {}",
                statement.analyst.label(),
                origin,
                statement.score,
                statement.text,
                target
            );
        }
        println!();
    }

    let consensus = council.get_consensus(&id).await?;
    println!("=== Consensus ===");
    println!("Price: {:.2} ({:.2} - {:.2})", consensus.average_price, consensus.min_price, consensus.max_price);
    println!("Date: {}", consensus.target_date_label);
    println!("{}", consensus.rationale);

    Ok(())
}
