//! Adapter backed by a chat-completion model

use super::{AgentAdapter, AgentContext, RawOutput};
use crate::analyst::AnalystIdentity;
use crate::config::OpenRouterConfig;
use crate::error::{Error, Result};
use crate::llm_client::LlmClient;
use crate::openrouter::{CompletionRequest, Message};
use async_trait::async_trait;
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::debug;

const DEFAULT_MAX_TOKENS: u32 = 1200;

/// Prompts a language model in an analyst's persona and parses its JSON reply
pub struct LlmAdapter {
    identity: AnalystIdentity,
    client: Arc<dyn LlmClient>,
    model: String,
    temperature: f32,
    max_tokens: u32,
    name: String,
}

impl LlmAdapter {
    /// Adapter for `identity` using the client's default model settings
    pub fn new(identity: AnalystIdentity, client: Arc<dyn LlmClient>) -> Self {
        Self {
            identity,
            client,
            model: crate::config::presets::BALANCED.to_string(),
            temperature: 0.7,
            max_tokens: DEFAULT_MAX_TOKENS,
            name: format!("llm/{}", identity.as_str()),
        }
    }

    /// Adapter taking model and temperature from an OpenRouter configuration
    pub fn from_config(
        identity: AnalystIdentity,
        client: Arc<dyn LlmClient>,
        config: &OpenRouterConfig,
    ) -> Self {
        Self::new(identity, client)
            .with_model(config.model.clone())
            .with_temperature(config.temperature)
    }

    /// Set the model
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self.name = format!("llm/{}/{}", self.identity.as_str(), self.model);
        self
    }

    /// Set the sampling temperature
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set the completion token limit
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    fn system_prompt(&self) -> String {
        let schema = schemars::schema_for!(RawOutput);
        let schema = serde_json::to_string_pretty(&schema).unwrap_or_default();
        format!(
            "{}\n\nYou are taking part in a structured, multi-round debate with other \
             analysts. Respond with a single JSON object and nothing else. Give `score` as \
             an integer from 1 (very bearish) to 5 (very bullish), `target_price` as a plain \
             number in the same units as the reference price, and `target_date` as YYYY-MM-DD.\n\n\
             JSON schema:\n{}",
            self.identity.persona(),
            schema
        )
    }

    fn user_prompt(&self, context: &AgentContext) -> String {
        let mut prompt = String::new();
        let _ = writeln!(prompt, "Instrument: {}", context.instrument);
        if let Some(sector) = &context.instrument.sector {
            let _ = writeln!(prompt, "Sector: {}", sector);
        }
        let _ = writeln!(prompt, "Reference price: {:.2}", context.reference_price);
        let _ = writeln!(prompt, "Round {} of {}", context.round, context.max_rounds);

        if context.prior_statements.is_empty() {
            let _ = writeln!(prompt, "\nYou open the debate.");
        } else {
            let _ = writeln!(prompt, "\nDebate so far:");
            for s in &context.prior_statements {
                let _ = write!(prompt, "- [round {}] {}: {}", s.round, s.analyst.label(), s.text);
                if let (Some(price), Some(date)) = (s.target_price, &s.target_date) {
                    let _ = write!(prompt, " (target {:.2} by {})", price, date);
                }
                prompt.push('\n');
            }
        }

        if let Some(target) = &context.own_prior_target {
            let _ = writeln!(
                prompt,
                "\nYour previous target was {:.2} by {}. Adjust it or defend it; do not start over.",
                target.price, target.date_label
            );
        }

        if context.is_final_round() {
            let _ = writeln!(prompt, "\nThis is the final round: commit to your definitive target.");
        } else {
            let _ = writeln!(prompt, "\nRespond to the other analysts and state your target.");
        }
        prompt
    }

    /// Parse a model reply into raw output
    pub fn parse_reply(reply: &str) -> Result<RawOutput> {
        let json = extract_json_object(reply)
            .ok_or_else(|| Error::malformed("reply contains no JSON object"))?;
        let output: RawOutput = serde_json::from_str(json)
            .map_err(|e| Error::malformed(format!("reply is not valid output JSON: {}", e)))?;
        if output.text.trim().is_empty() {
            return Err(Error::malformed("reply has no analysis text"));
        }
        Ok(output)
    }
}

/// Slice from the first `{` to the last `}`, which also strips code fences
fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

#[async_trait]
impl AgentAdapter for LlmAdapter {
    async fn generate(&self, context: &AgentContext) -> Result<RawOutput> {
        let request = CompletionRequest::new(
            self.model.clone(),
            vec![
                Message::system(self.system_prompt()),
                Message::user(self.user_prompt(context)),
            ],
        )
        .with_temperature(self.temperature)
        .with_max_tokens(self.max_tokens)
        .with_json_response();

        debug!(
            analyst = %self.identity,
            round = context.round,
            client = self.client.client_type(),
            endpoint = self.client.endpoint(),
            model = %self.model,
            "Requesting analyst completion"
        );
        let response = self.client.complete(request).await?;
        let reply = response
            .first_content()
            .ok_or_else(|| Error::malformed("completion returned no choices"))?;
        Self::parse_reply(reply)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::openrouter::{Choice, CompletionResponse, Role};
    use crate::statement::{StatementSummary, Target};
    use crate::types::Instrument;
    use chrono::NaiveDate;
    use parking_lot::Mutex;

    struct MockClient {
        reply: Option<String>,
        seen: Mutex<Vec<CompletionRequest>>,
    }

    impl MockClient {
        fn replying(reply: Option<&str>) -> Arc<Self> {
            Arc::new(Self {
                reply: reply.map(str::to_string),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl LlmClient for MockClient {
        async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
            self.seen.lock().push(request);
            Ok(CompletionResponse {
                id: "test".into(),
                model: "mock".into(),
                choices: self
                    .reply
                    .iter()
                    .map(|content| Choice {
                        index: 0,
                        message: Message::assistant(content.clone()),
                        finish_reason: Some("stop".into()),
                    })
                    .collect(),
                usage: None,
            })
        }

        fn client_type(&self) -> &str {
            "mock"
        }

        fn endpoint(&self) -> &str {
            "mock://"
        }
    }

    fn context() -> AgentContext {
        AgentContext {
            session_id: "s".into(),
            analyst: AnalystIdentity::Balanced,
            instrument: Instrument::new("BTC", "Bitcoin").with_sector("Digital assets"),
            reference_price: 70_000.0,
            round: 4,
            max_rounds: 4,
            prior_statements: vec![StatementSummary {
                analyst: AnalystIdentity::Growth,
                round: 3,
                text: "Adoption keeps compounding.".into(),
                target_price: Some(98_000.0),
                target_date: Some("March 2027".into()),
            }],
            own_prior_target: Some(Target {
                price: 80_000.0,
                date: NaiveDate::from_ymd_opt(2026, 9, 30).unwrap(),
                date_label: "September 2026".into(),
                rationale: String::new(),
                confidence: 3,
            }),
        }
    }

    #[tokio::test]
    async fn test_fenced_reply_is_parsed() {
        let client = MockClient::replying(Some(
            "```json\n{\"text\": \"Fair value holds.\", \"score\": 3, \"target_price\": \"$82,500\", \"target_date\": \"2026-12-31\"}\n```",
        ));
        let adapter = LlmAdapter::new(AnalystIdentity::Balanced, client.clone()).with_model("m");

        let output = adapter.generate(&context()).await.unwrap();
        assert_eq!(output.target_price, Some(82_500.0));
        assert_eq!(adapter.name(), "llm/balanced/m");

        let seen = client.seen.lock();
        let messages = &seen[0].messages;
        assert_eq!(messages[0].role, Role::System);
        assert!(messages[0].content.contains("target_price"));
        assert!(messages[1].content.contains("Growth Analyst"));
        assert!(messages[1].content.contains("previous target was 80000.00"));
        assert!(messages[1].content.contains("final round"));
    }

    #[tokio::test]
    async fn test_configured_model_is_requested() {
        let client = MockClient::replying(Some(r#"{"text": "Holding.", "score": 3}"#));
        let mut config = OpenRouterConfig::new("key").unwrap().with_model("x/y");
        config.temperature = 0.2;
        let adapter = LlmAdapter::from_config(AnalystIdentity::Balanced, client.clone(), &config);

        adapter.generate(&context()).await.unwrap();
        let seen = client.seen.lock();
        assert_eq!(seen[0].model, "x/y");
        assert_eq!(seen[0].temperature, Some(0.2));
        assert_eq!(adapter.name(), "llm/balanced/x/y");
    }

    #[tokio::test]
    async fn test_empty_choices_is_malformed() {
        let adapter = LlmAdapter::new(AnalystIdentity::Balanced, MockClient::replying(None));
        let err = adapter.generate(&context()).await.unwrap_err();
        assert!(matches!(err, Error::MalformedOutput(_)));
    }

    #[test]
    fn test_parse_reply_rejects_prose_and_empty_text() {
        assert!(LlmAdapter::parse_reply("I think it goes up.").is_err());
        assert!(LlmAdapter::parse_reply(r#"{"score": 4}"#).is_err());
        assert!(LlmAdapter::parse_reply(r#"{"text": "ok", "risks": "none"}"#).is_err());
    }
}
