//! OpenRouter chat-completions client

use crate::config::OpenRouterConfig;
use crate::error::{Error, Result};
use crate::llm_client::LlmClient;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::debug;

/// OpenRouter API client
pub struct OpenRouterClient {
    /// HTTP client
    client: Client,
    /// Configuration
    config: OpenRouterConfig,
}

impl OpenRouterClient {
    /// Create a new OpenRouter client from environment variables
    pub fn from_env() -> Result<Self> {
        let config = OpenRouterConfig::from_env()?;
        Self::new(config)
    }

    /// Create a new OpenRouter client with the given configuration
    pub fn new(config: OpenRouterConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;

        Ok(Self { client, config })
    }

    /// Send a completion request
    pub async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let url = format!(
            "{}/chat/completions",
            self.config.base_url.as_str().trim_end_matches('/')
        );
        debug!(model = %request.model, messages = request.messages.len(), "Sending completion request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.config.api_key()))
            .header("X-Title", &self.config.app_name)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(Error::openrouter(format!(
                "Request failed with status {}: {}",
                status, error_text
            )));
        }

        let completion: CompletionResponse = response.json().await?;
        Ok(completion)
    }

    /// Get the configuration
    pub fn config(&self) -> &OpenRouterConfig {
        &self.config
    }
}

/// Completion request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Model identifier
    pub model: String,
    /// Messages in the conversation
    pub messages: Vec<Message>,
    /// Temperature for sampling
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Maximum tokens for completion
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Requested response format, e.g. `{"type": "json_object"}`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<serde_json::Value>,
}

impl CompletionRequest {
    /// Create a new completion request
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: None,
            max_tokens: None,
            response_format: None,
        }
    }

    /// Set the temperature
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set the maximum tokens
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Ask the model for a JSON object reply
    pub fn with_json_response(mut self) -> Self {
        self.response_format = Some(serde_json::json!({ "type": "json_object" }));
        self
    }
}

/// Message in a conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Role of the message sender
    pub role: Role,
    /// Content of the message; `null` (tool-call or filtered replies) reads as empty
    #[serde(default, deserialize_with = "null_as_empty")]
    pub content: String,
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

impl Message {
    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Role of a message sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System message
    System,
    /// User message
    User,
    /// Assistant message
    Assistant,
}

/// Completion response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    /// Unique identifier
    #[serde(default)]
    pub id: String,
    /// Model used
    #[serde(default)]
    pub model: String,
    /// Choices
    #[serde(default)]
    pub choices: Vec<Choice>,
    /// Token usage
    #[serde(default)]
    pub usage: Option<Usage>,
}

impl CompletionResponse {
    /// Content of the first choice
    pub fn first_content(&self) -> Option<&str> {
        self.choices.first().map(|c| c.message.content.as_str())
    }
}

/// Choice in completion response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    /// Index of the choice
    #[serde(default)]
    pub index: u32,
    /// Message content
    pub message: Message,
    /// Finish reason
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Token usage information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    /// Prompt tokens
    pub prompt_tokens: u64,
    /// Completion tokens
    pub completion_tokens: u64,
    /// Total tokens
    pub total_tokens: u64,
}

#[async_trait]
impl LlmClient for OpenRouterClient {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        OpenRouterClient::complete(self, request).await
    }

    fn client_type(&self) -> &str {
        "openrouter"
    }

    fn endpoint(&self) -> &str {
        self.config.base_url.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    fn client_for(server: &mockito::ServerGuard) -> OpenRouterClient {
        let config = OpenRouterConfig::new("test-key")
            .unwrap()
            .with_base_url(Url::parse(&server.url()).unwrap());
        OpenRouterClient::new(config).unwrap()
    }

    #[tokio::test]
    async fn test_complete_parses_response() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer test-key")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"id":"gen-1","model":"m","choices":[{"index":0,"message":{"role":"assistant","content":"hi"},"finish_reason":"stop"}]}"#,
            )
            .create_async()
            .await;

        let client = client_for(&server);
        let response = client
            .complete(CompletionRequest::new("m", vec![Message::user("hello")]))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(response.first_content(), Some("hi"));
        assert!(response.usage.is_none());
    }

    #[tokio::test]
    async fn test_error_status_is_openrouter_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(429)
            .with_body("rate limited")
            .create_async()
            .await;

        let client = client_for(&server);
        let err = client
            .complete(CompletionRequest::new("m", vec![Message::user("hello")]))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::OpenRouter(ref msg) if msg.contains("429")));
        assert!(err.is_agent_failure());
    }

    #[test]
    fn test_null_content_reads_as_empty() {
        let response: CompletionResponse = serde_json::from_str(
            r#"{"id":"gen-2","model":"m","choices":[{"index":0,"message":{"role":"assistant","content":null},"finish_reason":"content_filter"}]}"#,
        )
        .unwrap();
        assert_eq!(response.first_content(), Some(""));

        let message: Message = serde_json::from_str(r#"{"role":"assistant"}"#).unwrap();
        assert!(message.content.is_empty());
    }

    #[test]
    fn test_client_exposes_configured_model() {
        let config = OpenRouterConfig::new("test-key").unwrap().with_model("openai/gpt-4o-mini");
        let client = OpenRouterClient::new(config).unwrap();
        assert_eq!(client.config().model, "openai/gpt-4o-mini");
        assert!(client.endpoint().starts_with("https://openrouter.ai"));
    }

    #[test]
    fn test_request_skips_unset_fields() {
        let request = CompletionRequest::new("m", vec![Message::system("s")]).with_json_response();
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("temperature").is_none());
        assert_eq!(json["response_format"]["type"], "json_object");
        assert_eq!(json["messages"][0]["role"], "system");
    }
}
