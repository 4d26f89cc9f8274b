//! Configuration types for the analyst council
//!
//! [`CouncilConfig`] drives the debate itself and can be read from a YAML
//! string, a YAML file, or a layered file + `COUNCIL__*` environment source.
//! [`OpenRouterConfig`] configures the optional language-model backend.

use crate::analyst::{AnalystIdentity, AnalystProfile};
use crate::error::{Error, Result};
use dotenvy::dotenv;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::time::Duration;
use url::Url;

/// How contributing targets are combined into the consensus price
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsensusWeighting {
    /// Arithmetic mean, every analyst counts once
    #[default]
    Equal,
    /// Mean weighted by each analyst's latest score
    Confidence,
}

/// Top-level debate configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CouncilConfig {
    /// Rounds after which a session is complete
    pub max_rounds: u32,
    /// Time budget for a single adapter call, in seconds
    pub agent_timeout_secs: u64,
    /// Analysts in speaking order
    pub analysts: Vec<AnalystIdentity>,
    /// Consensus averaging policy
    pub weighting: ConsensusWeighting,
    /// Seed for the validation engine's random source
    pub seed: Option<u64>,
    /// Per-identity overrides of the built-in profiles
    pub profiles: BTreeMap<AnalystIdentity, AnalystProfile>,
    /// Idle age after which a host-triggered sweep evicts a session, in seconds
    pub idle_ttl_secs: Option<u64>,
}

impl Default for CouncilConfig {
    fn default() -> Self {
        Self {
            max_rounds: 4,
            agent_timeout_secs: 30,
            analysts: AnalystIdentity::ALL.to_vec(),
            weighting: ConsensusWeighting::Equal,
            seed: None,
            profiles: BTreeMap::new(),
            idle_ttl_secs: None,
        }
    }
}

impl CouncilConfig {
    /// Load configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)
            .map_err(|e| Error::config(format!("Failed to parse YAML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| Error::config(format!("Failed to read file: {}", e)))?;
        Self::from_yaml(&content)
    }

    /// Load defaults, then an optional file, then `COUNCIL__*` environment
    /// variables (e.g. `COUNCIL__MAX_ROUNDS=6`, `COUNCIL__ANALYSTS=growth,balanced`).
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("COUNCIL")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("analysts"),
        );

        let config: Self = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| Error::config(format!("Failed to load configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Set the number of rounds
    pub fn with_max_rounds(mut self, max_rounds: u32) -> Self {
        self.max_rounds = max_rounds;
        self
    }

    /// Set the adapter timeout
    pub fn with_agent_timeout(mut self, timeout: Duration) -> Self {
        self.agent_timeout_secs = timeout.as_secs().max(1);
        self
    }

    /// Set the analyst order
    pub fn with_analysts(mut self, analysts: Vec<AnalystIdentity>) -> Self {
        self.analysts = analysts;
        self
    }

    /// Set the consensus weighting
    pub fn with_weighting(mut self, weighting: ConsensusWeighting) -> Self {
        self.weighting = weighting;
        self
    }

    /// Fix the validation seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Override one identity's profile
    pub fn with_profile(mut self, identity: AnalystIdentity, profile: AnalystProfile) -> Self {
        self.profiles.insert(identity, profile);
        self
    }

    /// Adapter timeout as a duration
    pub fn agent_timeout(&self) -> Duration {
        Duration::from_secs(self.agent_timeout_secs)
    }

    /// Idle TTL as a chrono duration
    pub fn idle_ttl(&self) -> Option<chrono::Duration> {
        self.idle_ttl_secs
            .and_then(|secs| chrono::Duration::try_seconds(secs as i64))
    }

    /// Effective profile for an identity
    pub fn profile(&self, identity: AnalystIdentity) -> AnalystProfile {
        self.profiles
            .get(&identity)
            .copied()
            .unwrap_or_else(|| identity.default_profile())
    }

    /// Check the configuration for values the orchestrator cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.max_rounds == 0 {
            return Err(Error::config("max_rounds must be at least 1"));
        }
        if self.agent_timeout_secs == 0 {
            return Err(Error::config("agent_timeout_secs must be at least 1"));
        }
        if self.analysts.is_empty() {
            return Err(Error::config("at least one analyst is required"));
        }
        let mut seen = HashSet::new();
        for identity in &self.analysts {
            if !seen.insert(identity) {
                return Err(Error::config(format!("analyst {} listed twice", identity)));
            }
        }
        for identity in &self.analysts {
            self.profile(*identity).validate(*identity)?;
        }
        Ok(())
    }
}

/// OpenRouter client configuration
#[derive(Clone)]
pub struct OpenRouterConfig {
    /// API key (loaded from environment variable)
    pub api_key: SecretString,
    /// Base URL for OpenRouter API
    pub base_url: Url,
    /// Model used by analyst adapters
    pub model: String,
    /// Sampling temperature
    pub temperature: f32,
    /// Request timeout
    pub timeout: Duration,
    /// App name for OpenRouter tracking
    pub app_name: String,
}

const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";

impl OpenRouterConfig {
    /// Create a new OpenRouter configuration from environment
    pub fn from_env() -> Result<Self> {
        // Load .env if present so local development picks up OPENROUTER_API_KEY
        let _ = dotenv();

        let api_key = std::env::var("OPENROUTER_API_KEY")
            .map_err(|_| Error::config("OPENROUTER_API_KEY environment variable not set"))?;

        let mut config = Self::new(api_key)?;
        if let Ok(model) = std::env::var("OPENROUTER_MODEL") {
            config.model = model;
        }
        Ok(config)
    }

    /// Create a new OpenRouter configuration with a specific API key
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let base_url = Url::parse(OPENROUTER_BASE_URL)
            .map_err(|e| Error::config(format!("invalid OpenRouter URL: {}", e)))?;

        Ok(Self {
            api_key: SecretString::from(api_key.into()),
            base_url,
            model: presets::BALANCED.to_string(),
            temperature: 0.7,
            timeout: Duration::from_secs(60),
            app_name: "Analyst Council".to_string(),
        })
    }

    /// Set the base URL
    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = base_url;
        self
    }

    /// Set the model
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Get the API key as a string
    pub fn api_key(&self) -> &str {
        self.api_key.expose_secret()
    }
}

impl std::fmt::Debug for OpenRouterConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenRouterConfig")
            .field("api_key", &"***REDACTED***")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("timeout", &self.timeout)
            .field("app_name", &self.app_name)
            .finish()
    }
}

/// Default model identifier
pub mod presets {
    /// Balanced performance and cost
    pub const BALANCED: &str = "anthropic/claude-sonnet-4";
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = CouncilConfig::default();
        config.validate().unwrap();
        assert_eq!(config.max_rounds, 4);
        assert_eq!(config.analysts, AnalystIdentity::ALL.to_vec());
        assert_eq!(config.agent_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_parse_yaml_with_profile_override() {
        let yaml = r#"
max_rounds: 3
agent_timeout_secs: 10
analysts: [growth, balanced]
weighting: confidence
seed: 42
profiles:
  growth:
    bias_min: 0.25
    bias_max: 0.45
    ceiling_multiple: 5.0
    ceiling_target: 1.5
    min_horizon_months: 12
    horizon_spread_months: 3
    default_score: 4
"#;
        let config = CouncilConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.max_rounds, 3);
        assert_eq!(config.analysts, vec![AnalystIdentity::Growth, AnalystIdentity::Balanced]);
        assert_eq!(config.weighting, ConsensusWeighting::Confidence);
        assert_eq!(config.seed, Some(42));
        assert_eq!(config.profile(AnalystIdentity::Growth).ceiling_target, 1.5);
        assert_eq!(
            config.profile(AnalystIdentity::Balanced),
            AnalystIdentity::Balanced.default_profile()
        );
    }

    #[test]
    fn test_rejects_duplicate_analysts() {
        let yaml = "analysts: [growth, growth]";
        assert!(CouncilConfig::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_rejects_zero_rounds() {
        assert!(CouncilConfig::default().with_max_rounds(0).validate().is_err());
    }

    #[test]
    fn test_load_layers_file_and_env() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "max_rounds: 5\nagent_timeout_secs: 12").unwrap();

        std::env::set_var("COUNCIL__AGENT_TIMEOUT_SECS", "7");
        let config = CouncilConfig::load(Some(file.path()));
        std::env::remove_var("COUNCIL__AGENT_TIMEOUT_SECS");

        let config = config.unwrap();
        assert_eq!(config.max_rounds, 5);
        assert_eq!(config.agent_timeout_secs, 7);
    }

    #[test]
    fn test_openrouter_config_redacts_key() {
        let config = OpenRouterConfig::new("sk-secret").unwrap();
        let debug = format!("{:?}", config);
        assert!(!debug.contains("sk-secret"));
        assert_eq!(config.api_key(), "sk-secret");
    }
}
