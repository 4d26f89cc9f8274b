//! Error types for the analyst council

use thiserror::Error;

/// Result type alias for council operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the analyst council
#[derive(Debug, Error)]
pub enum Error {
    /// An agent adapter failed to produce output
    #[error("Agent failure: {0}")]
    AgentFailure(String),

    /// An agent adapter exceeded its time budget
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Agent output could not be interpreted
    #[error("Malformed agent output: {0}")]
    MalformedOutput(String),

    /// Error from the OpenRouter API
    #[error("OpenRouter API error: {0}")]
    OpenRouter(String),

    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Caller violated the round/consensus protocol
    #[error("Protocol misuse: {0}")]
    ProtocolMisuse(String),

    /// Session not found
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an agent failure
    pub fn agent(msg: impl Into<String>) -> Self {
        Self::AgentFailure(msg.into())
    }

    /// Create a malformed output error
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedOutput(msg.into())
    }

    /// Create an OpenRouter error
    pub fn openrouter(msg: impl Into<String>) -> Self {
        Self::OpenRouter(msg.into())
    }

    /// Create a protocol misuse error
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::ProtocolMisuse(msg.into())
    }

    /// A round was requested out of sequence
    pub fn round_out_of_order(expected: u32, got: u32) -> Self {
        Self::ProtocolMisuse(format!(
            "round {} requested but the next runnable round is {}",
            got, expected
        ))
    }

    /// Consensus was requested before every analyst committed a target
    pub fn ledger_incomplete(missing: &[impl std::fmt::Display]) -> Self {
        let names = missing
            .iter()
            .map(|m| m.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        Self::ProtocolMisuse(format!("round incomplete: no target yet from {}", names))
    }

    /// Create a session-not-found error
    pub fn session_not_found(id: impl std::fmt::Display) -> Self {
        Self::SessionNotFound(id.to_string())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an other error
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Whether this error belongs to the agent-side failure family that the
    /// orchestrator recovers from with a fallback statement.
    pub fn is_agent_failure(&self) -> bool {
        matches!(
            self,
            Self::AgentFailure(_)
                | Self::Timeout(_)
                | Self::MalformedOutput(_)
                | Self::OpenRouter(_)
                | Self::Http(_)
        )
    }

    /// Whether this error is a rejected precondition on the caller side
    pub fn is_protocol_misuse(&self) -> bool {
        matches!(self, Self::ProtocolMisuse(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_categories() {
        assert!(Error::agent("boom").is_agent_failure());
        assert!(Error::Timeout("slow".into()).is_agent_failure());
        assert!(Error::malformed("no json").is_agent_failure());
        assert!(!Error::session_not_found("s1").is_agent_failure());

        assert!(Error::round_out_of_order(2, 4).is_protocol_misuse());
        assert!(!Error::invalid_input("x").is_protocol_misuse());
    }

    #[test]
    fn test_ledger_incomplete_message() {
        let err = Error::ledger_incomplete(&["growth", "macro_risk"]);
        assert_eq!(
            err.to_string(),
            "Protocol misuse: round incomplete: no target yet from growth, macro_risk"
        );
    }
}
