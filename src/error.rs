//! Error kinds surfaced by the relay.
//!
//! [`RelayError`] is the closed set of failures the session handler can
//! report. Each kind renders to the chat as `Error: <description>`; callers
//! pattern-match on the variant (or [`RelayError::kind`]) instead of
//! inspecting strings.

use thiserror::Error;

use crate::agent::AgentError;

/// Text rendered when a run succeeds without any agent-authored message.
pub const EMPTY_RESPONSE_TEXT: &str = "No response from the model.";

/// Failures observable by a chat session.
#[derive(Error, Debug)]
pub enum RelayError {
    /// A required setting is missing or malformed.
    #[error("configuration error: {0}")]
    Config(String),

    /// The remote conversation thread could not be created.
    #[error("could not create conversation thread: {0}")]
    Thread(#[source] AgentError),

    /// The remote run finished with status `failed`.
    #[error("{detail}")]
    RunFailed {
        /// Error code reported by the service, if any.
        code: Option<String>,
        /// Human-readable failure detail reported by the service.
        detail: String,
    },

    /// The run finished but produced no agent message.
    #[error("No response from the model.")]
    EmptyResponse,

    /// Any other failure talking to the agent service.
    #[error(transparent)]
    Transport(#[from] AgentError),
}

impl RelayError {
    /// Stable snake_case name of the error kind.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "config_error",
            Self::Thread(_) => "thread_error",
            Self::RunFailed { .. } => "run_failed",
            Self::EmptyResponse => "empty_response",
            Self::Transport(_) => "transport_error",
        }
    }

    /// The text shown to the user for this error.
    #[must_use]
    pub fn to_chat_text(&self) -> String {
        format!("Error: {self}")
    }
}

impl From<config::ConfigError> for RelayError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

/// Result alias for relay operations.
pub type Result<T> = std::result::Result<T, RelayError>;
