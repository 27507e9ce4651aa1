//! Client side of the remote agent service.
//!
//! The relay talks to a hosted agent through four operations, captured by the
//! [`AgentClient`] trait:
//!
//! - create a conversation thread
//! - append a message to a thread
//! - run an agent over a thread and wait for a terminal status
//! - list the messages of a thread
//!
//! # Implementations
//!
//! - [`HttpAgentClient`]: Azure AI Agents REST API over `reqwest`
//!
//! Authentication is delegated to a [`TokenCredential`]; see [`credential`].

pub mod connection;
pub mod credential;
pub mod http;

pub use connection::ProjectEndpoint;
pub use credential::{AccessToken, AmbientCredential, StaticTokenCredential, TokenCredential};
pub use http::HttpAgentClient;

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by an [`AgentClient`].
#[derive(Error, Debug)]
pub enum AgentError {
    /// The HTTP request could not be completed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The service answered with a non-success status.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error message from the service.
        message: String,
    },

    /// A response body did not have the expected shape.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// No bearer token could be obtained.
    #[error("credential unavailable: {0}")]
    Credential(String),

    /// The run did not reach a terminal state in time.
    #[error("run did not finish within {limit:?}")]
    Timeout {
        /// The timeout that elapsed.
        limit: Duration,
    },

    /// An endpoint URL could not be built.
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// Author of a thread message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageRole {
    /// Message written by the end user.
    #[serde(rename = "user")]
    User,
    /// Message produced by the agent. The service calls this role `assistant`.
    #[serde(rename = "assistant", alias = "agent")]
    Agent,
}

impl MessageRole {
    /// Wire name of the role.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Agent => "assistant",
        }
    }
}

/// A message stored in a remote thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadMessage {
    /// Author of the message.
    pub role: MessageRole,
    /// Text content, if the message carries any.
    pub text: Option<String>,
}

impl ThreadMessage {
    /// Create a text message.
    #[must_use]
    pub fn text(role: MessageRole, text: impl Into<String>) -> Self {
        Self {
            role,
            text: Some(text.into()),
        }
    }
}

/// Messages of a thread, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThreadMessages {
    messages: Vec<ThreadMessage>,
}

impl ThreadMessages {
    #[must_use]
    pub fn new(messages: Vec<ThreadMessage>) -> Self {
        Self { messages }
    }

    /// Most recent message with text authored by `role`.
    #[must_use]
    pub fn last_text_by_role(&self, role: MessageRole) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .filter(|m| m.role == role)
            .find_map(|m| m.text.as_deref())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ThreadMessage> {
        self.messages.iter()
    }
}

/// Status of a remote run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    InProgress,
    RequiresAction,
    Cancelling,
    Cancelled,
    Failed,
    Completed,
    Expired,
    /// A status this client does not know about.
    #[serde(other)]
    Unknown,
}

impl RunStatus {
    /// Whether the run can no longer change state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Cancelled | Self::Failed | Self::Completed | Self::Expired
        )
    }
}

/// Error detail attached to a failed run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunError {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: String,
}

/// Terminal state of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    /// Remote run identifier.
    pub run_id: String,
    /// Final status.
    pub status: RunStatus,
    /// Failure detail, present when the service reports one.
    pub last_error: Option<RunError>,
}

/// Operations the relay needs from the remote agent service.
///
/// Implementations must be safe to share across concurrent sessions.
#[async_trait::async_trait]
pub trait AgentClient: Send + Sync {
    /// Create a new conversation thread and return its identifier.
    async fn create_thread(&self) -> Result<String, AgentError>;

    /// Append a message to a thread.
    async fn append_message(
        &self,
        thread_id: &str,
        role: MessageRole,
        content: &str,
    ) -> Result<(), AgentError>;

    /// Run `agent_id` over the thread and wait until the run is terminal.
    ///
    /// Returns [`AgentError::Timeout`] if `timeout` elapses first.
    async fn run_and_wait(
        &self,
        thread_id: &str,
        agent_id: &str,
        timeout: Duration,
    ) -> Result<RunOutcome, AgentError>;

    /// List every message of the thread, oldest first.
    async fn list_messages(&self, thread_id: &str) -> Result<ThreadMessages, AgentError>;
}
