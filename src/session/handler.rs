//! Session event handlers.
//!
//! The handler relays each user message to the remote agent:
//! 1. Show a placeholder while the agent works
//! 2. Make sure the session is bound to a remote thread
//! 3. Append the user message to the thread
//! 4. Run the agent and wait for a terminal status
//! 5. Pick the newest agent message from the thread
//! 6. Replace the placeholder with the reply, or with `Error: ...`

use std::sync::Arc;
use std::time::Duration;

use tracing::instrument;

use super::SessionContext;
use crate::agent::{AgentClient, MessageRole, RunStatus};
use crate::config::AppConfig;
use crate::error::{RelayError, Result};
use crate::ui::{ChatSink, MessageId};

/// Detail used when a run fails without reporting why.
const UNKNOWN_RUN_FAILURE: &str = "Run failed without error detail.";

/// Knobs for [`SessionHandler`].
#[derive(Debug, Clone)]
pub struct HandlerSettings {
    /// Remote agent to run for every message.
    pub agent_id: String,
    /// Upper bound on a single run.
    pub run_timeout: Duration,
    /// Placeholder text shown while the run is in progress.
    pub placeholder: String,
    /// Author label for agent output.
    pub author: String,
}

impl HandlerSettings {
    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            agent_id: config.agent.agent_id.clone(),
            run_timeout: Duration::from_secs(config.agent.run_timeout_secs),
            placeholder: config.chat.placeholder.clone(),
            author: config.chat.author.clone(),
        }
    }
}

/// Result of handling one user message.
#[derive(Debug)]
pub struct MessageOutcome {
    /// The placeholder message, now holding the reply or the error text.
    pub message_id: MessageId,
    /// Set when the relay failed.
    pub error: Option<RelayError>,
}

/// Handles session lifecycle events against a shared [`AgentClient`].
#[derive(Clone)]
pub struct SessionHandler {
    client: Arc<dyn AgentClient>,
    settings: HandlerSettings,
}

impl std::fmt::Debug for SessionHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandler")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl SessionHandler {
    #[must_use]
    pub fn new(client: Arc<dyn AgentClient>, settings: HandlerSettings) -> Self {
        Self { client, settings }
    }

    #[must_use]
    pub fn settings(&self) -> &HandlerSettings {
        &self.settings
    }

    /// Session-start: bind the session to a new remote thread if it has none.
    ///
    /// Idempotent. On failure the error is shown to the user and returned;
    /// the next message retries thread creation.
    #[instrument(skip_all, fields(session_id = %ctx.key()))]
    pub async fn on_session_start(
        &self,
        ctx: &mut SessionContext,
        sink: &dyn ChatSink,
    ) -> Result<()> {
        match self.ensure_thread(ctx).await {
            Ok(_) => Ok(()),
            Err(err) => {
                tracing::warn!(
                    name: "session.start.failed",
                    kind = err.kind(),
                    error = %err,
                    "Could not open a thread for the session"
                );
                sink.send(&self.settings.author, &err.to_chat_text());
                Err(err)
            }
        }
    }

    /// Message-received: relay `text` to the agent and render the reply.
    ///
    /// Never fails outright; errors are rendered into the placeholder and
    /// reported in the returned [`MessageOutcome`].
    #[instrument(skip_all, fields(session_id = %ctx.key(), content_length = text.len()))]
    pub async fn on_message(
        &self,
        ctx: &mut SessionContext,
        text: &str,
        sink: &dyn ChatSink,
    ) -> MessageOutcome {
        let placeholder = sink.send(&self.settings.author, &self.settings.placeholder);

        match self.relay(ctx, text).await {
            Ok(reply) => {
                sink.update(&placeholder, &reply);
                MessageOutcome {
                    message_id: placeholder,
                    error: None,
                }
            }
            Err(err) => {
                tracing::error!(
                    name: "message.failed",
                    thread_id = ?ctx.thread_id(),
                    kind = err.kind(),
                    error = %err,
                    "Failed to relay message"
                );
                sink.update(&placeholder, &err.to_chat_text());
                MessageOutcome {
                    message_id: placeholder,
                    error: Some(err),
                }
            }
        }
    }

    async fn ensure_thread(&self, ctx: &mut SessionContext) -> Result<String> {
        if let Some(thread_id) = ctx.thread_id() {
            return Ok(thread_id.to_string());
        }

        let thread_id = self
            .client
            .create_thread()
            .await
            .map_err(RelayError::Thread)?;
        tracing::info!(name: "thread.created", thread_id = %thread_id, "New thread");
        Ok(ctx.bind_thread(thread_id).to_string())
    }

    async fn relay(&self, ctx: &mut SessionContext, text: &str) -> Result<String> {
        let thread_id = self.ensure_thread(ctx).await?;

        self.client
            .append_message(&thread_id, MessageRole::User, text)
            .await?;

        let run = self
            .client
            .run_and_wait(&thread_id, &self.settings.agent_id, self.settings.run_timeout)
            .await?;
        tracing::info!(
            name: "run.finished",
            thread_id = %thread_id,
            run_id = %run.run_id,
            status = ?run.status,
            "Run finished"
        );

        if run.status == RunStatus::Failed {
            return Err(match run.last_error {
                Some(e) if !e.message.is_empty() => RelayError::RunFailed {
                    code: e.code,
                    detail: e.message,
                },
                Some(e) => RelayError::RunFailed {
                    detail: e
                        .code
                        .clone()
                        .unwrap_or_else(|| UNKNOWN_RUN_FAILURE.to_string()),
                    code: e.code,
                },
                None => RelayError::RunFailed {
                    code: None,
                    detail: UNKNOWN_RUN_FAILURE.to_string(),
                },
            });
        }

        let messages = self.client.list_messages(&thread_id).await?;
        messages
            .last_text_by_role(MessageRole::Agent)
            .map(ToString::to_string)
            .ok_or(RelayError::EmptyResponse)
    }
}
