//! Azure AI Agents REST client.
//!
//! Implements [`AgentClient`] against the project-scoped agents API:
//!
//! | operation | request |
//! | --- | --- |
//! | create-thread | `POST /threads` |
//! | append-message | `POST /threads/{id}/messages` |
//! | run-and-wait | `POST /threads/{id}/runs`, then `GET /threads/{id}/runs/{run}` until terminal |
//! | list-messages | `GET /threads/{id}/messages?order=asc`, following `after` cursors |
//!
//! Every request carries the configured `api-version` and a bearer token
//! from the client's [`TokenCredential`].

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Method, RequestBuilder};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::instrument;

use super::{
    AgentClient, AgentError, AmbientCredential, MessageRole, ProjectEndpoint, RunError,
    RunOutcome, RunStatus, ThreadMessage, ThreadMessages, TokenCredential,
};
use crate::config::AgentConfig;
use crate::error::RelayError;

/// Page size used when listing thread messages.
const LIST_PAGE_SIZE: u32 = 100;

/// Tunables for [`HttpAgentClient`].
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Value of the `api-version` query parameter.
    pub api_version: String,
    /// Token scope requested from the credential.
    pub scope: String,
    /// Delay between run status polls.
    pub poll_interval: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            api_version: "2024-12-01-preview".to_string(),
            scope: "https://ml.azure.com/.default".to_string(),
            poll_interval: Duration::from_secs(1),
        }
    }
}

/// HTTP implementation of [`AgentClient`].
///
/// Cloning is cheap; clones share the connection pool and token cache.
#[derive(Clone)]
pub struct HttpAgentClient {
    endpoint: ProjectEndpoint,
    http: reqwest::Client,
    credential: Arc<dyn TokenCredential>,
    options: ClientOptions,
}

impl std::fmt::Debug for HttpAgentClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpAgentClient")
            .field("endpoint", &self.endpoint.to_string())
            .field("credential", &self.credential.name())
            .field("options", &self.options)
            .finish()
    }
}

// Wire shapes. Only the fields the relay reads are modelled.

#[derive(Deserialize)]
struct ThreadObject {
    id: String,
}

#[derive(Deserialize)]
struct RunObject {
    id: String,
    status: RunStatus,
    #[serde(default)]
    last_error: Option<RunError>,
}

#[derive(Deserialize)]
struct MessageList {
    data: Vec<MessageObject>,
    #[serde(default)]
    has_more: bool,
    #[serde(default)]
    last_id: Option<String>,
}

#[derive(Deserialize)]
struct MessageObject {
    role: MessageRole,
    #[serde(default)]
    content: Vec<ContentPart>,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: TextValue },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct TextValue {
    value: String,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl From<MessageObject> for ThreadMessage {
    fn from(message: MessageObject) -> Self {
        let text = message.content.into_iter().find_map(|part| match part {
            ContentPart::Text { text } => Some(text.value),
            ContentPart::Other => None,
        });
        Self {
            role: message.role,
            text,
        }
    }
}

impl HttpAgentClient {
    /// Create a client for `endpoint` authenticated by `credential`.
    #[must_use]
    pub fn new(
        endpoint: ProjectEndpoint,
        http: reqwest::Client,
        credential: Arc<dyn TokenCredential>,
        options: ClientOptions,
    ) -> Self {
        Self {
            endpoint,
            http,
            credential,
            options,
        }
    }

    /// Build a client from configuration, using the ambient credential chain.
    pub fn from_config(config: &AgentConfig) -> Result<Self, RelayError> {
        let endpoint = ProjectEndpoint::parse(&config.connection_string)?;
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| RelayError::Config(format!("failed to build HTTP client: {e}")))?;
        let credential = Arc::new(AmbientCredential::from_env(http.clone()));

        Ok(Self::new(
            endpoint,
            http,
            credential,
            ClientOptions {
                api_version: config.api_version.clone(),
                scope: config.scope.clone(),
                poll_interval: Duration::from_millis(config.poll_interval_ms),
            },
        ))
    }

    /// The project endpoint this client talks to.
    #[must_use]
    pub fn endpoint(&self) -> &ProjectEndpoint {
        &self.endpoint
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, AgentError> {
        let url = self.endpoint.join(path)?;
        Ok(self
            .http
            .request(method, url)
            .query(&[("api-version", self.options.api_version.as_str())]))
    }

    async fn execute<T: DeserializeOwned>(&self, rb: RequestBuilder) -> Result<T, AgentError> {
        let token = self.credential.get_token(&self.options.scope).await?;
        let response = rb.bearer_auth(&token.token).send().await?;
        Self::handle_response(response).await
    }

    async fn handle_response<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, AgentError> {
        let status = response.status();
        if status.is_success() {
            let bytes = response.bytes().await?;
            return Ok(serde_json::from_slice(&bytes)?);
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".into());
        let message = match serde_json::from_str::<ErrorEnvelope>(&body) {
            Ok(ErrorEnvelope {
                error:
                    ErrorBody {
                        message: Some(message),
                        code,
                    },
            }) => match code {
                Some(code) => format!("{code}: {message}"),
                None => message,
            },
            _ => body,
        };
        Err(AgentError::Api {
            status: status.as_u16(),
            message,
        })
    }

    async fn get_run(&self, thread_id: &str, run_id: &str) -> Result<RunObject, AgentError> {
        let rb = self.request(Method::GET, &format!("threads/{thread_id}/runs/{run_id}"))?;
        self.execute(rb).await
    }

    async fn cancel_run(&self, thread_id: &str, run_id: &str) -> Result<RunObject, AgentError> {
        let rb = self.request(
            Method::POST,
            &format!("threads/{thread_id}/runs/{run_id}/cancel"),
        )?;
        self.execute(rb).await
    }

    async fn poll_until_terminal(
        &self,
        thread_id: &str,
        mut run: RunObject,
    ) -> Result<RunObject, AgentError> {
        let mut cancel_requested = false;
        loop {
            if run.status.is_terminal() {
                return Ok(run);
            }

            // No tools are registered here, so tool-output requests can never be satisfied.
            if run.status == RunStatus::RequiresAction && !cancel_requested {
                tracing::warn!(
                    name: "agent.run.requires_action",
                    run_id = %run.id,
                    "Run requested tool outputs; cancelling"
                );
                cancel_requested = true;
                run = self.cancel_run(thread_id, &run.id).await?;
                continue;
            }

            tokio::time::sleep(self.options.poll_interval).await;
            run = self.get_run(thread_id, &run.id).await?;
            tracing::trace!(run_id = %run.id, status = ?run.status, "Polled run status");
        }
    }
}

#[async_trait::async_trait]
impl AgentClient for HttpAgentClient {
    #[instrument(skip(self))]
    async fn create_thread(&self) -> Result<String, AgentError> {
        let rb = self.request(Method::POST, "threads")?.json(&json!({}));
        let thread: ThreadObject = self.execute(rb).await?;
        Ok(thread.id)
    }

    #[instrument(skip(self, content), fields(content_length = content.len()))]
    async fn append_message(
        &self,
        thread_id: &str,
        role: MessageRole,
        content: &str,
    ) -> Result<(), AgentError> {
        let rb = self
            .request(Method::POST, &format!("threads/{thread_id}/messages"))?
            .json(&json!({
                "role": role.as_str(),
                "content": content,
            }));
        let _: serde_json::Value = self.execute(rb).await?;
        Ok(())
    }

    #[instrument(skip(self), fields(run_id = tracing::field::Empty))]
    async fn run_and_wait(
        &self,
        thread_id: &str,
        agent_id: &str,
        timeout: Duration,
    ) -> Result<RunOutcome, AgentError> {
        let rb = self
            .request(Method::POST, &format!("threads/{thread_id}/runs"))?
            .json(&json!({ "assistant_id": agent_id }));
        let run: RunObject = self.execute(rb).await?;
        let run_id = run.id.clone();
        tracing::Span::current().record("run_id", run_id.as_str());

        match tokio::time::timeout(timeout, self.poll_until_terminal(thread_id, run)).await {
            Ok(run) => {
                let run = run?;
                Ok(RunOutcome {
                    run_id: run.id,
                    status: run.status,
                    last_error: run.last_error,
                })
            }
            Err(_) => {
                if let Err(e) = self.cancel_run(thread_id, &run_id).await {
                    tracing::warn!(run_id = %run_id, error = %e, "Failed to cancel timed-out run");
                }
                Err(AgentError::Timeout { limit: timeout })
            }
        }
    }

    #[instrument(skip(self))]
    async fn list_messages(&self, thread_id: &str) -> Result<ThreadMessages, AgentError> {
        let path = format!("threads/{thread_id}/messages");
        let limit = LIST_PAGE_SIZE.to_string();
        let mut messages = Vec::new();
        let mut after: Option<String> = None;

        loop {
            let mut rb = self
                .request(Method::GET, &path)?
                .query(&[("order", "asc"), ("limit", limit.as_str())]);
            if let Some(cursor) = &after {
                rb = rb.query(&[("after", cursor.as_str())]);
            }

            let page: MessageList = self.execute(rb).await?;
            messages.extend(page.data.into_iter().map(ThreadMessage::from));

            match (page.has_more, page.last_id) {
                (true, Some(last)) => after = Some(last),
                _ => break,
            }
        }

        Ok(ThreadMessages::new(messages))
    }
}
