//! Bearer-token acquisition for the agent service.
//!
//! The relay never manages refresh tokens itself. It asks a
//! [`TokenCredential`] for an access token per request and the ambient chain
//! defers to whatever identity the process already has:
//!
//! 1. `AGENT_ACCESS_TOKEN`: a pre-issued bearer token
//! 2. `AZURE_TENANT_ID` / `AZURE_CLIENT_ID` / `AZURE_CLIENT_SECRET`: a service principal
//! 3. the Azure CLI login (`az account get-access-token`)

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use serde::Deserialize;
use tokio::process::Command;
use tokio::sync::{Mutex, OnceCell};

use super::AgentError;

/// Tokens closer than this many seconds to expiry are fetched again.
const EXPIRY_MARGIN_SECS: i64 = 300;

/// Token endpoint of the Microsoft identity platform.
const AUTHORITY_HOST: &str = "https://login.microsoftonline.com";

/// A bearer token and its expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub token: String,
    pub expires_on: DateTime<Utc>,
}

impl AccessToken {
    fn is_fresh(&self) -> bool {
        self.expires_on - chrono::Duration::seconds(EXPIRY_MARGIN_SECS) > Utc::now()
    }
}

/// Source of access tokens for a scope.
#[async_trait::async_trait]
pub trait TokenCredential: Send + Sync {
    /// Short name used in logs and error messages.
    fn name(&self) -> &'static str;

    /// Get a token valid for `scope`.
    async fn get_token(&self, scope: &str) -> Result<AccessToken, AgentError>;
}

/// A fixed token, typically injected through the environment.
#[derive(Clone)]
pub struct StaticTokenCredential {
    token: String,
}

impl std::fmt::Debug for StaticTokenCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticTokenCredential")
            .field("token", &"<redacted>")
            .finish()
    }
}

impl StaticTokenCredential {
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait::async_trait]
impl TokenCredential for StaticTokenCredential {
    fn name(&self) -> &'static str {
        "static"
    }

    async fn get_token(&self, _scope: &str) -> Result<AccessToken, AgentError> {
        Ok(AccessToken {
            token: self.token.clone(),
            expires_on: DateTime::<Utc>::MAX_UTC,
        })
    }
}

/// OAuth2 client-credentials flow for a service principal.
#[derive(Clone)]
pub struct ClientSecretCredential {
    http: reqwest::Client,
    tenant_id: String,
    client_id: String,
    client_secret: String,
}

impl std::fmt::Debug for ClientSecretCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientSecretCredential")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .finish()
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

impl ClientSecretCredential {
    #[must_use]
    pub fn new(
        http: reqwest::Client,
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            http,
            tenant_id: tenant_id.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    /// Build from `AZURE_TENANT_ID`, `AZURE_CLIENT_ID` and `AZURE_CLIENT_SECRET`.
    #[must_use]
    pub fn from_env(http: reqwest::Client) -> Option<Self> {
        let tenant_id = non_empty_env("AZURE_TENANT_ID")?;
        let client_id = non_empty_env("AZURE_CLIENT_ID")?;
        let client_secret = non_empty_env("AZURE_CLIENT_SECRET")?;
        Some(Self::new(http, tenant_id, client_id, client_secret))
    }
}

#[async_trait::async_trait]
impl TokenCredential for ClientSecretCredential {
    fn name(&self) -> &'static str {
        "client_secret"
    }

    async fn get_token(&self, scope: &str) -> Result<AccessToken, AgentError> {
        let url = format!("{AUTHORITY_HOST}/{}/oauth2/v2.0/token", self.tenant_id);
        let params = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("scope", scope),
        ];

        let response = self.http.post(&url).form(&params).send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".into());
            return Err(AgentError::Credential(format!(
                "token endpoint returned {status}: {message}"
            )));
        }

        let body: TokenResponse = response.json().await?;
        Ok(AccessToken {
            token: body.access_token,
            expires_on: Utc::now() + chrono::Duration::seconds(body.expires_in),
        })
    }
}

/// Token from the signed-in Azure CLI.
#[derive(Debug, Clone)]
pub struct AzureCliCredential {
    timeout: Duration,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CliToken {
    access_token: String,
    #[serde(rename = "expires_on", default)]
    expires_on_epoch: Option<i64>,
    #[serde(default)]
    expires_on: Option<String>,
}

impl Default for AzureCliCredential {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
        }
    }
}

impl AzureCliCredential {
    fn parse_output(stdout: &[u8]) -> Result<AccessToken, AgentError> {
        let token: CliToken = serde_json::from_slice(stdout)?;
        let expires_on = match (token.expires_on_epoch, token.expires_on.as_deref()) {
            (Some(epoch), _) => DateTime::from_timestamp(epoch, 0),
            // Older CLIs only print a local timestamp.
            (None, Some(local)) => NaiveDateTime::parse_from_str(local, "%Y-%m-%d %H:%M:%S%.f")
                .ok()
                .and_then(|naive| Local.from_local_datetime(&naive).single())
                .map(|dt| dt.with_timezone(&Utc)),
            (None, None) => None,
        }
        .ok_or_else(|| AgentError::Credential("az output has no usable expiry".to_string()))?;

        Ok(AccessToken {
            token: token.access_token,
            expires_on,
        })
    }
}

#[async_trait::async_trait]
impl TokenCredential for AzureCliCredential {
    fn name(&self) -> &'static str {
        "azure_cli"
    }

    async fn get_token(&self, scope: &str) -> Result<AccessToken, AgentError> {
        let mut command = Command::new("az");
        command
            .args(["account", "get-access-token", "--output", "json", "--scope", scope])
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| AgentError::Credential("az timed out".to_string()))?
            .map_err(|e| AgentError::Credential(format!("failed to run az: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AgentError::Credential(format!(
                "az exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        Self::parse_output(&output.stdout)
    }
}

/// Outcome of one walk over the chain, shared by every caller that waited on it.
type FetchResult = Result<AccessToken, String>;

/// Ordered chain of credentials with a per-scope token cache.
///
/// Concurrent callers missing the cache for the same scope share a single
/// walk over the chain. Fresh tokens are served without waiting on a fetch.
pub struct AmbientCredential {
    sources: Vec<Box<dyn TokenCredential>>,
    cache: Mutex<HashMap<String, AccessToken>>,
    inflight: Mutex<HashMap<String, Arc<OnceCell<FetchResult>>>>,
}

impl std::fmt::Debug for AmbientCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.sources.iter().map(|s| s.name()).collect();
        f.debug_struct("AmbientCredential")
            .field("sources", &names)
            .finish()
    }
}

impl AmbientCredential {
    /// Chain the given sources; the first to succeed wins.
    #[must_use]
    pub fn new(sources: Vec<Box<dyn TokenCredential>>) -> Self {
        Self {
            sources,
            cache: Mutex::new(HashMap::new()),
            inflight: Mutex::new(HashMap::new()),
        }
    }

    /// Build the default chain from the process environment.
    #[must_use]
    pub fn from_env(http: reqwest::Client) -> Self {
        let mut sources: Vec<Box<dyn TokenCredential>> = Vec::new();
        if let Some(token) = non_empty_env("AGENT_ACCESS_TOKEN") {
            sources.push(Box::new(StaticTokenCredential::new(token)));
        }
        if let Some(credential) = ClientSecretCredential::from_env(http) {
            sources.push(Box::new(credential));
        }
        sources.push(Box::new(AzureCliCredential::default()));
        Self::new(sources)
    }

    async fn cached(&self, scope: &str) -> Option<AccessToken> {
        self.cache
            .lock()
            .await
            .get(scope)
            .filter(|token| token.is_fresh())
            .cloned()
    }

    async fn walk_chain(&self, scope: &str) -> FetchResult {
        let mut failures = Vec::new();
        for source in &self.sources {
            match source.get_token(scope).await {
                Ok(token) => {
                    tracing::debug!(
                        name: "credential.acquired",
                        source = source.name(),
                        expires_on = %token.expires_on,
                        "Access token acquired"
                    );
                    self.cache
                        .lock()
                        .await
                        .insert(scope.to_string(), token.clone());
                    return Ok(token);
                }
                Err(e) => {
                    tracing::debug!(source = source.name(), error = %e, "Credential source failed");
                    failures.push(format!("{}: {e}", source.name()));
                }
            }
        }

        Err(if failures.is_empty() {
            "no credential sources configured".to_string()
        } else {
            failures.join("; ")
        })
    }
}

#[async_trait::async_trait]
impl TokenCredential for AmbientCredential {
    fn name(&self) -> &'static str {
        "ambient"
    }

    async fn get_token(&self, scope: &str) -> Result<AccessToken, AgentError> {
        if let Some(token) = self.cached(scope).await {
            return Ok(token);
        }

        let cell = Arc::clone(
            self.inflight
                .lock()
                .await
                .entry(scope.to_string())
                .or_default(),
        );
        let result = cell.get_or_init(|| self.walk_chain(scope)).await.clone();

        // The next miss after this fetch starts a new one.
        let mut inflight = self.inflight.lock().await;
        if inflight
            .get(scope)
            .is_some_and(|current| Arc::ptr_eq(current, &cell))
        {
            inflight.remove(scope);
        }
        drop(inflight);

        result.map_err(AgentError::Credential)
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
