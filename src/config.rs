use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;

use crate::error::RelayError;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file path
    #[arg(short, long, env = "CONFIG_FILE")]
    pub config: Option<String>,

    /// Agent project connection string or endpoint URL
    #[arg(long, env = "AIPROJECT_CONNECTION_STRING", hide_env_values = true)]
    pub connection_string: Option<String>,

    /// Identifier of the agent to run
    #[arg(long, env = "AGENT_ID")]
    pub agent_id: Option<String>,

    /// Host to bind
    #[arg(long)]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,

    /// Maximum seconds to wait for an agent run
    #[arg(long, env = "RUN_TIMEOUT_SECS")]
    pub run_timeout_secs: Option<u64>,

    /// Log output format (pretty or json)
    #[arg(long, env = "LOG_FORMAT")]
    pub log_format: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub agent: AgentConfig,
    pub chat: ChatConfig,
    pub log: LogConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AgentConfig {
    /// `<host>;<subscription_id>;<resource_group>;<project_name>` or an endpoint URL.
    pub connection_string: String,
    pub agent_id: String,
    pub api_version: String,
    pub scope: String,
    pub run_timeout_secs: u64,
    pub poll_interval_ms: u64,
    /// Per-request HTTP timeout towards the agent service.
    pub request_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatConfig {
    /// Text of the placeholder shown while the agent works.
    pub placeholder: String,
    /// Author label attached to agent messages.
    pub author: String,
    /// Idle seconds after which a session is dropped.
    pub session_idle_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogConfig {
    /// `pretty` or `json`.
    pub format: String,
}

impl AppConfig {
    pub fn load() -> Result<Self, RelayError> {
        Self::load_from_args(std::env::args())
    }

    pub fn load_from_args<I, T>(args: I) -> Result<Self, RelayError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let cli = Cli::try_parse_from(args).map_err(|e| RelayError::Config(e.to_string()))?;

        let mut builder = Config::builder()
            .set_default("server.port", 8000)?
            .set_default("server.host", "127.0.0.1")?
            .set_default("agent.connection_string", "")?
            .set_default("agent.agent_id", "")?
            .set_default("agent.api_version", "2024-12-01-preview")?
            .set_default("agent.scope", "https://ml.azure.com/.default")?
            .set_default("agent.run_timeout_secs", 120)?
            .set_default("agent.poll_interval_ms", 1000)?
            .set_default("agent.request_timeout_secs", 60)?
            .set_default("chat.placeholder", "thinking...")?
            .set_default("chat.author", "agent")?
            .set_default("chat.session_idle_secs", 30 * 60)?
            .set_default("log.format", "pretty")?;

        // Explicit file must exist; ./config.yaml is picked up when present.
        builder = match &cli.config {
            Some(path) => builder.add_source(File::with_name(path)),
            None => builder.add_source(File::with_name("config").required(false)),
        };

        // E.g. RELAY_SERVER__PORT=9000
        builder = builder.add_source(
            Environment::with_prefix("RELAY")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        // CLI flags (and the plain env vars clap reads for them) win.
        if let Some(cs) = cli.connection_string {
            builder = builder.set_override("agent.connection_string", cs)?;
        }
        if let Some(id) = cli.agent_id {
            builder = builder.set_override("agent.agent_id", id)?;
        }
        if let Some(host) = cli.host {
            builder = builder.set_override("server.host", host)?;
        }
        if let Some(port) = cli.port {
            builder = builder.set_override("server.port", i64::from(port))?;
        }
        if let Some(secs) = cli.run_timeout_secs {
            builder = builder.set_override("agent.run_timeout_secs", secs)?;
        }
        if let Some(format) = cli.log_format {
            builder = builder.set_override("log.format", format)?;
        }

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the relay cannot start with.
    pub fn validate(&self) -> Result<(), RelayError> {
        if self.agent.connection_string.trim().is_empty() {
            return Err(RelayError::Config(
                "missing required setting AIPROJECT_CONNECTION_STRING".to_string(),
            ));
        }
        if self.agent.agent_id.trim().is_empty() {
            return Err(RelayError::Config(
                "missing required setting AGENT_ID".to_string(),
            ));
        }
        if self.agent.run_timeout_secs == 0 {
            return Err(RelayError::Config(
                "agent.run_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if !matches!(self.log.format.as_str(), "pretty" | "json") {
            return Err(RelayError::Config(format!(
                "log.format must be 'pretty' or 'json', got '{}'",
                self.log.format
            )));
        }
        Ok(())
    }
}
