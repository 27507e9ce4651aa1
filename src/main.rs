//! Agent Relay server
//!
//! Entry point for the chat front-end that relays messages to a hosted agent.

use std::sync::Arc;

use mimalloc::MiMalloc;
use tracing::info;

use agent_relay::agent::{AgentClient, HttpAgentClient};
use agent_relay::config::AppConfig;
use agent_relay::{server, telemetry};

/// Global allocator for improved performance (M-MIMALLOC-APPS).
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env (if present)
    let _ = dotenvy::dotenv();

    let config = match AppConfig::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(1);
        }
    };

    telemetry::init(&config.log);

    let client = match HttpAgentClient::from_config(&config.agent) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(name: "agent.client.failed", error = %e, "Could not set up the agent client");
            std::process::exit(1);
        }
    };
    info!(
        name: "agent.client.ready",
        endpoint = %client.endpoint(),
        "Agent client ready"
    );

    let client: Arc<dyn AgentClient> = Arc::new(client);
    server::start_server(Arc::new(config), client).await
}
