//! Shared test doubles for the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use agent_relay::AppState;
use agent_relay::agent::{
    AgentClient, AgentError, MessageRole, RunError, RunOutcome, RunStatus, ThreadMessage,
    ThreadMessages,
};
use agent_relay::config::{AgentConfig, AppConfig, ChatConfig, LogConfig, ServerConfig};
use agent_relay::server::build_state;

/// How the scripted agent answers a run.
#[derive(Debug, Clone)]
pub enum Script {
    /// Complete the run and add this agent message to the thread.
    Reply(String),
    /// Complete the run without adding anything.
    Silent,
    /// Fail the run with this error detail.
    Fail(RunError),
    /// Report a transport failure from run-and-wait.
    Unreachable,
}

/// In-memory agent service that records every call.
pub struct ScriptedAgent {
    calls: Mutex<Vec<String>>,
    threads: Mutex<HashMap<String, Vec<ThreadMessage>>>,
    script: Mutex<Script>,
    fail_create: AtomicBool,
    run_delay: Mutex<Duration>,
}

impl ScriptedAgent {
    pub fn new(script: Script) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            threads: Mutex::new(HashMap::new()),
            script: Mutex::new(script),
            fail_create: AtomicBool::new(false),
            run_delay: Mutex::new(Duration::ZERO),
        })
    }

    pub fn replying(text: &str) -> Arc<Self> {
        Self::new(Script::Reply(text.to_string()))
    }

    pub fn set_script(&self, script: Script) {
        *self.script.lock().unwrap() = script;
    }

    pub fn set_fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    pub fn set_run_delay(&self, delay: Duration) {
        *self.run_delay.lock().unwrap() = delay;
    }

    /// Calls in order, e.g. `create_thread`, `append_message thread_1 user Hello`.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn create_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.as_str() == "create_thread")
            .count()
    }

    /// Messages stored on a thread, oldest first.
    pub fn thread(&self, thread_id: &str) -> Vec<ThreadMessage> {
        self.threads
            .lock()
            .unwrap()
            .get(thread_id)
            .cloned()
            .unwrap_or_default()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait::async_trait]
impl AgentClient for ScriptedAgent {
    async fn create_thread(&self) -> Result<String, AgentError> {
        self.record("create_thread".to_string());
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(AgentError::Api {
                status: 503,
                message: "service unavailable".to_string(),
            });
        }
        let mut threads = self.threads.lock().unwrap();
        let id = format!("thread_{}", threads.len() + 1);
        threads.insert(id.clone(), Vec::new());
        Ok(id)
    }

    async fn append_message(
        &self,
        thread_id: &str,
        role: MessageRole,
        content: &str,
    ) -> Result<(), AgentError> {
        self.record(format!("append_message {thread_id} {} {content}", role.as_str()));
        let mut threads = self.threads.lock().unwrap();
        let thread = threads.get_mut(thread_id).ok_or_else(|| AgentError::Api {
            status: 404,
            message: format!("no thread {thread_id}"),
        })?;
        thread.push(ThreadMessage::text(role, content));
        Ok(())
    }

    async fn run_and_wait(
        &self,
        thread_id: &str,
        agent_id: &str,
        _timeout: Duration,
    ) -> Result<RunOutcome, AgentError> {
        self.record(format!("run_and_wait {thread_id} {agent_id}"));
        let delay = *self.run_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let script = self.script.lock().unwrap().clone();
        let (status, last_error) = match script {
            Script::Reply(text) => {
                if let Some(thread) = self.threads.lock().unwrap().get_mut(thread_id) {
                    thread.push(ThreadMessage::text(MessageRole::Agent, text));
                }
                (RunStatus::Completed, None)
            }
            Script::Silent => (RunStatus::Completed, None),
            Script::Fail(error) => (RunStatus::Failed, Some(error)),
            Script::Unreachable => {
                return Err(AgentError::Api {
                    status: 502,
                    message: "bad gateway".to_string(),
                });
            }
        };
        Ok(RunOutcome {
            run_id: "run_1".to_string(),
            status,
            last_error,
        })
    }

    async fn list_messages(&self, thread_id: &str) -> Result<ThreadMessages, AgentError> {
        self.record(format!("list_messages {thread_id}"));
        Ok(ThreadMessages::new(self.thread(thread_id)))
    }
}

pub fn test_config() -> AppConfig {
    AppConfig {
        server: ServerConfig {
            port: 0,
            host: "127.0.0.1".to_string(),
        },
        agent: AgentConfig {
            connection_string: "http://127.0.0.1:1/proj".to_string(),
            agent_id: "asst_test".to_string(),
            api_version: "2024-12-01-preview".to_string(),
            scope: "https://ml.azure.com/.default".to_string(),
            run_timeout_secs: 5,
            poll_interval_ms: 10,
            request_timeout_secs: 5,
        },
        chat: ChatConfig {
            placeholder: "thinking...".to_string(),
            author: "agent".to_string(),
            session_idle_secs: 1800,
        },
        log: LogConfig {
            format: "pretty".to_string(),
        },
    }
}

pub fn test_state(agent: Arc<ScriptedAgent>) -> AppState {
    build_state(Arc::new(test_config()), agent)
}
