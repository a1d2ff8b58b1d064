//! Agent command dispatch
//!
//! Commands tell the tracing agent on a database node to run a new
//! instrumentation script for a pid, or to stop tracing it.

use crate::config::AgentConfig;
use crate::utils::{TracerError, TracerResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CommandName {
    Run,
    Stop,
}

impl fmt::Display for CommandName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandName::Run => f.write_str("RUN"),
            CommandName::Stop => f.write_str("STOP"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentCommand {
    #[serde(rename = "CommandName")]
    pub command_name: CommandName,
    #[serde(rename = "Pid")]
    pub pid: i32,
    #[serde(rename = "Script", default, skip_serializing_if = "String::is_empty")]
    pub script: String,
}

impl AgentCommand {
    pub fn run(pid: i32, script: String) -> Self {
        Self { command_name: CommandName::Run, pid, script }
    }

    pub fn stop(pid: i32) -> Self {
        Self { command_name: CommandName::Stop, pid, script: String::new() }
    }
}

#[async_trait]
pub trait CommandDispatcher: Send + Sync {
    async fn dispatch(&self, command: &AgentCommand) -> TracerResult<()>;
}

/// POSTs commands as JSON to the agent endpoint
pub struct HttpCommandDispatcher {
    client: reqwest::Client,
    url: String,
}

impl HttpCommandDispatcher {
    pub fn new(config: &AgentConfig) -> TracerResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs.max(1)))
            .build()?;
        Ok(Self { client, url: config.command_url.clone() })
    }
}

#[async_trait]
impl CommandDispatcher for HttpCommandDispatcher {
    async fn dispatch(&self, command: &AgentCommand) -> TracerResult<()> {
        let response = self.client.post(&self.url).json(command).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TracerError::transport(format!(
                "agent rejected {} for pid {}: HTTP {} {}",
                command.command_name, command.pid, status, body
            )));
        }
        tracing::debug!(pid = command.pid, command = %command.command_name, "Agent command delivered");
        Ok(())
    }
}

/// Logs commands instead of sending them
pub struct LogCommandDispatcher;

#[async_trait]
impl CommandDispatcher for LogCommandDispatcher {
    async fn dispatch(&self, command: &AgentCommand) -> TracerResult<()> {
        tracing::info!(
            pid = command.pid,
            command = %command.command_name,
            script_bytes = command.script.len(),
            "Agent command (no agent endpoint configured)"
        );
        Ok(())
    }
}

pub fn build_command_dispatcher(config: &AgentConfig) -> TracerResult<Arc<dyn CommandDispatcher>> {
    if config.command_url.trim().is_empty() {
        return Ok(Arc::new(LogCommandDispatcher));
    }
    Ok(Arc::new(HttpCommandDispatcher::new(config)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_command_wire_shape() {
        let json = serde_json::to_string(&AgentCommand::run(96700, "probe".to_string())).unwrap();
        assert_eq!(json, r#"{"CommandName":"RUN","Pid":96700,"Script":"probe"}"#);
    }

    #[test]
    fn test_stop_command_omits_script() {
        let json = serde_json::to_string(&AgentCommand::stop(96700)).unwrap();
        assert_eq!(json, r#"{"CommandName":"STOP","Pid":96700}"#);
        let parsed: AgentCommand = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, AgentCommand::stop(96700));
    }

    #[tokio::test]
    async fn test_log_dispatcher_accepts_everything() {
        let dispatcher = build_command_dispatcher(&AgentConfig::default()).unwrap();
        assert!(dispatcher.dispatch(&AgentCommand::stop(1)).await.is_ok());
    }
}
