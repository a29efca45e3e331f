//! Remote commands written to `{base}/controls/{id}/cmd`

use crate::error::RuleError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Command understood by the scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Command {
    /// Resume rule evaluation
    Run,
    /// Suspend rule evaluation; inputs are still polled
    Stop,
    /// Reload channels and rules
    Config,
    /// Reload rules only
    Condition,
    Ping,
    /// Publish the device summary
    Info,
    /// Delete all log snapshots
    Clear,
    /// Clear everything and reload from the store
    Restart,
}

impl Command {
    pub const ALL: [Command; 8] = [
        Command::Run,
        Command::Stop,
        Command::Config,
        Command::Condition,
        Command::Ping,
        Command::Info,
        Command::Clear,
        Command::Restart,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Run => "run",
            Command::Stop => "stop",
            Command::Config => "config",
            Command::Condition => "condition",
            Command::Ping => "ping",
            Command::Info => "info",
            Command::Clear => "clear",
            Command::Restart => "restart",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Command {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        Command::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(name))
            .ok_or_else(|| RuleError::UnknownCommand(name.to_string()))
    }
}

/// Acknowledgement written to `{base}/controls/{id}/ack`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandAck {
    pub cmd: String,
    pub ok: bool,
    pub ts: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl CommandAck {
    pub fn ok(cmd: impl Into<String>, ts: i64) -> Self {
        Self {
            cmd: cmd.into(),
            ok: true,
            ts,
            message: None,
        }
    }

    pub fn failed(cmd: impl Into<String>, ts: i64, message: impl Into<String>) -> Self {
        Self {
            cmd: cmd.into(),
            ok: false,
            ts,
            message: Some(message.into()),
        }
    }
}

/// Extract the command name from a stored value
///
/// Accepts a bare string or an object with a `cmd` field.
pub fn command_name(value: &serde_json::Value) -> Option<&str> {
    match value {
        serde_json::Value::String(s) => Some(s.as_str()),
        serde_json::Value::Object(map) => map.get("cmd").and_then(|v| v.as_str()),
        _ => None,
    }
    .map(str::trim)
    .filter(|s| !s.is_empty())
}
