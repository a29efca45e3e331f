//! Device runtime configuration

use serde::{Deserialize, Serialize};

/// Default scheduler tick interval (100ms)
pub const DEFAULT_TICK_MS: u64 = 100;

/// Runtime configuration of one FireSense device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FireSenseConfig {
    /// Device id used in every store path
    pub device_id: String,

    /// Root of the device tree in the sync store
    pub base_path: String,

    /// Minimum interval between two rule ticks
    pub tick_interval_ms: u64,

    /// Interval between log snapshots; 0 disables logging
    pub log_interval_ms: u64,

    /// Age after which log snapshots are pruned
    pub log_retention_secs: u64,

    /// Maximum snapshots pruned per pass
    pub log_limit: usize,

    /// Fixed offset of local time used by calendar conditions
    pub utc_offset_secs: i64,

    /// Mirror terminal messages into the store
    pub terminal_enabled: bool,

    /// Publish status updates of `status` channels
    pub publish_status: bool,

    pub logging: LogSettings,
}

impl Default for FireSenseConfig {
    fn default() -> Self {
        Self {
            device_id: "device".to_string(),
            base_path: String::new(),
            tick_interval_ms: DEFAULT_TICK_MS,
            log_interval_ms: 60_000,
            log_retention_secs: 86_400,
            log_limit: 100,
            utc_offset_secs: 0,
            terminal_enabled: true,
            publish_status: true,
            logging: LogSettings::default(),
        }
    }
}

impl FireSenseConfig {
    pub fn new(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            ..Self::default()
        }
    }

    pub fn with_base_path(mut self, base_path: impl Into<String>) -> Self {
        self.base_path = base_path.into();
        self
    }

    pub fn with_tick_interval(mut self, ms: u64) -> Self {
        self.tick_interval_ms = ms;
        self
    }

    pub fn with_log_interval(mut self, ms: u64) -> Self {
        self.log_interval_ms = ms;
        self
    }
}

/// Logging output settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// Filter directive when `RUST_LOG` is unset
    pub level: String,
    /// Directory for daily log files; console only when unset
    pub dir: Option<String>,
    /// JSON lines instead of the bracketed text format
    pub json: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            dir: None,
            json: false,
        }
    }
}
