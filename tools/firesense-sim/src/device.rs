//! Device definition files
//!
//! One YAML (or TOML/JSON) file describes a complete device:
//!
//! ```yaml
//! config:
//!   device_id: kitchen
//!   tick_interval_ms: 100
//! channels:
//!   - { id: BTN, type: input, gpio: 4 }
//!   - { id: LED, type: output, gpio: 5, status: true }
//! rules:
//!   - { IF: "BTN == 1", THEN: "LED = true", ELSE: "LED = false" }
//! stimuli:
//!   - { tick: 3, gpio: 4, digital: true }
//! ```
//!
//! `FIRESENSE_`-prefixed environment variables override file values, e.g.
//! `FIRESENSE_CONFIG__TICK_INTERVAL_MS=50`.

use anyhow::{Context, Result};
use firesense_rules::{ChannelDef, FireSenseConfig, RuleDef};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceFile {
    pub config: FireSenseConfig,
    pub channels: Vec<ChannelDef>,
    pub rules: Vec<RuleDef>,
    /// Scripted pin changes for simulated runs
    pub stimuli: Vec<Stimulus>,
}

/// Pin level change applied before the given tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stimulus {
    pub tick: u64,
    pub gpio: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digital: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analog: Option<i64>,
}

pub fn load_device(path: &Path) -> Result<DeviceFile> {
    common::load_config(Some(path), common::config_loader::ENV_PREFIX)
        .with_context(|| format!("Failed to load device file {}", path.display()))
}
