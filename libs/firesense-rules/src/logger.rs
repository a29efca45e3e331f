//! Status, log and terminal payloads
//!
//! Shapes written to the sync store:
//! - channel status: `{ "value": 1, "type": "int", "ts": 1710513015 }`
//! - log snapshot: `{ "ts": 1710513015, "LED1": true, "T": 21.5 }`
//! - terminal line: `[1710513015] message`

use crate::channel::{ChannelStore, StatusUpdate};
use crate::rule::Rule;
use crate::types::value_to_json;
use firesense_calc::Value;
use serde_json::{json, Map};

/// Payload for `status/{id}/channels/{channel}`
pub fn status_payload(value: Value, ts: i64) -> serde_json::Value {
    json!({
        "value": value_to_json(value),
        "type": value.value_type().as_str(),
        "ts": ts,
    })
}

/// Payload for one queued status update
pub fn status_update_payload(update: &StatusUpdate, ts: i64) -> serde_json::Value {
    status_payload(update.value, ts)
}

/// Snapshot of every channel flagged with `log`; `None` when no channel is
pub fn log_snapshot(channels: &ChannelStore, ts: i64) -> Option<serde_json::Value> {
    let mut map = Map::new();
    for channel in channels.iter().filter(|c| c.def().log) {
        map.insert(channel.id().to_string(), value_to_json(channel.current()));
    }
    if map.is_empty() {
        return None;
    }
    map.insert("ts".to_string(), json!(ts));
    Some(serde_json::Value::Object(map))
}

pub fn terminal_line(ts: i64, message: &str) -> String {
    format!("[{}] {}", ts, message)
}

/// One-line rule summary: `#0 IF A==1 THEN B=1 ELSE -`
pub fn format_rule(index: usize, rule: &Rule) -> String {
    let or_dash = |s: &str| {
        let s = s.trim();
        if s.is_empty() {
            "-".to_string()
        } else {
            s.to_string()
        }
    };
    format!(
        "#{} IF {} THEN {} ELSE {}",
        index,
        or_dash(&rule.def.condition),
        or_dash(&rule.def.then),
        or_dash(&rule.def.otherwise)
    )
}
