//! Rules Repository - channel and rule definitions in the sync store
//!
//! Channels live under `config/devices/{id}/channels` as an object keyed by
//! channel id (an array is accepted too). Rules live under
//! `config/devices/{id}/conditions` as an array of IF/THEN/ELSE triples (an
//! object with numeric keys is accepted too). Entries that do not
//! deserialize are skipped with a warning.

use crate::error::{Result, RuleError};
use crate::types::{ChannelDef, RuleDef};
use firesense_store::{DevicePaths, SyncStore};
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Load all channel definitions; an empty list when nothing is stored
pub async fn load_channel_defs<S>(store: &S, paths: &DevicePaths) -> Result<Vec<ChannelDef>>
where
    S: SyncStore + ?Sized,
{
    let Some(raw) = store.read(&paths.channels()).await? else {
        debug!("No channels stored for device '{}'", paths.device_id());
        return Ok(Vec::new());
    };
    Ok(parse_channel_defs(raw))
}

/// Load all rule definitions in stored order
pub async fn load_rule_defs<S>(store: &S, paths: &DevicePaths) -> Result<Vec<RuleDef>>
where
    S: SyncStore + ?Sized,
{
    let Some(raw) = store.read(&paths.conditions()).await? else {
        debug!("No conditions stored for device '{}'", paths.device_id());
        return Ok(Vec::new());
    };
    Ok(parse_rule_defs(raw))
}

/// Insert or replace one channel definition
pub async fn save_channel<S>(store: &S, paths: &DevicePaths, def: &ChannelDef) -> Result<()>
where
    S: SyncStore + ?Sized,
{
    if def.id.trim().is_empty() {
        return Err(RuleError::InvalidFormat(
            "channel id must not be empty".to_string(),
        ));
    }
    let mut defs = load_channel_defs(store, paths).await?;
    match defs.iter_mut().find(|d| d.id == def.id) {
        Some(existing) => *existing = def.clone(),
        None => defs.push(def.clone()),
    }
    save_channels(store, paths, &defs).await
}

/// Replace the stored channel list
pub async fn save_channels<S>(store: &S, paths: &DevicePaths, defs: &[ChannelDef]) -> Result<()>
where
    S: SyncStore + ?Sized,
{
    let mut map = Map::new();
    for def in defs {
        map.insert(def.id.clone(), serde_json::to_value(def)?);
    }
    store.write(&paths.channels(), Value::Object(map)).await?;
    Ok(())
}

/// Replace the rule at `index`, or append when `index` equals the rule count
pub async fn save_rule<S>(store: &S, paths: &DevicePaths, index: usize, def: &RuleDef) -> Result<()>
where
    S: SyncStore + ?Sized,
{
    let mut defs = load_rule_defs(store, paths).await?;
    match index.cmp(&defs.len()) {
        std::cmp::Ordering::Less => defs[index] = def.clone(),
        std::cmp::Ordering::Equal => defs.push(def.clone()),
        std::cmp::Ordering::Greater => {
            return Err(RuleError::InvalidFormat(format!(
                "rule index {} out of range (have {})",
                index,
                defs.len()
            )));
        },
    }
    save_rules(store, paths, &defs).await
}

/// Replace the stored rule list
pub async fn save_rules<S>(store: &S, paths: &DevicePaths, defs: &[RuleDef]) -> Result<()>
where
    S: SyncStore + ?Sized,
{
    store
        .write(&paths.conditions(), serde_json::to_value(defs)?)
        .await?;
    Ok(())
}

/// Decode a stored channel subtree
pub fn parse_channel_defs(raw: Value) -> Vec<ChannelDef> {
    let entries: Vec<(Option<String>, Value)> = match raw {
        Value::Object(map) => map.into_iter().map(|(k, v)| (Some(k), v)).collect(),
        Value::Array(items) => items.into_iter().map(|v| (None, v)).collect(),
        other => {
            warn!("Channel list is not an object or array: {}", other);
            return Vec::new();
        },
    };

    let mut defs = Vec::with_capacity(entries.len());
    for (key, value) in entries {
        if value.is_null() {
            continue;
        }
        match serde_json::from_value::<ChannelDef>(value) {
            Ok(mut def) => {
                if def.id.is_empty() {
                    match key {
                        Some(key) => def.id = key,
                        None => {
                            warn!("Skipping channel without id");
                            continue;
                        },
                    }
                }
                defs.push(def);
            },
            Err(e) => warn!("Skipping channel {:?}: {}", key.unwrap_or_default(), e),
        }
    }
    defs
}

/// Decode a stored rule subtree
pub fn parse_rule_defs(raw: Value) -> Vec<RuleDef> {
    let items: Vec<Value> = match raw {
        Value::Array(items) => items,
        Value::Object(map) => {
            let mut keyed: Vec<(u64, Value)> = Vec::with_capacity(map.len());
            for (key, value) in map {
                match key.parse::<u64>() {
                    Ok(index) => keyed.push((index, value)),
                    Err(_) => warn!("Skipping rule with non-numeric key '{}'", key),
                }
            }
            keyed.sort_by_key(|(index, _)| *index);
            keyed.into_iter().map(|(_, v)| v).collect()
        },
        other => {
            warn!("Rule list is not an array or object: {}", other);
            return Vec::new();
        },
    };

    items
        .into_iter()
        .filter(|v| !v.is_null())
        .filter_map(|v| match serde_json::from_value::<RuleDef>(v) {
            Ok(def) => Some(def),
            Err(e) => {
                warn!("Skipping rule: {}", e);
                None
            },
        })
        .collect()
}
