//! Channel store
//!
//! Holds every I/O channel with its current and previous value. Parsed rule
//! trees reference channels through generation-tagged `ChannelRef` handles;
//! `clear()` bumps the generation so handles from before a reload resolve to
//! `Undefined` and writes through them are dropped.

use crate::hardware::{Hardware, PinMode};
use crate::types::{ChannelDef, ChannelKind};
use firesense_calc::{ChannelRef, SymbolTable, Value, ValueType};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, warn};

/// Shared table of user-program values that `Value` channels can bind to
#[derive(Debug, Clone, Default)]
pub struct UserValues {
    slots: Arc<RwLock<Vec<Value>>>,
}

impl UserValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a slot and return its index
    pub fn add(&self, value: Value) -> usize {
        let mut slots = self.slots.write();
        slots.push(value);
        slots.len() - 1
    }

    pub fn get(&self, index: usize) -> Option<Value> {
        self.slots.read().get(index).copied()
    }

    /// Overwrite a slot; false when the index is out of range
    pub fn set(&self, index: usize, value: Value) -> bool {
        match self.slots.write().get_mut(index) {
            Some(slot) => {
                *slot = value;
                true
            },
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.slots.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.read().is_empty()
    }
}

/// One live channel
#[derive(Debug, Clone)]
pub struct Channel {
    def: ChannelDef,
    value_type: ValueType,
    current: Value,
    previous: Value,
    pin_ready: bool,
    last_poll_ms: Option<u64>,
}

impl Channel {
    fn new(def: ChannelDef) -> Self {
        let value_type = def.storage_type();
        let zero = Value::int(0).coerce(value_type);
        Self {
            def,
            value_type,
            current: zero,
            previous: zero,
            pin_ready: false,
            last_poll_ms: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.def.id
    }

    pub fn def(&self) -> &ChannelDef {
        &self.def
    }

    pub fn kind(&self) -> ChannelKind {
        self.def.kind
    }

    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    pub fn current(&self) -> Value {
        self.current
    }

    pub fn previous(&self) -> Value {
        self.previous
    }

    /// True when the current value differs from the last committed one
    pub fn changed(&self) -> bool {
        self.current.differs(&self.previous)
    }

    fn ensure_pin(&mut self, hardware: &dyn Hardware, mode: PinMode) -> Option<u32> {
        let pin = self.def.gpio?;
        if !self.pin_ready {
            hardware.pin_mode(pin, mode);
            self.pin_ready = true;
        }
        Some(pin)
    }
}

/// Channel value change queued for status publishing
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    pub channel_id: String,
    pub value: Value,
}

/// Channel list plus the collaborators writes are routed through
pub struct ChannelStore {
    channels: Vec<Channel>,
    generation: u32,
    hardware: Arc<dyn Hardware>,
    user_values: UserValues,
    status_queue: Vec<StatusUpdate>,
}

impl ChannelStore {
    pub fn new(hardware: Arc<dyn Hardware>, user_values: UserValues) -> Self {
        Self {
            channels: Vec::new(),
            generation: 0,
            hardware,
            user_values,
            status_queue: Vec::new(),
        }
    }

    /// Add a channel, deriving its storage type from its kind
    ///
    /// An existing channel with the same id is replaced in place and keeps
    /// its handle. Persisting the definition is the caller's job.
    pub fn add(&mut self, mut def: ChannelDef) -> ChannelRef {
        if def.uid.is_empty() {
            def.uid = format!("{:08x}", rand::random::<u32>());
        }
        if let Some(channel) = self.find(&def.id) {
            warn!("Channel '{}' redefined", def.id);
            self.channels[channel.slot as usize] = Channel::new(def);
            return channel;
        }
        debug!(
            "Add channel '{}' ({:?}, {})",
            def.id,
            def.kind,
            def.storage_type()
        );
        self.channels.push(Channel::new(def));
        ChannelRef::new((self.channels.len() - 1) as u32, self.generation)
    }

    /// Linear lookup by id
    pub fn find(&self, id: &str) -> Option<ChannelRef> {
        self.channels
            .iter()
            .position(|c| c.def.id == id)
            .map(|slot| ChannelRef::new(slot as u32, self.generation))
    }

    fn slot(&self, channel: ChannelRef) -> Option<usize> {
        let slot = channel.slot as usize;
        (channel.generation == self.generation && slot < self.channels.len()).then_some(slot)
    }

    pub fn get(&self, channel: ChannelRef) -> Option<&Channel> {
        self.slot(channel).map(|slot| &self.channels[slot])
    }

    pub fn by_id(&self, id: &str) -> Option<&Channel> {
        self.channels.iter().find(|c| c.def.id == id)
    }

    /// Cached current value; `Undefined` for stale handles
    pub fn value(&self, channel: ChannelRef) -> Value {
        self.get(channel).map(Channel::current).unwrap_or_default()
    }

    /// Value as of the last `commit_tick`
    pub fn previous(&self, channel: ChannelRef) -> Value {
        self.get(channel).map(Channel::previous).unwrap_or_default()
    }

    /// Current value, re-read from hardware for Input/AnalogInput channels
    pub fn read(&mut self, channel: ChannelRef) -> Value {
        let Some(slot) = self.slot(channel) else {
            return Value::undefined();
        };
        self.read_slot(slot);
        self.channels[slot].current
    }

    fn read_slot(&mut self, slot: usize) {
        let hardware = self.hardware.clone();
        let channel = &mut self.channels[slot];
        let reading = match channel.def.kind {
            ChannelKind::Input => channel
                .ensure_pin(hardware.as_ref(), PinMode::Input)
                .map(|pin| Value::int(i64::from(hardware.digital_read(pin)))),
            ChannelKind::AnalogInput => channel
                .ensure_pin(hardware.as_ref(), PinMode::Input)
                .map(|pin| Value::int(hardware.analog_read(pin))),
            ChannelKind::Output | ChannelKind::Value => None,
        };
        if let Some(value) = reading {
            self.set_current(slot, value);
        }
    }

    /// Type- and kind-aware write
    ///
    /// - Output: coerced to bool, drives the pin only when the level changes
    /// - Value: coerced to the channel type; with `elide_unchanged` an equal
    ///   value is not applied. Bound channels mirror into their user slot
    /// - Input/AnalogInput: ignored
    ///
    /// Returns whether the write was applied.
    pub fn write(&mut self, channel: ChannelRef, value: Value, elide_unchanged: bool) -> bool {
        let Some(slot) = self.slot(channel) else {
            debug!("Write through stale channel handle dropped");
            return false;
        };
        let hardware = self.hardware.clone();
        let ch = &mut self.channels[slot];
        let value = value.coerce(ch.value_type);

        match ch.def.kind {
            ChannelKind::Input | ChannelKind::AnalogInput => {
                debug!("Write to input channel '{}' ignored", ch.def.id);
                false
            },
            ChannelKind::Output => {
                if !value.differs(&ch.current) {
                    return false;
                }
                if let Some(pin) = ch.ensure_pin(hardware.as_ref(), PinMode::Output) {
                    hardware.digital_write(pin, value.as_bool());
                }
                self.set_current(slot, value);
                true
            },
            ChannelKind::Value => {
                if elide_unchanged && !value.differs(&ch.current) {
                    return false;
                }
                if let Some(index) = ch.def.bound_index() {
                    if !self.user_values.set(index, value) {
                        warn!("Channel '{}' bound to missing slot {}", ch.def.id, index);
                    }
                }
                self.set_current(slot, value);
                true
            },
        }
    }

    fn set_current(&mut self, slot: usize, value: Value) {
        let channel = &mut self.channels[slot];
        let changed = value.differs(&channel.current);
        channel.current = value;
        if changed && channel.def.status {
            self.status_queue.push(StatusUpdate {
                channel_id: channel.def.id.clone(),
                value,
            });
        }
    }

    /// Copy every current value into previous; once per tick, after all rules
    pub fn commit_tick(&mut self) {
        for channel in &mut self.channels {
            channel.previous = channel.current;
        }
    }

    /// Re-read inputs whose polling interval has elapsed
    pub fn poll_inputs(&mut self, now_ms: u64) -> usize {
        let mut polled = 0;
        for slot in 0..self.channels.len() {
            let channel = &self.channels[slot];
            if !channel.def.kind.is_input() {
                continue;
            }
            let due = match channel.last_poll_ms {
                None => true,
                Some(last) => now_ms.saturating_sub(last) >= channel.def.polling_interval_ms,
            };
            if due {
                self.channels[slot].last_poll_ms = Some(now_ms);
                self.read_slot(slot);
                polled += 1;
            }
        }
        polled
    }

    /// Pull bound user slots into their `Value` channels
    pub fn pull_bound(&mut self) {
        for slot in 0..self.channels.len() {
            let channel = &self.channels[slot];
            if channel.def.kind != ChannelKind::Value {
                continue;
            }
            let Some(value) = channel
                .def
                .bound_index()
                .and_then(|index| self.user_values.get(index))
            else {
                continue;
            };
            let value = value.coerce(channel.value_type);
            self.set_current(slot, value);
        }
    }

    /// Drop every channel and invalidate outstanding handles
    pub fn clear(&mut self) {
        self.channels.clear();
        self.generation = self.generation.wrapping_add(1);
    }

    /// Drain queued status updates
    pub fn take_status_updates(&mut self) -> Vec<StatusUpdate> {
        std::mem::take(&mut self.status_queue)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Channel> {
        self.channels.iter()
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn user_values(&self) -> &UserValues {
        &self.user_values
    }
}

impl SymbolTable for ChannelStore {
    fn lookup(&self, id: &str) -> Option<ChannelRef> {
        self.find(id)
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::hardware::SimulatedHardware;

    fn store() -> (ChannelStore, Arc<SimulatedHardware>) {
        let hw = Arc::new(SimulatedHardware::new());
        (ChannelStore::new(hw.clone(), UserValues::new()), hw)
    }

    #[test]
    fn test_add_assigns_uid_and_type() {
        let (mut channels, _) = store();
        let led = channels.add(ChannelDef::new("LED1", ChannelKind::Output).with_gpio(2));
        let ch = channels.get(led).unwrap();
        assert_eq!(ch.def().uid.len(), 8);
        assert_eq!(ch.value_type(), ValueType::Bool);
        assert_eq!(ch.current(), Value::boolean(false));
        assert_eq!(channels.find("LED1"), Some(led));
        assert_eq!(channels.find("LED2"), None);
    }

    #[test]
    fn test_redefinition_keeps_handle() {
        let (mut channels, _) = store();
        let a = channels.add(ChannelDef::new("A", ChannelKind::Value));
        let again = channels.add(
            ChannelDef::new("A", ChannelKind::Value).with_value_type(ValueType::Float),
        );
        assert_eq!(a, again);
        assert_eq!(channels.len(), 1);
        assert_eq!(channels.get(a).unwrap().value_type(), ValueType::Float);
    }

    #[test]
    fn test_output_write_suppresses_unchanged_level() {
        let (mut channels, hw) = store();
        let led = channels.add(ChannelDef::new("LED1", ChannelKind::Output).with_gpio(2));

        assert!(channels.write(led, Value::int(5), false));
        assert!(!channels.write(led, Value::boolean(true), false));
        assert!(channels.write(led, Value::boolean(false), false));

        assert_eq!(hw.writes(), vec![(2, true), (2, false)]);
        assert_eq!(hw.mode(2), Some(PinMode::Output));
    }

    #[test]
    fn test_value_write_elision_is_opt_in() {
        let (mut channels, _) = store();
        let n = channels.add(ChannelDef::new("N", ChannelKind::Value));

        assert!(channels.write(n, Value::int(3), true));
        assert!(!channels.write(n, Value::int(3), true));
        assert!(channels.write(n, Value::int(3), false));
        assert_eq!(channels.value(n), Value::int(3));
    }

    #[test]
    fn test_value_write_coerces_to_channel_type() {
        let (mut channels, _) = store();
        let n = channels.add(ChannelDef::new("N", ChannelKind::Value));
        let t = channels.add(
            ChannelDef::new("T", ChannelKind::Value).with_value_type(ValueType::Float),
        );

        channels.write(n, Value::float(2.9), false);
        channels.write(t, Value::int(2), false);
        assert_eq!(channels.value(n), Value::int(2));
        assert_eq!(channels.value(t), Value::float(2.0));
    }

    #[test]
    fn test_input_writes_are_ignored() {
        let (mut channels, _) = store();
        let btn = channels.add(ChannelDef::new("BTN", ChannelKind::Input).with_gpio(4));
        assert!(!channels.write(btn, Value::int(1), false));
        assert_eq!(channels.value(btn), Value::int(0));
    }

    #[test]
    fn test_read_inputs_from_hardware() {
        let (mut channels, hw) = store();
        let btn = channels.add(ChannelDef::new("BTN", ChannelKind::Input).with_gpio(4));
        let pot = channels.add(ChannelDef::new("POT", ChannelKind::AnalogInput).with_gpio(34));
        hw.set_digital(4, true);
        hw.set_analog(34, 1023);

        assert_eq!(channels.read(btn), Value::int(1));
        assert_eq!(channels.read(pot), Value::int(1023));
        assert_eq!(hw.mode(4), Some(PinMode::Input));
    }

    #[test]
    fn test_poll_respects_interval() {
        let (mut channels, hw) = store();
        channels.add(
            ChannelDef::new("BTN", ChannelKind::Input)
                .with_gpio(4)
                .with_polling_interval(100),
        );

        assert_eq!(channels.poll_inputs(0), 1);
        assert_eq!(channels.poll_inputs(50), 0);
        assert_eq!(channels.poll_inputs(100), 1);
        assert_eq!(hw.read_count(), 2);
    }

    #[test]
    fn test_commit_tick_snapshots_previous() {
        let (mut channels, _) = store();
        let n = channels.add(ChannelDef::new("N", ChannelKind::Value));
        channels.write(n, Value::int(1), true);
        assert!(channels.get(n).unwrap().changed());
        channels.commit_tick();
        assert!(!channels.get(n).unwrap().changed());
        assert_eq!(channels.previous(n), Value::int(1));
    }

    #[test]
    fn test_clear_invalidates_handles() {
        let (mut channels, _) = store();
        let n = channels.add(ChannelDef::new("N", ChannelKind::Value));
        channels.write(n, Value::int(7), true);
        channels.clear();
        let fresh = channels.add(ChannelDef::new("N", ChannelKind::Value));

        assert_eq!(n.slot, fresh.slot);
        assert_ne!(n.generation, fresh.generation);
        assert!(channels.value(n).is_undefined());
        assert!(!channels.write(n, Value::int(1), false));
        assert_eq!(channels.value(fresh), Value::int(0));
    }

    #[test]
    fn test_bound_values_mirror_both_ways() {
        let (mut channels, _) = store();
        let slot = channels.user_values().add(Value::int(10));
        let n = channels.add(ChannelDef::new("N", ChannelKind::Value).with_value_index(slot));

        channels.pull_bound();
        assert_eq!(channels.value(n), Value::int(10));

        channels.write(n, Value::int(11), true);
        assert_eq!(channels.user_values().get(slot), Some(Value::int(11)));
    }

    #[test]
    fn test_status_queue_only_for_changes_on_status_channels() {
        let (mut channels, _) = store();
        let a = channels.add(ChannelDef::new("A", ChannelKind::Value).with_status(true));
        let b = channels.add(ChannelDef::new("B", ChannelKind::Value));

        channels.write(a, Value::int(1), false);
        channels.write(a, Value::int(1), false);
        channels.write(b, Value::int(1), false);

        let updates = channels.take_status_updates();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].channel_id, "A");
        assert!(channels.take_status_updates().is_empty());
    }
}
