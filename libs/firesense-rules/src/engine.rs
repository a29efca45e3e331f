//! Rule Engine - synchronous per-tick core
//!
//! Owns the channel store, the rule list and the callback table. One call to
//! `tick()`:
//! 1. Pulls bound user values into their channels and polls due inputs
//! 2. For every rule in list order: evaluates the condition, resets the
//!    inactive branch and executes the active one
//! 3. Commits the previous-value snapshot exactly once
//!
//! `tick()` is total: bad rule text degrades to `Undefined`/false and never
//! stops the loop. The engine is not internally synchronized; the scheduler
//! serializes access behind one mutex.

use crate::channel::{Channel, ChannelStore, StatusUpdate, UserValues};
use crate::condition::ConditionContext;
use crate::error::{Result, RuleError};
use crate::hardware::Hardware;
use crate::rule::Rule;
use crate::statement::ExecContext;
use crate::types::{ChannelDef, RuleDef};
use chrono::{DateTime, NaiveDateTime};
use firesense_calc::{ChannelRef, EvalContext, Value};
use firesense_store::Clock;
use std::sync::Arc;
use tracing::{debug, info};

/// Callback invoked by `func(index, ...)` statements
pub type Callback = Box<dyn FnMut(&str) + Send>;

/// Summary of one tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub rules_evaluated: usize,
    pub then_branches: usize,
    pub else_branches: usize,
    pub inputs_polled: usize,
}

/// Read-only view used while evaluating conditions
struct TickContext<'a> {
    channels: &'a ChannelStore,
    millis: u64,
    micros: u64,
    local_time: NaiveDateTime,
}

impl EvalContext for TickContext<'_> {
    fn channel_value(&self, channel: ChannelRef) -> Value {
        self.channels.value(channel)
    }

    fn millis(&self) -> u64 {
        self.millis
    }

    fn micros(&self) -> u64 {
        self.micros
    }
}

impl ConditionContext for TickContext<'_> {
    fn previous_value(&self, channel: ChannelRef) -> Value {
        self.channels.previous(channel)
    }

    fn local_time(&self) -> NaiveDateTime {
        self.local_time
    }
}

/// Mutable view used while executing statements
struct ExecState<'a> {
    channels: &'a mut ChannelStore,
    callbacks: &'a mut [Callback],
    millis: u64,
    micros: u64,
}

impl EvalContext for ExecState<'_> {
    fn channel_value(&self, channel: ChannelRef) -> Value {
        self.channels.value(channel)
    }

    fn millis(&self) -> u64 {
        self.millis
    }

    fn micros(&self) -> u64 {
        self.micros
    }
}

impl ExecContext for ExecState<'_> {
    fn write_channel(&mut self, channel: ChannelRef, value: Value, elide_unchanged: bool) -> bool {
        self.channels.write(channel, value, elide_unchanged)
    }

    fn invoke(&mut self, index: usize, payload: &str) {
        match self.callbacks.get_mut(index) {
            Some(callback) => callback(payload),
            None => debug!("func({}) has no registered callback", index),
        }
    }

    fn value_of(&self, id: &str) -> Option<Value> {
        self.channels.by_id(id).map(Channel::current)
    }
}

/// Channel store + rules + callbacks + clock
pub struct Engine {
    channels: ChannelStore,
    rules: Vec<Rule>,
    callbacks: Vec<Callback>,
    clock: Arc<dyn Clock>,
    utc_offset_secs: i64,
    enabled: bool,
    ticks: u64,
}

impl Engine {
    pub fn new(hardware: Arc<dyn Hardware>, clock: Arc<dyn Clock>) -> Self {
        Self {
            channels: ChannelStore::new(hardware, UserValues::new()),
            rules: Vec::new(),
            callbacks: Vec::new(),
            clock,
            utc_offset_secs: 0,
            enabled: true,
            ticks: 0,
        }
    }

    /// Fixed offset applied to calendar fields in conditions
    pub fn with_utc_offset(mut self, secs: i64) -> Self {
        self.utc_offset_secs = secs;
        self
    }

    // ========== Programmatic API ==========

    pub fn add_channel(&mut self, def: ChannelDef) -> ChannelRef {
        self.channels.add(def)
    }

    /// Add a rule from its three texts; returns its index
    pub fn add_rule(
        &mut self,
        condition: impl Into<String>,
        then: impl Into<String>,
        otherwise: impl Into<String>,
    ) -> usize {
        self.add_rule_def(RuleDef::new(condition, then, otherwise))
    }

    pub fn add_rule_def(&mut self, def: RuleDef) -> usize {
        debug!("Add rule IF '{}'", def.condition);
        self.rules.push(Rule::parse(def, &self.channels));
        self.rules.len() - 1
    }

    /// Register a callback for `func(index, ...)`; returns its index
    pub fn add_callback<F>(&mut self, callback: F) -> usize
    where
        F: FnMut(&str) + Send + 'static,
    {
        self.callbacks.push(Box::new(callback));
        self.callbacks.len() - 1
    }

    /// Add a user value slot that `Value` channels can bind to via `value_index`
    pub fn add_user_value(&mut self, value: Value) -> usize {
        self.channels.user_values().add(value)
    }

    /// Shared handle to the user value table
    pub fn user_values(&self) -> UserValues {
        self.channels.user_values().clone()
    }

    /// Drop all channels; outstanding rule references degrade to `Undefined`
    pub fn clear_channels(&mut self) {
        self.channels.clear();
    }

    pub fn clear_rules(&mut self) {
        self.rules.clear();
    }

    /// Replace the channel list and re-resolve every rule against it
    pub fn load_channels(&mut self, defs: Vec<ChannelDef>) {
        self.channels.clear();
        for def in defs {
            self.channels.add(def);
        }
        self.reparse_rules();
        info!("Loaded {} channels", self.channels.len());
    }

    /// Replace the rule list
    pub fn load_rules(&mut self, defs: Vec<RuleDef>) {
        self.rules.clear();
        for def in defs {
            self.add_rule_def(def);
        }
        info!("Loaded {} rules", self.rules.len());
    }

    /// Replace the rule at `index` or append when `index` is the rule count
    pub fn put_rule(&mut self, index: usize, def: RuleDef) -> Result<()> {
        match index.cmp(&self.rules.len()) {
            std::cmp::Ordering::Less => {
                self.rules[index] = Rule::parse(def, &self.channels);
                Ok(())
            },
            std::cmp::Ordering::Equal => {
                self.add_rule_def(def);
                Ok(())
            },
            std::cmp::Ordering::Greater => Err(RuleError::InvalidFormat(format!(
                "rule index {} out of range (have {})",
                index,
                self.rules.len()
            ))),
        }
    }

    pub fn reparse_rules(&mut self) {
        for rule in &mut self.rules {
            rule.reparse(&self.channels);
        }
    }

    pub fn channel(&self, id: &str) -> Option<&Channel> {
        self.channels.by_id(id)
    }

    /// Cached current value of a channel
    pub fn channel_value(&self, id: &str) -> Option<Value> {
        self.channels.by_id(id).map(Channel::current)
    }

    /// Current value, re-read from hardware for inputs
    pub fn read_channel(&mut self, id: &str) -> Option<Value> {
        let channel = self.channels.find(id)?;
        Some(self.channels.read(channel))
    }

    /// Write a channel by id with the same rules as a statement write
    pub fn set_channel_value(&mut self, id: &str, value: Value) -> Result<bool> {
        let channel = self
            .channels
            .find(id)
            .ok_or_else(|| RuleError::ChannelNotFound(id.to_string()))?;
        Ok(self.channels.write(channel, value, false))
    }

    pub fn channels(&self) -> &ChannelStore {
        &self.channels
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn rule_defs(&self) -> Vec<RuleDef> {
        self.rules.iter().map(|r| r.def.clone()).collect()
    }

    /// Rule evaluation on/off; inputs are still polled while off
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn take_status_updates(&mut self) -> Vec<StatusUpdate> {
        self.channels.take_status_updates()
    }

    pub fn now_epoch_seconds(&self) -> i64 {
        self.clock.now_epoch_seconds()
    }

    /// Wall-clock time shifted by the configured offset
    pub fn local_time(&self) -> NaiveDateTime {
        DateTime::from_timestamp(self.clock.now_epoch_seconds() + self.utc_offset_secs, 0)
            .map(|t| t.naive_utc())
            .unwrap_or_default()
    }

    // ========== Tick ==========

    /// Run one scheduler tick
    pub fn tick(&mut self) -> TickReport {
        let millis = self.clock.monotonic_millis();
        let micros = self.clock.monotonic_micros();
        let local_time = self.local_time();
        let mut report = TickReport::default();

        self.channels.pull_bound();
        report.inputs_polled = self.channels.poll_inputs(millis);

        if self.enabled {
            for (index, rule) in self.rules.iter_mut().enumerate() {
                let ctx = TickContext {
                    channels: &self.channels,
                    millis,
                    micros,
                    local_time,
                };
                let result = rule.condition.evaluate(&ctx);
                if result != rule.last_result {
                    debug!("Rule {} '{}' -> {}", index, rule.def.condition, result);
                }
                rule.last_result = result;

                let mut exec = ExecState {
                    channels: &mut self.channels,
                    callbacks: &mut self.callbacks,
                    millis,
                    micros,
                };
                if result {
                    rule.else_branch.reset();
                    rule.then_branch.execute(&mut exec);
                    report.then_branches += 1;
                } else {
                    rule.then_branch.reset();
                    rule.else_branch.execute(&mut exec);
                    report.else_branches += 1;
                }
                report.rules_evaluated += 1;
            }
        }

        self.channels.commit_tick();
        self.ticks += 1;
        report
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::hardware::SimulatedHardware;
    use crate::types::ChannelKind;
    use firesense_store::ManualClock;

    fn engine() -> (Engine, Arc<SimulatedHardware>, Arc<ManualClock>) {
        let hw = Arc::new(SimulatedHardware::new());
        // 2024-03-15 14:30:15 UTC
        let clock = Arc::new(ManualClock::new(1_710_513_015));
        (Engine::new(hw.clone(), clock.clone()), hw, clock)
    }

    #[test]
    fn test_then_and_else_branches() {
        let (mut engine, hw, _) = engine();
        engine.add_channel(ChannelDef::new("BTN", ChannelKind::Input).with_gpio(4));
        engine.add_channel(ChannelDef::new("LED", ChannelKind::Output).with_gpio(2));
        engine.add_rule("BTN == 1", "LED = true", "LED = false");

        let report = engine.tick();
        assert_eq!(report.else_branches, 1);
        assert_eq!(engine.channel_value("LED"), Some(Value::boolean(false)));

        hw.set_digital(4, true);
        let report = engine.tick();
        assert_eq!(report.then_branches, 1);
        assert!(hw.level(2));
    }

    #[test]
    fn test_later_rule_sees_earlier_write_in_same_tick() {
        let (mut engine, _, _) = engine();
        engine.add_channel(ChannelDef::new("A", ChannelKind::Value));
        engine.add_channel(ChannelDef::new("B", ChannelKind::Value));
        engine.add_rule("A == 0", "A = 1", "");
        engine.add_rule("A == 1", "B = 1", "");

        engine.tick();
        assert_eq!(engine.channel_value("B"), Some(Value::int(1)));
    }

    #[test]
    fn test_change_is_not_consumed_by_earlier_rule() {
        let (mut engine, _, _) = engine();
        engine.add_channel(ChannelDef::new("A", ChannelKind::Value));
        engine.add_channel(ChannelDef::new("HITS", ChannelKind::Value));
        engine.add_rule("change(A)", "HITS += 1", "");
        engine.add_rule("change(A)", "HITS += 1", "");

        engine.set_channel_value("A", Value::int(5)).unwrap();
        engine.tick();
        assert_eq!(engine.channel_value("HITS"), Some(Value::int(2)));

        // Edge committed: no further hits
        engine.tick();
        assert_eq!(engine.channel_value("HITS"), Some(Value::int(2)));
    }

    #[test]
    fn test_disabled_engine_skips_rules_but_commits() {
        let (mut engine, _, _) = engine();
        engine.add_channel(ChannelDef::new("A", ChannelKind::Value));
        engine.add_rule("change(A)", "A = 100", "");
        engine.set_enabled(false);

        engine.set_channel_value("A", Value::int(1)).unwrap();
        let report = engine.tick();
        assert_eq!(report.rules_evaluated, 0);
        assert_eq!(engine.channel_value("A"), Some(Value::int(1)));
        assert!(!engine.channel("A").unwrap().changed());
    }

    #[test]
    fn test_callbacks() {
        let (mut engine, _, _) = engine();
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = seen.clone();
        let index = engine.add_callback(move |payload| sink.lock().push(payload.to_string()));
        assert_eq!(index, 0);

        engine.add_channel(ChannelDef::new("T", ChannelKind::Value));
        engine.set_channel_value("T", Value::int(42)).unwrap();
        engine.add_rule("T > 40", "func(0,2,'hot {T}'), func(7,1,'nobody')", "");
        for _ in 0..3 {
            engine.tick();
        }
        assert_eq!(*seen.lock(), vec!["hot 42".to_string(), "hot 42".to_string()]);
    }

    #[test]
    fn test_bound_user_value_drives_condition() {
        let (mut engine, _, _) = engine();
        let slot = engine.add_user_value(Value::int(0));
        engine.add_channel(ChannelDef::new("MODE", ChannelKind::Value).with_value_index(slot));
        engine.add_channel(ChannelDef::new("OUT", ChannelKind::Value));
        engine.add_rule("MODE == 2", "OUT = 1", "OUT = 0");

        engine.tick();
        assert_eq!(engine.channel_value("OUT"), Some(Value::int(0)));

        engine.user_values().set(slot, Value::int(2));
        engine.tick();
        assert_eq!(engine.channel_value("OUT"), Some(Value::int(1)));
    }

    #[test]
    fn test_reload_channels_reresolves_rules() {
        let (mut engine, _, _) = engine();
        engine.add_rule("X == 0", "Y = 5", "");
        engine.tick();

        engine.load_channels(vec![
            ChannelDef::new("X", ChannelKind::Value),
            ChannelDef::new("Y", ChannelKind::Value),
        ]);
        engine.tick();
        assert_eq!(engine.channel_value("Y"), Some(Value::int(5)));
    }

    #[test]
    fn test_cleared_channels_degrade_rules() {
        let (mut engine, _, _) = engine();
        engine.add_channel(ChannelDef::new("X", ChannelKind::Value));
        engine.add_rule("X == 0", "X = 1", "");
        engine.clear_channels();
        engine.add_channel(ChannelDef::new("X", ChannelKind::Value));

        // Stale handles: condition reads Undefined (0) but the write is dropped
        engine.tick();
        assert_eq!(engine.channel_value("X"), Some(Value::int(0)));
    }

    #[test]
    fn test_put_rule_replaces_or_appends() {
        let (mut engine, _, _) = engine();
        engine.add_rule("A == 1", "", "");
        engine.put_rule(0, RuleDef::new("A == 2", "", "")).unwrap();
        engine.put_rule(1, RuleDef::new("A == 3", "", "")).unwrap();
        assert!(engine.put_rule(5, RuleDef::default()).is_err());

        let conditions: Vec<String> = engine.rule_defs().into_iter().map(|d| d.condition).collect();
        assert_eq!(conditions, vec!["A == 2", "A == 3"]);
    }

    #[test]
    fn test_set_unknown_channel_fails() {
        let (mut engine, _, _) = engine();
        let err = engine.set_channel_value("NOPE", Value::int(1)).unwrap_err();
        assert!(matches!(err, RuleError::ChannelNotFound(_)));
    }

    #[test]
    fn test_utc_offset_shifts_calendar_fields() {
        let (engine, _, _) = engine();
        let mut engine = engine.with_utc_offset(3 * 3600);
        engine.add_channel(ChannelDef::new("EVENING", ChannelKind::Value));
        engine.add_rule("hour == 17", "EVENING = 1", "EVENING = 0");
        engine.tick();
        assert_eq!(engine.channel_value("EVENING"), Some(Value::int(1)));
    }
}
