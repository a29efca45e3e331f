//! Symbol resolution and evaluation context
//!
//! Parsers resolve identifiers to `ChannelRef` handles through a
//! `SymbolTable`; evaluators read live values through an `EvalContext`.
//! Handles are slot indices tagged with the store generation, so a handle
//! that outlives a channel-list reload resolves to `Undefined` instead of
//! pointing at a different channel.

use crate::value::Value;
use std::collections::HashMap;

/// Stable handle to a channel slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelRef {
    pub slot: u32,
    pub generation: u32,
}

impl ChannelRef {
    pub fn new(slot: u32, generation: u32) -> Self {
        Self { slot, generation }
    }
}

/// Parse-time identifier lookup
pub trait SymbolTable {
    fn lookup(&self, id: &str) -> Option<ChannelRef>;
}

/// Evaluation-time value source
pub trait EvalContext {
    /// Current value of a channel; stale or unknown handles yield `Undefined`
    fn channel_value(&self, channel: ChannelRef) -> Value;

    /// Monotonic milliseconds
    fn millis(&self) -> u64;

    /// Monotonic microseconds
    fn micros(&self) -> u64;
}

/// Symbol table with no channels
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSymbols;

impl SymbolTable for NoSymbols {
    fn lookup(&self, _id: &str) -> Option<ChannelRef> {
        None
    }
}

/// Fixed symbol table and value source, for tools and tests
#[derive(Debug, Clone, Default)]
pub struct StaticContext {
    pub(crate) names: HashMap<String, u32>,
    pub(crate) values: Vec<Value>,
    pub millis: u64,
    pub micros: u64,
}

impl StaticContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Define (or overwrite) a named value
    pub fn set(&mut self, id: impl Into<String>, value: Value) -> ChannelRef {
        let id = id.into();
        let slot = match self.names.get(&id) {
            Some(slot) => {
                self.values[*slot as usize] = value;
                *slot
            },
            None => {
                let slot = self.values.len() as u32;
                self.values.push(value);
                self.names.insert(id, slot);
                slot
            },
        };
        ChannelRef::new(slot, 0)
    }

    /// Overwrite the value behind a handle; false for unknown or stale handles
    pub fn write(&mut self, channel: ChannelRef, value: Value) -> bool {
        if channel.generation != 0 {
            return false;
        }
        match self.values.get_mut(channel.slot as usize) {
            Some(slot) => {
                *slot = value;
                true
            },
            None => false,
        }
    }

    pub fn with(mut self, id: impl Into<String>, value: Value) -> Self {
        self.set(id, value);
        self
    }
}

impl SymbolTable for StaticContext {
    fn lookup(&self, id: &str) -> Option<ChannelRef> {
        self.names.get(id).map(|slot| ChannelRef::new(*slot, 0))
    }
}

impl EvalContext for StaticContext {
    fn channel_value(&self, channel: ChannelRef) -> Value {
        if channel.generation != 0 {
            return Value::undefined();
        }
        self.values
            .get(channel.slot as usize)
            .copied()
            .unwrap_or_default()
    }

    fn millis(&self) -> u64 {
        self.millis
    }

    fn micros(&self) -> u64 {
        self.micros
    }
}
