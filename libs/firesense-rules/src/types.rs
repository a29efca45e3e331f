//! Persisted definition types
//!
//! - ChannelDef: one I/O channel as stored under `config/devices/{id}/channels`
//! - RuleDef: one IF/THEN/ELSE triple as stored under `config/devices/{id}/conditions`
//!
//! Rule text is kept verbatim; the parsed trees live in `Rule` and are never
//! serialized back.

use firesense_calc::{Value, ValueType};
use serde::{Deserialize, Serialize};

/// Channel kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChannelKind {
    /// Digital input pin
    Input,
    /// Digital output pin
    Output,
    /// Analog input pin
    #[serde(alias = "analog_input", alias = "analog")]
    AnalogInput,
    /// In-memory variable, optionally bound to a user value slot
    Value,
}

impl ChannelKind {
    pub fn is_input(&self) -> bool {
        matches!(self, ChannelKind::Input | ChannelKind::AnalogInput)
    }

    pub fn has_pin(&self) -> bool {
        !matches!(self, ChannelKind::Value)
    }
}

/// Channel definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelDef {
    /// Unique id within the device; rule text refers to channels by this id
    #[serde(default)]
    pub id: String,

    /// Random display id, assigned when empty
    #[serde(default)]
    pub uid: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub location: String,

    #[serde(rename = "type")]
    pub kind: ChannelKind,

    /// GPIO pin for Input/Output/AnalogInput
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpio: Option<u32>,

    /// Storage type of a `Value` channel: `int` (default) or `float`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_type: Option<ValueType>,

    /// Bound user value slot, `-1` when unbound
    #[serde(default = "unbound")]
    pub value_index: i32,

    /// Publish value changes to the status tree
    #[serde(default)]
    pub status: bool,

    /// Include in periodic log snapshots
    #[serde(default)]
    pub log: bool,

    /// Minimum interval between hardware reads for inputs
    #[serde(default)]
    pub polling_interval_ms: u64,
}

fn unbound() -> i32 {
    -1
}

impl ChannelDef {
    pub fn new(id: impl Into<String>, kind: ChannelKind) -> Self {
        Self {
            id: id.into(),
            uid: String::new(),
            name: String::new(),
            location: String::new(),
            kind,
            gpio: None,
            value_type: None,
            value_index: -1,
            status: false,
            log: false,
            polling_interval_ms: 0,
        }
    }

    pub fn with_gpio(mut self, gpio: u32) -> Self {
        self.gpio = Some(gpio);
        self
    }

    pub fn with_value_type(mut self, value_type: ValueType) -> Self {
        self.value_type = Some(value_type);
        self
    }

    /// Indexes past `i32::MAX` leave the channel unbound
    pub fn with_value_index(mut self, index: usize) -> Self {
        self.value_index = i32::try_from(index).unwrap_or(-1);
        self
    }

    pub fn with_status(mut self, status: bool) -> Self {
        self.status = status;
        self
    }

    pub fn with_log(mut self, log: bool) -> Self {
        self.log = log;
        self
    }

    pub fn with_polling_interval(mut self, ms: u64) -> Self {
        self.polling_interval_ms = ms;
        self
    }

    /// Storage type fixed for the channel's lifetime
    ///
    /// Output is bool, inputs are int, Value channels are int unless
    /// declared float.
    pub fn storage_type(&self) -> ValueType {
        match self.kind {
            ChannelKind::Output => ValueType::Bool,
            ChannelKind::Input | ChannelKind::AnalogInput => ValueType::Int,
            ChannelKind::Value => match self.value_type {
                Some(ValueType::Float) => ValueType::Float,
                _ => ValueType::Int,
            },
        }
    }

    /// Bound slot index when `value_index >= 0`
    pub fn bound_index(&self) -> Option<usize> {
        usize::try_from(self.value_index).ok()
    }
}

/// One IF/THEN/ELSE triple, stored verbatim
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RuleDef {
    #[serde(rename = "IF", alias = "if")]
    pub condition: String,

    #[serde(rename = "THEN", alias = "then", default)]
    pub then: String,

    #[serde(rename = "ELSE", alias = "else", default)]
    pub otherwise: String,
}

impl RuleDef {
    pub fn new(
        condition: impl Into<String>,
        then: impl Into<String>,
        otherwise: impl Into<String>,
    ) -> Self {
        Self {
            condition: condition.into(),
            then: then.into(),
            otherwise: otherwise.into(),
        }
    }
}

/// JSON rendering of a channel value for status and log payloads
pub fn value_to_json(value: Value) -> serde_json::Value {
    match value.value_type() {
        ValueType::Undefined | ValueType::Expression => serde_json::Value::Null,
        ValueType::Bool => serde_json::Value::Bool(value.as_bool()),
        ValueType::Float => serde_json::Number::from_f64(value.as_float())
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        ValueType::Int | ValueType::Byte => serde_json::Value::from(value.as_int()),
    }
}
