//! Tagged scalar value
//!
//! A `Value` carries both an integer and a float representation. The type tag
//! decides which one is authoritative; the other is re-derived on every
//! construction so either accessor is always valid.

use crate::error::{CalcError, Result};
use crate::operator::Operator;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Value type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    #[default]
    Undefined,
    Byte,
    Bool,
    Int,
    Float,
    Expression,
}

impl ValueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueType::Undefined => "undefined",
            ValueType::Byte => "byte",
            ValueType::Bool => "bool",
            ValueType::Int => "int",
            ValueType::Float => "float",
            ValueType::Expression => "expression",
        }
    }
}

impl FromStr for ValueType {
    type Err = CalcError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "undefined" => Ok(ValueType::Undefined),
            "byte" => Ok(ValueType::Byte),
            "bool" | "boolean" => Ok(ValueType::Bool),
            "int" | "integer" => Ok(ValueType::Int),
            "float" | "double" => Ok(ValueType::Float),
            "expression" => Ok(ValueType::Expression),
            other => Err(CalcError::unknown_type(other)),
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tagged scalar with synchronized integer and float representations
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Value {
    int_value: i64,
    float_value: f64,
    value_type: ValueType,
}

impl Value {
    /// Undefined value: zero in both representations
    pub const UNDEFINED: Value = Value {
        int_value: 0,
        float_value: 0.0,
        value_type: ValueType::Undefined,
    };

    pub fn undefined() -> Self {
        Self::UNDEFINED
    }

    pub fn int(v: i64) -> Self {
        Self {
            int_value: v,
            float_value: v as f64,
            value_type: ValueType::Int,
        }
    }

    /// Float value; the integer side is the truncated float (saturating, NaN -> 0)
    pub fn float(v: f64) -> Self {
        Self {
            int_value: v as i64,
            float_value: v,
            value_type: ValueType::Float,
        }
    }

    pub fn boolean(v: bool) -> Self {
        let i = i64::from(v);
        Self {
            int_value: i,
            float_value: i as f64,
            value_type: ValueType::Bool,
        }
    }

    pub fn byte(v: u8) -> Self {
        Self {
            int_value: i64::from(v),
            float_value: f64::from(v),
            value_type: ValueType::Byte,
        }
    }

    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    pub fn is_undefined(&self) -> bool {
        self.value_type == ValueType::Undefined
    }

    pub fn as_int(&self) -> i64 {
        self.int_value
    }

    pub fn as_float(&self) -> f64 {
        self.float_value
    }

    pub fn as_bool(&self) -> bool {
        match self.value_type {
            ValueType::Float => self.float_value != 0.0,
            _ => self.int_value != 0,
        }
    }

    /// Truthiness used by a comparison without comparator: `value > 0`
    pub fn is_positive(&self) -> bool {
        match self.value_type {
            ValueType::Float => self.float_value > 0.0,
            _ => self.int_value > 0,
        }
    }

    /// Re-tag this value as `target`, syncing the non-authoritative side
    ///
    /// `Undefined` and `Expression` targets leave the value untouched.
    pub fn coerce(self, target: ValueType) -> Value {
        match target {
            ValueType::Int => Value::int(self.authoritative_int()),
            ValueType::Float => Value::float(self.authoritative_float()),
            ValueType::Bool => Value::boolean(self.as_bool()),
            ValueType::Byte => Value::byte(self.authoritative_int() as u8),
            ValueType::Undefined | ValueType::Expression => self,
        }
    }

    /// Edge test used by `change()`: either representation differs
    pub fn differs(&self, other: &Value) -> bool {
        self.int_value != other.int_value || self.float_value != other.float_value
    }

    pub fn logical_not(self) -> Value {
        Value::boolean(!self.as_bool())
    }

    /// Combine `self` (left) with `rhs` using `op`
    ///
    /// Float arithmetic when either side is Float, Bool for `&&`/`||`,
    /// integer arithmetic otherwise. Division, modulo and shifts that would
    /// trap degrade to zero.
    pub fn apply(self, op: Operator, rhs: Value) -> Value {
        let float_space =
            self.value_type == ValueType::Float || rhs.value_type == ValueType::Float;

        match op {
            Operator::None | Operator::Assign => rhs,
            Operator::And => Value::boolean(self.as_bool() && rhs.as_bool()),
            Operator::Or => Value::boolean(self.as_bool() || rhs.as_bool()),
            Operator::Add if float_space => Value::float(self.float_value + rhs.float_value),
            Operator::Sub if float_space => Value::float(self.float_value - rhs.float_value),
            Operator::Mul if float_space => Value::float(self.float_value * rhs.float_value),
            Operator::Div if float_space => Value::float(self.float_value / rhs.float_value),
            Operator::Mod if float_space => {
                if rhs.float_value == 0.0 {
                    Value::float(0.0)
                } else {
                    Value::float(self.float_value % rhs.float_value)
                }
            },
            Operator::Add => Value::int(self.int_value.wrapping_add(rhs.int_value)),
            Operator::Sub => Value::int(self.int_value.wrapping_sub(rhs.int_value)),
            Operator::Mul => Value::int(self.int_value.wrapping_mul(rhs.int_value)),
            Operator::Div => Value::int(self.int_value.checked_div(rhs.int_value).unwrap_or(0)),
            Operator::Mod => Value::int(self.int_value.checked_rem(rhs.int_value).unwrap_or(0)),
            Operator::Shl => Value::int(
                shift_amount(rhs.int_value)
                    .and_then(|s| self.int_value.checked_shl(s))
                    .unwrap_or(0),
            ),
            Operator::Shr => Value::int(
                shift_amount(rhs.int_value)
                    .and_then(|s| self.int_value.checked_shr(s))
                    .unwrap_or(0),
            ),
            Operator::BitAnd | Operator::BitOr => {
                let bits = if op == Operator::BitAnd {
                    self.int_value & rhs.int_value
                } else {
                    self.int_value | rhs.int_value
                };
                if self.value_type == ValueType::Bool && rhs.value_type == ValueType::Bool {
                    Value::boolean(bits != 0)
                } else {
                    Value::int(bits)
                }
            },
        }
    }

    /// Strict literal parse: `true`/`false`, decimal float, decimal or hex integer
    pub fn from_literal(text: &str) -> Result<Value> {
        let text = text.trim();
        match text {
            "true" => return Ok(Value::boolean(true)),
            "false" => return Ok(Value::boolean(false)),
            _ => {},
        }

        if text.contains('.') {
            return text
                .parse::<f64>()
                .map(Value::float)
                .map_err(|_| CalcError::invalid_literal(text));
        }

        let (negative, digits) = match text.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, text.strip_prefix('+').unwrap_or(text)),
        };
        let parsed = match digits
            .strip_prefix("0x")
            .or_else(|| digits.strip_prefix("0X"))
        {
            Some(hex) => i64::from_str_radix(hex, 16),
            None => digits.parse::<i64>(),
        };
        parsed
            .ok()
            .and_then(|v| if negative { v.checked_neg() } else { Some(v) })
            .map(Value::int)
            .ok_or_else(|| CalcError::invalid_literal(text))
    }

    fn authoritative_int(&self) -> i64 {
        match self.value_type {
            ValueType::Float => self.float_value as i64,
            _ => self.int_value,
        }
    }

    fn authoritative_float(&self) -> f64 {
        match self.value_type {
            ValueType::Float => self.float_value,
            _ => self.int_value as f64,
        }
    }
}

fn shift_amount(v: i64) -> Option<u32> {
    u32::try_from(v).ok().filter(|s| *s < 64)
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value_type {
            ValueType::Bool => write!(f, "{}", self.int_value != 0),
            ValueType::Float => write!(f, "{}", self.float_value),
            _ => write!(f, "{}", self.int_value),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::boolean(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::float(v)
    }
}
