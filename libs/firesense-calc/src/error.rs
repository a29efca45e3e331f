//! Error types for firesense-calc

use thiserror::Error;

/// Calculation errors
///
/// Only strict literal parsing reports errors; expression parsing and
/// evaluation degrade to `Undefined` values instead.
#[derive(Debug, Error)]
pub enum CalcError {
    #[error("Invalid literal: {0}")]
    InvalidLiteral(String),

    #[error("Unknown value type: {0}")]
    UnknownType(String),
}

impl CalcError {
    pub fn invalid_literal(msg: impl Into<String>) -> Self {
        Self::InvalidLiteral(msg.into())
    }

    pub fn unknown_type(msg: impl Into<String>) -> Self {
        Self::UnknownType(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, CalcError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_literal_error() {
        let err = CalcError::invalid_literal("abc");
        assert_eq!(err.to_string(), "Invalid literal: abc");
    }

    #[test]
    fn test_unknown_type_error() {
        let err = CalcError::unknown_type("string");
        assert_eq!(err.to_string(), "Unknown value type: string");
    }
}
