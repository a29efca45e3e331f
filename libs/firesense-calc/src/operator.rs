//! Expression and assignment operators

use serde::{Deserialize, Serialize};
use std::fmt;

/// Operator joining an expression node to its next sibling
///
/// Also used as the compound part of an assignment (`+=` is `Add`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Operator {
    /// Last node of a list
    #[default]
    None,
    /// Plain assignment `=`
    Assign,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Shl,
    Shr,
    BitAnd,
    BitOr,
    And,
    Or,
}

impl Operator {
    pub fn symbol(&self) -> &'static str {
        match self {
            Operator::None => "",
            Operator::Assign => "=",
            Operator::Add => "+",
            Operator::Sub => "-",
            Operator::Mul => "*",
            Operator::Div => "/",
            Operator::Mod => "%",
            Operator::Shl => "<<",
            Operator::Shr => ">>",
            Operator::BitAnd => "&",
            Operator::BitOr => "|",
            Operator::And => "&&",
            Operator::Or => "||",
        }
    }

    /// `+` and `-` close the running group during evaluation
    pub fn is_additive(&self) -> bool {
        matches!(self, Operator::Add | Operator::Sub)
    }

    /// Lex an expression operator at the start of `s`
    ///
    /// Returns the operator and its byte length. A lone `<` or `>` is not an
    /// expression operator; comparisons belong to the condition grammar.
    pub fn lex(s: &str) -> Option<(Operator, usize)> {
        let bytes = s.as_bytes();
        let first = *bytes.first()?;
        let second = bytes.get(1).copied();

        match (first, second) {
            (b'<', Some(b'<')) => Some((Operator::Shl, 2)),
            (b'>', Some(b'>')) => Some((Operator::Shr, 2)),
            (b'&', Some(b'&')) => Some((Operator::And, 2)),
            (b'|', Some(b'|')) => Some((Operator::Or, 2)),
            (b'+', _) => Some((Operator::Add, 1)),
            (b'-', _) => Some((Operator::Sub, 1)),
            (b'*', _) => Some((Operator::Mul, 1)),
            (b'/', _) => Some((Operator::Div, 1)),
            (b'%', _) => Some((Operator::Mod, 1)),
            (b'&', _) => Some((Operator::BitAnd, 1)),
            (b'|', _) => Some((Operator::BitOr, 1)),
            _ => None,
        }
    }

    /// Map an assignment token (`=`, `+=`, `<<=`, ...) to its operator
    pub fn from_assignment(token: &str) -> Option<Operator> {
        match token {
            "=" => Some(Operator::Assign),
            "+=" => Some(Operator::Add),
            "-=" => Some(Operator::Sub),
            "*=" => Some(Operator::Mul),
            "/=" => Some(Operator::Div),
            "%=" => Some(Operator::Mod),
            "<<=" => Some(Operator::Shl),
            ">>=" => Some(Operator::Shr),
            "&=" => Some(Operator::BitAnd),
            "|=" => Some(Operator::BitOr),
            _ => None,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lex_prefers_two_char_operators() {
        assert_eq!(Operator::lex("&& B"), Some((Operator::And, 2)));
        assert_eq!(Operator::lex("& B"), Some((Operator::BitAnd, 1)));
        assert_eq!(Operator::lex("|| B"), Some((Operator::Or, 2)));
        assert_eq!(Operator::lex("<< 2"), Some((Operator::Shl, 2)));
        assert_eq!(Operator::lex(">> 2"), Some((Operator::Shr, 2)));
    }

    #[test]
    fn test_lone_angle_bracket_is_not_an_operator() {
        assert_eq!(Operator::lex("< 3"), None);
        assert_eq!(Operator::lex("> 3"), None);
        assert_eq!(Operator::lex(""), None);
    }

    #[test]
    fn test_assignment_tokens() {
        assert_eq!(Operator::from_assignment("="), Some(Operator::Assign));
        assert_eq!(Operator::from_assignment("<<="), Some(Operator::Shl));
        assert_eq!(Operator::from_assignment("|="), Some(Operator::BitOr));
        assert_eq!(Operator::from_assignment("=="), None);
    }
}
