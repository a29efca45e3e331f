//! firesense-calc - Value and expression library for FireSense rules
//!
//! Provides the tagged scalar used by every channel and the precedence-free
//! expression engine used by conditions and statements.
//!
//! # Features
//!
//! - **Tagged values**: one integer and one float representation kept in sync,
//!   with the type tag deciding which one is authoritative
//! - **Expression trees**: flat node lists with a trailing operator per node,
//!   nesting only on parenthesised groups
//! - **Total evaluation**: unresolvable operands degrade to `Undefined` (zero)
//!   instead of raising errors
//!
//! # Example
//!
//! ```rust
//! use firesense_calc::{Expression, NoSymbols, StaticContext};
//!
//! let expr = Expression::parse("10 - 2 * 3", &NoSymbols);
//! let value = expr.evaluate(&StaticContext::default());
//! assert_eq!(value.as_int(), 4);
//! ```
//!
//! # Operators
//!
//! | Operator | Meaning | Grouping |
//! |----------|---------|----------|
//! | `+` `-` | add, subtract | closes the running group |
//! | `*` `/` `%` | multiply, divide, modulo | applied to the running group |
//! | `<<` `>>` | shifts | applied to the running group |
//! | `&` `\|` | bitwise and/or | applied to the running group |
//! | `&&` `\|\|` | logical and/or | applied to the running group |

pub mod context;
pub mod error;
pub mod expression;
pub mod lexer;
pub mod operator;
pub mod value;

// Re-exports for convenience
pub use context::{ChannelRef, EvalContext, NoSymbols, StaticContext, SymbolTable};
pub use error::{CalcError, Result};
pub use expression::{ExprKind, ExprNode, Expression, Operand};
pub use operator::Operator;
pub use value::{Value, ValueType};
