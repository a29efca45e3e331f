//! Expression parser and evaluator
//!
//! An expression is a flat list of nodes, each carrying the operator that
//! joins it to the next sibling. Parenthesised groups nest as sub-lists.
//!
//! Evaluation walks the list left to right with a running accumulator:
//! - `* / % << >> & | && ||` are applied to the accumulator immediately
//! - `+` and `-` push the accumulator onto a pending list and start a new one
//! - pending groups are folded left to right with their `+`/`-` operators
//!
//! So `10 - 2 * 3` evaluates as `[10] - [2 * 3]` = 4, and `2 * 3 + 4` as
//! `[6] + [4]` = 10. There is no other precedence.

use crate::context::{ChannelRef, EvalContext, SymbolTable};
use crate::lexer::{group_body, strip_not, top_level_indices};
use crate::operator::Operator;
use crate::value::Value;

/// Resolved leaf operand
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Channel(ChannelRef),
    Literal(Value),
    Millis,
    Micros,
    /// Text that matched nothing; evaluates to `Undefined`
    Unresolved(String),
}

impl Operand {
    /// Resolve leaf text: channel id, `true`/`false`, `millis`/`micros`, numeric literal
    pub fn resolve(text: &str, symbols: &dyn SymbolTable) -> Operand {
        let text = text.trim();
        if let Some(channel) = symbols.lookup(text) {
            return Operand::Channel(channel);
        }
        match text {
            "millis" => Operand::Millis,
            "micros" => Operand::Micros,
            _ => match Value::from_literal(text) {
                Ok(v) => Operand::Literal(v),
                Err(_) => {
                    if !text.is_empty() {
                        tracing::debug!("Unresolved operand '{}'", text);
                    }
                    Operand::Unresolved(text.to_string())
                },
            },
        }
    }

    pub fn value(&self, ctx: &dyn EvalContext) -> Value {
        match self {
            Operand::Channel(channel) => ctx.channel_value(*channel),
            Operand::Literal(v) => *v,
            Operand::Millis => Value::int(ctx.millis() as i64),
            Operand::Micros => Value::int(ctx.micros() as i64),
            Operand::Unresolved(_) => Value::undefined(),
        }
    }
}

/// Node payload
#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Leaf(Operand),
    Group(Vec<ExprNode>),
}

/// One node of an expression list
#[derive(Debug, Clone, PartialEq)]
pub struct ExprNode {
    pub kind: ExprKind,
    /// Logical negation of this node's result
    pub not: bool,
    /// Operator joining this node to the next sibling
    pub next: Operator,
}

/// Parsed expression
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Expression {
    pub nodes: Vec<ExprNode>,
}

impl Expression {
    /// Parse expression text; never fails, unknown operands become `Unresolved`
    pub fn parse(text: &str, symbols: &dyn SymbolTable) -> Self {
        Self {
            nodes: parse_list(text, symbols),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The channel when the expression is a single plain channel reference
    pub fn single_channel(&self) -> Option<ChannelRef> {
        match self.nodes.as_slice() {
            [ExprNode {
                kind: ExprKind::Leaf(Operand::Channel(channel)),
                not: false,
                ..
            }] => Some(*channel),
            _ => None,
        }
    }

    pub fn evaluate(&self, ctx: &dyn EvalContext) -> Value {
        evaluate_list(&self.nodes, ctx)
    }
}

fn parse_list(text: &str, symbols: &dyn SymbolTable) -> Vec<ExprNode> {
    let mut nodes = Vec::new();
    let mut start = 0;
    let mut resume = 0;

    for i in top_level_indices(text) {
        if i < resume {
            continue;
        }
        let Some((op, len)) = Operator::lex(&text[i..]) else {
            continue;
        };
        let term = text[start..i].trim();
        if term.is_empty() && op.is_additive() {
            // Sign of a literal, e.g. `-2` or `3 * -2`
            continue;
        }
        nodes.push(parse_term(term, op, symbols));
        start = i + len;
        resume = start;
    }

    let tail = text[start..].trim();
    if !tail.is_empty() || !nodes.is_empty() {
        nodes.push(parse_term(tail, Operator::None, symbols));
    }
    nodes
}

fn parse_term(term: &str, next: Operator, symbols: &dyn SymbolTable) -> ExprNode {
    let (not, body) = strip_not(term);
    let kind = match group_body(body) {
        Some(inner) => ExprKind::Group(parse_list(inner, symbols)),
        None => ExprKind::Leaf(Operand::resolve(body, symbols)),
    };
    ExprNode { kind, not, next }
}

fn evaluate_node(node: &ExprNode, ctx: &dyn EvalContext) -> Value {
    let value = match &node.kind {
        ExprKind::Leaf(operand) => operand.value(ctx),
        ExprKind::Group(nodes) => evaluate_list(nodes, ctx),
    };
    if node.not {
        value.logical_not()
    } else {
        value
    }
}

fn evaluate_list(nodes: &[ExprNode], ctx: &dyn EvalContext) -> Value {
    let mut pending: Vec<(Value, Operator)> = Vec::new();
    let mut acc = Value::undefined();

    for (i, node) in nodes.iter().enumerate() {
        let value = evaluate_node(node, ctx);
        if i == 0 {
            acc = value;
            continue;
        }
        let op = nodes[i - 1].next;
        if op.is_additive() {
            pending.push((acc, op));
            acc = value;
        } else {
            acc = acc.apply(op, value);
        }
    }

    if pending.is_empty() {
        return acc;
    }

    pending.push((acc, Operator::None));
    let mut result = pending[0].0;
    for pair in pending.windows(2) {
        result = result.apply(pair[0].1, pair[1].0);
    }
    result
}
