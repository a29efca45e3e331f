//! Statement parser and executor
//!
//! THEN/ELSE text is a comma-separated list of statements (commas inside
//! parentheses or single quotes do not split):
//!
//! - `delay(ms)`: non-blocking wait. While pending, the rest of the branch is
//!   skipped; once elapsed it stays done until the branch is reset
//! - `func(index, max, 'payload')`: invoke callback `index` with the payload,
//!   at most `max` times while the branch stays active. `{channelId}` markers
//!   are replaced by live values and `\n` by a newline
//! - `CHANNEL op expr` with `op` one of `= += -= *= /= %= <<= >>= &= |=`
//!
//! Parsing never fails. Text that is none of the above becomes an inert
//! statement.

use firesense_calc::lexer::{group_body, split_top_level, top_level_indices, unquote};
use firesense_calc::{ChannelRef, EvalContext, Expression, Operator, SymbolTable, Value};
use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

static PLACEHOLDER: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\{([A-Za-z0-9_.\-]+)\}").ok());

/// Execution context for statements
pub trait ExecContext: EvalContext {
    /// Write a channel; `elide_unchanged` skips writes of an equal value
    fn write_channel(&mut self, channel: ChannelRef, value: Value, elide_unchanged: bool)
        -> bool;

    /// Invoke the registered callback at `index`
    fn invoke(&mut self, index: usize, payload: &str);

    /// Current value of a channel by id, for payload interpolation
    fn value_of(&self, id: &str) -> Option<Value>;
}

/// Outcome of polling a delay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelayPoll {
    Pending,
    /// Elapsed on this poll
    Elapsed,
    /// Elapsed on an earlier poll
    Done,
}

/// One-shot countdown that spans ticks
#[derive(Debug, Clone, PartialEq)]
pub struct DelayTimer {
    duration: Expression,
    started: bool,
    start_ms: u64,
    timeout_ms: u64,
    done: bool,
}

impl DelayTimer {
    pub fn new(duration: Expression) -> Self {
        Self {
            duration,
            started: false,
            start_ms: 0,
            timeout_ms: 0,
            done: false,
        }
    }

    /// Arm on first poll, then report expiry
    pub fn poll(&mut self, ctx: &dyn EvalContext) -> DelayPoll {
        if self.done {
            return DelayPoll::Done;
        }
        let now = ctx.millis();
        if !self.started {
            self.started = true;
            self.start_ms = now;
            self.timeout_ms = self.duration.evaluate(ctx).as_int().max(0) as u64;
        }
        if now.saturating_sub(self.start_ms) >= self.timeout_ms {
            self.done = true;
            DelayPoll::Elapsed
        } else {
            DelayPoll::Pending
        }
    }

    pub fn reset(&mut self) {
        self.started = false;
        self.done = false;
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn is_done(&self) -> bool {
        self.done
    }
}

/// Bounded callback invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FuncCall {
    pub index: usize,
    pub max_iterations: u32,
    pub iterations: u32,
    pub payload: String,
}

impl FuncCall {
    fn parse(args: &str) -> Self {
        let parts = split_top_level(args, b',');
        let index = parts
            .first()
            .and_then(|p| p.parse::<usize>().ok())
            .unwrap_or(0);
        let max_iterations = parts
            .get(1)
            .and_then(|p| p.parse::<u32>().ok())
            .unwrap_or(1);
        let payload = parts.get(2).map(|p| unquote(p)).unwrap_or_default();
        Self {
            index,
            max_iterations,
            iterations: 0,
            payload: payload.to_string(),
        }
    }
}

/// Statement payload
#[derive(Debug, Clone, PartialEq)]
pub enum StatementKind {
    Delay(DelayTimer),
    Func(FuncCall),
    Assign {
        /// `None` when the left side is not a channel
        target: Option<ChannelRef>,
        op: Operator,
        source: Expression,
    },
    /// Unrecognised text; executes as a no-op
    Inert,
}

/// One parsed statement with its source text
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub text: String,
    pub kind: StatementKind,
}

impl Statement {
    pub fn parse(text: &str, symbols: &dyn SymbolTable) -> Statement {
        let text = text.trim();
        let kind = if let Some(args) = call_args(text, "delay") {
            StatementKind::Delay(DelayTimer::new(Expression::parse(args, symbols)))
        } else if let Some(args) = call_args(text, "func") {
            StatementKind::Func(FuncCall::parse(args))
        } else {
            parse_assignment(text, symbols)
        };
        Statement {
            text: text.to_string(),
            kind,
        }
    }

    pub fn reset(&mut self) {
        match &mut self.kind {
            StatementKind::Delay(timer) => timer.reset(),
            StatementKind::Func(call) => call.iterations = 0,
            StatementKind::Assign { .. } | StatementKind::Inert => {},
        }
    }
}

/// Arguments of `name(...)` when `text` is exactly one such call
fn call_args<'a>(text: &'a str, name: &str) -> Option<&'a str> {
    group_body(text.strip_prefix(name)?)
}

fn parse_assignment(text: &str, symbols: &dyn SymbolTable) -> StatementKind {
    let bytes = text.as_bytes();
    let Some(eq) = top_level_indices(text)
        .into_iter()
        .find(|i| bytes[*i] == b'=')
    else {
        debug!("Statement '{}' has no assignment", text);
        return StatementKind::Inert;
    };

    let shift = bytes
        .get(eq.saturating_sub(2)..eq)
        .is_some_and(|b| b == b"<<" || b == b">>");
    let start = if shift {
        eq - 2
    } else if eq >= 1 && b"+-*/%&|".contains(&bytes[eq - 1]) {
        eq - 1
    } else {
        eq
    };
    let Some(op) = Operator::from_assignment(&text[start..=eq]) else {
        return StatementKind::Inert;
    };

    let left = text[..start].trim();
    let target = symbols.lookup(left);
    if target.is_none() {
        debug!("Statement target '{}' is not a channel", left);
    }
    StatementKind::Assign {
        target,
        op,
        source: Expression::parse(&text[eq + 1..], symbols),
    }
}

/// Replace `{channelId}` markers with live values and `\n` with newlines
pub fn interpolate<C: ExecContext + ?Sized>(payload: &str, ctx: &C) -> String {
    let text = match PLACEHOLDER.as_ref() {
        Some(re) => re
            .replace_all(payload, |caps: &regex::Captures<'_>| match ctx.value_of(&caps[1]) {
                Some(value) => value.to_string(),
                None => caps[0].to_string(),
            })
            .into_owned(),
        None => payload.to_string(),
    };
    text.replace("\\n", "\n")
}

/// Ordered statement list of one THEN or ELSE branch
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Branch {
    pub statements: Vec<Statement>,
}

impl Branch {
    pub fn parse(text: &str, symbols: &dyn SymbolTable) -> Self {
        Self {
            statements: split_top_level(text, b',')
                .into_iter()
                .map(|s| Statement::parse(s, symbols))
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    /// Re-arm delays and zero iteration counters
    pub fn reset(&mut self) {
        for statement in &mut self.statements {
            statement.reset();
        }
    }

    /// Run the branch; returns false when a pending delay cut it short
    pub fn execute<C: ExecContext>(&mut self, ctx: &mut C) -> bool {
        let mut delay_elapsed = false;

        for statement in &mut self.statements {
            match &mut statement.kind {
                StatementKind::Delay(timer) => match timer.poll(&*ctx) {
                    DelayPoll::Pending => return false,
                    DelayPoll::Elapsed => delay_elapsed = true,
                    DelayPoll::Done => {},
                },
                StatementKind::Func(call) => {
                    if delay_elapsed {
                        call.iterations = 0;
                    }
                    if call.iterations < call.max_iterations {
                        call.iterations += 1;
                        let payload = interpolate(&call.payload, &*ctx);
                        debug!(
                            "func({}) {}/{}: {}",
                            call.index, call.iterations, call.max_iterations, payload
                        );
                        ctx.invoke(call.index, &payload);
                    }
                },
                StatementKind::Assign {
                    target: Some(target),
                    op,
                    source,
                } => {
                    let plain = *op == Operator::Assign;
                    let rhs = source.evaluate(&*ctx);
                    let value = if plain {
                        rhs
                    } else {
                        ctx.channel_value(*target).apply(*op, rhs)
                    };
                    ctx.write_channel(*target, value, plain);
                },
                StatementKind::Assign { target: None, .. } | StatementKind::Inert => {},
            }
        }
        true
    }
}
