//! Condition parser and evaluator
//!
//! A condition is a flat list of nodes joined by `&&`/`||`, each node either
//! a parenthesised sub-list or a leaf comparison `left [cmp right]`. The join
//! operator lives on the node before it and the list folds strictly left to
//! right; once the running result is true and the next join is `||` the
//! remaining siblings are not evaluated.
//!
//! Left operands are classified in order: `change(X)`, time keywords
//! (`millis micros date time day weekday hour min sec year month`), channel
//! id, nested expression. Right operands: channel id, `millis`/`micros`,
//! nested expression. A leaf without comparator tests `left > 0`.
//!
//! The right operand's not-flag is taken from the *left* text's leading `!`,
//! so `!A == B` negates both sides. Kept as-is for rule compatibility.

use chrono::{Datelike, Duration, Months, NaiveDate, NaiveDateTime, Timelike};
use firesense_calc::lexer::{group_body, strip_not, top_level_indices};
use firesense_calc::{ChannelRef, EvalContext, Expression, Operator, SymbolTable, Value, ValueType};
use std::fmt;

/// Evaluation context for conditions: live values plus the tick snapshot and clock
pub trait ConditionContext: EvalContext {
    /// Channel value as of the last committed tick
    fn previous_value(&self, channel: ChannelRef) -> Value;

    /// Wall-clock time in the device's configured offset
    fn local_time(&self) -> NaiveDateTime;
}

/// Comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Comparator {
    /// No comparator: `left > 0`
    #[default]
    None,
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    Ne,
}

impl Comparator {
    pub fn symbol(&self) -> &'static str {
        match self {
            Comparator::None => "",
            Comparator::Lt => "<",
            Comparator::Gt => ">",
            Comparator::Le => "<=",
            Comparator::Ge => ">=",
            Comparator::Eq => "==",
            Comparator::Ne => "!=",
        }
    }

    /// Compare in float space when either side is Float, integer space otherwise
    pub fn compare(&self, left: Value, right: Value) -> bool {
        let float_space =
            left.value_type() == ValueType::Float || right.value_type() == ValueType::Float;
        if float_space {
            let (l, r) = (left.as_float(), right.as_float());
            match self {
                Comparator::None => l > 0.0,
                Comparator::Lt => l < r,
                Comparator::Gt => l > r,
                Comparator::Le => l <= r,
                Comparator::Ge => l >= r,
                Comparator::Eq => l == r,
                Comparator::Ne => l != r,
            }
        } else {
            let (l, r) = (left.as_int(), right.as_int());
            match self {
                Comparator::None => l > 0,
                Comparator::Lt => l < r,
                Comparator::Gt => l > r,
                Comparator::Le => l <= r,
                Comparator::Ge => l >= r,
                Comparator::Eq => l == r,
                Comparator::Ne => l != r,
            }
        }
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Clock-derived left operand
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeField {
    Millis,
    Micros,
    /// Calendar date, compared as a full timestamp
    Date,
    /// Time of day, compared as a full timestamp
    Time,
    Day,
    /// 0-6, Sunday = 0
    Weekday,
    Hour,
    Min,
    Sec,
    Year,
    /// 1-12
    Month,
}

impl TimeField {
    pub fn from_keyword(word: &str) -> Option<TimeField> {
        match word {
            "millis" => Some(TimeField::Millis),
            "micros" => Some(TimeField::Micros),
            "date" => Some(TimeField::Date),
            "time" => Some(TimeField::Time),
            "day" => Some(TimeField::Day),
            "weekday" => Some(TimeField::Weekday),
            "hour" => Some(TimeField::Hour),
            "min" => Some(TimeField::Min),
            "sec" => Some(TimeField::Sec),
            "year" => Some(TimeField::Year),
            "month" => Some(TimeField::Month),
            _ => None,
        }
    }

    fn current<C: ConditionContext>(&self, ctx: &C) -> Value {
        let now = ctx.local_time();
        match self {
            TimeField::Millis => Value::int(ctx.millis() as i64),
            TimeField::Micros => Value::int(ctx.micros() as i64),
            TimeField::Date | TimeField::Time => Value::int(now.and_utc().timestamp()),
            TimeField::Day => Value::int(i64::from(now.day())),
            TimeField::Weekday => Value::int(i64::from(now.weekday().num_days_from_sunday())),
            TimeField::Hour => Value::int(i64::from(now.hour())),
            TimeField::Min => Value::int(i64::from(now.minute())),
            TimeField::Sec => Value::int(i64::from(now.second())),
            TimeField::Year => Value::int(i64::from(now.year())),
            TimeField::Month => Value::int(i64::from(now.month())),
        }
    }
}

/// Calendar target with unset fields filled from the current time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PartialTime {
    pub year: Option<i32>,
    pub month: Option<i32>,
    pub day: Option<i32>,
    pub hour: Option<i32>,
    pub minute: Option<i32>,
    pub second: Option<i32>,
}

impl PartialTime {
    /// `YYYY-MM-DD` or `D/M/YYYY`
    pub fn parse_date(text: &str) -> Option<PartialTime> {
        let text = text.trim();
        let (year, month, day) = if text.contains('-') {
            let mut parts = text.split('-').map(|p| p.trim().parse::<i32>());
            (parts.next()?.ok()?, parts.next()?.ok()?, parts.next()?.ok()?)
        } else {
            let mut parts = text.split('/').map(|p| p.trim().parse::<i32>());
            let day = parts.next()?.ok()?;
            let month = parts.next()?.ok()?;
            (parts.next()?.ok()?, month, day)
        };
        Some(PartialTime {
            year: Some(year),
            month: Some(month),
            day: Some(day),
            ..Default::default()
        })
    }

    /// `HH:MM` or `HH:MM:SS`
    pub fn parse_time(text: &str) -> Option<PartialTime> {
        let mut parts = text.trim().split(':').map(|p| p.trim().parse::<i32>());
        let hour = parts.next()?.ok()?;
        let minute = parts.next()?.ok()?;
        let second = match parts.next() {
            Some(s) => Some(s.ok()?),
            None => None,
        };
        Some(PartialTime {
            hour: Some(hour),
            minute: Some(minute),
            second,
            ..Default::default()
        })
    }

    /// Fill unset fields from `now` and normalize out-of-range fields the way
    /// calendar arithmetic does (Feb 30 rolls into March)
    pub fn resolve(&self, now: NaiveDateTime) -> Option<NaiveDateTime> {
        let year = self.year.unwrap_or(now.year());
        let month = self.month.unwrap_or(now.month() as i32);
        let day = self.day.unwrap_or(now.day() as i32);
        let hour = self.hour.unwrap_or(now.hour() as i32);
        let minute = self.minute.unwrap_or(now.minute() as i32);
        let second = self.second.unwrap_or(now.second() as i32);

        // Out-of-range fields come straight from rule text
        let months = i64::from(month) - 1;
        let year = i32::try_from(i64::from(year) + months.div_euclid(12)).ok()?;
        let base = NaiveDate::from_ymd_opt(year, 1, 1)?
            .checked_add_months(Months::new(months.rem_euclid(12) as u32))?
            .and_hms_opt(0, 0, 0)?;
        base.checked_add_signed(Duration::days(i64::from(day) - 1))?
            .checked_add_signed(Duration::hours(i64::from(hour)))?
            .checked_add_signed(Duration::minutes(i64::from(minute)))?
            .checked_add_signed(Duration::seconds(i64::from(second)))
    }
}

/// Left side of a comparison
#[derive(Debug, Clone, PartialEq)]
pub enum LeftOperand {
    /// `change(X)`; `None` when X is not a channel
    Change(Option<ChannelRef>),
    Time(TimeField),
    Channel(ChannelRef),
    Expr(Expression),
}

impl LeftOperand {
    pub fn resolve(text: &str, symbols: &dyn SymbolTable) -> LeftOperand {
        let text = text.trim();
        if let Some(inner) = text
            .strip_prefix("change(")
            .and_then(|rest| rest.strip_suffix(')'))
        {
            return LeftOperand::Change(symbols.lookup(inner.trim()));
        }
        if let Some(field) = TimeField::from_keyword(text) {
            return LeftOperand::Time(field);
        }
        if let Some(channel) = symbols.lookup(text) {
            return LeftOperand::Channel(channel);
        }
        LeftOperand::Expr(Expression::parse(text, symbols))
    }

    fn value<C: ConditionContext>(&self, ctx: &C) -> Value {
        match self {
            LeftOperand::Change(Some(channel)) => {
                let current = ctx.channel_value(*channel);
                Value::boolean(current.differs(&ctx.previous_value(*channel)))
            },
            LeftOperand::Change(None) => Value::undefined(),
            LeftOperand::Time(field) => field.current(ctx),
            LeftOperand::Channel(channel) => ctx.channel_value(*channel),
            LeftOperand::Expr(expr) => expr.evaluate(ctx),
        }
    }
}

/// Right side of a comparison
#[derive(Debug, Clone, PartialEq)]
pub enum RightOperand {
    None,
    Channel(ChannelRef),
    Millis,
    Micros,
    /// Date or time literal compared against `date`/`time`
    Moment(PartialTime),
    Expr(Expression),
}

impl RightOperand {
    pub fn resolve(text: &str, left: &LeftOperand, symbols: &dyn SymbolTable) -> RightOperand {
        let text = text.trim();
        let moment = match left {
            LeftOperand::Time(TimeField::Date) => PartialTime::parse_date(text),
            LeftOperand::Time(TimeField::Time) => PartialTime::parse_time(text),
            _ => None,
        };
        if let Some(moment) = moment {
            return RightOperand::Moment(moment);
        }
        if let Some(channel) = symbols.lookup(text) {
            return RightOperand::Channel(channel);
        }
        match text {
            "millis" => RightOperand::Millis,
            "micros" => RightOperand::Micros,
            _ => RightOperand::Expr(Expression::parse(text, symbols)),
        }
    }

    fn value<C: ConditionContext>(&self, ctx: &C) -> Option<Value> {
        match self {
            RightOperand::None => None,
            RightOperand::Channel(channel) => Some(ctx.channel_value(*channel)),
            RightOperand::Millis => Some(Value::int(ctx.millis() as i64)),
            RightOperand::Micros => Some(Value::int(ctx.micros() as i64)),
            RightOperand::Moment(moment) => Some(
                moment
                    .resolve(ctx.local_time())
                    .map(|t| Value::int(t.and_utc().timestamp()))
                    .unwrap_or_default(),
            ),
            RightOperand::Expr(expr) => Some(expr.evaluate(ctx)),
        }
    }
}

/// Leaf comparison
#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub left: LeftOperand,
    pub right: RightOperand,
    pub comparator: Comparator,
    pub left_not: bool,
    pub right_not: bool,
}

impl Comparison {
    pub fn parse(text: &str, symbols: &dyn SymbolTable) -> Comparison {
        let (left_text, right_text, comparator) = match find_comparator(text) {
            Some((at, len, comparator)) => (&text[..at], Some(&text[at + len..]), comparator),
            None => (text, None, Comparator::None),
        };

        let (left_not, left_body) = strip_not(left_text);
        let left = LeftOperand::resolve(left_body, symbols);
        let right = match right_text {
            Some(right_text) => RightOperand::resolve(right_text, &left, symbols),
            None => RightOperand::None,
        };

        Comparison {
            left,
            right,
            comparator,
            left_not,
            right_not: left_not,
        }
    }

    pub fn evaluate<C: ConditionContext>(&self, ctx: &C) -> bool {
        let mut left = self.left.value(ctx);
        if self.left_not {
            left = left.logical_not();
        }
        match (self.comparator, self.right.value(ctx)) {
            (Comparator::None, _) | (_, None) => left.is_positive(),
            (comparator, Some(mut right)) => {
                if self.right_not {
                    right = right.logical_not();
                }
                comparator.compare(left, right)
            },
        }
    }
}

/// Locate the first top-level comparator; `<<` and `>>` are skipped as shifts
fn find_comparator(text: &str) -> Option<(usize, usize, Comparator)> {
    let bytes = text.as_bytes();
    let mut resume = 0;

    for i in top_level_indices(text) {
        if i < resume {
            continue;
        }
        let next = bytes.get(i + 1).copied();
        let found = match (bytes[i], next) {
            (b'<', Some(b'<')) | (b'>', Some(b'>')) => {
                resume = i + 2;
                None
            },
            (b'<', Some(b'=')) => Some((2, Comparator::Le)),
            (b'>', Some(b'=')) => Some((2, Comparator::Ge)),
            (b'=', Some(b'=')) => Some((2, Comparator::Eq)),
            (b'!', Some(b'=')) => Some((2, Comparator::Ne)),
            (b'<', _) => Some((1, Comparator::Lt)),
            (b'>', _) => Some((1, Comparator::Gt)),
            _ => None,
        };
        if let Some((len, comparator)) = found {
            return Some((i, len, comparator));
        }
    }
    None
}

/// Node payload
#[derive(Debug, Clone, PartialEq)]
pub enum CondKind {
    Leaf(Comparison),
    Group(Vec<CondNode>),
}

/// One node of a condition list
#[derive(Debug, Clone, PartialEq)]
pub struct CondNode {
    pub kind: CondKind,
    /// Negation of a parenthesised group
    pub not: bool,
    /// `And`, `Or`, or `None` on the last node
    pub next: Operator,
}

impl CondNode {
    fn evaluate<C: ConditionContext>(&self, ctx: &C) -> bool {
        let result = match &self.kind {
            CondKind::Leaf(comparison) => comparison.evaluate(ctx),
            CondKind::Group(nodes) => evaluate_list(nodes, ctx),
        };
        result != self.not
    }
}

/// Parsed condition
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Condition {
    pub nodes: Vec<CondNode>,
}

impl Condition {
    /// Parse condition text; never fails
    pub fn parse(text: &str, symbols: &dyn SymbolTable) -> Self {
        Self {
            nodes: parse_list(text, symbols),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// An empty condition is false
    pub fn evaluate<C: ConditionContext>(&self, ctx: &C) -> bool {
        evaluate_list(&self.nodes, ctx)
    }
}

fn parse_list(text: &str, symbols: &dyn SymbolTable) -> Vec<CondNode> {
    let bytes = text.as_bytes();
    let mut nodes = Vec::new();
    let mut start = 0;
    let mut resume = 0;

    for i in top_level_indices(text) {
        if i < resume {
            continue;
        }
        let join = match (bytes[i], bytes.get(i + 1).copied()) {
            (b'&', Some(b'&')) => Operator::And,
            (b'|', Some(b'|')) => Operator::Or,
            _ => continue,
        };
        nodes.push(parse_term(&text[start..i], join, symbols));
        start = i + 2;
        resume = start;
    }

    let tail = text[start..].trim();
    if !tail.is_empty() || !nodes.is_empty() {
        nodes.push(parse_term(tail, Operator::None, symbols));
    }
    nodes
}

fn parse_term(term: &str, next: Operator, symbols: &dyn SymbolTable) -> CondNode {
    let term = term.trim();
    let (not, body) = strip_not(term);
    match group_body(body) {
        Some(inner) => CondNode {
            kind: CondKind::Group(parse_list(inner, symbols)),
            not,
            next,
        },
        None => CondNode {
            kind: CondKind::Leaf(Comparison::parse(term, symbols)),
            not: false,
            next,
        },
    }
}

fn evaluate_list<C: ConditionContext>(nodes: &[CondNode], ctx: &C) -> bool {
    let mut acc = false;
    for (i, node) in nodes.iter().enumerate() {
        let result = node.evaluate(ctx);
        acc = match i {
            0 => result,
            _ if nodes[i - 1].next == Operator::Or => acc || result,
            _ => acc && result,
        };
        if acc && node.next == Operator::Or {
            break;
        }
    }
    acc
}
