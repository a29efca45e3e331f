//! Static checks of a device definition
//!
//! Rule text never fails to parse: unknown names degrade to zero at runtime.
//! These checks surface such problems before a device is deployed.

use crate::device::DeviceFile;
use firesense_rules::{ChannelKind, ValueType};
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::LazyLock;

static QUOTED: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r#"'[^']*'|"[^"]*""#).ok());
static WORD: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\b[A-Za-z_][A-Za-z0-9_]*\b").ok());

/// Words the rule grammar understands without a channel
const KEYWORDS: &[&str] = &[
    "change", "delay", "func", "millis", "micros", "date", "time", "weekday", "day", "month",
    "year", "hour", "min", "sec", "true", "false",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issue {
    pub severity: Severity,
    pub location: String,
    pub message: String,
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.location, self.message)
    }
}

#[derive(Debug, Default)]
pub struct CheckReport {
    pub issues: Vec<Issue>,
}

impl CheckReport {
    fn warn(&mut self, location: impl Into<String>, message: impl Into<String>) {
        self.issues.push(Issue {
            severity: Severity::Warning,
            location: location.into(),
            message: message.into(),
        });
    }

    fn error(&mut self, location: impl Into<String>, message: impl Into<String>) {
        self.issues.push(Issue {
            severity: Severity::Error,
            location: location.into(),
            message: message.into(),
        });
    }

    pub fn has_errors(&self) -> bool {
        self.issues.iter().any(|i| i.severity == Severity::Error)
    }

    pub fn warnings(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Warning)
            .count()
    }
}

pub fn check_device(device: &DeviceFile) -> CheckReport {
    let mut report = CheckReport::default();
    let mut ids = HashSet::new();
    let mut pins: HashMap<u32, &str> = HashMap::new();

    for (i, channel) in device.channels.iter().enumerate() {
        let location = format!("channel #{}", i);
        if channel.id.is_empty() {
            report.error(&location, "missing id");
            continue;
        }
        if !ids.insert(channel.id.as_str()) {
            report.error(&location, format!("duplicate id '{}'", channel.id));
        }
        if channel.kind.has_pin() {
            match channel.gpio {
                Some(gpio) => {
                    if let Some(other) = pins.insert(gpio, channel.id.as_str()) {
                        report.warn(
                            &location,
                            format!("gpio {} also used by '{}'", gpio, other),
                        );
                    }
                },
                None => report.error(&location, format!("'{}' has no gpio", channel.id)),
            }
        }
        if let Some(value_type) = channel.value_type {
            if channel.kind != ChannelKind::Value {
                report.warn(&location, "valueType only applies to value channels");
            } else if !matches!(value_type, ValueType::Int | ValueType::Float) {
                report.warn(
                    &location,
                    format!("valueType '{}' is stored as int", value_type),
                );
            }
        }
    }

    for (i, rule) in device.rules.iter().enumerate() {
        let location = format!("rule #{}", i);
        if rule.condition.trim().is_empty() {
            report.warn(&location, "empty IF is never true");
        }
        let (Some(quoted), Some(word)) = (QUOTED.as_ref(), WORD.as_ref()) else {
            continue;
        };
        for text in [&rule.condition, &rule.then, &rule.otherwise] {
            let stripped = quoted.replace_all(text, "");
            let mut seen = HashSet::new();
            for m in word.find_iter(&stripped) {
                let name = m.as_str();
                if KEYWORDS.contains(&name) || ids.contains(name) || !seen.insert(name) {
                    continue;
                }
                report.warn(
                    &location,
                    format!("unknown name '{}' evaluates to 0", name),
                );
            }
        }
    }

    for (i, stimulus) in device.stimuli.iter().enumerate() {
        let location = format!("stimulus #{}", i);
        let target = device
            .channels
            .iter()
            .find(|c| c.kind.is_input() && c.gpio == Some(stimulus.gpio));
        if target.is_none() {
            report.warn(
                &location,
                format!("gpio {} is not an input channel", stimulus.gpio),
            );
        }
        if stimulus.digital.is_none() && stimulus.analog.is_none() {
            report.warn(&location, "sets neither digital nor analog");
        }
    }

    report
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::device::Stimulus;
    use firesense_rules::{ChannelDef, RuleDef};

    fn device() -> DeviceFile {
        DeviceFile {
            channels: vec![
                ChannelDef::new("BTN", ChannelKind::Input).with_gpio(4),
                ChannelDef::new("LED", ChannelKind::Output).with_gpio(5),
                ChannelDef::new("T", ChannelKind::Value).with_value_type(ValueType::Float),
            ],
            rules: vec![RuleDef::new(
                "BTN == 1 && change(BTN) && hour >= 8",
                "LED = true, delay(500), func(0, 2, 'pressed {BTN}')",
                "LED = false",
            )],
            ..Default::default()
        }
    }

    #[test]
    fn test_clean_device() {
        let report = check_device(&device());
        assert!(report.issues.is_empty(), "{:?}", report.issues);
    }

    #[test]
    fn test_unknown_names_in_rules() {
        let mut device = device();
        device.rules.push(RuleDef::new("TEMP > 0x1F", "ALARM = TEMP", ""));
        let report = check_device(&device);
        let messages: Vec<_> = report.issues.iter().map(|i| i.message.as_str()).collect();
        assert_eq!(
            messages,
            vec![
                "unknown name 'TEMP' evaluates to 0",
                "unknown name 'ALARM' evaluates to 0",
                "unknown name 'TEMP' evaluates to 0",
            ]
        );
        assert!(!report.has_errors());
        assert_eq!(report.warnings(), 3);
    }

    #[test]
    fn test_channel_errors() {
        let mut device = device();
        device.channels.push(ChannelDef::new("BTN", ChannelKind::Input).with_gpio(5));
        device.channels.push(ChannelDef::new("X", ChannelKind::Output));
        device.channels.push(ChannelDef::new("", ChannelKind::Value));
        let report = check_device(&device);
        assert!(report.has_errors());
        let rendered: Vec<_> = report.issues.iter().map(|i| i.to_string()).collect();
        assert_eq!(
            rendered,
            vec![
                "channel #3: duplicate id 'BTN'",
                "channel #3: gpio 5 also used by 'LED'",
                "channel #4: 'X' has no gpio",
                "channel #5: missing id",
            ]
        );
    }

    #[test]
    fn test_empty_condition_and_stimuli() {
        let mut device = device();
        device.rules.push(RuleDef::new(" ", "LED = true", ""));
        device.stimuli.push(Stimulus {
            tick: 0,
            gpio: 5,
            digital: Some(true),
            analog: None,
        });
        let report = check_device(&device);
        let rendered: Vec<_> = report.issues.iter().map(|i| i.to_string()).collect();
        assert_eq!(
            rendered,
            vec![
                "rule #1: empty IF is never true",
                "stimulus #0: gpio 5 is not an input channel",
            ]
        );
    }
}
