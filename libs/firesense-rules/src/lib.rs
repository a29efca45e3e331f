//! FireSense Rules - Rule Engine Library
//!
//! An IF/THEN/ELSE rule engine for FireSense devices providing:
//! - Channel store over digital/analog pins and in-memory values
//! - Condition parsing with comparisons, `change()`, calendar and time fields
//! - Statement execution with non-blocking `delay()` and bounded `func()`
//! - Tick scheduling with status publishing, log snapshots and remote commands
//! - Channel and rule persistence in a key-path sync store
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌──────────────┐     ┌──────────────┐
//! │  Scheduler  │────▶│    Engine    │────▶│ ChannelStore │
//! │  (100ms)    │     │ (tick/rules) │     │  (hardware)  │
//! └─────────────┘     └──────────────┘     └──────────────┘
//!        │                   │
//!        ▼                   ▼
//! ┌─────────────┐     ┌──────────────┐
//! │ Repository  │     │  Condition / │
//! │ (SyncStore) │     │  Statement   │
//! └─────────────┘     └──────────────┘
//! ```
//!
//! # Example
//!
//! ```rust
//! use firesense_rules::{ChannelDef, ChannelKind, Engine, SimulatedHardware};
//! use firesense_store::ManualClock;
//! use std::sync::Arc;
//!
//! let hw = Arc::new(SimulatedHardware::new());
//! let clock = Arc::new(ManualClock::new(0));
//! let mut engine = Engine::new(hw.clone(), clock.clone());
//! engine.add_channel(ChannelDef::new("BTN", ChannelKind::Input).with_gpio(4));
//! engine.add_channel(ChannelDef::new("LED", ChannelKind::Output).with_gpio(2));
//! engine.add_rule("BTN == 1", "delay(500), LED = true", "LED = false");
//!
//! hw.set_digital(4, true);
//! engine.tick();
//! assert!(!hw.level(2));
//!
//! clock.advance_millis(500);
//! engine.tick();
//! assert!(hw.level(2));
//! ```

pub mod channel;
pub mod command;
pub mod condition;
pub mod config;
pub mod engine;
mod error;
pub mod hardware;
pub mod logger;
mod repository;
pub mod rule;
mod scheduler;
pub mod statement;
pub mod types;

// Re-export public API
pub use channel::{Channel, ChannelStore, StatusUpdate, UserValues};
pub use command::{Command, CommandAck};
pub use condition::{Comparator, Condition, ConditionContext};
pub use config::{FireSenseConfig, LogSettings};
pub use engine::{Callback, Engine, TickReport};
pub use error::{Result, RuleError};
pub use hardware::{Hardware, NoHardware, PinMode, SimulatedHardware};
pub use repository::{
    load_channel_defs, load_rule_defs, parse_channel_defs, parse_rule_defs, save_channel,
    save_channels, save_rule, save_rules,
};
pub use rule::Rule;
pub use scheduler::{RuleScheduler, SchedulerStatus, DEFAULT_TICK_MS};
pub use statement::{Branch, ExecContext, Statement};
pub use types::{ChannelDef, ChannelKind, RuleDef};

// Re-export value types for convenience
pub use firesense_calc::{Value, ValueType};
