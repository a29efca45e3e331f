//! Rule Scheduler - periodic tick loop around the engine
//!
//! Responsibilities:
//! - Loads channel and rule definitions from the sync store
//! - Runs `Engine::tick` at a fixed minimum interval
//! - Publishes status updates, `lastSeen` and periodic log snapshots
//! - Handles remote commands from `controls/{id}/cmd`
//!
//! Reload and tick never overlap: the engine sits behind one async mutex and
//! the `loading_config` / `loading_condition` busy flags make a second reload
//! (or a tick during a reload) skip instead of queueing. Store failures are
//! logged and the loop keeps running.

use crate::command::{command_name, Command, CommandAck};
use crate::config::FireSenseConfig;
use crate::engine::{Engine, TickReport};
use crate::error::{Result, RuleError};
use crate::hardware::Hardware;
use crate::logger::{format_rule, log_snapshot, status_update_payload, terminal_line};
use crate::repository;
use crate::types::{ChannelDef, RuleDef};
use firesense_store::{Clock, DevicePaths, SyncStore};
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

pub use crate::config::DEFAULT_TICK_MS;

/// Resets a busy flag when dropped
struct BusyGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> BusyGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

fn ensure_loaded(loaded: bool, what: &str) -> Result<()> {
    if loaded {
        Ok(())
    } else {
        Err(RuleError::SchedulerError(format!(
            "{} load already in progress",
            what
        )))
    }
}

/// Rule Scheduler - owns the engine and talks to the sync store
pub struct RuleScheduler<S: SyncStore + ?Sized> {
    engine: Arc<Mutex<Engine>>,
    store: Arc<S>,
    paths: DevicePaths,
    config: FireSenseConfig,
    clock: Arc<dyn Clock>,
    /// Shutdown signal
    shutdown: Arc<Notify>,
    /// Running state
    running: Arc<AtomicBool>,
    loading_config: AtomicBool,
    loading_condition: AtomicBool,
    last_log_ms: parking_lot::Mutex<Option<u64>>,
}

impl<S: SyncStore + ?Sized> RuleScheduler<S> {
    pub fn new(
        hardware: Arc<dyn Hardware>,
        store: Arc<S>,
        clock: Arc<dyn Clock>,
        config: FireSenseConfig,
    ) -> Self {
        let engine =
            Engine::new(hardware, clock.clone()).with_utc_offset(config.utc_offset_secs);
        Self {
            engine: Arc::new(Mutex::new(engine)),
            store,
            paths: DevicePaths::new(&config.base_path, config.device_id.clone()),
            config,
            clock,
            shutdown: Arc::new(Notify::new()),
            running: Arc::new(AtomicBool::new(false)),
            loading_config: AtomicBool::new(false),
            loading_condition: AtomicBool::new(false),
            last_log_ms: parking_lot::Mutex::new(None),
        }
    }

    /// Shared engine handle for the programmatic API
    pub fn engine(&self) -> &Arc<Mutex<Engine>> {
        &self.engine
    }

    pub fn paths(&self) -> &DevicePaths {
        &self.paths
    }

    pub fn config(&self) -> &FireSenseConfig {
        &self.config
    }

    // ========== Loading ==========

    /// Load channels and then rules
    pub async fn load(&self) -> Result<()> {
        self.load_config().await?;
        self.load_conditions().await?;
        Ok(())
    }

    /// Rebuild the channel store from `config/devices/{id}/channels`
    ///
    /// Returns `Ok(false)` when another config load is in progress.
    pub async fn load_config(&self) -> Result<bool> {
        let Some(_guard) = BusyGuard::acquire(&self.loading_config) else {
            debug!("Config load already in progress, skipped");
            return Ok(false);
        };
        let defs = repository::load_channel_defs(&*self.store, &self.paths).await?;
        let count = defs.len();
        self.engine.lock().await.load_channels(defs);
        self.terminal(&format!("Loaded {} channels", count)).await;
        Ok(true)
    }

    /// Replace the rule list from `config/devices/{id}/conditions`
    ///
    /// Returns `Ok(false)` when another rule load is in progress.
    pub async fn load_conditions(&self) -> Result<bool> {
        let Some(_guard) = BusyGuard::acquire(&self.loading_condition) else {
            debug!("Condition load already in progress, skipped");
            return Ok(false);
        };
        let defs = repository::load_rule_defs(&*self.store, &self.paths).await?;
        let count = defs.len();
        {
            let mut engine = self.engine.lock().await;
            engine.load_rules(defs);
            for (index, rule) in engine.rules().iter().enumerate() {
                debug!("{}", format_rule(index, rule));
            }
        }
        self.terminal(&format!("Loaded {} rules", count)).await;
        Ok(true)
    }

    /// Persist a channel definition and apply it to the running engine
    pub async fn save_channel(&self, def: ChannelDef) -> Result<()> {
        repository::save_channel(&*self.store, &self.paths, &def).await?;
        let mut engine = self.engine.lock().await;
        engine.add_channel(def);
        engine.reparse_rules();
        Ok(())
    }

    /// Persist a rule at `index` (append when `index` is the rule count) and
    /// apply it to the running engine
    pub async fn save_rule(&self, index: usize, def: RuleDef) -> Result<()> {
        repository::save_rule(&*self.store, &self.paths, index, &def).await?;
        self.engine.lock().await.put_rule(index, def)
    }

    // ========== Loop ==========

    /// Start the scheduler loop
    pub async fn start(&self) {
        if self.running.swap(true, Ordering::AcqRel) {
            warn!("Scheduler already running");
            return;
        }
        info!(
            "Starting rule scheduler for '{}' with {}ms tick",
            self.paths.device_id(),
            self.config.tick_interval_ms
        );

        if let Err(e) = self.load().await {
            error!("Initial load failed: {}", e);
        }

        let mut tick_interval = interval(Duration::from_millis(self.config.tick_interval_ms.max(1)));
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut commands = self.store.subscribe(&self.paths.command());
        let mut commands_open = true;

        loop {
            tokio::select! {
                _ = tick_interval.tick() => {
                    self.poll_commands_logged().await;
                    self.tick().await;
                }
                event = commands.recv(), if commands_open => {
                    match event {
                        Some(event) if event.value.is_some() => self.poll_commands_logged().await,
                        Some(_) => {},
                        None => {
                            debug!("Command subscription closed");
                            commands_open = false;
                        },
                    }
                }
                _ = self.shutdown.notified() => {
                    info!("Scheduler received shutdown signal");
                    break;
                }
            }
        }

        self.running.store(false, Ordering::Release);
        info!("Rule scheduler stopped");
    }

    /// Stop the scheduler
    pub fn stop(&self) {
        info!("Stopping rule scheduler...");
        self.shutdown.notify_one();
    }

    /// Check if scheduler is running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Single scheduler tick
    ///
    /// Skipped (`None`) while a reload is in progress.
    pub async fn tick(&self) -> Option<TickReport> {
        if self.loading_config.load(Ordering::Acquire)
            || self.loading_condition.load(Ordering::Acquire)
        {
            debug!("Reload in progress, tick skipped");
            return None;
        }

        let ts = self.clock.now_epoch_seconds();
        let now_ms = self.clock.monotonic_millis();
        let (report, updates, snapshot) = {
            let mut engine = self.engine.lock().await;
            let report = engine.tick();
            let updates = engine.take_status_updates();
            let snapshot = if self.log_due(now_ms) {
                log_snapshot(engine.channels(), ts)
            } else {
                None
            };
            (report, updates, snapshot)
        };

        if self.config.publish_status && !updates.is_empty() {
            for update in &updates {
                let path = self.paths.channel_status(&update.channel_id);
                if let Err(e) = self.store.write(&path, status_update_payload(update, ts)).await {
                    warn!("Status publish for '{}' failed: {}", update.channel_id, e);
                }
            }
            if let Err(e) = self.store.write(&self.paths.last_seen(), json!(ts)).await {
                warn!("lastSeen update failed: {}", e);
            }
        }

        if let Some(snapshot) = snapshot {
            self.write_log(ts, snapshot).await;
        }

        Some(report)
    }

    fn log_due(&self, now_ms: u64) -> bool {
        if self.config.log_interval_ms == 0 {
            return false;
        }
        let mut last = self.last_log_ms.lock();
        match *last {
            None => {
                *last = Some(now_ms);
                false
            },
            Some(prev) if now_ms.saturating_sub(prev) >= self.config.log_interval_ms => {
                *last = Some(now_ms);
                true
            },
            Some(_) => false,
        }
    }

    async fn write_log(&self, ts: i64, snapshot: serde_json::Value) {
        if let Err(e) = self.store.write(&self.paths.log_entry(ts), snapshot).await {
            warn!("Log snapshot failed: {}", e);
            return;
        }
        match self
            .store
            .delete_older_than(
                &self.paths.logs(),
                "ts",
                self.config.log_limit,
                self.config.log_retention_secs,
            )
            .await
        {
            Ok(0) => {},
            Ok(removed) => debug!("Pruned {} log snapshots", removed),
            Err(e) => warn!("Log pruning failed: {}", e),
        }
    }

    // ========== Commands ==========

    async fn poll_commands_logged(&self) {
        if let Err(e) = self.poll_commands().await {
            warn!("Command poll failed: {}", e);
        }
    }

    /// Handle a pending command, if any, then clear it and write the ack
    pub async fn poll_commands(&self) -> Result<Option<CommandAck>> {
        let path = self.paths.command();
        let Some(raw) = self.store.read(&path).await? else {
            return Ok(None);
        };
        let ts = self.clock.now_epoch_seconds();
        let ack = match command_name(&raw) {
            Some(name) => {
                let name = name.to_string();
                match name.parse::<Command>() {
                    Ok(cmd) => match self.handle_command(cmd).await {
                        Ok(()) => CommandAck::ok(cmd.as_str(), ts),
                        Err(e) => CommandAck::failed(cmd.as_str(), ts, e.to_string()),
                    },
                    Err(e) => CommandAck::failed(name, ts, e.to_string()),
                }
            },
            None => CommandAck::failed(raw.to_string(), ts, "Malformed command"),
        };

        self.store.delete(&path).await?;
        self.store
            .write(&self.paths.ack(), serde_json::to_value(&ack)?)
            .await?;
        match &ack.message {
            None => self.terminal(&format!("cmd {}: ok", ack.cmd)).await,
            Some(message) => self.terminal(&format!("cmd {}: {}", ack.cmd, message)).await,
        }
        Ok(Some(ack))
    }

    /// Execute one command against the engine and store
    pub async fn handle_command(&self, cmd: Command) -> Result<()> {
        info!("Handling command '{}'", cmd);
        match cmd {
            Command::Run => self.engine.lock().await.set_enabled(true),
            Command::Stop => self.engine.lock().await.set_enabled(false),
            Command::Config => {
                ensure_loaded(self.load_config().await?, "config")?;
                ensure_loaded(self.load_conditions().await?, "condition")?;
            },
            Command::Condition => {
                ensure_loaded(self.load_conditions().await?, "condition")?;
            },
            Command::Ping => {},
            Command::Info => self.publish_info().await?,
            Command::Clear => {
                self.clear_logs().await?;
            },
            Command::Restart => {
                {
                    let mut engine = self.engine.lock().await;
                    engine.clear_rules();
                    engine.clear_channels();
                    engine.set_enabled(true);
                }
                *self.last_log_ms.lock() = None;
                ensure_loaded(self.load_config().await?, "config")?;
                ensure_loaded(self.load_conditions().await?, "condition")?;
            },
        }
        Ok(())
    }

    // ========== Publishing ==========

    /// Write a debug message to the log and, when enabled, the terminal path
    pub async fn terminal(&self, message: &str) {
        info!("{}", message);
        if !self.config.terminal_enabled {
            return;
        }
        let line = terminal_line(self.clock.now_epoch_seconds(), message);
        if let Err(e) = self.store.write(&self.paths.terminal(), json!(line)).await {
            warn!("Terminal write failed: {}", e);
        }
    }

    /// Publish the device summary to `status/{id}/info`
    pub async fn publish_info(&self) -> Result<()> {
        let info = {
            let engine = self.engine.lock().await;
            json!({
                "deviceId": self.paths.device_id(),
                "version": env!("CARGO_PKG_VERSION"),
                "channels": engine.channels().len(),
                "rules": engine.rules().len(),
                "enabled": engine.is_enabled(),
                "ticks": engine.ticks(),
                "ts": self.clock.now_epoch_seconds(),
            })
        };
        self.store.write(&self.paths.info(), info).await?;
        Ok(())
    }

    /// Delete every log snapshot
    pub async fn clear_logs(&self) -> Result<bool> {
        Ok(self.store.delete(&self.paths.logs()).await?)
    }

    /// Get scheduler status
    pub async fn status(&self) -> SchedulerStatus {
        let engine = self.engine.lock().await;
        SchedulerStatus {
            running: self.is_running(),
            enabled: engine.is_enabled(),
            total_rules: engine.rules().len(),
            total_channels: engine.channels().len(),
            ticks: engine.ticks(),
            tick_interval_ms: self.config.tick_interval_ms,
        }
    }
}

/// Scheduler status information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerStatus {
    pub running: bool,
    /// Rule evaluation enabled (`run` / `stop`)
    pub enabled: bool,
    pub total_rules: usize,
    pub total_channels: usize,
    pub ticks: u64,
    pub tick_interval_ms: u64,
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::hardware::NoHardware;
    use firesense_store::{ManualClock, MemoryStore};
    use tracing_test::traced_test;

    fn scheduler() -> RuleScheduler<MemoryStore> {
        let clock = Arc::new(ManualClock::new(1_000));
        let store = Arc::new(MemoryStore::with_clock(clock.clone()));
        RuleScheduler::new(
            Arc::new(NoHardware),
            store,
            clock,
            FireSenseConfig::new("dev1").with_base_path("home"),
        )
    }

    #[test]
    fn test_busy_guard_is_exclusive() {
        let flag = AtomicBool::new(false);
        let guard = BusyGuard::acquire(&flag);
        assert!(guard.is_some());
        assert!(BusyGuard::acquire(&flag).is_none());
        drop(guard);
        assert!(!flag.load(Ordering::Acquire));
        assert!(BusyGuard::acquire(&flag).is_some());
    }

    #[tokio::test]
    async fn test_busy_config_load_is_skipped() {
        let scheduler = scheduler();
        scheduler.loading_config.store(true, Ordering::Release);
        assert!(!scheduler.load_config().await.unwrap());
        assert!(scheduler.tick().await.is_none());

        scheduler.loading_config.store(false, Ordering::Release);
        assert!(scheduler.load_config().await.unwrap());
        assert!(scheduler.tick().await.is_some());
    }

    #[tokio::test]
    async fn test_busy_reload_fails_command() {
        let scheduler = scheduler();
        scheduler.loading_condition.store(true, Ordering::Release);
        let err = scheduler.handle_command(Command::Condition).await.unwrap_err();
        assert!(matches!(err, RuleError::SchedulerError(_)));
    }

    #[traced_test]
    #[tokio::test]
    async fn test_terminal_messages_are_logged() {
        let scheduler = scheduler();
        scheduler.load().await.unwrap();
        assert!(logs_contain("Loaded 0 channels"));
        assert!(logs_contain("Loaded 0 rules"));
    }

    #[traced_test]
    #[tokio::test]
    async fn test_store_failure_is_logged_not_raised() {
        let scheduler = scheduler();
        scheduler.store.set_offline(true);
        scheduler.terminal("hello").await;
        assert!(logs_contain("Terminal write failed"));
    }

    #[tokio::test]
    async fn test_status_reflects_engine() {
        let scheduler = scheduler();
        scheduler.handle_command(Command::Stop).await.unwrap();
        let status = scheduler.status().await;
        assert!(!status.running);
        assert!(!status.enabled);
        assert_eq!(status.tick_interval_ms, DEFAULT_TICK_MS);
    }
}
