//! Integration tests for the scheduler against the in-memory store
//!
//! Covers config loading, status publishing, log snapshots, remote commands
//! and the start/stop loop.

#![allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable

use firesense_rules::{
    ChannelDef, ChannelKind, Command, FireSenseConfig, RuleDef, RuleScheduler, SimulatedHardware,
    Value,
};
use firesense_store::{ManualClock, MemoryStore, SyncStore};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

const EPOCH: i64 = 1_710_513_015;

struct Fixture {
    scheduler: Arc<RuleScheduler<MemoryStore>>,
    store: Arc<MemoryStore>,
    hw: Arc<SimulatedHardware>,
    clock: Arc<ManualClock>,
}

fn fixture(config: FireSenseConfig) -> Fixture {
    let clock = Arc::new(ManualClock::new(EPOCH));
    let store = Arc::new(MemoryStore::with_clock(clock.clone()));
    let hw = Arc::new(SimulatedHardware::new());
    let scheduler = Arc::new(RuleScheduler::new(
        hw.clone(),
        store.clone(),
        clock.clone(),
        config,
    ));
    Fixture {
        scheduler,
        store,
        hw,
        clock,
    }
}

fn config() -> FireSenseConfig {
    FireSenseConfig::new("dev1").with_base_path("home")
}

async fn seed_button_led(store: &MemoryStore) {
    store
        .write(
            "home/config/devices/dev1/channels",
            json!({
                "BTN": {"type": "input", "gpio": 4, "status": true},
                "LED": {"type": "output", "gpio": 2, "status": true}
            }),
        )
        .await
        .unwrap();
    store
        .write(
            "home/config/devices/dev1/conditions",
            json!([{"IF": "BTN == 1", "THEN": "LED = true", "ELSE": "LED = false"}]),
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_load_and_publish_status() {
    let f = fixture(config());
    seed_button_led(&f.store).await;
    f.scheduler.load().await.unwrap();

    let status = f.scheduler.status().await;
    assert_eq!(status.total_channels, 2);
    assert_eq!(status.total_rules, 1);

    f.hw.set_digital(4, true);
    let report = f.scheduler.tick().await.unwrap();
    assert_eq!(report.then_branches, 1);
    assert!(f.hw.level(2));

    assert_eq!(
        f.store.read("home/status/dev1/channels/BTN").await.unwrap(),
        Some(json!({"value": 1, "type": "int", "ts": EPOCH}))
    );
    assert_eq!(
        f.store.read("home/status/dev1/channels/LED").await.unwrap(),
        Some(json!({"value": true, "type": "bool", "ts": EPOCH}))
    );
    assert_eq!(
        f.store.read("home/status/dev1/lastSeen").await.unwrap(),
        Some(json!(EPOCH))
    );
    assert_eq!(
        f.store.read("home/status/dev1/terminal").await.unwrap(),
        Some(json!(format!("[{}] Loaded 1 rules", EPOCH)))
    );
}

#[tokio::test]
async fn test_unchanged_values_are_not_republished() {
    let mut config = config();
    config.terminal_enabled = false;
    let f = fixture(config);
    seed_button_led(&f.store).await;
    f.scheduler.load().await.unwrap();

    f.scheduler.tick().await.unwrap();
    let writes = f.store.write_count();
    f.scheduler.tick().await.unwrap();
    assert_eq!(f.store.write_count(), writes);
}

#[tokio::test]
async fn test_status_publishing_can_be_disabled() {
    let mut config = config();
    config.publish_status = false;
    let f = fixture(config);
    seed_button_led(&f.store).await;
    f.scheduler.load().await.unwrap();

    f.hw.set_digital(4, true);
    f.scheduler.tick().await.unwrap();
    assert_eq!(f.store.read("home/status/dev1/channels").await.unwrap(), None);
}

#[tokio::test]
async fn test_log_snapshots_and_retention() {
    let mut config = config().with_log_interval(1_000);
    config.log_retention_secs = 10;
    let f = fixture(config);
    f.store
        .write(
            "home/config/devices/dev1/channels",
            json!({"T": {"type": "value", "valueType": "float", "log": true}}),
        )
        .await
        .unwrap();
    f.scheduler.load().await.unwrap();
    f.scheduler
        .engine()
        .lock()
        .await
        .set_channel_value("T", Value::float(21.5))
        .unwrap();

    // First tick only starts the interval
    f.scheduler.tick().await.unwrap();
    assert_eq!(f.store.read("home/logs/dev1").await.unwrap(), None);

    f.clock.advance_millis(1_000);
    f.scheduler.tick().await.unwrap();
    let first = EPOCH + 1;
    assert_eq!(
        f.store.read(&format!("home/logs/dev1/{}", first)).await.unwrap(),
        Some(json!({"ts": first, "T": 21.5}))
    );

    f.clock.advance_millis(20_000);
    f.scheduler.tick().await.unwrap();
    let logs = f.store.read("home/logs/dev1").await.unwrap().unwrap();
    let keys: Vec<&String> = logs.as_object().unwrap().keys().collect();
    assert_eq!(keys, vec![&(EPOCH + 21).to_string()]);

    assert!(f.scheduler.clear_logs().await.unwrap());
    assert_eq!(f.store.read("home/logs/dev1").await.unwrap(), None);
}

#[tokio::test]
async fn test_run_and_stop_commands() {
    let f = fixture(config());
    seed_button_led(&f.store).await;
    f.scheduler.load().await.unwrap();

    f.store.write("home/controls/dev1/cmd", json!("stop")).await.unwrap();
    let ack = f.scheduler.poll_commands().await.unwrap().unwrap();
    assert!(ack.ok);
    assert_eq!(ack.cmd, "stop");
    assert_eq!(f.store.read("home/controls/dev1/cmd").await.unwrap(), None);
    assert_eq!(
        f.store.read("home/controls/dev1/ack").await.unwrap(),
        Some(json!({"cmd": "stop", "ok": true, "ts": EPOCH}))
    );

    // Stopped: inputs are polled, rules do not run
    f.hw.set_digital(4, true);
    let report = f.scheduler.tick().await.unwrap();
    assert_eq!(report.rules_evaluated, 0);
    assert_eq!(report.inputs_polled, 1);
    assert!(!f.hw.level(2));

    f.store
        .write("home/controls/dev1/cmd", json!({"cmd": "run"}))
        .await
        .unwrap();
    f.scheduler.poll_commands().await.unwrap().unwrap();
    f.scheduler.tick().await.unwrap();
    assert!(f.hw.level(2));

    assert!(f.scheduler.poll_commands().await.unwrap().is_none());
}

#[tokio::test]
async fn test_unknown_command_is_acknowledged_with_error() {
    let f = fixture(config());
    f.store.write("home/controls/dev1/cmd", json!("reboot")).await.unwrap();

    let ack = f.scheduler.poll_commands().await.unwrap().unwrap();
    assert!(!ack.ok);
    assert_eq!(ack.message.as_deref(), Some("Unknown command: reboot"));
    assert_eq!(f.store.read("home/controls/dev1/cmd").await.unwrap(), None);
}

#[tokio::test]
async fn test_condition_and_config_commands_reload() {
    let f = fixture(config());
    seed_button_led(&f.store).await;
    f.scheduler.load().await.unwrap();

    f.store
        .write(
            "home/config/devices/dev1/conditions",
            json!([
                {"IF": "BTN == 1", "THEN": "LED = true", "ELSE": "LED = false"},
                {"IF": "BTN == 0", "THEN": "", "ELSE": ""}
            ]),
        )
        .await
        .unwrap();
    f.scheduler.handle_command(Command::Condition).await.unwrap();
    assert_eq!(f.scheduler.status().await.total_rules, 2);

    f.store
        .write(
            "home/config/devices/dev1/channels/N",
            json!({"type": "value"}),
        )
        .await
        .unwrap();
    f.scheduler.handle_command(Command::Config).await.unwrap();
    assert_eq!(f.scheduler.status().await.total_channels, 3);
}

#[tokio::test]
async fn test_info_and_restart_commands() {
    let f = fixture(config());
    seed_button_led(&f.store).await;
    f.scheduler.load().await.unwrap();
    f.scheduler.handle_command(Command::Stop).await.unwrap();

    f.store.write("home/controls/dev1/cmd", json!("info")).await.unwrap();
    f.scheduler.poll_commands().await.unwrap();
    let info = f.store.read("home/status/dev1/info").await.unwrap().unwrap();
    assert_eq!(info["deviceId"], json!("dev1"));
    assert_eq!(info["channels"], json!(2));
    assert_eq!(info["rules"], json!(1));
    assert_eq!(info["enabled"], json!(false));

    f.scheduler.handle_command(Command::Restart).await.unwrap();
    let status = f.scheduler.status().await;
    assert!(status.enabled);
    assert_eq!(status.total_channels, 2);
    assert_eq!(status.total_rules, 1);
}

#[tokio::test]
async fn test_save_channel_and_rule_apply_and_persist() {
    let f = fixture(config());
    f.scheduler
        .save_channel(ChannelDef::new("N", ChannelKind::Value))
        .await
        .unwrap();
    f.scheduler
        .save_rule(0, RuleDef::new("N == 0", "N = 7", ""))
        .await
        .unwrap();

    f.scheduler.tick().await.unwrap();
    let engine = f.scheduler.engine().lock().await;
    assert_eq!(engine.channel_value("N"), Some(Value::int(7)));
    drop(engine);

    assert_eq!(
        f.store
            .read("home/config/devices/dev1/conditions")
            .await
            .unwrap(),
        Some(json!([{"IF": "N == 0", "THEN": "N = 7", "ELSE": ""}]))
    );
    assert!(f
        .store
        .read("home/config/devices/dev1/channels/N")
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn test_store_outage_does_not_stop_ticks() {
    let f = fixture(config());
    seed_button_led(&f.store).await;
    f.scheduler.load().await.unwrap();

    f.store.set_offline(true);
    f.hw.set_digital(4, true);
    assert!(f.scheduler.tick().await.is_some());
    assert!(f.hw.level(2));
    assert!(f.scheduler.load_config().await.is_err());

    f.store.set_offline(false);
    assert!(f.scheduler.load_config().await.unwrap());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_loop_handles_pushed_commands_and_stops() {
    let f = fixture(config().with_tick_interval(10));
    seed_button_led(&f.store).await;

    let scheduler = f.scheduler.clone();
    let handle = tokio::spawn(async move { scheduler.start().await });

    let started = tokio::time::timeout(Duration::from_secs(5), async {
        while f.scheduler.status().await.total_rules == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(started.is_ok());
    assert!(f.scheduler.is_running());

    f.hw.set_digital(4, true);
    let lit = tokio::time::timeout(Duration::from_secs(5), async {
        while !f.hw.level(2) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(lit.is_ok());

    f.store.write("home/controls/dev1/cmd", json!("ping")).await.unwrap();
    let acked = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Some(ack) = f.store.read("home/controls/dev1/ack").await.unwrap() {
                return ack;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(acked["cmd"], json!("ping"));

    f.scheduler.stop();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();
    assert!(!f.scheduler.is_running());
}
