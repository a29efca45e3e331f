//! Device simulation
//!
//! `simulate` drives the scheduler tick by tick on a manual clock, so a run
//! is reproducible. `run_realtime` starts the real scheduler loop on the
//! system clock until Ctrl+C.

use crate::device::DeviceFile;
use anyhow::Result;
use firesense_rules::{
    save_channels, save_rules, RuleScheduler, SimulatedHardware, Value,
};
use firesense_store::{Clock, ManualClock, MemoryStore, SystemClock};
use std::sync::Arc;
use tracing::{debug, info};

/// One observed output pin write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinWrite {
    pub tick: u64,
    pub gpio: u32,
    pub level: bool,
}

#[derive(Debug, Default)]
pub struct RunSummary {
    pub ticks: u64,
    pub then_branches: usize,
    pub else_branches: usize,
    pub pin_writes: Vec<PinWrite>,
    /// Final channel values in definition order
    pub channels: Vec<(String, Value)>,
    pub store: serde_json::Value,
}

type SimScheduler = RuleScheduler<MemoryStore>;

async fn prepare(
    device: &DeviceFile,
    hardware: Arc<SimulatedHardware>,
    store: Arc<MemoryStore>,
    clock: Arc<dyn Clock>,
) -> Result<SimScheduler> {
    let scheduler = RuleScheduler::new(hardware, store.clone(), clock, device.config.clone());
    save_channels(&*store, scheduler.paths(), &device.channels).await?;
    save_rules(&*store, scheduler.paths(), &device.rules).await?;
    scheduler.load().await?;
    Ok(scheduler)
}

/// Run `ticks` scheduler ticks, advancing a manual clock by the tick interval
pub async fn simulate(device: &DeviceFile, ticks: u64, start_epoch: i64) -> Result<RunSummary> {
    let clock = Arc::new(ManualClock::new(start_epoch));
    let store = Arc::new(MemoryStore::with_clock(clock.clone()));
    let hardware = Arc::new(SimulatedHardware::new());
    let scheduler = prepare(device, hardware.clone(), store.clone(), clock.clone()).await?;

    let interval = device.config.tick_interval_ms.max(1);
    let mut summary = RunSummary::default();
    let mut seen_writes = hardware.writes().len();

    for tick in 0..ticks {
        for stimulus in device.stimuli.iter().filter(|s| s.tick == tick) {
            if let Some(level) = stimulus.digital {
                hardware.set_digital(stimulus.gpio, level);
            }
            if let Some(reading) = stimulus.analog {
                hardware.set_analog(stimulus.gpio, reading);
            }
            debug!("Tick {}: stimulus on gpio {}", tick, stimulus.gpio);
        }

        if let Some(report) = scheduler.tick().await {
            summary.then_branches += report.then_branches;
            summary.else_branches += report.else_branches;
        }
        summary.ticks += 1;

        let writes = hardware.writes();
        summary
            .pin_writes
            .extend(writes[seen_writes..].iter().map(|(gpio, level)| PinWrite {
                tick,
                gpio: *gpio,
                level: *level,
            }));
        seen_writes = writes.len();

        clock.advance_millis(interval);
    }

    let engine = scheduler.engine().lock().await;
    summary.channels = engine
        .channels()
        .iter()
        .map(|c| (c.id().to_string(), c.current()))
        .collect();
    drop(engine);
    summary.store = store.snapshot();

    info!("Simulated {} ticks", summary.ticks);
    Ok(summary)
}

/// Run the scheduler loop on the system clock until a shutdown signal
pub async fn run_realtime(device: &DeviceFile) -> Result<()> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
    let store = Arc::new(MemoryStore::with_clock(clock.clone()));
    let hardware = Arc::new(SimulatedHardware::new());
    let scheduler = Arc::new(prepare(device, hardware, store, clock).await?);

    let runner = {
        let scheduler = scheduler.clone();
        tokio::spawn(async move { scheduler.start().await })
    };
    info!("Scheduler running, press Ctrl+C to stop");

    common::shutdown::wait_for_shutdown().await;
    scheduler.stop();
    runner.await?;

    let status = scheduler.status().await;
    info!(
        "Stopped after {} ticks ({} rules, {} channels)",
        status.ticks, status.total_rules, status.total_channels
    );
    Ok(())
}
