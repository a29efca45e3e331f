//! Hardware I/O abstraction
//!
//! Channels of kind Input/Output/AnalogInput reach their pins only through
//! this trait. `SimulatedHardware` backs tests and the simulator with an
//! in-memory pin table.

use parking_lot::Mutex;
use std::collections::HashMap;

/// Pin direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinMode {
    Input,
    Output,
}

/// Digital/analog pin access
pub trait Hardware: Send + Sync + 'static {
    fn pin_mode(&self, pin: u32, mode: PinMode);
    fn digital_read(&self, pin: u32) -> bool;
    fn digital_write(&self, pin: u32, level: bool);
    fn analog_read(&self, pin: u32) -> i64;
}

/// Hardware with no pins: reads are low/zero, writes are dropped
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHardware;

impl Hardware for NoHardware {
    fn pin_mode(&self, _pin: u32, _mode: PinMode) {}

    fn digital_read(&self, _pin: u32) -> bool {
        false
    }

    fn digital_write(&self, _pin: u32, _level: bool) {}

    fn analog_read(&self, _pin: u32) -> i64 {
        0
    }
}

#[derive(Debug, Default)]
struct PinTable {
    modes: HashMap<u32, PinMode>,
    digital: HashMap<u32, bool>,
    analog: HashMap<u32, i64>,
    writes: Vec<(u32, bool)>,
    reads: u64,
}

/// In-memory pin table
#[derive(Debug, Default)]
pub struct SimulatedHardware {
    pins: Mutex<PinTable>,
}

impl SimulatedHardware {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drive a digital input level
    pub fn set_digital(&self, pin: u32, level: bool) {
        self.pins.lock().digital.insert(pin, level);
    }

    /// Drive an analog input reading
    pub fn set_analog(&self, pin: u32, reading: i64) {
        self.pins.lock().analog.insert(pin, reading);
    }

    /// Current level of a digital pin
    pub fn level(&self, pin: u32) -> bool {
        self.pins.lock().digital.get(&pin).copied().unwrap_or(false)
    }

    pub fn mode(&self, pin: u32) -> Option<PinMode> {
        self.pins.lock().modes.get(&pin).copied()
    }

    /// Every `digital_write` so far, in order
    pub fn writes(&self) -> Vec<(u32, bool)> {
        self.pins.lock().writes.clone()
    }

    /// Number of digital and analog reads so far
    pub fn read_count(&self) -> u64 {
        self.pins.lock().reads
    }
}

impl Hardware for SimulatedHardware {
    fn pin_mode(&self, pin: u32, mode: PinMode) {
        self.pins.lock().modes.insert(pin, mode);
    }

    fn digital_read(&self, pin: u32) -> bool {
        let mut pins = self.pins.lock();
        pins.reads += 1;
        pins.digital.get(&pin).copied().unwrap_or(false)
    }

    fn digital_write(&self, pin: u32, level: bool) {
        let mut pins = self.pins.lock();
        pins.digital.insert(pin, level);
        pins.writes.push((pin, level));
    }

    fn analog_read(&self, pin: u32) -> i64 {
        let mut pins = self.pins.lock();
        pins.reads += 1;
        pins.analog.get(&pin).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simulated_pins() {
        let hw = SimulatedHardware::new();
        hw.pin_mode(2, PinMode::Output);
        hw.digital_write(2, true);
        hw.set_analog(34, 512);

        assert_eq!(hw.mode(2), Some(PinMode::Output));
        assert!(hw.level(2));
        assert_eq!(hw.analog_read(34), 512);
        assert!(!hw.digital_read(5));
        assert_eq!(hw.writes(), vec![(2, true)]);
        assert_eq!(hw.read_count(), 2);
    }

    #[test]
    fn test_no_hardware() {
        NoHardware.digital_write(1, true);
        assert!(!NoHardware.digital_read(1));
        assert_eq!(NoHardware.analog_read(1), 0);
    }
}
