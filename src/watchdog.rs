//! Watchdog state machine (§4.6).
//!
//! A magic-pattern channel decouples the host from the controller: writing
//! `0x88CD` arms/retriggers, writing its bitwise complement disables. This
//! mirrors the teacher's old-style register state machines
//! (`drivers/virtio/mod.rs`'s `device::Status` bitmask progression) in
//! spirit: a tiny set of legal register values driving a small explicit
//! state machine, rather than free-form integer state.

use log::warn;

/// The magic arm pattern (§4.6, §ecos GLOSSARY).
pub const WATCHDOG_ARM_PATTERN: u32 = 0x88CD;

/// What happens to outgoing frames once the alarm latches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlarmMode {
    /// Suppress TX entirely for subsequent cycles.
    AlarmDisableTx,
    /// Keep sending, but zero every outgoing payload (header preserved).
    AlarmSendEmpty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WatchdogState {
    /// Reset value; distinguishes "never armed" from "disabled after arming".
    Reset,
    Armed,
    Disabled,
    Alarmed,
}

/// The watchdog's full runtime state (§4.6).
#[derive(Debug, Clone, Copy)]
pub struct Watchdog {
    state: WatchdogState,
    reload_value: u32,
    counter: u32,
    mode: AlarmMode,
}

impl Watchdog {
    pub fn new(mode: AlarmMode) -> Self {
        Self {
            state: WatchdogState::Reset,
            reload_value: 0,
            counter: 0,
            mode,
        }
    }

    /// Handles a host write to `WDCSR`'s magic-pattern field (§4.6).
    pub fn write_wdcsr(&mut self, pattern: u32, reload_value: u32) {
        if pattern == WATCHDOG_ARM_PATTERN {
            self.reload_value = reload_value;
            self.counter = reload_value;
            if self.state != WatchdogState::Alarmed {
                self.state = WatchdogState::Armed;
            }
        } else if pattern == !WATCHDOG_ARM_PATTERN {
            self.state = WatchdogState::Disabled;
            self.counter = 0;
        }
        // Any other pattern is ignored: the host is expected to write
        // exactly the arm pattern or its complement every cycle.
    }

    /// Ticks the watchdog once per cycle (§4.5 prepare-phase step 2).
    /// Returns `true` the cycle the alarm first latches.
    pub fn tick(&mut self) -> bool {
        match self.state {
            WatchdogState::Reset | WatchdogState::Disabled => false,
            WatchdogState::Alarmed => false,
            WatchdogState::Armed => {
                if self.counter == 0 {
                    self.state = WatchdogState::Alarmed;
                    warn!("watchdog alarm latched, mode {:?}", self.mode);
                    true
                } else {
                    self.counter -= 1;
                    if self.counter == 0 {
                        self.state = WatchdogState::Alarmed;
                        warn!("watchdog alarm latched, mode {:?}", self.mode);
                        true
                    } else {
                        false
                    }
                }
            }
        }
    }

    pub fn is_alarmed(&self) -> bool {
        self.state == WatchdogState::Alarmed
    }

    pub fn mode(&self) -> AlarmMode {
        self.mode
    }

    pub fn counter(&self) -> u32 {
        self.counter
    }

    /// Whether TX should be suppressed this cycle given the current alarm
    /// state and mode (§4.6).
    pub fn suppress_tx(&self) -> bool {
        self.is_alarmed() && self.mode == AlarmMode::AlarmDisableTx
    }

    /// Whether outgoing payloads should be zeroed (header preserved).
    pub fn zero_payloads(&self) -> bool {
        self.is_alarmed() && self.mode == AlarmMode::AlarmSendEmpty
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arming_then_ticking_to_zero_latches_alarm() {
        let mut wd = Watchdog::new(AlarmMode::AlarmDisableTx);
        wd.write_wdcsr(WATCHDOG_ARM_PATTERN, 2);
        assert!(!wd.tick());
        assert!(wd.tick());
        assert!(wd.is_alarmed());
        assert!(wd.suppress_tx());
    }

    #[test]
    fn retriggering_resets_counter() {
        let mut wd = Watchdog::new(AlarmMode::AlarmSendEmpty);
        wd.write_wdcsr(WATCHDOG_ARM_PATTERN, 3);
        wd.tick();
        wd.write_wdcsr(WATCHDOG_ARM_PATTERN, 3);
        assert_eq!(wd.counter(), 3);
        assert!(!wd.is_alarmed());
    }

    #[test]
    fn disable_pattern_stops_ticking() {
        let mut wd = Watchdog::new(AlarmMode::AlarmDisableTx);
        wd.write_wdcsr(WATCHDOG_ARM_PATTERN, 1);
        wd.write_wdcsr(!WATCHDOG_ARM_PATTERN, 0);
        assert!(!wd.tick());
        assert!(!wd.is_alarmed());
    }

    #[test]
    fn idempotent_rearm_same_pattern_twice() {
        let mut wd = Watchdog::new(AlarmMode::AlarmSendEmpty);
        wd.write_wdcsr(WATCHDOG_ARM_PATTERN, 5);
        wd.write_wdcsr(WATCHDOG_ARM_PATTERN, 5);
        assert_eq!(wd.counter(), 5);
    }
}
