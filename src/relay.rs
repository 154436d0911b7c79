//! Relay protection state machine: the last stage of the pipeline, and the
//! only one allowed to disagree with a cooldown guard.

use core::sync::atomic::{AtomicU8, Ordering};

use crate::anomaly::AnomalyKind;
use crate::config::{RelayConfig, RelayLevel};
use crate::error::{CoreError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub enum RelayState {
    Off,
    On,
    Tripped,
}

impl RelayState {
    const fn to_u8(self) -> u8 {
        match self {
            RelayState::Off => 0,
            RelayState::On => 1,
            RelayState::Tripped => 2,
        }
    }

    const fn from_u8(v: u8) -> Self {
        match v {
            1 => RelayState::On,
            2 => RelayState::Tripped,
            _ => RelayState::Off,
        }
    }
}

/// Lock-free mirror of the current [`RelayState`], refreshed alongside every
/// `state` write below. Lets an external observer answer `GetState` without
/// acquiring the controller's mutex, since `get_state` must return the last
/// known state even when that mutex cannot be acquired.
pub static STATE_SHADOW: AtomicU8 = AtomicU8::new(RelayState::Off.to_u8());

/// Reads the lock-free state shadow. Safe to call without holding the
/// controller's mutex.
pub fn shadow_state() -> RelayState {
    RelayState::from_u8(STATE_SHADOW.load(Ordering::Acquire))
}

/// Anything that can drive the relay's digital output line to a level.
/// Implemented for the real GPIO output in the hardware task wiring, and
/// for an in-memory recorder in tests.
pub trait RelayDriver {
    fn drive(&mut self, level: RelayLevel);
}

/// Protection state machine plus its output driver. Exclusively owned by
/// the relay-controller task; the mutex guarding concurrent access lives
/// one layer up, in the task wiring.
pub struct RelayController<D: RelayDriver> {
    driver: D,
    config: RelayConfig,
    state: RelayState,
    last_toggle_ms: u64,
    /// `false` until the first `set_state`/`emergency_cutoff` call. A raw
    /// timestamp comparison can't distinguish "cooldown elapsed" from
    /// "never toggled yet" when construction happens near `now_ms = 0`, so
    /// the very first transition is gated on this flag instead.
    has_toggled: bool,
    trip_count: u32,
    last_trip_reason: AnomalyKind,
}

impl<D: RelayDriver> RelayController<D> {
    /// Drives the GPIO to the inactive (OFF) level before returning, so the
    /// relay starts in its fail-safe state regardless of what the pin was
    /// floating at.
    pub fn new(mut driver: D, config: RelayConfig, now_ms: u64) -> Self {
        driver.drive(config.off_level);
        STATE_SHADOW.store(RelayState::Off.to_u8(), Ordering::Release);
        Self {
            driver,
            config,
            state: RelayState::Off,
            last_toggle_ms: now_ms,
            has_toggled: false,
            trip_count: 0,
            last_trip_reason: AnomalyKind::None,
        }
    }

    pub fn can_toggle(&self, now_ms: u64) -> bool {
        !self.has_toggled || now_ms.saturating_sub(self.last_toggle_ms) >= self.config.cooldown_ms
    }

    pub fn get_state(&self) -> RelayState {
        self.state
    }

    pub fn get_trip_count(&self) -> u32 {
        self.trip_count
    }

    pub fn reset_trip_count(&mut self) {
        self.trip_count = 0;
    }

    /// Commanded transition. Blocked by the cooldown guard unless one side
    /// of the transition is `Tripped`.
    pub fn set_state(&mut self, new_state: RelayState, now_ms: u64) -> Result<()> {
        let bypasses_cooldown = self.state == RelayState::Tripped || new_state == RelayState::Tripped;

        if !bypasses_cooldown && !self.can_toggle(now_ms) {
            return Err(CoreError::InvalidState);
        }

        let level = match new_state {
            RelayState::On => self.config.on_level,
            RelayState::Off | RelayState::Tripped => self.config.off_level,
        };
        self.driver.drive(level);
        self.state = new_state;
        STATE_SHADOW.store(new_state.to_u8(), Ordering::Release);
        self.last_toggle_ms = now_ms;
        self.has_toggled = true;
        Ok(())
    }

    /// Emergency cutoff: always drives the safe level and latches
    /// `Tripped`, bypassing the cooldown guard entirely. Infallible by
    /// design — the only failure mode (mutex acquisition) lives in the task
    /// wiring that holds this controller behind a lock.
    pub fn emergency_cutoff(&mut self, reason: AnomalyKind, now_ms: u64) {
        self.driver.drive(self.config.off_level);
        self.state = RelayState::Tripped;
        STATE_SHADOW.store(RelayState::Tripped.to_u8(), Ordering::Release);
        self.last_toggle_ms = now_ms;
        self.has_toggled = true;
        self.trip_count += 1;
        self.last_trip_reason = reason;
    }

    pub fn last_trip_reason(&self) -> AnomalyKind {
        self.last_trip_reason
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingDriver {
        levels: std::vec::Vec<RelayLevel>,
    }

    impl RelayDriver for RecordingDriver {
        fn drive(&mut self, level: RelayLevel) {
            self.levels.push(level);
        }
    }

    fn config() -> RelayConfig {
        RelayConfig {
            on_level: RelayLevel::High,
            off_level: RelayLevel::Low,
            cooldown_ms: 5000,
            auto_reset_enabled: false,
        }
    }

    #[test]
    fn starts_off_and_drives_off_level_immediately() {
        let ctl = RelayController::new(RecordingDriver::default(), config(), 0);
        assert_eq!(ctl.get_state(), RelayState::Off);
        assert_eq!(ctl.driver.levels, std::vec![RelayLevel::Low]);
    }

    #[test]
    fn cooldown_blocks_toggle_within_window() {
        let mut ctl = RelayController::new(RecordingDriver::default(), config(), 0);
        ctl.set_state(RelayState::On, 0).unwrap();

        let result = ctl.set_state(RelayState::Off, 3000);
        assert_eq!(result, Err(CoreError::InvalidState));
        assert_eq!(ctl.get_state(), RelayState::On);
    }

    #[test]
    fn cooldown_elapsed_allows_toggle() {
        let mut ctl = RelayController::new(RecordingDriver::default(), config(), 0);
        ctl.set_state(RelayState::On, 0).unwrap();
        ctl.set_state(RelayState::Off, 5500).unwrap();
        assert_eq!(ctl.get_state(), RelayState::Off);
    }

    #[test]
    fn emergency_cutoff_bypasses_cooldown_and_trips() {
        let mut ctl = RelayController::new(RecordingDriver::default(), config(), 0);
        ctl.set_state(RelayState::On, 0).unwrap();
        ctl.emergency_cutoff(AnomalyKind::ShortCircuit, 100);

        assert_eq!(ctl.get_state(), RelayState::Tripped);
        assert_eq!(ctl.get_trip_count(), 1);
        assert_eq!(ctl.last_trip_reason(), AnomalyKind::ShortCircuit);
        assert_eq!(*ctl.driver.levels.last().unwrap(), RelayLevel::Low);
    }

    #[test]
    fn set_state_out_of_tripped_bypasses_cooldown() {
        let mut ctl = RelayController::new(RecordingDriver::default(), config(), 0);
        ctl.emergency_cutoff(AnomalyKind::Overcurrent, 10);
        // Immediately, no cooldown wait, transitioning out of TRIPPED works.
        ctl.set_state(RelayState::Off, 11).unwrap();
        assert_eq!(ctl.get_state(), RelayState::Off);
    }

    #[test]
    fn reset_trip_count_clears_counter_only() {
        let mut ctl = RelayController::new(RecordingDriver::default(), config(), 0);
        ctl.emergency_cutoff(AnomalyKind::WireFire, 0);
        ctl.reset_trip_count();
        assert_eq!(ctl.get_trip_count(), 0);
        assert_eq!(ctl.get_state(), RelayState::Tripped);
    }
}
