//! Multi-rule anomaly detector with hysteresis and an adaptive baseline.
//!
//! `Detector::analyze` evaluates the rules in priority order and returns at
//! most one event per window; once a rule hits, later rules are not
//! evaluated.

use crate::config::{
    ANOMALY_CONFIRM_COUNT, BASELINE_EMA_ALPHA, FIRE_HISTORY_SIZE, I_OVER, I_SHORT, P_FIRE_MIN,
    TEMP_RISE_THRESHOLD, V_MAX, V_MIN,
};
use crate::power::PowerRecord;

/// The closed tag set of fault kinds this detector can classify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub enum AnomalyKind {
    None,
    Overcurrent,
    ShortCircuit,
    WireFire,
    Overvoltage,
    Undervoltage,
}

impl AnomalyKind {
    /// Human-readable form used both in log lines and in the publisher
    /// payload's `anomaly_type` field.
    pub const fn as_str(self) -> &'static str {
        match self {
            AnomalyKind::None => "NONE",
            AnomalyKind::Overcurrent => "OVERCURRENT",
            AnomalyKind::ShortCircuit => "SHORT_CIRCUIT",
            AnomalyKind::WireFire => "WIRE_FIRE",
            AnomalyKind::Overvoltage => "OVERVOLTAGE",
            AnomalyKind::Undervoltage => "UNDERVOLTAGE",
        }
    }

    /// Whether this kind should actuate the relay. Voltage anomalies are
    /// reported but never trip.
    pub const fn triggers_relay(self) -> bool {
        matches!(
            self,
            AnomalyKind::ShortCircuit | AnomalyKind::Overcurrent | AnomalyKind::WireFire
        )
    }
}

impl core::fmt::Display for AnomalyKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified fault, carrying the electrical quantities observed at
/// detection time.
#[derive(Debug, Clone, Copy, PartialEq, defmt::Format)]
pub struct AnomalyEvent {
    pub kind: AnomalyKind,
    pub current_amps: f32,
    pub voltage_volts: f32,
    pub power_watts: f32,
    pub timestamp_ms: u64,
    /// Set by the relay controller after it actuates on this event.
    pub relay_triggered: bool,
}

impl AnomalyEvent {
    fn from_record(kind: AnomalyKind, record: &PowerRecord) -> Self {
        Self {
            kind,
            current_amps: record.i_rms,
            voltage_volts: record.v_rms,
            power_watts: record.power_real,
            timestamp_ms: record.timestamp_ms,
            relay_triggered: false,
        }
    }
}

/// Hysteretic overcurrent counter: increments on every over-threshold
/// window, resets on the first sub-threshold window, fires only once it
/// reaches `ANOMALY_CONFIRM_COUNT`.
#[derive(Debug, Clone, Copy, Default)]
struct OvercurrentState {
    count: u32,
}

impl OvercurrentState {
    fn observe(&mut self, i_rms: f32) -> bool {
        if i_rms > I_OVER {
            self.count += 1;
            self.count >= ANOMALY_CONFIRM_COUNT
        } else {
            self.count = 0;
            false
        }
    }

    fn reset(&mut self) {
        self.count = 0;
    }
}

/// Adaptive thermal-runaway detector: tracks a trailing ring of real-power
/// readings against a slow-moving baseline.
#[derive(Debug, Clone, Copy)]
struct FireDetectorState {
    history: [f32; FIRE_HISTORY_SIZE],
    index: usize,
    buffer_full: bool,
    baseline_power: f32,
}

impl Default for FireDetectorState {
    fn default() -> Self {
        Self {
            history: [0.0; FIRE_HISTORY_SIZE],
            index: 0,
            buffer_full: false,
            baseline_power: 0.0,
        }
    }
}

impl FireDetectorState {
    fn observe(&mut self, power_real: f32) -> bool {
        self.history[self.index] = power_real;
        self.index = (self.index + 1) % FIRE_HISTORY_SIZE;
        if self.index == 0 {
            self.buffer_full = true;
        }

        if !self.buffer_full {
            return false;
        }

        let avg: f32 = self.history.iter().sum::<f32>() / FIRE_HISTORY_SIZE as f32;

        if self.baseline_power < 1.0 {
            self.baseline_power = avg;
            return false;
        }

        let ratio = avg / self.baseline_power;
        if ratio > TEMP_RISE_THRESHOLD && avg > P_FIRE_MIN {
            return true;
        }

        self.baseline_power = self.baseline_power * (1.0 - BASELINE_EMA_ALPHA) + avg * BASELINE_EMA_ALPHA;
        false
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Voltage-anomaly classification, reported but excluded from the relay
/// dispatch path by design.
fn classify_voltage(v_rms: f32) -> Option<AnomalyKind> {
    if v_rms < V_MIN {
        Some(AnomalyKind::Undervoltage)
    } else if v_rms > V_MAX {
        Some(AnomalyKind::Overvoltage)
    } else {
        None
    }
}

/// Owns the stateful rules (overcurrent hysteresis, fire-detector
/// baseline). Exclusively owned by the anomaly-detector task; no locking
/// needed.
#[derive(Debug, Clone, Copy, Default)]
pub struct Detector {
    overcurrent: OvercurrentState,
    fire: FireDetectorState,
}

impl Detector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluate all rules in priority order against one power record.
    /// Returns the first rule that fires, or a voltage-only report via
    /// [`Detector::voltage_report`] if only a non-actuating anomaly is
    /// present.
    pub fn analyze(&mut self, record: &PowerRecord) -> Option<AnomalyEvent> {
        if record.i_rms > I_SHORT {
            return Some(AnomalyEvent::from_record(AnomalyKind::ShortCircuit, record));
        }

        if self.overcurrent.observe(record.i_rms) {
            return Some(AnomalyEvent::from_record(AnomalyKind::Overcurrent, record));
        }

        if self.fire.observe(record.power_real) {
            return Some(AnomalyEvent::from_record(AnomalyKind::WireFire, record));
        }

        None
    }

    /// Separate, non-dispatching report of voltage anomalies: always
    /// evaluated regardless of whether `analyze` already found a relay-
    /// triggering fault, so voltage conditions stay visible in logs/
    /// publishing without ever reaching the relay controller.
    pub fn voltage_report(&self, record: &PowerRecord) -> Option<AnomalyEvent> {
        classify_voltage(record.v_rms).map(|kind| AnomalyEvent::from_record(kind, record))
    }

    pub fn reset(&mut self) {
        self.overcurrent.reset();
        self.fire.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(i_rms: f32, v_rms: f32, power_real: f32) -> PowerRecord {
        PowerRecord {
            v_rms,
            i_rms,
            power_apparent: v_rms * i_rms,
            power_real,
            power_factor: 1.0,
            timestamp_ms: 0,
        }
    }

    #[test]
    fn short_circuit_fires_instantly_without_hysteresis() {
        let mut det = Detector::new();
        let event = det.analyze(&record(60.0, 220.0, 220.0 * 60.0)).unwrap();
        assert_eq!(event.kind, AnomalyKind::ShortCircuit);
    }

    #[test]
    fn overcurrent_requires_confirm_count_consecutive_windows() {
        let mut det = Detector::new();
        assert!(det.analyze(&record(17.0, 220.0, 100.0)).is_none());
        assert!(det.analyze(&record(17.0, 220.0, 100.0)).is_none());
        let event = det.analyze(&record(17.0, 220.0, 100.0)).unwrap();
        assert_eq!(event.kind, AnomalyKind::Overcurrent);
    }

    #[test]
    fn overcurrent_counter_resets_below_threshold() {
        let mut det = Detector::new();
        det.analyze(&record(17.0, 220.0, 100.0));
        det.analyze(&record(17.0, 220.0, 100.0));
        // Sub-threshold window resets the counter.
        assert!(det.analyze(&record(9.0, 220.0, 100.0)).is_none());
        assert!(det.analyze(&record(17.0, 220.0, 100.0)).is_none());
    }

    #[test]
    fn wire_fire_never_fires_before_history_full() {
        let mut det = Detector::new();
        for _ in 0..(FIRE_HISTORY_SIZE - 1) {
            assert!(det.analyze(&record(1.0, 220.0, 3000.0)).is_none());
        }
    }

    #[test]
    fn wire_fire_fires_on_thermal_runaway_ramp() {
        let mut det = Detector::new();
        for _ in 0..FIRE_HISTORY_SIZE {
            assert!(det.analyze(&record(1.0, 220.0, 1000.0)).is_none());
        }

        let ramp = [2000.0, 2200.0, 2400.0, 2500.0, 2600.0];
        let mut fired = false;
        for power in ramp {
            if let Some(event) = det.analyze(&record(1.0, 220.0, power)) {
                assert_eq!(event.kind, AnomalyKind::WireFire);
                fired = true;
                break;
            }
        }
        assert!(fired, "expected wire fire to trip during the power ramp");
    }

    #[test]
    fn wire_fire_never_fires_at_or_below_min_power() {
        let mut det = Detector::new();
        for _ in 0..(FIRE_HISTORY_SIZE * 3) {
            assert!(det.analyze(&record(1.0, 220.0, P_FIRE_MIN)).is_none());
        }
    }

    #[test]
    fn voltage_anomaly_is_reported_but_not_dispatched() {
        let mut det = Detector::new();
        let rec = record(3.0, 170.0, 510.0);
        assert!(det.analyze(&rec).is_none());
        let report = det.voltage_report(&rec).unwrap();
        assert_eq!(report.kind, AnomalyKind::Undervoltage);
        assert!(!report.kind.triggers_relay());
    }

    #[test]
    fn overvoltage_is_reported() {
        let det = Detector::new();
        let rec = record(3.0, 260.0, 780.0);
        let report = det.voltage_report(&rec).unwrap();
        assert_eq!(report.kind, AnomalyKind::Overvoltage);
    }

    #[test]
    fn reset_clears_all_stateful_rules() {
        let mut det = Detector::new();
        det.analyze(&record(17.0, 220.0, 100.0));
        det.analyze(&record(17.0, 220.0, 100.0));
        det.reset();
        // After reset, two more sub-threshold-confirm windows should not
        // fire (counter was cleared, not merely decremented).
        assert!(det.analyze(&record(17.0, 220.0, 100.0)).is_none());
        assert!(det.analyze(&record(17.0, 220.0, 100.0)).is_none());
    }
}
