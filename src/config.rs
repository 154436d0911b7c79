//! Tunable constants and calibration structs for the protection pipeline.
//!
//! Collected in one module as plain structs of tunables with a `Default`
//! impl holding the nominal/measured values, constructed once at startup
//! and handed to the owning task.

/// Sampler period in milliseconds. Nominally a 2 kHz request, but the
/// scheduler pins the sampling task at this period, yielding ~1 kHz; that
/// is the value this crate treats as canonical.
pub const SAMPLE_PERIOD_MS: u64 = 1;

/// One measurement window, in raw sample pairs: ~10 mains cycles at the
/// 1 kHz sampler period.
pub const WINDOW_SIZE: usize = 400;

/// Sample buffer capacity: twice the window, so one window can be computed
/// from the previous half while the sampler fills the other.
pub const SAMPLE_BUFFER_CAPACITY: usize = 2 * WINDOW_SIZE;

/// Power-compute task period, in milliseconds.
pub const POWER_COMPUTE_PERIOD_MS: u64 = 200;

/// Sample-buffer write acquire budget.
pub const BUFFER_WRITE_TIMEOUT_MS: u64 = 10;
/// Sample-buffer read acquire budget.
pub const BUFFER_READ_TIMEOUT_MS: u64 = 100;
/// Relay mutex acquire budget.
pub const RELAY_LOCK_TIMEOUT_MS: u64 = 100;

/// Short-circuit threshold, amperes.
pub const I_SHORT: f32 = 50.0;
/// Overcurrent threshold, amperes.
pub const I_OVER: f32 = 15.0;
/// Consecutive overcurrent windows required to confirm the rule.
pub const ANOMALY_CONFIRM_COUNT: u32 = 3;

/// Wire-fire detector history depth, in windows.
pub const FIRE_HISTORY_SIZE: usize = 10;
/// Minimum real power, watts, below which wire-fire never fires.
pub const P_FIRE_MIN: f32 = 2100.0;
/// Ratio of trailing average to baseline that trips wire-fire.
pub const TEMP_RISE_THRESHOLD: f32 = 1.5;
/// Baseline EMA weight applied to the new average each window.
pub const BASELINE_EMA_ALPHA: f32 = 0.1;

/// Undervoltage threshold, volts.
pub const V_MIN: f32 = 190.0;
/// Overvoltage threshold, volts.
pub const V_MAX: f32 = 250.0;

/// Relay cooldown between commanded (non-emergency) transitions, ms.
pub const RELAY_COOLDOWN_MS: u64 = 5000;

/// Watchdog reset timeout, seconds, if any task stops servicing its loop.
pub const WATCHDOG_TIMEOUT_S: u64 = 30;

/// Relay task's idle heartbeat period, ms: well under the watchdog timeout
/// so a long stretch with no anomaly or external request still counts as
/// progress rather than looking like a hang.
pub const RELAY_HEARTBEAT_PERIOD_MS: u64 = 1000;

/// Inter-task queue depths.
pub const POWER_QUEUE_DEPTH: usize = 5;
pub const ANOMALY_QUEUE_DEPTH: usize = 10;
pub const NETWORK_ANOMALY_QUEUE_DEPTH: usize = 20;
pub const NETWORK_POWER_QUEUE_DEPTH: usize = 5;

/// ADC full-scale reference voltage, millivolts, and resolution.
pub const ADC_FULL_SCALE_MV: u32 = 3300;
pub const ADC_MAX_CODE: u32 = 4095;

/// Sample count for the startup zero-offset self-calibration.
pub const ZERO_OFFSET_CALIBRATION_SAMPLES: usize = 256;

/// Selectable Hall-effect current sensor sensitivities, volts per ampere.
#[derive(Debug, Clone, Copy, PartialEq, defmt::Format)]
pub enum CurrentSensorVariant {
    /// ACS712-30A
    Sensitivity066,
    /// ACS712-20A
    Sensitivity100,
    /// ACS712-05B
    Sensitivity185,
}

impl CurrentSensorVariant {
    pub const fn sensitivity_v_per_a(self) -> f32 {
        match self {
            CurrentSensorVariant::Sensitivity066 => 0.066,
            CurrentSensorVariant::Sensitivity100 => 0.100,
            CurrentSensorVariant::Sensitivity185 => 0.185,
        }
    }
}

/// A two-point ADC-code to millivolt calibration curve, with a fallback to
/// the plain linear map when no calibration data is available.
#[derive(Debug, Clone, Copy, defmt::Format)]
pub struct CalibrationTable {
    /// (code, millivolts) pairs used to interpolate. `None` means "use the
    /// linear fallback unconditionally".
    pub points: Option<(u32, u32, u32, u32)>,
}

impl CalibrationTable {
    pub const fn linear_fallback() -> Self {
        Self { points: None }
    }

    /// Convert a raw ADC code to millivolts.
    pub fn code_to_millivolts(&self, code: u32) -> u32 {
        match self.points {
            Some((code_lo, mv_lo, code_hi, mv_hi)) if code_hi != code_lo => {
                let span_code = code_hi - code_lo;
                let span_mv = mv_hi as i64 - mv_lo as i64;
                let offset = code as i64 - code_lo as i64;
                (mv_lo as i64 + offset * span_mv / span_code as i64).max(0) as u32
            }
            _ => code * ADC_FULL_SCALE_MV / ADC_MAX_CODE,
        }
    }
}

impl Default for CalibrationTable {
    fn default() -> Self {
        Self::linear_fallback()
    }
}

/// Calibration constants applied when deriving `CalibratedSample` from a
/// `RawSample`.
#[derive(Debug, Clone, Copy, defmt::Format)]
pub struct CalibrationConfig {
    pub current_cal: CalibrationTable,
    pub voltage_cal: CalibrationTable,
    pub current_sensor: CurrentSensorVariant,
    /// Zero-current bias of the current sensor, volts (nominal 2.5 V).
    pub current_zero_offset_v: f32,
    /// Voltage transformer divider ratio (nominal 1000 for a 1:1000 VT).
    pub voltage_scaling_factor: f32,
    /// Fine-tune multiplier applied on top of the divider ratio.
    pub voltage_fine_calibration: f32,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            current_cal: CalibrationTable::linear_fallback(),
            voltage_cal: CalibrationTable::linear_fallback(),
            current_sensor: CurrentSensorVariant::Sensitivity100,
            current_zero_offset_v: 2.5,
            voltage_scaling_factor: 1000.0,
            voltage_fine_calibration: 1.0,
        }
    }
}

/// GPIO drive level for each relay state. The fail-safe side is always OFF;
/// which physical level that corresponds to is board wiring, hence
/// configurable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub enum RelayLevel {
    Low,
    High,
}

#[derive(Debug, Clone, Copy, defmt::Format)]
pub struct RelayConfig {
    pub on_level: RelayLevel,
    pub off_level: RelayLevel,
    pub cooldown_ms: u64,
    pub auto_reset_enabled: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            on_level: RelayLevel::High,
            off_level: RelayLevel::Low,
            cooldown_ms: RELAY_COOLDOWN_MS,
            auto_reset_enabled: false,
        }
    }
}
