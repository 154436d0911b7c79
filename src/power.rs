//! Windowed RMS / power / power-factor compute stage.
//!
//! `compute` is a pure function of one window of calibrated samples: same
//! input always yields the same output, and it mutates nothing but its own
//! return value.

use crate::config::CalibrationConfig;
use crate::error::{CoreError, Result};
use crate::sample::RawSample;

/// One window's worth of electrical measurements.
#[derive(Debug, Clone, Copy, PartialEq, defmt::Format)]
pub struct PowerRecord {
    pub v_rms: f32,
    pub i_rms: f32,
    pub power_apparent: f32,
    pub power_real: f32,
    pub power_factor: f32,
    pub timestamp_ms: u64,
}

/// Guard below which voltage/current variance is treated as "no meaningful
/// signal" and power factor defaults to unity.
const DEGENERATE_VARIANCE_GUARD: f32 = 1e-3;

/// Compute RMS voltage, RMS current, apparent/real power, and power factor
/// for one window of raw samples, given the current timestamp in
/// milliseconds since boot.
///
/// Returns `InvalidArgument` for an empty window; otherwise infallible.
pub fn compute(samples: &[RawSample], cal: &CalibrationConfig, timestamp_ms: u64) -> Result<PowerRecord> {
    if samples.is_empty() {
        return Err(CoreError::InvalidArgument);
    }

    let n = samples.len() as f32;

    let mut sum_v_sq = 0.0f32;
    let mut sum_i_sq = 0.0f32;
    let mut sum_v = 0.0f32;
    let mut sum_i = 0.0f32;

    for s in samples {
        let c = s.calibrate(cal);
        sum_v += c.voltage_volts;
        sum_i += c.current_amps;
        sum_v_sq += c.voltage_volts * c.voltage_volts;
        sum_i_sq += c.current_amps * c.current_amps;
    }

    let v_rms = libm::sqrtf(sum_v_sq / n);
    let i_rms = libm::sqrtf(sum_i_sq / n);

    let v_mean = sum_v / n;
    let i_mean = sum_i / n;

    let mut covariance = 0.0f32;
    let mut v_variance = 0.0f32;
    let mut i_variance = 0.0f32;

    for s in samples {
        let c = s.calibrate(cal);
        let dv = c.voltage_volts - v_mean;
        let di = c.current_amps - i_mean;
        covariance += dv * di;
        v_variance += dv * dv;
        i_variance += di * di;
    }

    let denom = libm::sqrtf(v_variance * i_variance);
    let power_factor = if denom < DEGENERATE_VARIANCE_GUARD {
        1.0
    } else {
        (covariance / denom).abs().clamp(0.0, 1.0)
    };

    let power_apparent = v_rms * i_rms;
    let power_real = power_apparent * power_factor;

    Ok(PowerRecord {
        v_rms,
        i_rms,
        power_apparent,
        power_real,
        power_factor,
        timestamp_ms,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CalibrationConfig, CurrentSensorVariant};

    /// Build a window of W in-phase 60 Hz sine samples for the given RMS
    /// current/voltage, encoded back through the calibration the test uses
    /// so `compute` recovers approximately the same RMS values.
    fn sine_window(
        window: usize,
        sample_rate_hz: f32,
        i_rms: f32,
        v_rms: f32,
        cal: &CalibrationConfig,
    ) -> std::vec::Vec<RawSample> {
        let i_peak = i_rms * core::f32::consts::SQRT_2;
        let v_peak = v_rms * core::f32::consts::SQRT_2;

        (0..window)
            .map(|n| {
                let t = n as f32 / sample_rate_hz;
                let phase = 2.0 * core::f32::consts::PI * 60.0 * t;
                let i = i_peak * libm::sinf(phase);
                let v = v_peak * libm::sinf(phase);

                let current_v = i * cal.current_sensor.sensitivity_v_per_a()
                    + cal.current_zero_offset_v;
                let voltage_v = v / (cal.voltage_scaling_factor * cal.voltage_fine_calibration);

                let current_code =
                    ((current_v * 1000.0) * 4095.0 / 3300.0).round().clamp(0.0, 4095.0) as u16;
                let voltage_code =
                    ((voltage_v * 1000.0) * 4095.0 / 3300.0).round().clamp(0.0, 4095.0) as u16;

                RawSample {
                    current_code,
                    voltage_code,
                }
            })
            .collect()
    }

    fn test_calibration() -> CalibrationConfig {
        CalibrationConfig {
            current_sensor: CurrentSensorVariant::Sensitivity100,
            ..CalibrationConfig::default()
        }
    }

    #[test]
    fn clean_sinusoid_resistive_load() {
        let cal = test_calibration();
        let samples = sine_window(400, 1000.0, 3.536, 220.0, &cal);

        let record = compute(&samples, &cal, 1_000).unwrap();

        assert!((record.i_rms - 3.536).abs() < 0.05, "i_rms={}", record.i_rms);
        assert!((record.v_rms - 220.0).abs() < 1.0, "v_rms={}", record.v_rms);
        assert!(record.power_factor >= 0.98, "pf={}", record.power_factor);
        assert!(
            (record.power_real - 778.0).abs() < 20.0,
            "power_real={}",
            record.power_real
        );
    }

    #[test]
    fn apparent_power_equals_v_times_i() {
        let cal = test_calibration();
        let samples = sine_window(400, 1000.0, 5.0, 230.0, &cal);
        let record = compute(&samples, &cal, 0).unwrap();

        let expected = record.v_rms * record.i_rms;
        assert!((record.power_apparent - expected).abs() / expected < 1e-6);
    }

    #[test]
    fn power_factor_is_always_in_unit_range() {
        let cal = test_calibration();
        let samples = sine_window(400, 1000.0, 7.0, 220.0, &cal);
        let record = compute(&samples, &cal, 0).unwrap();
        assert!((0.0..=1.0).contains(&record.power_factor));
    }

    #[test]
    fn pure_function_same_input_same_output() {
        let cal = test_calibration();
        let samples = sine_window(400, 1000.0, 4.2, 225.0, &cal);
        let a = compute(&samples, &cal, 10).unwrap();
        let b = compute(&samples, &cal, 10).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn empty_window_is_invalid_argument() {
        let cal = test_calibration();
        let result = compute(&[], &cal, 0);
        assert_eq!(result, Err(CoreError::InvalidArgument));
    }

    #[test]
    fn degenerate_flat_window_returns_unity_power_factor() {
        let cal = test_calibration();
        let samples = [RawSample {
            current_code: 2048,
            voltage_code: 2048,
        }; 400];
        let record = compute(&samples, &cal, 0).unwrap();
        assert_eq!(record.power_factor, 1.0);
    }
}
