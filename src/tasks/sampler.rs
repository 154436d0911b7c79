//! Periodic ADC sampler: the highest-priority task in the pipeline.
//!
//! A ticker-driven polling loop over the two analog channels (current,
//! voltage), writing straight into the shared [`SampleBuffer`] instead of a
//! pubsub/watch pair.

use defmt::{debug, warn};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex;
use embassy_time::{with_timeout, Duration, Instant, Ticker};
use esp_hal::analog::adc::{Adc, AdcPin};
use esp_hal::peripherals::ADC1;

use crate::config::{BUFFER_WRITE_TIMEOUT_MS, SAMPLE_PERIOD_MS};
use crate::sample::SampleBuffer;

use super::watchdog;

pub type CurrentPin = esp_hal::peripherals::GPIO0<'static>;
pub type VoltagePin = esp_hal::peripherals::GPIO1<'static>;

pub type CurrentAdcPin = AdcPin<CurrentPin, ADC1<'static>>;
pub type VoltageAdcPin = AdcPin<VoltagePin, ADC1<'static>>;

/// One-time zero-current self-calibration: averages the current channel's
/// reading over a run of samples with no load attached, so a caller can
/// refine [`crate::config::CalibrationConfig::current_zero_offset_v`] before
/// the pipeline starts trusting its readings. Gated on a "no load attached"
/// precondition that this crate does not attempt to verify itself. Called
/// from startup, before `sampler_task` is spawned, on the same ADC and pin
/// handle that is then handed to the task.
pub async fn calibrate_zero_offset(
    adc: &mut Adc<'static, ADC1<'static>, esp_hal::Blocking>,
    pin: &mut CurrentAdcPin,
    full_scale_mv: u32,
    max_code: u32,
    samples: usize,
) -> f32 {
    let mut sum_mv: u64 = 0;
    for _ in 0..samples {
        let code = adc.read_oneshot(pin).await as u32;
        sum_mv += (code * full_scale_mv / max_code) as u64;
    }
    (sum_mv as f32 / samples as f32) / 1000.0
}

#[embassy_executor::task]
pub async fn sampler_task(
    mut adc: Adc<'static, ADC1<'static>, esp_hal::Async>,
    mut adc_current: CurrentAdcPin,
    mut adc_voltage: VoltageAdcPin,
    buffer: &'static Mutex<CriticalSectionRawMutex, SampleBuffer>,
) {
    let mut ticker = Ticker::every(Duration::from_millis(SAMPLE_PERIOD_MS));
    let started_at = Instant::now();
    let mut ticks: u64 = 0;

    loop {
        let current_code = adc.read_oneshot(&mut adc_current).await;
        let voltage_code = adc.read_oneshot(&mut adc_voltage).await;

        let write_budget = Duration::from_millis(BUFFER_WRITE_TIMEOUT_MS);
        match with_timeout(write_budget, buffer.lock()).await {
            Ok(mut guard) => guard.write(current_code, voltage_code),
            Err(_) => warn!("sample buffer write timed out, dropping this tick"),
        }
        watchdog::heartbeat(watchdog::TaskId::Sampler);

        ticks += 1;
        if ticks % 1000 == 0 {
            debug!(
                "sampler alive, {} ticks since {}",
                ticks,
                started_at.elapsed().as_millis()
            );
        }

        ticker.next().await;
    }
}
