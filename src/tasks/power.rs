//! Power-compute task: wakes every 200 ms, snapshots one window from the
//! sample buffer, and runs the pure [`crate::power::compute`].

use defmt::warn;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_sync::mutex::Mutex;
use embassy_time::{with_timeout, Duration, Instant, Ticker};

use crate::config::{CalibrationConfig, BUFFER_READ_TIMEOUT_MS, POWER_COMPUTE_PERIOD_MS, WINDOW_SIZE};
use crate::power::{self, PowerRecord};
use crate::sample::{RawSample, SampleBuffer};

use super::watchdog;

pub type PowerChannel = Channel<CriticalSectionRawMutex, PowerRecord, { crate::config::POWER_QUEUE_DEPTH }>;
pub type NetworkPowerChannel =
    Channel<CriticalSectionRawMutex, PowerRecord, { crate::config::NETWORK_POWER_QUEUE_DEPTH }>;

#[embassy_executor::task]
pub async fn power_task(
    buffer: &'static Mutex<CriticalSectionRawMutex, SampleBuffer>,
    cal: CalibrationConfig,
    out_anomaly: &'static PowerChannel,
    out_network: &'static NetworkPowerChannel,
) {
    let mut ticker = Ticker::every(Duration::from_millis(POWER_COMPUTE_PERIOD_MS));
    let mut current = [0u16; WINDOW_SIZE];
    let mut voltage = [0u16; WINDOW_SIZE];

    loop {
        let read_budget = Duration::from_millis(BUFFER_READ_TIMEOUT_MS);
        let n = match with_timeout(read_budget, buffer.lock()).await {
            Ok(guard) => guard.read_snapshot(&mut current, &mut voltage),
            Err(_) => {
                warn!("sample buffer read timed out, skipping this window");
                0
            }
        };

        if n == WINDOW_SIZE {
            let mut samples = [RawSample {
                current_code: 0,
                voltage_code: 0,
            }; WINDOW_SIZE];
            for i in 0..n {
                samples[i] = RawSample {
                    current_code: current[i],
                    voltage_code: voltage[i],
                };
            }

            match power::compute(&samples, &cal, Instant::now().as_millis()) {
                Ok(record) => dispatch(record, out_anomaly, out_network).await,
                Err(e) => warn!("power compute failed: {}", e),
            }
        } else {
            warn!("short window, have {} of {} samples", n, WINDOW_SIZE);
        }

        watchdog::heartbeat(watchdog::TaskId::Power);
        ticker.next().await;
    }
}

async fn dispatch(record: PowerRecord, out_anomaly: &PowerChannel, out_network: &NetworkPowerChannel) {
    // Drop-newest backpressure: a full queue means a downstream consumer is
    // behind, and the pipeline must not stall on it.
    if out_anomaly.try_send(record).is_err() {
        warn!("anomaly queue full, dropping power record");
    }
    let _ = out_network.try_send(record);
}
