//! Watchdog task: resets the device if any pipeline task stops servicing
//! its loop. Each covered task refreshes its own heartbeat slot by calling
//! `heartbeat(TaskId::...)`; this task only checks every slot for
//! staleness, it never drives application logic.

use core::sync::atomic::{AtomicU64, Ordering};

use defmt::error;
use embassy_time::{Duration, Instant, Timer};

use crate::config::WATCHDOG_TIMEOUT_S;

/// One heartbeat slot per task the watchdog covers.
#[derive(Clone, Copy)]
#[repr(usize)]
pub enum TaskId {
    Sampler = 0,
    Power = 1,
    Anomaly = 2,
    Relay = 3,
}

const TASK_COUNT: usize = 4;

/// Milliseconds since boot at which each monitored task last reported
/// progress. Updated with `Ordering::Relaxed`; staleness, not ordering, is
/// what this watchdog cares about.
static HEARTBEATS: [AtomicU64; TASK_COUNT] = [
    AtomicU64::new(0),
    AtomicU64::new(0),
    AtomicU64::new(0),
    AtomicU64::new(0),
];

pub fn heartbeat(task: TaskId) {
    HEARTBEATS[task as usize].store(Instant::now().as_millis(), Ordering::Relaxed);
}

#[embassy_executor::task]
pub async fn watchdog_task() {
    let check_period = Duration::from_secs(WATCHDOG_TIMEOUT_S / 3);

    loop {
        Timer::after(check_period).await;

        let now = Instant::now().as_millis();
        for slot in HEARTBEATS.iter() {
            let stale_for_ms = now.saturating_sub(slot.load(Ordering::Relaxed));
            if stale_for_ms > WATCHDOG_TIMEOUT_S * 1000 {
                error!("watchdog timeout: no heartbeat for {} ms, resetting", stale_for_ms);
                esp_hal::reset::software_reset();
            }
        }
    }
}
