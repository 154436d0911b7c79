//! Network-publish tasks: drain the network-facing queues into a
//! [`Publisher`] implementation — one task per direction, no backpressure
//! onto the producer.

use alloc::boxed::Box;

use defmt::warn;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex;

use crate::publisher::Publisher;

use super::anomaly::NetworkAnomalyChannel;
use super::power::NetworkPowerChannel;

pub type BoxedPublisher = Box<dyn Publisher + Send>;

#[embassy_executor::task]
pub async fn publish_power_task(
    in_power: &'static NetworkPowerChannel,
    publisher: &'static Mutex<CriticalSectionRawMutex, BoxedPublisher>,
) {
    loop {
        let record = in_power.receive().await;
        let mut guard = publisher.lock().await;
        if guard.is_link_up() && !guard.post_power_data(&record) {
            warn!("power data publish failed, dropping");
        }
    }
}

#[embassy_executor::task]
pub async fn publish_anomaly_task(
    in_anomaly: &'static NetworkAnomalyChannel,
    publisher: &'static Mutex<CriticalSectionRawMutex, BoxedPublisher>,
) {
    loop {
        let event = in_anomaly.receive().await;
        let mut guard = publisher.lock().await;
        if guard.is_link_up() && !guard.post_anomaly_event(&event) {
            warn!("anomaly event publish failed, dropping");
        }
    }
}
