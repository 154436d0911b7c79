//! Anomaly-detector task: blocks on the power-record queue, runs the
//! stateful multi-rule detector, and fans the result out to the relay
//! controller and the network-publish queue.

use defmt::{info, warn};

use crate::anomaly::{AnomalyEvent, Detector};

use super::power::PowerChannel;
use super::relay::RelayCommand;
use super::watchdog;

pub type NetworkAnomalyChannel =
    embassy_sync::channel::Channel<
        embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex,
        AnomalyEvent,
        { crate::config::NETWORK_ANOMALY_QUEUE_DEPTH },
    >;

#[embassy_executor::task]
pub async fn anomaly_task(
    in_power: &'static PowerChannel,
    out_relay: &'static super::relay::RelayCommandChannel,
    out_network: &'static NetworkAnomalyChannel,
) {
    let mut detector = Detector::new();

    loop {
        let record = in_power.receive().await;

        if let Some(event) = detector.analyze(&record) {
            warn!("anomaly detected: {}", event.kind.as_str());
            if event.kind.triggers_relay() {
                if out_relay.try_send(RelayCommand::EmergencyCutoff(event.kind)).is_err() {
                    warn!("relay command queue full, dropping cutoff request");
                }
            }
            let _ = out_network.try_send(event);
        }

        if let Some(report) = detector.voltage_report(&record) {
            info!("voltage anomaly reported: {}", report.kind.as_str());
            let _ = out_network.try_send(report);
        }

        watchdog::heartbeat(watchdog::TaskId::Anomaly);
    }
}
