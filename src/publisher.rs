//! Narrow contract for the network-publisher collaborator.
//!
//! This crate never dials the network itself; a `Publisher` implementation
//! living outside the core pipeline (an MQTT client, an HTTP poster, a test
//! recorder) is handed the serialized payloads this module defines.

use serde::Serialize;

use crate::anomaly::AnomalyEvent;
use crate::power::PowerRecord;

/// External collaborator: uploads power/anomaly data and reports link
/// health. A failed `post_*` call is not retried by the implementer of this
/// trait — it is logged by the calling task and the record is dropped,
/// an at-most-once delivery policy.
pub trait Publisher {
    fn post_power_data(&mut self, record: &PowerRecord) -> bool;
    fn post_anomaly_event(&mut self, event: &AnomalyEvent) -> bool;
    fn is_link_up(&self) -> bool;
}

/// Wire payload for a power-data upload. Timestamps are reported in whole
/// seconds, matching the external telemetry convention, even though the
/// core pipeline tracks milliseconds internally.
#[derive(Debug, Clone, Serialize)]
pub struct PowerDataPayload<'a> {
    pub device_id: &'a str,
    pub timestamp: u64,
    pub v_rms: f32,
    pub i_rms: f32,
    pub power_apparent: f32,
    pub power_real: f32,
    pub power_factor: f32,
}

impl<'a> PowerDataPayload<'a> {
    pub fn from_record(device_id: &'a str, record: &PowerRecord) -> Self {
        Self {
            device_id,
            timestamp: record.timestamp_ms / 1000,
            v_rms: record.v_rms,
            i_rms: record.i_rms,
            power_apparent: record.power_apparent,
            power_real: record.power_real,
            power_factor: record.power_factor,
        }
    }
}

/// Wire payload for an anomaly-event upload.
#[derive(Debug, Clone, Serialize)]
pub struct AnomalyEventPayload<'a> {
    pub device_id: &'a str,
    pub timestamp: u64,
    pub anomaly_type: &'static str,
    pub current_amps: f32,
    pub voltage_volts: f32,
    pub power_watts: f32,
    pub relay_tripped: bool,
}

impl<'a> AnomalyEventPayload<'a> {
    pub fn from_event(device_id: &'a str, event: &AnomalyEvent) -> Self {
        Self {
            device_id,
            timestamp: event.timestamp_ms / 1000,
            anomaly_type: event.kind.as_str(),
            current_amps: event.current_amps,
            voltage_volts: event.voltage_volts,
            power_watts: event.power_watts,
            relay_tripped: event.relay_triggered,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anomaly::AnomalyKind;

    #[test]
    fn power_payload_converts_timestamp_to_seconds() {
        let record = PowerRecord {
            v_rms: 220.0,
            i_rms: 3.5,
            power_apparent: 770.0,
            power_real: 760.0,
            power_factor: 0.98,
            timestamp_ms: 12_345,
        };
        let payload = PowerDataPayload::from_record("mains-guard-01", &record);
        assert_eq!(payload.timestamp, 12);
        assert_eq!(payload.device_id, "mains-guard-01");
    }

    #[test]
    fn anomaly_payload_uses_human_readable_kind() {
        let event = AnomalyEvent {
            kind: AnomalyKind::ShortCircuit,
            current_amps: 60.0,
            voltage_volts: 220.0,
            power_watts: 13_200.0,
            timestamp_ms: 5_000,
            relay_triggered: true,
        };
        let payload = AnomalyEventPayload::from_event("mains-guard-01", &event);
        assert_eq!(payload.anomaly_type, "SHORT_CIRCUIT");
        assert!(payload.relay_tripped);
    }

    struct RecordingPublisher {
        power_calls: std::vec::Vec<std::string::String>,
        link_up: bool,
    }

    impl Publisher for RecordingPublisher {
        fn post_power_data(&mut self, record: &PowerRecord) -> bool {
            self.power_calls
                .push(std::format!("{:.1}", record.power_real));
            self.link_up
        }

        fn post_anomaly_event(&mut self, _event: &AnomalyEvent) -> bool {
            self.link_up
        }

        fn is_link_up(&self) -> bool {
            self.link_up
        }
    }

    #[test]
    fn publisher_reports_failure_when_link_down() {
        let mut publisher = RecordingPublisher {
            power_calls: std::vec::Vec::new(),
            link_up: false,
        };
        let record = PowerRecord {
            v_rms: 220.0,
            i_rms: 1.0,
            power_apparent: 220.0,
            power_real: 220.0,
            power_factor: 1.0,
            timestamp_ms: 0,
        };
        assert!(!publisher.post_power_data(&record));
        assert_eq!(publisher.power_calls.len(), 1);
    }
}
