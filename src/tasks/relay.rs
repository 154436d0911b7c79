//! Relay-controller task: the lowest-priority dispatch stage. Owns the
//! state machine behind one mutex shared with the external `set_state`
//! request/response interface, following the same command-loop pattern
//! used elsewhere in this pipeline for request/response tasks.

use defmt::{error, info};
use embassy_futures::select::{select3, Either3};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_sync::mutex::Mutex;
use embassy_time::{with_timeout, Duration, Instant, Ticker};
use esp_hal::gpio::{Level, Output, OutputConfig, OutputPin};

use crate::anomaly::AnomalyKind;
use crate::channel::RequestResponseChannel;
use crate::config::{RELAY_HEARTBEAT_PERIOD_MS, RELAY_LOCK_TIMEOUT_MS};
use crate::error::CoreError;
use crate::relay::{self, RelayController, RelayDriver, RelayState};

use super::watchdog;

pub type RelayCommandChannel =
    Channel<CriticalSectionRawMutex, RelayCommand, { crate::config::ANOMALY_QUEUE_DEPTH }>;

pub enum RelayCommand {
    EmergencyCutoff(AnomalyKind),
}

pub enum RelayExternalRequest {
    SetState(RelayState),
    GetState,
    GetTripCount,
    ResetTripCount,
}

pub enum RelayExternalResponse {
    Ack,
    State(RelayState),
    TripCount(u32),
    Err(CoreError),
}

pub type RelayExternalChannel = RequestResponseChannel<RelayExternalRequest, RelayExternalResponse, 4>;

/// Wraps a GPIO output pin behind the [`RelayDriver`] contract the pure
/// state machine depends on.
pub struct GpioRelayDriver {
    pin: Output<'static>,
}

impl GpioRelayDriver {
    pub fn new(pin: impl OutputPin + 'static) -> Self {
        Self {
            pin: Output::new(pin, Level::Low, OutputConfig::default()),
        }
    }
}

impl RelayDriver for GpioRelayDriver {
    fn drive(&mut self, level: crate::config::RelayLevel) {
        self.pin.set_level(match level {
            crate::config::RelayLevel::Low => Level::Low,
            crate::config::RelayLevel::High => Level::High,
        });
    }
}

#[embassy_executor::task]
pub async fn relay_task(
    controller: &'static Mutex<CriticalSectionRawMutex, RelayController<GpioRelayDriver>>,
    in_anomaly: &'static RelayCommandChannel,
    external: &'static RelayExternalChannel,
) {
    let lock_budget = Duration::from_millis(RELAY_LOCK_TIMEOUT_MS);
    let mut heartbeat_ticker = Ticker::every(Duration::from_millis(RELAY_HEARTBEAT_PERIOD_MS));

    loop {
        match select3(in_anomaly.receive(), external.recv_request(), heartbeat_ticker.next()).await {
            Either3::First(RelayCommand::EmergencyCutoff(reason)) => {
                let now = Instant::now().as_millis();
                match with_timeout(lock_budget, controller.lock()).await {
                    Ok(mut guard) => {
                        guard.emergency_cutoff(reason, now);
                        error!("relay tripped: {} (trip_count={})", reason.as_str(), guard.get_trip_count());
                    }
                    // Mutex contention during an emergency: logged and left
                    // for the next anomaly event to retry.
                    Err(_) => error!("relay mutex timed out during emergency cutoff for {}", reason.as_str()),
                }
                watchdog::heartbeat(watchdog::TaskId::Relay);
            }
            Either3::Second(request) => {
                let response = handle_external_request(controller, request, lock_budget).await;
                external.send_response(response).await;
                watchdog::heartbeat(watchdog::TaskId::Relay);
            }
            Either3::Third(()) => {
                // No anomaly or external request arrived this period; a long
                // idle stretch is normal operation, not a hang, so the
                // watchdog still sees progress.
                watchdog::heartbeat(watchdog::TaskId::Relay);
            }
        }
    }
}

async fn handle_external_request(
    controller: &Mutex<CriticalSectionRawMutex, RelayController<GpioRelayDriver>>,
    request: RelayExternalRequest,
    lock_budget: Duration,
) -> RelayExternalResponse {
    // `GetState` answers from the lock-free shadow so it returns the last
    // known state even when the controller's mutex can't be acquired.
    if let RelayExternalRequest::GetState = request {
        return RelayExternalResponse::State(relay::shadow_state());
    }

    let now = Instant::now().as_millis();
    let mut guard = match with_timeout(lock_budget, controller.lock()).await {
        Ok(guard) => guard,
        Err(_) => return RelayExternalResponse::Err(CoreError::Timeout),
    };

    match request {
        RelayExternalRequest::SetState(new_state) => match guard.set_state(new_state, now) {
            Ok(()) => {
                info!("relay state set to {}", new_state);
                RelayExternalResponse::Ack
            }
            Err(e) => RelayExternalResponse::Err(e),
        },
        RelayExternalRequest::GetState => unreachable!("handled above without locking"),
        RelayExternalRequest::GetTripCount => RelayExternalResponse::TripCount(guard.get_trip_count()),
        RelayExternalRequest::ResetTripCount => {
            guard.reset_trip_count();
            RelayExternalResponse::Ack
        }
    }
}
