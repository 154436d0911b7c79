#![feature(impl_trait_in_assoc_type)]
#![no_std]
#![no_main]
#![deny(
    clippy::mem_forget,
    reason = "mem::forget is generally not safe to do with esp_hal types, especially those \
    holding buffers for the duration of a data transfer."
)]

use mains_guard::channel::RequestResponseChannel;
use mains_guard::config::{CalibrationConfig, RelayConfig, ADC_FULL_SCALE_MV, ADC_MAX_CODE, ZERO_OFFSET_CALIBRATION_SAMPLES};
use mains_guard::relay::RelayController;
use mains_guard::sample::SampleBuffer;
use mains_guard::tasks::anomaly::NetworkAnomalyChannel;
use mains_guard::tasks::power::{NetworkPowerChannel, PowerChannel};
use mains_guard::tasks::publish::BoxedPublisher;
use mains_guard::tasks::relay::{GpioRelayDriver, RelayCommandChannel};
use mains_guard::tasks::sampler::calibrate_zero_offset;
use mains_guard::tasks::{anomaly_task, power_task, publish_anomaly_task, publish_power_task, relay_task, sampler_task, watchdog_task};
use mains_guard::{create_board, Board};

use defmt::info;
use embassy_executor::Spawner;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex;
use embassy_time::Instant;
use esp_hal::analog::adc::{Adc, AdcConfig, Attenuation};
use esp_hal::clock::CpuClock;
use esp_hal::timer::systimer::SystemTimer;
use panic_rtt_target as _;
use static_cell::StaticCell;

extern crate alloc;

// This creates a default app-descriptor required by the esp-idf bootloader.
// For more information see: <https://docs.espressif.com/projects/esp-idf/en/stable/esp32/api-reference/system/app_image_format.html#application-description>
esp_bootloader_esp_idf::esp_app_desc!();

static SAMPLE_BUFFER: StaticCell<Mutex<CriticalSectionRawMutex, SampleBuffer>> = StaticCell::new();
static RELAY_CONTROLLER: StaticCell<Mutex<CriticalSectionRawMutex, RelayController<GpioRelayDriver>>> =
    StaticCell::new();
static PUBLISHER: StaticCell<Mutex<CriticalSectionRawMutex, BoxedPublisher>> = StaticCell::new();

static POWER_CHANNEL: PowerChannel = PowerChannel::new();
static NETWORK_POWER_CHANNEL: NetworkPowerChannel = NetworkPowerChannel::new();
static RELAY_COMMAND_CHANNEL: RelayCommandChannel = RelayCommandChannel::new();
static NETWORK_ANOMALY_CHANNEL: NetworkAnomalyChannel = NetworkAnomalyChannel::new();
static RELAY_EXTERNAL_CHANNEL: RequestResponseChannel<
    mains_guard::tasks::relay::RelayExternalRequest,
    mains_guard::tasks::relay::RelayExternalResponse,
    4,
> = RequestResponseChannel::with_static_channels();

/// Stands in for the persistent key/value store and network-manager
/// collaborators this core never talks to directly: `is_link_up` always
/// reports down so the publish tasks never block on a network stack this
/// crate doesn't own.
struct NullPublisher;

impl mains_guard::publisher::Publisher for NullPublisher {
    fn post_power_data(&mut self, _record: &mains_guard::power::PowerRecord) -> bool {
        false
    }

    fn post_anomaly_event(&mut self, _event: &mains_guard::anomaly::AnomalyEvent) -> bool {
        false
    }

    fn is_link_up(&self) -> bool {
        false
    }
}

#[esp_hal_embassy::main]
async fn main(spawner: Spawner) {
    // Initialize RTT for logging
    rtt_target::rtt_init_defmt!();

    // Configure and initialize hardware
    let config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(config);
    let board: Board = create_board!(peripherals);

    // Initialize heap allocator
    esp_alloc::heap_allocator!(size: 64 * 1024);

    // Initialize embassy time
    let timer0 = SystemTimer::new(peripherals.SYSTIMER);
    esp_hal_embassy::init(timer0.alarm0);
    info!("Embassy initialized!");

    // Persistent-store init is a collaborator's responsibility; this core
    // never reads or writes it.

    // Relay init first: fail-safe OFF before anything else can command it.
    let relay_driver = GpioRelayDriver::new(board.Relay);
    let relay_controller = RELAY_CONTROLLER.init(Mutex::new(RelayController::new(
        relay_driver,
        RelayConfig::default(),
        Instant::now().as_millis(),
    )));
    info!("Relay initialized, fail-safe OFF");

    // ADC init: enable both channels, then run the zero-offset
    // self-calibration on the current channel before handing the ADC and
    // pins over to the sampler task. Requires no load attached.
    let mut adc_config = AdcConfig::new();
    let mut adc_current_pin = adc_config.enable_pin(board.CurrentSense, Attenuation::_0dB);
    let adc_voltage_pin = adc_config.enable_pin(board.VoltageSense, Attenuation::_0dB);
    let mut adc_blocking = Adc::new(peripherals.ADC1, adc_config);

    let current_zero_offset_v = calibrate_zero_offset(
        &mut adc_blocking,
        &mut adc_current_pin,
        ADC_FULL_SCALE_MV,
        ADC_MAX_CODE,
        ZERO_OFFSET_CALIBRATION_SAMPLES,
    )
    .await;
    info!("zero-offset calibration: {} V", current_zero_offset_v);

    let adc = adc_blocking.into_async();
    let mut calibration = CalibrationConfig::default();
    calibration.current_zero_offset_v = current_zero_offset_v;

    let sample_buffer = SAMPLE_BUFFER.init(Mutex::new(SampleBuffer::new()));

    // Power compute / anomaly detector init is implicit in task spawn below;
    // both are stateless-at-rest until their first window/record.

    // Network init / publisher init: no real network stack is wired in this
    // core; `NullPublisher` documents the seam a collaborator plugs into.
    let publisher = PUBLISHER.init(Mutex::new(alloc::boxed::Box::new(NullPublisher) as BoxedPublisher));

    // Task creation in priority order.
    spawner
        .spawn(sampler_task(adc, adc_current_pin, adc_voltage_pin, sample_buffer))
        .expect("spawn sampler task failed");

    spawner
        .spawn(power_task(sample_buffer, calibration, &POWER_CHANNEL, &NETWORK_POWER_CHANNEL))
        .expect("spawn power task failed");

    spawner
        .spawn(anomaly_task(&POWER_CHANNEL, &RELAY_COMMAND_CHANNEL, &NETWORK_ANOMALY_CHANNEL))
        .expect("spawn anomaly task failed");

    spawner
        .spawn(relay_task(relay_controller, &RELAY_COMMAND_CHANNEL, &RELAY_EXTERNAL_CHANNEL))
        .expect("spawn relay task failed");

    spawner
        .spawn(publish_power_task(&NETWORK_POWER_CHANNEL, publisher))
        .expect("spawn power publisher task failed");
    spawner
        .spawn(publish_anomaly_task(&NETWORK_ANOMALY_CHANNEL, publisher))
        .expect("spawn anomaly publisher task failed");

    spawner.spawn(watchdog_task()).expect("spawn watchdog task failed");

    info!("mains-guard pipeline running");
}
