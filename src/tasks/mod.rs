pub mod anomaly;
pub mod power;
pub mod publish;
pub mod relay;
pub mod sampler;
pub mod watchdog;

pub use anomaly::anomaly_task;
pub use power::power_task;
pub use publish::{publish_anomaly_task, publish_power_task};
pub use relay::relay_task;
pub use sampler::sampler_task;
pub use watchdog::watchdog_task;
