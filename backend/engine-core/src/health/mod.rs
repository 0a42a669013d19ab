//! Sidecar liveness: miss counting, probing and the restart state machine.

pub mod miss_counter;
pub mod monitor;
pub mod probe;
pub mod state;

pub use miss_counter::MissCounter;
pub use monitor::HealthMonitor;
pub use probe::HealthProbe;
pub use state::{HealthState, HealthStatus};
