pub mod host;
pub mod metrics;

pub use host::HostMonitor;
pub use metrics::Metrics;
