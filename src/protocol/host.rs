use serde::Serialize;

/// Host machine metrics for the status endpoint and the `server` command.
#[derive(Debug, Clone, Serialize)]
pub struct HostMetrics {
    pub uptime_seconds: u64,
    /// Bytes.
    pub ram_total: u64,
    pub ram_used: u64,
    pub ram_free: u64,
    pub load_1m: f64,
    pub load_5m: f64,
    pub load_15m: f64,
    /// Celsius, `None` when no sensor is readable.
    pub cpu_temperature: Option<f32>,
}
