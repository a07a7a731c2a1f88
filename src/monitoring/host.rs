use parking_lot::Mutex;
use sysinfo::{Components, System};

use crate::protocol::HostMetrics;

const THERMAL_FALLBACKS: &[&str] = &[
    "/sys/class/thermal/thermal_zone0/temp",
    "/sys/class/hwmon/hwmon0/temp1_input",
];

/// Samples host metrics on demand.
pub struct HostMonitor {
    sys: Mutex<System>,
}

impl Default for HostMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl HostMonitor {
    pub fn new() -> Self {
        Self {
            sys: Mutex::new(System::new()),
        }
    }

    pub fn snapshot(&self) -> HostMetrics {
        let (ram_total, ram_used, ram_free) = {
            let mut sys = self.sys.lock();
            sys.refresh_memory();
            (sys.total_memory(), sys.used_memory(), sys.available_memory())
        };
        let load = System::load_average();

        HostMetrics {
            uptime_seconds: System::uptime(),
            ram_total,
            ram_used,
            ram_free,
            load_1m: load.one,
            load_5m: load.five,
            load_15m: load.fifteen,
            cpu_temperature: read_cpu_temperature(),
        }
    }
}

/// CPU temperature in Celsius, preferring a sensor labelled as the CPU.
fn read_cpu_temperature() -> Option<f32> {
    let components = Components::new_with_refreshed_list();
    let readings: Vec<(String, f32)> = components
        .iter()
        .filter_map(|c| Some((c.label().to_lowercase(), c.temperature()?)))
        .filter(|(_, t)| t.is_finite())
        .collect();

    let cpu_like = ["cpu", "package", "tctl", "soc", "core"];
    readings
        .iter()
        .find(|(label, _)| cpu_like.iter().any(|k| label.contains(k)))
        .or_else(|| readings.first())
        .map(|(_, t)| *t)
        .or_else(read_thermal_zone)
}

fn read_thermal_zone() -> Option<f32> {
    THERMAL_FALLBACKS.iter().find_map(|path| {
        let raw = std::fs::read_to_string(path).ok()?;
        parse_millidegrees(&raw)
    })
}

/// Kernel sensors report millidegrees; some report plain degrees.
fn parse_millidegrees(raw: &str) -> Option<f32> {
    let value = raw.trim().parse::<f32>().ok()?;
    Some(if value > 1000.0 { value / 1000.0 } else { value })
}
