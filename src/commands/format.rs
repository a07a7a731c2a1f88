//! Text formatting shared by command replies.

pub const BAR_WIDTH: usize = 25;

/// `HH:MM:SS`, with `00:00:00` for zero or unknown.
pub fn fmt_time(seconds: f64) -> String {
    if !seconds.is_finite() || seconds <= 0.0 {
        return "00:00:00".to_string();
    }
    let s = seconds as u64;
    format!("{:02}:{:02}:{:02}", s / 3600, (s % 3600) / 60, s % 60)
}

/// `MM:SS`, with `?:??` for zero or unknown. Minutes are not wrapped.
pub fn fmt_mmss(seconds: f64) -> String {
    if !seconds.is_finite() || seconds <= 0.0 {
        return "?:??".to_string();
    }
    let s = seconds as u64;
    format!("{:02}:{:02}", s / 60, s % 60)
}

/// Filled/empty cell bar for a fraction clamped to `[0, 1]`.
pub fn progress_bar(fraction: f64, width: usize) -> String {
    let fraction = if fraction.is_finite() {
        fraction.clamp(0.0, 1.0)
    } else {
        0.0
    };
    let filled = (fraction * width as f64) as usize;
    format!("{}{}", "▰".repeat(filled), "▱".repeat(width - filled))
}
