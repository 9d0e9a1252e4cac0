//! One-line system summary for `/SYSINFO`.

use std::fmt::Write as _;

pub fn system_summary() -> String {
    let mut out = format!(
        "{} {} | OS: {} ({})",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        std::env::consts::ARCH
    );
    if let Ok(cpus) = std::thread::available_parallelism() {
        let _ = write!(out, " | CPUs: {cpus}");
    }
    if let Some(secs) = uptime_secs() {
        let _ = write!(out, " | Uptime: {}", format_uptime(secs));
    }
    out
}

fn uptime_secs() -> Option<u64> {
    let contents = std::fs::read_to_string("/proc/uptime").ok()?;
    let first = contents.split_whitespace().next()?;
    first.parse::<f64>().ok().map(|s| s as u64)
}

fn format_uptime(secs: u64) -> String {
    let days = secs / 86_400;
    let hours = (secs % 86_400) / 3600;
    let minutes = (secs % 3600) / 60;
    if days > 0 {
        format!("{days}d {hours}h {minutes}m")
    } else {
        format!("{hours}h {minutes}m")
    }
}
