use crate::collectors::command::CommandRunner;
use crate::collectors::platform::Platform;
use crate::collectors::text::{first_line_containing, parse_f64_loose, parse_u64_digits, value_for_key};
use crate::config::LoadConfig;
use serde::Serialize;
use std::time::Duration;
use sysinfo::{CpuExt, System, SystemExt};
use tracing::debug;

const DEFAULT_PAGE_SIZE: u64 = 4096;
const VM_STAT_USED_KEYS: [&str; 4] = [
    "Pages active",
    "Pages inactive",
    "Pages wired down",
    "Pages occupied by compressor",
];

/// CPU and RAM utilisation over one sampling window, each 0..=100.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct LoadSample {
    pub cpu_percent: Option<f64>,
    pub ram_percent: Option<f64>,
}

pub fn collect_load(platform: Platform, runner: &dyn CommandRunner, cfg: &LoadConfig) -> LoadSample {
    let window = Duration::from_millis(cfg.sample_window_ms);
    match platform {
        Platform::Darwin => collect_darwin(runner, window),
        Platform::Windows | Platform::Unsupported => sample_with_sysinfo(window),
    }
}

fn collect_darwin(runner: &dyn CommandRunner, window: Duration) -> LoadSample {
    let interval = window.as_secs().max(1).to_string();
    let cpu_percent = match runner.run("top", &["-l", "2", "-s", &interval, "-n", "0"]) {
        Ok(text) => parse_top_cpu_percent(&text),
        Err(err) => {
            debug!(error = %err, "top unavailable");
            None
        }
    };

    let total = runner
        .run("sysctl", &["-n", "hw.memsize"])
        .map_err(|err| debug!(error = %err, "sysctl unavailable"))
        .ok()
        .and_then(|text| parse_u64_digits(text.trim()));
    let used = runner
        .run("vm_stat", &[])
        .map_err(|err| debug!(error = %err, "vm_stat unavailable"))
        .ok()
        .and_then(|text| parse_vm_stat_used_bytes(&text));

    LoadSample {
        cpu_percent,
        ram_percent: used_ratio_percent(used, total),
    }
}

/// CPU busy share from the last `CPU usage:` line of `top -l N`.
///
/// The first sample of `top` covers time since boot, so the final one is the
/// only reading bound to the sampling interval.
fn parse_top_cpu_percent(text: &str) -> Option<f64> {
    let line = text.lines().rev().find(|line| line.contains("CPU usage:"))?;
    let idle = line
        .split(',')
        .find(|segment| segment.contains("idle"))?
        .split('%')
        .next()
        .and_then(|value| {
            let value = value.rsplit(':').next().unwrap_or(value);
            parse_f64_loose(value)
        })?;
    Some((100.0 - idle).clamp(0.0, 100.0))
}

fn parse_vm_stat_used_bytes(text: &str) -> Option<u64> {
    let page_size = first_line_containing(text, "page size of")
        .and_then(|line| line.split_whitespace().find_map(|t| t.parse::<u64>().ok()))
        .unwrap_or(DEFAULT_PAGE_SIZE);

    let pages: Vec<u64> = VM_STAT_USED_KEYS
        .iter()
        .filter_map(|key| value_for_key(text, key).and_then(parse_u64_digits))
        .collect();
    if pages.is_empty() {
        return None;
    }
    Some(pages.iter().sum::<u64>().saturating_mul(page_size))
}

fn used_ratio_percent(used: Option<u64>, total: Option<u64>) -> Option<f64> {
    match (used, total) {
        (Some(used), Some(total)) if total > 0 => {
            Some((used as f64 / total as f64 * 100.0).clamp(0.0, 100.0))
        }
        _ => None,
    }
}

fn sample_with_sysinfo(window: Duration) -> LoadSample {
    let mut system = System::new();
    system.refresh_cpu();
    std::thread::sleep(window);
    system.refresh_cpu();
    system.refresh_memory();

    let cpu_percent = if system.cpus().is_empty() {
        None
    } else {
        let sum: f32 = system.cpus().iter().map(|c| c.cpu_usage()).sum();
        Some(((sum / system.cpus().len() as f32) as f64).clamp(0.0, 100.0))
    };

    LoadSample {
        cpu_percent,
        ram_percent: used_ratio_percent(Some(system.used_memory()), Some(system.total_memory())),
    }
}
