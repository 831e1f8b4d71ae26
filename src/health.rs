//! Weighted health score over an already collected snapshot.
//!
//! Each subject is classified on its own; the overall score is the rounded
//! mean of every subject that could be scored. Nothing here performs I/O.

use crate::collectors::battery::BatteryRecord;
use crate::collectors::checks::ProbeResult;
use crate::collectors::load::LoadSample;
use crate::collectors::system::VolumeStat;
use crate::collectors::wireless::WirelessRecord;
use crate::config::{FloorBands, HealthPolicy, UsageBands};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Tier {
    Green,
    Yellow,
    Red,
    /// Not scored; excluded from the overall mean.
    Unknown,
}

impl Tier {
    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Green => "GREEN",
            Tier::Yellow => "YELLOW",
            Tier::Red => "RED",
            Tier::Unknown => "UNKNOWN",
        }
    }

    /// Ordinal for gauges: Unknown 0, Red 1, Yellow 2, Green 3.
    pub fn ordinal(self) -> u8 {
        match self {
            Tier::Unknown => 0,
            Tier::Red => 1,
            Tier::Yellow => 2,
            Tier::Green => 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthItem {
    pub subject: String,
    pub tier: Tier,
    /// Meaningless when `tier` is Unknown.
    pub score: u8,
    pub detail: String,
}

impl HealthItem {
    fn new(subject: &str, tier: Tier, score: u8, detail: impl Into<String>) -> Self {
        Self {
            subject: subject.to_string(),
            tier,
            score,
            detail: detail.into(),
        }
    }

    fn unknown(subject: &str, detail: impl Into<String>) -> Self {
        Self::new(subject, Tier::Unknown, 0, detail)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthSummary {
    pub items: Vec<HealthItem>,
    pub overall_score: u8,
    pub overall_tier: Tier,
}

pub struct HealthInputs<'a> {
    pub load: &'a LoadSample,
    pub system_volume: Option<&'a VolumeStat>,
    pub probe: &'a ProbeResult,
    pub wireless: &'a WirelessRecord,
    pub battery: &'a BatteryRecord,
}

/// (green, yellow, red) scores per subject.
const CPU_SCORES: (u8, u8, u8) = (95, 70, 35);
const RAM_SCORES: (u8, u8, u8) = (95, 65, 25);
const DISK_SCORES: (u8, u8, u8) = (95, 60, 20);
const WIRELESS_SCORES: (u8, u8, u8) = (95, 65, 25);
const NETWORK_UP_SCORE: u8 = 95;
const NETWORK_DOWN_SCORE: u8 = 15;
const BATTERY_NORMAL_SCORE: u8 = 95;
const BATTERY_DEGRADED_SCORE: u8 = 60;

pub fn evaluate(inputs: &HealthInputs<'_>, policy: &HealthPolicy) -> HealthSummary {
    let items = vec![
        score_usage("CPU", inputs.load.cpu_percent, &policy.cpu, CPU_SCORES),
        score_usage("RAM", inputs.load.ram_percent, &policy.ram, RAM_SCORES),
        score_disk(inputs.system_volume, &policy.disk_free),
        score_network(inputs.probe),
        score_wireless(inputs.wireless, policy),
        score_battery(inputs.battery),
    ];
    summarize(items, &policy.overall)
}

pub fn summarize(items: Vec<HealthItem>, overall: &FloorBands) -> HealthSummary {
    let scored: Vec<f64> = items
        .iter()
        .filter(|item| item.tier != Tier::Unknown)
        .map(|item| f64::from(item.score))
        .collect();

    if scored.is_empty() {
        return HealthSummary {
            items,
            overall_score: 0,
            overall_tier: Tier::Unknown,
        };
    }

    let mean = scored.iter().sum::<f64>() / scored.len() as f64;
    let overall_score = mean.round().clamp(0.0, 100.0) as u8;
    HealthSummary {
        items,
        overall_score,
        overall_tier: floor_tier(f64::from(overall_score), overall),
    }
}

fn floor_tier(value: f64, bands: &FloorBands) -> Tier {
    if value >= bands.green_at_least {
        Tier::Green
    } else if value >= bands.yellow_at_least {
        Tier::Yellow
    } else {
        Tier::Red
    }
}

fn pick(tier: Tier, scores: (u8, u8, u8)) -> u8 {
    match tier {
        Tier::Green => scores.0,
        Tier::Yellow => scores.1,
        Tier::Red => scores.2,
        Tier::Unknown => 0,
    }
}

fn score_usage(
    subject: &str,
    percent: Option<f64>,
    bands: &UsageBands,
    scores: (u8, u8, u8),
) -> HealthItem {
    let Some(percent) = percent else {
        return HealthItem::unknown(subject, format!("no {subject} sample"));
    };
    let tier = if percent < bands.green_below {
        Tier::Green
    } else if percent < bands.yellow_below {
        Tier::Yellow
    } else {
        Tier::Red
    };
    HealthItem::new(
        subject,
        tier,
        pick(tier, scores),
        format!("{subject} usage {percent:.1}%"),
    )
}

fn score_disk(volume: Option<&VolumeStat>, bands: &FloorBands) -> HealthItem {
    let Some((volume, free)) = volume.and_then(|v| v.free_percent().map(|free| (v, free))) else {
        return HealthItem::unknown("Disk", "system volume not measured");
    };
    let tier = floor_tier(free, bands);
    HealthItem::new(
        "Disk",
        tier,
        pick(tier, DISK_SCORES),
        format!("{:.1}% free on {}", free, volume.mount),
    )
}

fn score_network(probe: &ProbeResult) -> HealthItem {
    if probe.up {
        HealthItem::new(
            "Network",
            Tier::Green,
            NETWORK_UP_SCORE,
            format!("{} reachable in {} ms", probe.target, probe.latency_ms),
        )
    } else {
        let reason = probe.note.as_deref().unwrap_or("unreachable");
        HealthItem::new(
            "Network",
            Tier::Red,
            NETWORK_DOWN_SCORE,
            format!("{} unreachable: {reason}", probe.target),
        )
    }
}

fn score_wireless(wireless: &WirelessRecord, policy: &HealthPolicy) -> HealthItem {
    const SUBJECT: &str = "Wi-Fi";
    if !wireless.is_available {
        return HealthItem::unknown(SUBJECT, "not connected");
    }

    let (tier, detail) = if let Some(pct) = wireless.signal_percent {
        (
            floor_tier(f64::from(pct), &policy.wireless_signal),
            format!("signal {pct}%"),
        )
    } else if let Some(dbm) = wireless.signal_dbm {
        (
            floor_tier(f64::from(dbm), &policy.wireless_dbm),
            format!("signal {dbm} dBm"),
        )
    } else {
        return HealthItem::unknown(SUBJECT, "connected, signal strength not reported");
    };
    HealthItem::new(SUBJECT, tier, pick(tier, WIRELESS_SCORES), detail)
}

fn score_battery(battery: &BatteryRecord) -> HealthItem {
    const SUBJECT: &str = "Battery";
    if !battery.is_present {
        return HealthItem::unknown(SUBJECT, "no battery");
    }
    match battery.condition.as_deref().map(str::trim) {
        Some(condition) if condition.eq_ignore_ascii_case("Normal") => HealthItem::new(
            SUBJECT,
            Tier::Green,
            BATTERY_NORMAL_SCORE,
            "condition Normal",
        ),
        Some(condition) if !condition.is_empty() => HealthItem::new(
            SUBJECT,
            Tier::Yellow,
            BATTERY_DEGRADED_SCORE,
            format!("condition {condition}"),
        ),
        _ => HealthItem::unknown(SUBJECT, "condition not reported"),
    }
}
