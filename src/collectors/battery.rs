use crate::collectors::command::{run_powershell, CommandRunner};
use crate::collectors::platform::Platform;
use crate::collectors::text::{digits_only, first_line_containing, non_blank, value_after_colon};
use crate::collectors::CollectError;
use serde::Serialize;
use tracing::{debug, warn};

const DARWIN_SOURCE: &str = "macOS:pmset+system_profiler";
const WINDOWS_SOURCE: &str = "Windows:CIM(Win32_Battery)";
const UNKNOWN_SOURCE: &str = "unknown";

const WIN32_BATTERY_QUERY: &str = "Get-CimInstance -ClassName Win32_Battery -ErrorAction SilentlyContinue | ForEach-Object { \"$($_.EstimatedChargeRemaining)|$($_.BatteryStatus)\" }";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatteryRecord {
    pub is_present: bool,
    pub charge_percent: Option<u8>,
    /// `None` when the utility did not say either way.
    pub is_charging: Option<bool>,
    pub condition: Option<String>,
    pub cycle_count: Option<u32>,
    pub design_capacity_mah: Option<u32>,
    pub full_charge_capacity_mah: Option<u32>,
    pub maximum_capacity_percent: Option<u8>,
    pub source: String,
    pub note: Option<String>,
}

impl BatteryRecord {
    fn present(source: &str) -> Self {
        Self {
            is_present: true,
            ..Self::unavailable(source, "")
        }
    }

    pub fn unavailable(source: &str, note: impl Into<String>) -> Self {
        Self {
            is_present: false,
            charge_percent: None,
            is_charging: None,
            condition: None,
            cycle_count: None,
            design_capacity_mah: None,
            full_charge_capacity_mah: None,
            maximum_capacity_percent: None,
            source: source.to_string(),
            note: non_blank(&note.into()),
        }
    }
}

pub fn collect_battery(platform: Platform, runner: &dyn CommandRunner) -> BatteryRecord {
    let (source, result) = match platform {
        Platform::Darwin => (DARWIN_SOURCE, collect_darwin(runner)),
        Platform::Windows => (WINDOWS_SOURCE, collect_windows(runner)),
        Platform::Unsupported => {
            return BatteryRecord::unavailable(
                UNKNOWN_SOURCE,
                "Battery info not available on this platform.",
            )
        }
    };

    result.unwrap_or_else(|err| {
        warn!(error = %err, platform = platform.label(), "battery collection failed");
        let context = format!("{} battery query", platform.label());
        BatteryRecord::unavailable(source, err.note(&context))
    })
}

fn collect_darwin(runner: &dyn CommandRunner) -> Result<BatteryRecord, CollectError> {
    let pmset = runner.run("pmset", &["-g", "batt"])?;
    if !pmset.to_lowercase().contains("internalbattery") {
        return Ok(BatteryRecord::unavailable(
            DARWIN_SOURCE,
            "No InternalBattery found (desktop or no battery).",
        ));
    }

    let mut record = parse_pmset(&pmset);

    match runner.run("system_profiler", &["SPPowerDataType"]) {
        Ok(profile) => apply_power_profile(&mut record, &profile),
        Err(err) => debug!(error = %err, "power profile unavailable, keeping pmset fields"),
    }

    Ok(record)
}

fn parse_pmset(text: &str) -> BatteryRecord {
    let mut record = BatteryRecord::present(DARWIN_SOURCE);

    record.charge_percent = text
        .split_whitespace()
        .find_map(|token| token.strip_suffix("%;"))
        .and_then(|pct| pct.parse::<u8>().ok())
        .map(|pct| pct.min(100));

    record.is_charging = first_line_containing(text, "InternalBattery").and_then(charging_state);
    record
}

/// Reads the `;`-separated status segments of a pmset battery line.
///
/// Segments are compared whole, so "discharging" and "not charging" never
/// count as charging. A trailing `present: true` is not part of the status.
/// Priority: charging, then discharging, then charged.
fn charging_state(line: &str) -> Option<bool> {
    let segments: Vec<String> = line
        .split(';')
        .map(|s| {
            let lowered = s.to_lowercase();
            let status = lowered.split("present:").next().unwrap_or_default();
            status.trim().to_string()
        })
        .collect();
    let has = |word: &str| segments.iter().any(|s| s == word);

    if has("charging") || has("finishing charge") {
        Some(true)
    } else if has("discharging") {
        Some(false)
    } else if has("charged") || has("ac attached") || has("not charging") {
        Some(false)
    } else {
        None
    }
}

fn apply_power_profile(record: &mut BatteryRecord, text: &str) {
    record.cycle_count = number_after_label(text, "Cycle Count");
    record.condition = first_line_containing(text, "Condition")
        .and_then(value_after_colon)
        .and_then(non_blank);
    record.full_charge_capacity_mah = number_after_label(text, "Full Charge Capacity");
    record.design_capacity_mah = number_after_label(text, "Design Capacity");
    record.maximum_capacity_percent = number_after_label(text, "Maximum Capacity")
        .and_then(|pct| u8::try_from(pct).ok())
        .map(|pct| pct.min(100));
}

fn number_after_label(text: &str, label: &str) -> Option<u32> {
    let line = first_line_containing(text, label)?;
    let value = value_after_colon(line).unwrap_or(line);
    digits_only(value).parse().ok()
}

fn collect_windows(runner: &dyn CommandRunner) -> Result<BatteryRecord, CollectError> {
    let output = run_powershell(runner, WIN32_BATTERY_QUERY)?;
    Ok(parse_win32_battery(&output))
}

fn parse_win32_battery(text: &str) -> BatteryRecord {
    let Some(row) = text.lines().map(str::trim).find(|line| line.contains('|')) else {
        return BatteryRecord::unavailable(
            WINDOWS_SOURCE,
            "Win32_Battery returned no results (desktop or no battery).",
        );
    };

    let mut record = BatteryRecord::present(WINDOWS_SOURCE);
    let mut parts = row.splitn(2, '|').map(str::trim);

    record.charge_percent = parts
        .next()
        .and_then(|v| v.parse::<u8>().ok())
        .map(|pct| pct.min(100));
    record.is_charging = match parts.next().and_then(|v| v.parse::<u16>().ok()) {
        Some(2) | Some(6) => Some(true),
        Some(3) => Some(false),
        _ => None,
    };
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::command::testing::ScriptedRunner;

    const PMSET_DISCHARGING: &str = "Now drawing from 'Battery Power'\n -InternalBattery-0 (id=4653155)\t85%; discharging; 4:12 remaining present: true\n";
    const PMSET_CHARGING: &str = "Now drawing from 'AC Power'\n -InternalBattery-0 (id=4653155)\t41%; charging; 1:02 remaining present: true\n";
    const PMSET_DESKTOP: &str = "Now drawing from 'AC Power'\n";

    const POWER_PROFILE: &str = "\
Power:

    Battery Information:

      Charge Information:
          Charge Remaining (mAh): 4382
          Fully Charged: No
          Full Charge Capacity (mAh): 5103
      Health Information:
          Cycle Count: 312
          Condition: Normal
          Maximum Capacity: 88%
";

    fn darwin_runner(pmset: &str) -> ScriptedRunner {
        ScriptedRunner::new()
            .reply("pmset", "-g batt", pmset)
            .reply("system_profiler", "SPPowerDataType", POWER_PROFILE)
    }

    #[test]
    fn darwin_battery_reads_pmset_and_profile() {
        let runner = darwin_runner(PMSET_DISCHARGING);
        let record = collect_battery(Platform::Darwin, &runner);

        assert!(record.is_present);
        assert_eq!(record.charge_percent, Some(85));
        assert_eq!(record.is_charging, Some(false));
        assert_eq!(record.condition.as_deref(), Some("Normal"));
        assert_eq!(record.cycle_count, Some(312));
        assert_eq!(record.full_charge_capacity_mah, Some(5103));
        assert_eq!(record.design_capacity_mah, None);
        assert_eq!(record.maximum_capacity_percent, Some(88));
        assert_eq!(record.source, DARWIN_SOURCE);
        assert_eq!(record.note, None);
    }

    #[test]
    fn darwin_charging_segment_wins() {
        let record = collect_battery(Platform::Darwin, &darwin_runner(PMSET_CHARGING));
        assert_eq!(record.is_charging, Some(true));
        assert_eq!(record.charge_percent, Some(41));
    }

    #[test]
    fn charging_state_segments() {
        assert_eq!(charging_state("x 100%; charged; 0:00 remaining"), Some(false));
        assert_eq!(charging_state("x 80%; AC attached; not charging present: true"), Some(false));
        assert_eq!(charging_state("x 99%; finishing charge; 0:05 remaining"), Some(true));
        assert_eq!(charging_state("x 50%"), None);
    }

    #[test]
    fn status_segment_with_presence_suffix() {
        let line = "-InternalBattery-0 (id=4653155)\t62%; charging present: true";
        assert_eq!(charging_state(line), Some(true));
        assert_eq!(
            charging_state("-InternalBattery-0 (id=1)\t62%; discharging present: true"),
            Some(false)
        );

        let runner = darwin_runner(&format!("Now drawing from 'AC Power'\n {line}\n"));
        let record = collect_battery(Platform::Darwin, &runner);
        assert_eq!(record.charge_percent, Some(62));
        assert_eq!(record.is_charging, Some(true));
    }

    #[test]
    fn darwin_without_internal_battery_skips_profiler() {
        let runner = darwin_runner(PMSET_DESKTOP);
        let record = collect_battery(Platform::Darwin, &runner);

        assert!(!record.is_present);
        assert_eq!(record.charge_percent, None);
        assert!(record.note.as_deref().unwrap_or("").contains("No InternalBattery"));
        assert!(!runner.was_called("system_profiler"));
    }

    #[test]
    fn darwin_profiler_failure_is_not_fatal() {
        let runner = ScriptedRunner::new()
            .reply("pmset", "-g batt", PMSET_DISCHARGING)
            .missing("system_profiler", "SPPowerDataType");
        let record = collect_battery(Platform::Darwin, &runner);

        assert!(record.is_present);
        assert_eq!(record.charge_percent, Some(85));
        assert_eq!(record.condition, None);
        assert_eq!(record.cycle_count, None);
    }

    #[test]
    fn spawn_failure_degrades_to_unavailable() {
        let runner = ScriptedRunner::new().missing("pmset", "");
        let record = collect_battery(Platform::Darwin, &runner);

        assert!(!record.is_present);
        assert_eq!(record.charge_percent, None);
        assert_eq!(record.note.as_deref(), Some("macOS battery query error: NotFound"));
    }

    #[test]
    fn windows_status_codes_map_to_charging() {
        let cases = [("87|2", Some(true)), ("87|6", Some(true)), ("87|3", Some(false)), ("87|1", None)];
        for (row, expected) in cases {
            let runner = ScriptedRunner::new().reply("powershell", "Win32_Battery", row);
            let record = collect_battery(Platform::Windows, &runner);
            assert!(record.is_present, "row {row}");
            assert_eq!(record.charge_percent, Some(87));
            assert_eq!(record.is_charging, expected, "row {row}");
        }
    }

    #[test]
    fn windows_without_rows_is_absent() {
        let runner = ScriptedRunner::new().reply("powershell", "Win32_Battery", "\r\n");
        let record = collect_battery(Platform::Windows, &runner);
        assert!(!record.is_present);
        assert!(record.note.is_some());
        assert_eq!(record.source, WINDOWS_SOURCE);
    }

    #[test]
    fn repeated_collection_is_stable() {
        let runner = darwin_runner(PMSET_DISCHARGING);
        let first = collect_battery(Platform::Darwin, &runner);
        let second = collect_battery(Platform::Darwin, &runner);
        assert_eq!(first, second);
    }

    #[test]
    fn unsupported_platform_reports_note() {
        let record = collect_battery(Platform::Unsupported, &ScriptedRunner::new());
        assert!(!record.is_present);
        assert_eq!(record.source, UNKNOWN_SOURCE);
    }
}
