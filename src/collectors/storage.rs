use crate::collectors::command::{run_powershell, CommandRunner};
use crate::collectors::platform::Platform;
use crate::collectors::text::{non_blank, parse_u64_digits, query_rows};
use crate::collectors::CollectError;
use serde::Serialize;
use std::collections::HashSet;
use tracing::{debug, warn};

const DARWIN_SOURCE: &str = "macOS:system_profiler(SPNVMeDataType+SPSerialATADataType)";
const WINDOWS_SOURCE: &str = "Windows:CIM(MSFT_PhysicalDisk -> fallback Win32_DiskDrive)";
const UNKNOWN_SOURCE: &str = "unknown";

/// Per-device header indent in system_profiler output.
const PROFILER_DEVICE_INDENT: usize = 6;

const MSFT_PHYSICAL_DISK_QUERY: &str = "Get-CimInstance -Namespace root/Microsoft/Windows/Storage -ClassName MSFT_PhysicalDisk -ErrorAction SilentlyContinue | ForEach-Object { \"$($_.FriendlyName)|$($_.MediaType)|$($_.Size)|$($_.SerialNumber)|$($_.HealthStatus)\" }";
const WIN32_DISK_DRIVE_QUERY: &str = "Get-CimInstance -ClassName Win32_DiskDrive -ErrorAction SilentlyContinue | ForEach-Object { \"$($_.Model)|$($_.Size)|$($_.SerialNumber)|$($_.MediaType)|$($_.InterfaceType)\" }";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StorageRecord {
    pub is_available: bool,
    pub disks: Vec<PhysicalDisk>,
    pub source: String,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PhysicalDisk {
    pub name: Option<String>,
    pub model: Option<String>,
    pub serial: Option<String>,
    pub bsd_name: Option<String>,
    pub is_ssd: Option<bool>,
    pub capacity_text: Option<String>,
    pub capacity_bytes: Option<u64>,
    pub smart_status: Option<String>,
    pub trim_support: Option<String>,
    pub medium_type: Option<String>,
    pub interface_type: Option<String>,
    pub health_status: Option<String>,
}

impl PhysicalDisk {
    fn dedup_key(&self) -> String {
        format!(
            "{}|{}",
            self.name.as_deref().unwrap_or("").trim(),
            self.model.as_deref().unwrap_or("").trim()
        )
    }

    fn is_identified(&self) -> bool {
        let filled = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        filled(&self.name) || filled(&self.model)
    }
}

impl StorageRecord {
    fn with_disks(source: &str, disks: Vec<PhysicalDisk>, empty_note: &str) -> Self {
        let is_available = !disks.is_empty();
        Self {
            is_available,
            disks,
            source: source.to_string(),
            note: (!is_available).then(|| empty_note.to_string()),
        }
    }

    pub fn unavailable(source: &str, note: impl Into<String>) -> Self {
        Self {
            is_available: false,
            disks: Vec::new(),
            source: source.to_string(),
            note: non_blank(&note.into()),
        }
    }
}

pub fn collect_storage(platform: Platform, runner: &dyn CommandRunner) -> StorageRecord {
    let (source, result) = match platform {
        Platform::Darwin => (DARWIN_SOURCE, collect_darwin(runner)),
        Platform::Windows => (WINDOWS_SOURCE, collect_windows(runner)),
        Platform::Unsupported => {
            return StorageRecord::unavailable(
                UNKNOWN_SOURCE,
                "Storage info not available on this platform.",
            )
        }
    };

    result.unwrap_or_else(|err| {
        warn!(error = %err, platform = platform.label(), "storage collection failed");
        let context = format!("{} storage query", platform.label());
        StorageRecord::unavailable(source, err.note(&context))
    })
}

fn collect_darwin(runner: &dyn CommandRunner) -> Result<StorageRecord, CollectError> {
    let mut disks = Vec::new();

    let nvme = runner.run("system_profiler", &["SPNVMeDataType"])?;
    parse_profiler_disks(&nvme, true, &mut disks);

    let sata = runner.run("system_profiler", &["SPSerialATADataType"])?;
    parse_profiler_disks(&sata, false, &mut disks);

    Ok(StorageRecord::with_disks(
        DARWIN_SOURCE,
        dedup_disks(disks),
        "No physical disks found in system_profiler output.",
    ))
}

/// Scans one system_profiler dump, appending a disk per device header.
///
/// `assume_ssd` seeds the solid-state flag (NVMe dumps true, SATA false);
/// an explicit `Medium Type` overrides it.
fn parse_profiler_disks(text: &str, assume_ssd: bool, disks: &mut Vec<PhysicalDisk>) {
    let mut current: Option<PhysicalDisk> = None;

    for raw in text.lines() {
        let line = raw.trim_end_matches('\r');
        let trimmed = line.trim();

        if is_device_header(line, trimmed) {
            disks.extend(current.take());
            current = Some(PhysicalDisk {
                name: non_blank(trimmed.trim_end_matches(':')),
                is_ssd: Some(assume_ssd),
                ..PhysicalDisk::default()
            });
            continue;
        }

        let Some(disk) = current.as_mut() else {
            continue;
        };
        let Some((key, value)) = trimmed.split_once(':') else {
            continue;
        };
        apply_profiler_field(disk, key.trim(), value.trim());
    }

    disks.extend(current);
}

fn is_device_header(line: &str, trimmed: &str) -> bool {
    let indent = line.len() - line.trim_start_matches(' ').len();
    trimmed.ends_with(':')
        && !trimmed.contains(": ")
        && trimmed.len() > 2
        && indent == PROFILER_DEVICE_INDENT
}

/// First value of each key wins so nested volume blocks keep their hands
/// off the device's own fields.
fn apply_profiler_field(disk: &mut PhysicalDisk, key: &str, value: &str) {
    fn set_once(slot: &mut Option<String>, value: &str) {
        if slot.is_none() {
            *slot = non_blank(value);
        }
    }

    let key = key.to_ascii_lowercase();
    match key.as_str() {
        "model" => set_once(&mut disk.model, value),
        "serial number" => set_once(&mut disk.serial, value),
        "bsd name" => set_once(&mut disk.bsd_name, value),
        "smart status" | "s.m.a.r.t. status" => set_once(&mut disk.smart_status, value),
        "trim support" => set_once(&mut disk.trim_support, value),
        "capacity" => {
            if disk.capacity_text.is_none() {
                disk.capacity_text = non_blank(value);
                disk.capacity_bytes = parse_parenthesized_bytes(value);
            }
        }
        "medium type" => {
            if disk.medium_type.is_some() {
                return;
            }
            disk.medium_type = non_blank(value);
            let lowered = value.to_ascii_lowercase();
            if lowered.contains("ssd") || lowered.contains("solid state") {
                disk.is_ssd = Some(true);
            } else if lowered.contains("hdd") || lowered.contains("hard disk") {
                disk.is_ssd = Some(false);
            }
        }
        _ => {}
    }
}

/// "500.28 GB (500,277,790,720 bytes)" -> 500277790720.
fn parse_parenthesized_bytes(value: &str) -> Option<u64> {
    let (_, rest) = value.split_once('(')?;
    let (inner, _) = rest.split_once(')')?;
    let number = inner.trim().strip_suffix("bytes")?;
    parse_u64_digits(number)
}

fn dedup_disks(disks: Vec<PhysicalDisk>) -> Vec<PhysicalDisk> {
    let mut seen = HashSet::new();
    disks
        .into_iter()
        .filter(PhysicalDisk::is_identified)
        .filter(|disk| seen.insert(disk.dedup_key()))
        .collect()
}

fn collect_windows(runner: &dyn CommandRunner) -> Result<StorageRecord, CollectError> {
    // Older builds lack the Storage namespace; treat any failure as zero rows.
    let modern = match run_powershell(runner, MSFT_PHYSICAL_DISK_QUERY) {
        Ok(text) => parse_msft_physical_disks(&text),
        Err(err) => {
            debug!(error = %err, "MSFT_PhysicalDisk query failed");
            Vec::new()
        }
    };
    if !modern.is_empty() {
        return Ok(StorageRecord::with_disks(WINDOWS_SOURCE, modern, ""));
    }

    let legacy = run_powershell(runner, WIN32_DISK_DRIVE_QUERY)?;
    Ok(StorageRecord::with_disks(
        WINDOWS_SOURCE,
        parse_win32_disk_drives(&legacy),
        "No physical disks found via CIM.",
    ))
}

fn parse_msft_physical_disks(text: &str) -> Vec<PhysicalDisk> {
    query_rows(text, 5)
        .map(|parts| {
            let media_type = parts[1].parse::<u16>().ok();
            PhysicalDisk {
                name: non_blank(parts[0]),
                medium_type: non_blank(parts[1]),
                is_ssd: match media_type {
                    Some(3) => Some(true),
                    Some(4) => Some(false),
                    _ => None,
                },
                capacity_bytes: parts[2].parse().ok(),
                serial: non_blank(parts[3]),
                health_status: health_status_label(parts[4]),
                ..PhysicalDisk::default()
            }
        })
        .filter(PhysicalDisk::is_identified)
        .collect()
}

fn health_status_label(raw: &str) -> Option<String> {
    let label = match raw.trim() {
        "0" => "Healthy",
        "1" => "Warning",
        "2" => "Unhealthy",
        "5" => "Unknown",
        other => return non_blank(other),
    };
    Some(label.to_string())
}

fn parse_win32_disk_drives(text: &str) -> Vec<PhysicalDisk> {
    query_rows(text, 5)
        .map(|parts| {
            let medium_type = non_blank(parts[3]);
            let is_ssd = medium_type
                .as_deref()
                .is_some_and(|m| m.to_ascii_uppercase().contains("SSD"))
                .then_some(true);
            PhysicalDisk {
                name: non_blank(parts[0]),
                model: non_blank(parts[0]),
                capacity_bytes: parts[1].parse().ok(),
                serial: non_blank(parts[2]),
                medium_type,
                is_ssd,
                interface_type: non_blank(parts[4]),
                ..PhysicalDisk::default()
            }
        })
        .filter(PhysicalDisk::is_identified)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::command::testing::ScriptedRunner;

    const NVME: &str = "\
NVMExpress:

    Apple SSD Controller:

      APPLE SSD AP0512Q:

          Capacity: 500.28 GB (500,277,790,720 bytes)
          TRIM Support: Yes
          Model: APPLE SSD AP0512Q
          Serial Number: C02XYZ
          BSD Name: disk0
          S.M.A.R.T. status: Verified
          Volumes:
            EFI:
              Capacity: 209.7 MB (209,715,200 bytes)
";

    const SATA: &str = "\
SATA/SATA Express:

    Intel 8 Series Chipset:

      WDC WD10EZEX-08WN4A0:

          Capacity: 1 TB (1,000,204,886,016 bytes)
          Model: WDC WD10EZEX-08WN4A0
          SMART Status: Verified
          Medium Type: Rotational HDD

      Samsung SSD 860 EVO:

          Model: Samsung SSD 860 EVO 500GB
          Medium Type: Solid State
          TRIM Support: Yes
";

    fn darwin_runner(nvme: &str, sata: &str) -> ScriptedRunner {
        ScriptedRunner::new()
            .reply("system_profiler", "SPNVMeDataType", nvme)
            .reply("system_profiler", "SPSerialATADataType", sata)
    }

    #[test]
    fn darwin_profiler_disks_are_parsed() {
        let record = collect_storage(Platform::Darwin, &darwin_runner(NVME, SATA));

        assert!(record.is_available);
        assert_eq!(record.disks.len(), 3);

        let nvme = &record.disks[0];
        assert_eq!(nvme.name.as_deref(), Some("APPLE SSD AP0512Q"));
        assert_eq!(nvme.is_ssd, Some(true));
        assert_eq!(nvme.capacity_text.as_deref(), Some("500.28 GB (500,277,790,720 bytes)"));
        assert_eq!(nvme.capacity_bytes, Some(500_277_790_720));
        assert_eq!(nvme.smart_status.as_deref(), Some("Verified"));
        assert_eq!(nvme.trim_support.as_deref(), Some("Yes"));
        assert_eq!(nvme.serial.as_deref(), Some("C02XYZ"));
        assert_eq!(nvme.bsd_name.as_deref(), Some("disk0"));

        let hdd = &record.disks[1];
        assert_eq!(hdd.is_ssd, Some(false));
        assert_eq!(hdd.smart_status.as_deref(), Some("Verified"));

        let sata_ssd = &record.disks[2];
        assert_eq!(sata_ssd.name.as_deref(), Some("Samsung SSD 860 EVO"));
        assert_eq!(sata_ssd.is_ssd, Some(true));
    }

    #[test]
    fn controller_lines_are_not_device_headers() {
        let mut disks = Vec::new();
        parse_profiler_disks("    Apple SSD Controller:\n        Model: X\n", true, &mut disks);
        assert!(disks.is_empty());
    }

    #[test]
    fn identical_devices_are_merged() {
        let record = collect_storage(Platform::Darwin, &darwin_runner(NVME, NVME));
        assert_eq!(record.disks.len(), 1);
    }

    #[test]
    fn empty_profiler_output_is_unavailable() {
        let record = collect_storage(Platform::Darwin, &darwin_runner("NVMExpress:\n", ""));
        assert!(!record.is_available);
        assert!(record.disks.is_empty());
        assert!(record.note.is_some());
    }

    #[test]
    fn profiler_spawn_failure_is_unavailable() {
        let runner = ScriptedRunner::new().missing("system_profiler", "");
        let record = collect_storage(Platform::Darwin, &runner);
        assert!(!record.is_available);
        assert_eq!(record.note.as_deref(), Some("macOS storage query error: NotFound"));
    }

    #[test]
    fn windows_prefers_msft_physical_disk() {
        let runner = ScriptedRunner::new()
            .reply(
                "powershell",
                "MSFT_PhysicalDisk",
                "ST2000DM008|4|2000398934016|ZFL1|0\r\nSamsung SSD 980|3|1000204886016|S64ANS0R|1\r\n",
            )
            .reply("powershell", "Win32_DiskDrive", "should-not-be-read|1|2|3|4");
        let record = collect_storage(Platform::Windows, &runner);

        assert!(record.is_available);
        assert_eq!(record.disks.len(), 2);
        assert_eq!(record.disks[0].is_ssd, Some(false));
        assert_eq!(record.disks[0].capacity_bytes, Some(2_000_398_934_016));
        assert_eq!(record.disks[0].health_status.as_deref(), Some("Healthy"));
        assert_eq!(record.disks[1].is_ssd, Some(true));
        assert_eq!(record.disks[1].health_status.as_deref(), Some("Warning"));
        assert!(!runner.calls().iter().any(|c| c.contains("Win32_DiskDrive")));
    }

    #[test]
    fn windows_falls_back_to_win32_disk_drive() {
        let runner = ScriptedRunner::new()
            .reply("powershell", "MSFT_PhysicalDisk", "")
            .reply(
                "powershell",
                "Win32_DiskDrive",
                "KINGSTON SA400 SSD|480101368320|50026B77|Fixed hard disk media SSD|SCSI\r\n",
            );
        let record = collect_storage(Platform::Windows, &runner);

        assert!(record.is_available);
        let disk = &record.disks[0];
        assert_eq!(disk.model.as_deref(), Some("KINGSTON SA400 SSD"));
        assert_eq!(disk.is_ssd, Some(true));
        assert_eq!(disk.interface_type.as_deref(), Some("SCSI"));
    }

    #[test]
    fn repeated_collection_is_stable() {
        let runner = darwin_runner(NVME, SATA);
        let first = collect_storage(Platform::Darwin, &runner);
        let second = collect_storage(Platform::Darwin, &runner);
        assert_eq!(first, second);

        let runner = ScriptedRunner::new().reply(
            "powershell",
            "MSFT_PhysicalDisk",
            "ST2000DM008|4|2000398934016|ZFL1|0\r\n",
        );
        let first = collect_storage(Platform::Windows, &runner);
        let second = collect_storage(Platform::Windows, &runner);
        assert!(first.is_available);
        assert_eq!(first, second);
    }

    #[test]
    fn windows_legacy_non_ssd_media_is_unknown() {
        let disks = parse_win32_disk_drives("WDC WD10|1000|SN|Fixed hard disk media|IDE\n");
        assert_eq!(disks[0].is_ssd, None);
    }

    #[test]
    fn windows_with_no_disks_is_unavailable() {
        let runner = ScriptedRunner::new()
            .reply("powershell", "MSFT_PhysicalDisk", "")
            .reply("powershell", "Win32_DiskDrive", "");
        let record = collect_storage(Platform::Windows, &runner);
        assert!(!record.is_available);
        assert_eq!(record.note.as_deref(), Some("No physical disks found via CIM."));
    }
}
