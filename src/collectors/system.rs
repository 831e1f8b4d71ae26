use crate::collectors::platform::Platform;
use serde::Serialize;
use std::path::Path;
use sysinfo::{DiskExt, NetworkExt, NetworksExt, System, SystemExt};
use tracing::debug;

#[derive(Debug, Clone, Default, Serialize)]
pub struct HostInfo {
    pub host_name: Option<String>,
    pub os_name: Option<String>,
    pub os_version: Option<String>,
    pub kernel_version: Option<String>,
    pub architecture: String,
    pub user_name: Option<String>,
    pub cpu_core_count: u32,
}

/// Traffic totals and hardware address of one interface as sysinfo sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct InterfaceCounters {
    pub name: String,
    pub mac: Option<String>,
    pub rx_bytes_total: u64,
    pub tx_bytes_total: u64,
}

/// Free-space figures of the volume the OS boots from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VolumeStat {
    pub mount: String,
    pub total_bytes: u64,
    pub available_bytes: u64,
}

impl VolumeStat {
    pub fn free_percent(&self) -> Option<f64> {
        (self.total_bytes > 0)
            .then(|| self.available_bytes as f64 / self.total_bytes as f64 * 100.0)
    }
}

pub fn collect_host_info() -> HostInfo {
    let mut system = System::new();
    system.refresh_cpu();
    HostInfo {
        host_name: system.host_name(),
        os_name: system.name(),
        os_version: system.os_version(),
        kernel_version: system.kernel_version(),
        architecture: std::env::consts::ARCH.to_string(),
        user_name: current_user(),
        cpu_core_count: system.cpus().len() as u32,
    }
}

fn current_user() -> Option<String> {
    ["USER", "USERNAME"]
        .iter()
        .filter_map(|key| std::env::var(key).ok())
        .find(|name| !name.trim().is_empty())
}

pub fn collect_interface_counters() -> Vec<InterfaceCounters> {
    let mut system = System::new();
    system.refresh_networks_list();
    system.refresh_networks();

    let mut counters: Vec<InterfaceCounters> = system
        .networks()
        .iter()
        .map(|(iface, data)| {
            let mac = data.mac_address();
            InterfaceCounters {
                name: iface.to_string(),
                mac: (!mac.is_unspecified()).then(|| mac.to_string()),
                rx_bytes_total: data.total_received(),
                tx_bytes_total: data.total_transmitted(),
            }
        })
        .collect();
    counters.sort_by(|a, b| a.name.cmp(&b.name));
    counters
}

pub fn collect_system_volume(platform: Platform) -> Option<VolumeStat> {
    let mut system = System::new();
    system.refresh_disks_list();
    system.refresh_disks();

    let target = system_mount(platform);
    let volumes: Vec<VolumeStat> = system
        .disks()
        .iter()
        .map(|d| VolumeStat {
            mount: d.mount_point().to_string_lossy().to_string(),
            total_bytes: d.total_space(),
            available_bytes: d.available_space(),
        })
        .collect();

    let found = pick_system_volume(volumes, &target);
    if found.is_none() {
        debug!(mount = %target, "system volume not found among mounted disks");
    }
    found
}

fn system_mount(platform: Platform) -> String {
    match platform {
        Platform::Windows => {
            let drive = std::env::var("SystemDrive").unwrap_or_else(|_| "C:".to_string());
            format!("{}\\", drive.trim_end_matches('\\'))
        }
        Platform::Darwin | Platform::Unsupported => "/".to_string(),
    }
}

fn pick_system_volume(volumes: Vec<VolumeStat>, target: &str) -> Option<VolumeStat> {
    volumes.into_iter().find(|v| {
        v.total_bytes > 0
            && (v.mount.eq_ignore_ascii_case(target) || Path::new(&v.mount) == Path::new(target))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn volume(mount: &str, total: u64, available: u64) -> VolumeStat {
        VolumeStat {
            mount: mount.to_string(),
            total_bytes: total,
            available_bytes: available,
        }
    }

    #[test]
    fn picks_root_mount() {
        let volumes = vec![
            volume("/boot", 100, 50),
            volume("/", 1000, 250),
            volume("/home", 2000, 10),
        ];
        let picked = pick_system_volume(volumes, "/").unwrap();
        assert_eq!(picked.mount, "/");
        assert_eq!(picked.free_percent(), Some(25.0));
    }

    #[test]
    fn windows_drive_letters_match_without_case() {
        let picked = pick_system_volume(vec![volume("c:\\", 10, 1)], "C:\\");
        assert!(picked.is_some());
    }

    #[test]
    fn zero_sized_volume_is_ignored() {
        assert_eq!(pick_system_volume(vec![volume("/", 0, 0)], "/"), None);
        assert_eq!(volume("/", 0, 0).free_percent(), None);
    }
}
