use crate::collectors::battery::BatteryRecord;
use crate::collectors::checks::ProbeResult;
use crate::collectors::load::LoadSample;
use crate::collectors::network::NetworkRecord;
use crate::collectors::platform::Platform;
use crate::collectors::storage::StorageRecord;
use crate::collectors::system::{HostInfo, VolumeStat};
use crate::collectors::wireless::WirelessRecord;
use crate::collectors::HostSnapshot;
use crate::config::HealthPolicy;
use crate::health::{self, HealthInputs, HealthSummary};
use serde::Serialize;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// One finished collection pass: every record plus its health summary.
#[derive(Debug, Clone, Serialize)]
pub struct HostReport {
    pub generated_at: String,
    pub generated_at_unix: i64,
    pub platform: Platform,
    pub host: HostInfo,
    pub battery: BatteryRecord,
    pub storage: StorageRecord,
    pub wireless: WirelessRecord,
    pub network: NetworkRecord,
    pub load: LoadSample,
    pub system_volume: Option<VolumeStat>,
    pub probe: ProbeResult,
    pub health: HealthSummary,
}

impl HostReport {
    pub fn build(
        snapshot: HostSnapshot,
        probe: ProbeResult,
        policy: &HealthPolicy,
        generated_at: SystemTime,
    ) -> Self {
        let health = health::evaluate(
            &HealthInputs {
                load: &snapshot.load,
                system_volume: snapshot.system_volume.as_ref(),
                probe: &probe,
                wireless: &snapshot.wireless,
                battery: &snapshot.battery,
            },
            policy,
        );

        Self {
            generated_at: humantime::format_rfc3339_seconds(generated_at).to_string(),
            generated_at_unix: generated_at
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs() as i64)
                .unwrap_or(0),
            platform: snapshot.platform,
            host: snapshot.host,
            battery: snapshot.battery,
            storage: snapshot.storage,
            wireless: snapshot.wireless,
            network: snapshot.network,
            load: snapshot.load,
            system_volume: snapshot.system_volume,
            probe,
            health,
        }
    }
}

struct Opt<'a, T>(&'a Option<T>);

impl<T: fmt::Display> fmt::Display for Opt<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(v) => v.fmt(f),
            None => f.write_str("n/a"),
        }
    }
}

fn yes_no(flag: Option<bool>) -> &'static str {
    match flag {
        Some(true) => "yes",
        Some(false) => "no",
        None => "unknown",
    }
}

fn joined(values: &[String]) -> String {
    if values.is_empty() {
        "n/a".to_string()
    } else {
        values.join(", ")
    }
}

fn format_gb(bytes: u64) -> String {
    format!("{:.1} GB", bytes as f64 / 1_000_000_000.0)
}

impl fmt::Display for HostReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Host diagnostics ({})", self.generated_at)?;
        writeln!(
            f,
            "Host: {}  OS: {} {}  Platform: {}  Arch: {}  User: {}",
            Opt(&self.host.host_name),
            Opt(&self.host.os_name),
            Opt(&self.host.os_version),
            self.platform.label(),
            self.host.architecture,
            Opt(&self.host.user_name)
        )?;

        writeln!(f, "\n== Battery ({}) ==", self.battery.source)?;
        let b = &self.battery;
        if b.is_present {
            writeln!(f, "  Charge: {}%  Charging: {}", Opt(&b.charge_percent), yes_no(b.is_charging))?;
            writeln!(f, "  Condition: {}  Cycles: {}", Opt(&b.condition), Opt(&b.cycle_count))?;
            writeln!(
                f,
                "  Capacity: {} / {} mAh  Maximum: {}%",
                Opt(&b.full_charge_capacity_mah),
                Opt(&b.design_capacity_mah),
                Opt(&b.maximum_capacity_percent)
            )?;
        }
        if let Some(note) = &b.note {
            writeln!(f, "  Note: {note}")?;
        }

        writeln!(f, "\n== Storage ({}) ==", self.storage.source)?;
        for disk in &self.storage.disks {
            writeln!(
                f,
                "  {} [{}]  SSD: {}  Capacity: {}",
                Opt(&disk.name),
                Opt(&disk.model),
                yes_no(disk.is_ssd),
                disk.capacity_text
                    .clone()
                    .or_else(|| disk.capacity_bytes.map(format_gb))
                    .unwrap_or_else(|| "n/a".to_string())
            )?;
            writeln!(
                f,
                "    SMART: {}  TRIM: {}  Health: {}  Interface: {}",
                Opt(&disk.smart_status),
                Opt(&disk.trim_support),
                Opt(&disk.health_status),
                Opt(&disk.interface_type)
            )?;
        }
        if let Some(note) = &self.storage.note {
            writeln!(f, "  Note: {note}")?;
        }

        writeln!(f, "\n== Wi-Fi ({}) ==", self.wireless.source)?;
        let w = &self.wireless;
        if w.is_available {
            writeln!(f, "  SSID: {}  Interface: {}", Opt(&w.ssid), Opt(&w.interface_name))?;
            writeln!(
                f,
                "  Signal: {}% ({} dBm)  Noise: {} dBm  Tx: {} Mbps",
                Opt(&w.signal_percent),
                Opt(&w.signal_dbm),
                Opt(&w.noise_dbm),
                Opt(&w.tx_rate_mbps)
            )?;
            writeln!(
                f,
                "  Channel: {}  PHY: {}  Security: {}",
                Opt(&w.channel),
                Opt(&w.phy_mode),
                Opt(&w.security)
            )?;
        }
        if let Some(note) = &w.note {
            writeln!(f, "  Note: {note}")?;
        }

        writeln!(f, "\n== Network ({}) ==", self.network.source)?;
        let n = &self.network;
        if n.is_available {
            writeln!(
                f,
                "  Primary: {}  Gateway: {}",
                Opt(&n.primary_adapter),
                Opt(&n.default_gateway)
            )?;
            for adapter in &n.adapters {
                writeln!(
                    f,
                    "  {} [{}]  MAC: {}  Speed: {} Mbps",
                    adapter.name,
                    Opt(&adapter.kind),
                    Opt(&adapter.mac),
                    Opt(&adapter.link_speed_mbps)
                )?;
                writeln!(
                    f,
                    "    IPv4: {}  IPv6: {}",
                    joined(&adapter.ipv4),
                    joined(&adapter.ipv6)
                )?;
                if !adapter.gateways.is_empty() || !adapter.dns_servers.is_empty() {
                    writeln!(
                        f,
                        "    Gateways: {}  DNS: {}",
                        joined(&adapter.gateways),
                        joined(&adapter.dns_servers)
                    )?;
                }
            }
        }
        if let Some(note) = &n.note {
            writeln!(f, "  Note: {note}")?;
        }

        writeln!(f, "\n== Connectivity ==")?;
        let p = &self.probe;
        writeln!(
            f,
            "  Target: {}  Up: {}  Latency: {} ms",
            p.target,
            yes_no(Some(p.up)),
            p.latency_ms
        )?;
        if let Some(note) = &p.note {
            writeln!(f, "    Note: {note}")?;
        }
        match &p.gateway {
            Some(gw) => {
                writeln!(
                    f,
                    "  Gateway: {}  Up: {}  Latency: {} ms",
                    gw.address,
                    yes_no(Some(gw.up)),
                    gw.latency_ms
                )?;
                if let Some(note) = &gw.note {
                    writeln!(f, "    Note: {note}")?;
                }
            }
            None => writeln!(f, "  Gateway: not checked")?,
        }

        writeln!(f, "\n== Health ==")?;
        for item in &self.health.items {
            writeln!(
                f,
                "  {:<8} {:<7} {:>3}  {}",
                item.subject,
                item.tier.as_str(),
                item.score,
                item.detail
            )?;
        }
        writeln!(
            f,
            "  Overall: {} ({})",
            self.health.overall_score,
            self.health.overall_tier.as_str()
        )
    }
}
