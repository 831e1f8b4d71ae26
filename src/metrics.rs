use crate::health::Tier;
use crate::report::HostReport;
use prometheus::core::Collector;
use prometheus::{opts, Encoder, Gauge, GaugeVec, Registry, TextEncoder};

/// Gauges for one report. Optional readings live in labelled vectors so an
/// absent value is left out of the exposition instead of reading as zero.
pub struct Metrics {
    registry: Registry,
    pub health_score: GaugeVec,
    pub health_tier: GaugeVec,
    pub health_overall_score: Gauge,
    pub health_overall_tier: Gauge,
    pub cpu_usage_percent: GaugeVec,
    pub ram_usage_percent: GaugeVec,
    pub system_volume_free_percent: GaugeVec,
    pub battery_charge_percent: GaugeVec,
    pub battery_cycle_count: GaugeVec,
    pub battery_maximum_capacity_percent: GaugeVec,
    pub wireless_signal_percent: GaugeVec,
    pub wireless_signal_dbm: GaugeVec,
    pub disk_count: Gauge,
    pub disk_capacity_bytes: GaugeVec,
    pub probe_up: GaugeVec,
    pub probe_latency_ms: GaugeVec,
    pub network_adapter_count: Gauge,
    pub gateway_up: GaugeVec,
    pub gateway_latency_ms: GaugeVec,
    pub collector_available: GaugeVec,
    pub last_collect_timestamp_seconds: Gauge,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let health_score = GaugeVec::new(
            opts!("hostprobe_health_score", "Health score (0..100) by subject"),
            &["subject"],
        )?;
        let health_tier = GaugeVec::new(
            opts!(
                "hostprobe_health_tier",
                "Health tier by subject (0 unknown, 1 red, 2 yellow, 3 green)"
            ),
            &["subject"],
        )?;
        let health_overall_score = Gauge::with_opts(opts!(
            "hostprobe_health_overall_score",
            "Mean score of every scored subject"
        ))?;
        let health_overall_tier = Gauge::with_opts(opts!(
            "hostprobe_health_overall_tier",
            "Overall tier (0 unknown, 1 red, 2 yellow, 3 green)"
        ))?;
        let cpu_usage_percent = GaugeVec::new(
            opts!("hostprobe_cpu_usage_percent", "CPU usage in percent"),
            &["platform"],
        )?;
        let ram_usage_percent = GaugeVec::new(
            opts!("hostprobe_ram_usage_percent", "RAM usage in percent"),
            &["platform"],
        )?;
        let system_volume_free_percent = GaugeVec::new(
            opts!(
                "hostprobe_system_volume_free_percent",
                "Free space on the system volume in percent"
            ),
            &["mount"],
        )?;
        let battery_charge_percent = GaugeVec::new(
            opts!("hostprobe_battery_charge_percent", "Battery charge in percent"),
            &["source"],
        )?;
        let battery_cycle_count = GaugeVec::new(
            opts!("hostprobe_battery_cycle_count", "Battery charge cycles"),
            &["source"],
        )?;
        let battery_maximum_capacity_percent = GaugeVec::new(
            opts!(
                "hostprobe_battery_maximum_capacity_percent",
                "Battery maximum capacity relative to design"
            ),
            &["source"],
        )?;
        let wireless_signal_percent = GaugeVec::new(
            opts!("hostprobe_wireless_signal_percent", "Wi-Fi signal quality in percent"),
            &["ssid"],
        )?;
        let wireless_signal_dbm = GaugeVec::new(
            opts!("hostprobe_wireless_signal_dbm", "Wi-Fi RSSI in dBm"),
            &["ssid"],
        )?;
        let disk_count = Gauge::with_opts(opts!(
            "hostprobe_disk_count",
            "Number of physical disks reported"
        ))?;
        let disk_capacity_bytes = GaugeVec::new(
            opts!("hostprobe_disk_capacity_bytes", "Physical disk capacity in bytes"),
            &["disk"],
        )?;
        let probe_up = GaugeVec::new(
            opts!("hostprobe_probe_up", "Reachability probe result (1 up, 0 down)"),
            &["target"],
        )?;
        let probe_latency_ms = GaugeVec::new(
            opts!("hostprobe_probe_latency_ms", "Reachability probe latency in ms"),
            &["target"],
        )?;
        let network_adapter_count = Gauge::with_opts(opts!(
            "hostprobe_network_adapter_count",
            "Active network adapters with a routable address"
        ))?;
        let gateway_up = GaugeVec::new(
            opts!("hostprobe_gateway_up", "Default gateway reachability (1 up, 0 down)"),
            &["gateway"],
        )?;
        let gateway_latency_ms = GaugeVec::new(
            opts!("hostprobe_gateway_latency_ms", "Default gateway connect latency in ms"),
            &["gateway"],
        )?;
        let collector_available = GaugeVec::new(
            opts!(
                "hostprobe_collector_available",
                "Whether a collector produced data (1) or an unavailable record (0)"
            ),
            &["collector"],
        )?;
        let last_collect_timestamp_seconds = Gauge::with_opts(opts!(
            "hostprobe_last_collect_timestamp_seconds",
            "Unix time of the collection pass"
        ))?;

        register(&registry, &health_score)?;
        register(&registry, &health_tier)?;
        register(&registry, &health_overall_score)?;
        register(&registry, &health_overall_tier)?;
        register(&registry, &cpu_usage_percent)?;
        register(&registry, &ram_usage_percent)?;
        register(&registry, &system_volume_free_percent)?;
        register(&registry, &battery_charge_percent)?;
        register(&registry, &battery_cycle_count)?;
        register(&registry, &battery_maximum_capacity_percent)?;
        register(&registry, &wireless_signal_percent)?;
        register(&registry, &wireless_signal_dbm)?;
        register(&registry, &disk_count)?;
        register(&registry, &disk_capacity_bytes)?;
        register(&registry, &probe_up)?;
        register(&registry, &probe_latency_ms)?;
        register(&registry, &network_adapter_count)?;
        register(&registry, &gateway_up)?;
        register(&registry, &gateway_latency_ms)?;
        register(&registry, &collector_available)?;
        register(&registry, &last_collect_timestamp_seconds)?;

        Ok(Self {
            registry,
            health_score,
            health_tier,
            health_overall_score,
            health_overall_tier,
            cpu_usage_percent,
            ram_usage_percent,
            system_volume_free_percent,
            battery_charge_percent,
            battery_cycle_count,
            battery_maximum_capacity_percent,
            wireless_signal_percent,
            wireless_signal_dbm,
            disk_count,
            disk_capacity_bytes,
            probe_up,
            probe_latency_ms,
            network_adapter_count,
            gateway_up,
            gateway_latency_ms,
            collector_available,
            last_collect_timestamp_seconds,
        })
    }

    pub fn update_from_report(&self, report: &HostReport) {
        for item in &report.health.items {
            self.health_tier
                .with_label_values(&[&item.subject])
                .set(f64::from(item.tier.ordinal()));
            if item.tier != Tier::Unknown {
                self.health_score
                    .with_label_values(&[&item.subject])
                    .set(f64::from(item.score));
            }
        }
        self.health_overall_tier
            .set(f64::from(report.health.overall_tier.ordinal()));
        if report.health.overall_tier != Tier::Unknown {
            self.health_overall_score
                .set(f64::from(report.health.overall_score));
        }

        let platform = report.platform.label();
        if let Some(cpu) = report.load.cpu_percent {
            self.cpu_usage_percent.with_label_values(&[platform]).set(cpu);
        }
        if let Some(ram) = report.load.ram_percent {
            self.ram_usage_percent.with_label_values(&[platform]).set(ram);
        }
        if let Some(volume) = &report.system_volume {
            if let Some(free) = volume.free_percent() {
                self.system_volume_free_percent
                    .with_label_values(&[&volume.mount])
                    .set(free);
            }
        }

        let battery = &report.battery;
        if let Some(pct) = battery.charge_percent {
            self.battery_charge_percent
                .with_label_values(&[&battery.source])
                .set(f64::from(pct));
        }
        if let Some(cycles) = battery.cycle_count {
            self.battery_cycle_count
                .with_label_values(&[&battery.source])
                .set(f64::from(cycles));
        }
        if let Some(max) = battery.maximum_capacity_percent {
            self.battery_maximum_capacity_percent
                .with_label_values(&[&battery.source])
                .set(f64::from(max));
        }

        let wireless = &report.wireless;
        if let Some(ssid) = wireless.ssid.as_deref().filter(|_| wireless.is_available) {
            if let Some(pct) = wireless.signal_percent {
                self.wireless_signal_percent
                    .with_label_values(&[ssid])
                    .set(f64::from(pct));
            }
            if let Some(dbm) = wireless.signal_dbm {
                self.wireless_signal_dbm
                    .with_label_values(&[ssid])
                    .set(f64::from(dbm));
            }
        }

        self.disk_count.set(report.storage.disks.len() as f64);
        for disk in &report.storage.disks {
            let label = disk
                .bsd_name
                .as_deref()
                .or(disk.name.as_deref())
                .or(disk.model.as_deref())
                .unwrap_or("unknown");
            if let Some(bytes) = disk.capacity_bytes {
                self.disk_capacity_bytes
                    .with_label_values(&[label])
                    .set(bytes as f64);
            }
        }

        let probe = &report.probe;
        self.probe_up
            .with_label_values(&[&probe.target])
            .set(if probe.up { 1.0 } else { 0.0 });
        self.probe_latency_ms
            .with_label_values(&[&probe.target])
            .set(probe.latency_ms as f64);

        if let Some(gateway) = &probe.gateway {
            self.gateway_up
                .with_label_values(&[&gateway.address])
                .set(if gateway.up { 1.0 } else { 0.0 });
            self.gateway_latency_ms
                .with_label_values(&[&gateway.address])
                .set(gateway.latency_ms as f64);
        }
        self.network_adapter_count
            .set(report.network.adapters.len() as f64);

        for (collector, available) in [
            ("battery", battery.is_present),
            ("storage", report.storage.is_available),
            ("wireless", wireless.is_available),
            ("network", report.network.is_available),
            ("system_volume", report.system_volume.is_some()),
        ] {
            self.collector_available
                .with_label_values(&[collector])
                .set(if available { 1.0 } else { 0.0 });
        }

        self.last_collect_timestamp_seconds
            .set(report.generated_at_unix as f64);
    }

    pub fn encode_metrics(&self) -> Result<Vec<u8>, prometheus::Error> {
        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        let mf = self.registry.gather();
        encoder.encode(&mf, &mut buf)?;
        Ok(buf)
    }
}

fn register<T: Collector + Clone + 'static>(
    registry: &Registry,
    collector: &T,
) -> Result<(), prometheus::Error> {
    registry.register(Box::new(collector.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::tests::sample_report;

    fn encoded(report: &HostReport) -> String {
        let metrics = Metrics::new().unwrap();
        metrics.update_from_report(report);
        String::from_utf8(metrics.encode_metrics().unwrap()).unwrap()
    }

    #[test]
    fn exposes_health_and_probe() {
        let text = encoded(&sample_report());
        assert!(text.contains("hostprobe_health_overall_score 72"));
        assert!(text.contains("hostprobe_health_overall_tier 2"));
        assert!(text.contains("hostprobe_health_score{subject=\"RAM\"} 25"));
        assert!(text.contains("hostprobe_health_tier{subject=\"Battery\"} 0"));
        assert!(text.contains("hostprobe_probe_up{target=\"1.1.1.1:443\"} 1"));
        assert!(text.contains("hostprobe_cpu_usage_percent{platform=\"macOS\"} 50"));
    }

    #[test]
    fn exposes_adapters_and_gateway() {
        let text = encoded(&sample_report());
        assert!(text.contains("hostprobe_network_adapter_count 1"));
        assert!(text.contains("hostprobe_gateway_up{gateway=\"192.168.1.1\"} 1"));
        assert!(text.contains("hostprobe_gateway_latency_ms{gateway=\"192.168.1.1\"} 2"));
        assert!(text.contains("hostprobe_collector_available{collector=\"network\"} 1"));

        let mut report = sample_report();
        report.probe.gateway = None;
        assert!(!encoded(&report).contains("hostprobe_gateway_up"));
    }

    #[test]
    fn absent_readings_are_left_out() {
        let text = encoded(&sample_report());
        assert!(!text.contains("hostprobe_battery_charge_percent"));
        assert!(!text.contains("hostprobe_wireless_signal_dbm"));
        assert!(!text.contains("hostprobe_health_score{subject=\"Battery\"}"));
        assert!(text.contains("hostprobe_collector_available{collector=\"battery\"} 0"));
    }
}
