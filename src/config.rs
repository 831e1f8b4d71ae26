use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub probe: ProbeConfig,
    #[serde(default)]
    pub load: LoadConfig,
    #[serde(default)]
    pub wireless: WirelessConfig,
    #[serde(default)]
    pub health: HealthPolicy,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ProbeConfig {
    #[serde(default = "default_probe_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub target: ProbeTarget,
    /// TCP-connect the default gateway as well when one is known.
    #[serde(default = "default_check_gateway")]
    pub check_gateway: bool,
    #[serde(default = "default_gateway_port")]
    pub gateway_port: u16,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ProbeTarget {
    Tcp {
        host: String,
        port: u16,
    },
    Http {
        url: String,
        #[serde(default = "default_expected_status")]
        expected_status: u16,
    },
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct LoadConfig {
    #[serde(default = "default_sample_window_ms")]
    pub sample_window_ms: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DarwinWirelessSource {
    /// airport, then networksetup when airport is missing or retired.
    #[default]
    Auto,
    Airport,
    Networksetup,
    /// Needs root; without it the record explains the privilege requirement.
    Wdutil,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct WirelessConfig {
    #[serde(default)]
    pub darwin_source: DarwinWirelessSource,
    #[serde(default = "default_airport_path")]
    pub airport_path: String,
}

/// Tier thresholds of the health score. Defaults are heuristics, not
/// calibrated limits.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct HealthPolicy {
    #[serde(default = "default_cpu_bands")]
    pub cpu: UsageBands,
    #[serde(default = "default_ram_bands")]
    pub ram: UsageBands,
    #[serde(default = "default_disk_free_bands")]
    pub disk_free: FloorBands,
    #[serde(default = "default_wireless_signal_bands")]
    pub wireless_signal: FloorBands,
    #[serde(default = "default_wireless_dbm_bands")]
    pub wireless_dbm: FloorBands,
    #[serde(default = "default_overall_bands")]
    pub overall: FloorBands,
}

/// Utilisation bands: below `green_below` is Green, below `yellow_below` Yellow.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct UsageBands {
    pub green_below: f64,
    pub yellow_below: f64,
}

/// Floor bands: at least `green_at_least` is Green, at least `yellow_at_least` Yellow.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct FloorBands {
    pub green_at_least: f64,
    pub yellow_at_least: f64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_probe_timeout_ms(),
            target: ProbeTarget::default(),
            check_gateway: default_check_gateway(),
            gateway_port: default_gateway_port(),
        }
    }
}

impl Default for ProbeTarget {
    fn default() -> Self {
        ProbeTarget::Tcp {
            host: "1.1.1.1".to_string(),
            port: 443,
        }
    }
}

impl ProbeTarget {
    pub fn label(&self) -> String {
        match self {
            ProbeTarget::Tcp { host, port } => format!("{host}:{port}"),
            ProbeTarget::Http { url, .. } => url.clone(),
        }
    }
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            sample_window_ms: default_sample_window_ms(),
        }
    }
}

impl Default for WirelessConfig {
    fn default() -> Self {
        Self {
            darwin_source: DarwinWirelessSource::Auto,
            airport_path: default_airport_path(),
        }
    }
}

impl Default for HealthPolicy {
    fn default() -> Self {
        Self {
            cpu: default_cpu_bands(),
            ram: default_ram_bands(),
            disk_free: default_disk_free_bands(),
            wireless_signal: default_wireless_signal_bands(),
            wireless_dbm: default_wireless_dbm_bands(),
            overall: default_overall_bands(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse YAML in {path}: {source}")]
    Parse {
        path: String,
        source: serde_yaml::Error,
    },
    #[error("invalid configuration: {0}")]
    Validation(String),
}

impl Config {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        let path_display = path_ref.display().to_string();
        let text = fs::read_to_string(path_ref).map_err(|source| ConfigError::Read {
            path: path_display.clone(),
            source,
        })?;

        let cfg: Config = serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path_display,
            source,
        })?;

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_probe(&self.probe)?;
        if self.load.sample_window_ms < 200 {
            return Err(ConfigError::Validation(
                "load.sample_window_ms must be >= 200".to_string(),
            ));
        }
        if self.wireless.airport_path.trim().is_empty() {
            return Err(ConfigError::Validation(
                "wireless.airport_path must not be empty".to_string(),
            ));
        }
        validate_health(&self.health)?;
        Ok(())
    }

    pub fn example_yaml() -> &'static str {
        include_str!("../config.yaml.example")
    }
}

fn validate_probe(probe: &ProbeConfig) -> Result<(), ConfigError> {
    if probe.timeout_ms == 0 {
        return Err(ConfigError::Validation(
            "probe.timeout_ms must be > 0".to_string(),
        ));
    }
    if probe.check_gateway && probe.gateway_port == 0 {
        return Err(ConfigError::Validation(
            "probe.gateway_port must be in 1..65535".to_string(),
        ));
    }
    match &probe.target {
        ProbeTarget::Tcp { host, port } => {
            if host.trim().is_empty() {
                return Err(ConfigError::Validation(
                    "probe.target.host must not be empty".to_string(),
                ));
            }
            if *port == 0 {
                return Err(ConfigError::Validation(
                    "probe.target.port must be in 1..65535".to_string(),
                ));
            }
        }
        ProbeTarget::Http { url, .. } => {
            if url.trim().is_empty() {
                return Err(ConfigError::Validation(
                    "probe.target.url must not be empty".to_string(),
                ));
            }
        }
    }
    Ok(())
}

fn validate_health(policy: &HealthPolicy) -> Result<(), ConfigError> {
    validate_usage("health.cpu", &policy.cpu)?;
    validate_usage("health.ram", &policy.ram)?;
    validate_percent_floor("health.disk_free", &policy.disk_free)?;
    validate_percent_floor("health.wireless_signal", &policy.wireless_signal)?;
    validate_percent_floor("health.overall", &policy.overall)?;

    let dbm = &policy.wireless_dbm;
    if dbm.green_at_least > 0.0 || dbm.green_at_least < dbm.yellow_at_least {
        return Err(ConfigError::Validation(
            "health.wireless_dbm needs yellow_at_least <= green_at_least <= 0".to_string(),
        ));
    }
    Ok(())
}

fn validate_usage(name: &str, bands: &UsageBands) -> Result<(), ConfigError> {
    let in_range = |v: f64| (0.0..=100.0).contains(&v);
    if !in_range(bands.green_below) || !in_range(bands.yellow_below) {
        return Err(ConfigError::Validation(format!(
            "{name} thresholds must be within 0..100"
        )));
    }
    if bands.green_below > bands.yellow_below {
        return Err(ConfigError::Validation(format!(
            "{name}.green_below must not exceed yellow_below"
        )));
    }
    Ok(())
}

fn validate_percent_floor(name: &str, bands: &FloorBands) -> Result<(), ConfigError> {
    let in_range = |v: f64| (0.0..=100.0).contains(&v);
    if !in_range(bands.green_at_least) || !in_range(bands.yellow_at_least) {
        return Err(ConfigError::Validation(format!(
            "{name} thresholds must be within 0..100"
        )));
    }
    if bands.green_at_least < bands.yellow_at_least {
        return Err(ConfigError::Validation(format!(
            "{name}.yellow_at_least must not exceed green_at_least"
        )));
    }
    Ok(())
}

const fn default_probe_timeout_ms() -> u64 {
    1500
}

const fn default_check_gateway() -> bool {
    true
}

const fn default_gateway_port() -> u16 {
    53
}

const fn default_expected_status() -> u16 {
    200
}

const fn default_sample_window_ms() -> u64 {
    1000
}

fn default_airport_path() -> String {
    "/System/Library/PrivateFrameworks/Apple80211.framework/Versions/Current/Resources/airport"
        .to_string()
}

const fn default_cpu_bands() -> UsageBands {
    UsageBands {
        green_below: 70.0,
        yellow_below: 90.0,
    }
}

const fn default_ram_bands() -> UsageBands {
    UsageBands {
        green_below: 75.0,
        yellow_below: 90.0,
    }
}

const fn default_disk_free_bands() -> FloorBands {
    FloorBands {
        green_at_least: 20.0,
        yellow_at_least: 10.0,
    }
}

const fn default_wireless_signal_bands() -> FloorBands {
    FloorBands {
        green_at_least: 70.0,
        yellow_at_least: 40.0,
    }
}

const fn default_wireless_dbm_bands() -> FloorBands {
    FloorBands {
        green_at_least: -67.0,
        yellow_at_least: -75.0,
    }
}

const fn default_overall_bands() -> FloorBands {
    FloorBands {
        green_at_least: 80.0,
        yellow_at_least: 55.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn example_config_matches_defaults() {
        let cfg: Config = serde_yaml::from_str(Config::example_yaml()).expect("example parses");
        cfg.validate().expect("example validates");
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn empty_document_uses_defaults() {
        let cfg: Config = serde_yaml::from_str("{}").unwrap();
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn http_probe_target_parses() {
        let yaml = "probe:\n  target:\n    kind: http\n    url: https://example.com/health\n";
        let cfg: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(
            cfg.probe.target,
            ProbeTarget::Http {
                url: "https://example.com/health".to_string(),
                expected_status: 200,
            }
        );
        assert_eq!(cfg.probe.timeout_ms, 1500);
        cfg.validate().unwrap();
    }

    #[test]
    fn partial_health_section_keeps_other_defaults() {
        let yaml = "health:\n  cpu:\n    green_below: 60\n    yellow_below: 85\n";
        let cfg: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.health.cpu.green_below, 60.0);
        assert_eq!(cfg.health.ram, default_ram_bands());
    }

    #[test]
    fn inverted_bands_are_rejected() {
        let mut cfg = Config::default();
        cfg.health.cpu = UsageBands {
            green_below: 95.0,
            yellow_below: 90.0,
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::Validation(_))));

        let mut cfg = Config::default();
        cfg.health.wireless_dbm = FloorBands {
            green_at_least: -80.0,
            yellow_at_least: -70.0,
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn zero_port_and_short_window_are_rejected() {
        let mut cfg = Config::default();
        cfg.probe.target = ProbeTarget::Tcp {
            host: "1.1.1.1".to_string(),
            port: 0,
        };
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.load.sample_window_ms = 50;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn gateway_check_can_be_turned_off() {
        let yaml = "probe:\n  check_gateway: false\n  gateway_port: 0\n";
        let cfg: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(!cfg.probe.check_gateway);
        cfg.validate().unwrap();

        let mut cfg = Config::default();
        cfg.probe.gateway_port = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn missing_file_reports_path() {
        let err = Config::load_from_file("/nonexistent/hostprobe.yaml").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/hostprobe.yaml"));
    }
}
