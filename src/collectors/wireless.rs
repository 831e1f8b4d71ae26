use crate::collectors::command::CommandRunner;
use crate::collectors::platform::Platform;
use crate::collectors::text::{
    digits_only, extract_section, first_line_containing, non_blank, parse_f64_loose,
    parse_i32_loose, value_after_colon, value_for_key,
};
use crate::collectors::CollectError;
use crate::config::{DarwinWirelessSource, WirelessConfig};
use serde::Serialize;
use tracing::{info, warn};

/// How many lines after a `Hardware Port:` line may hold its `Device:`.
const HARDWARE_PORT_LOOKAHEAD: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WirelessRecord {
    /// True only when an SSID was resolved.
    pub is_available: bool,
    pub interface_name: Option<String>,
    pub ssid: Option<String>,
    pub signal_percent: Option<u8>,
    pub signal_dbm: Option<i32>,
    pub noise_dbm: Option<i32>,
    pub tx_rate_mbps: Option<f64>,
    pub channel: Option<String>,
    pub phy_mode: Option<String>,
    pub security: Option<String>,
    pub source: String,
    pub note: Option<String>,
}

impl WirelessRecord {
    fn empty(source: &str) -> Self {
        Self {
            is_available: false,
            interface_name: None,
            ssid: None,
            signal_percent: None,
            signal_dbm: None,
            noise_dbm: None,
            tx_rate_mbps: None,
            channel: None,
            phy_mode: None,
            security: None,
            source: source.to_string(),
            note: None,
        }
    }

    pub fn unavailable(source: &str, note: impl Into<String>) -> Self {
        Self {
            note: non_blank(&note.into()),
            ..Self::empty(source)
        }
    }

    /// Settles availability and derives the percentage from dBm if needed.
    fn finish(mut self) -> Self {
        self.ssid = self.ssid.take().filter(|s| is_real_ssid(s));
        self.is_available = self.ssid.is_some();
        if self.signal_percent.is_none() {
            self.signal_percent = self.signal_dbm.map(dbm_to_percent);
        }
        if !self.is_available && self.note.is_none() {
            self.note = Some("Not associated with a wireless network.".to_string());
        }
        self
    }
}

/// Maps RSSI onto 0..=100 assuming -100 dBm is unusable and -50 dBm is
/// full strength. A fixed linear heuristic, not a calibrated curve.
pub fn dbm_to_percent(dbm: i32) -> u8 {
    dbm.saturating_add(100).saturating_mul(2).clamp(0, 100) as u8
}

fn is_real_ssid(ssid: &str) -> bool {
    let trimmed = ssid.trim();
    !trimmed.is_empty() && !trimmed.eq_ignore_ascii_case("none")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    /// `airport -I`: low-level radio status dump.
    Airport,
    /// `networksetup`: hardware port enumeration plus the associated network.
    NetworkSetup,
    /// `wdutil info`: sectioned diagnostic dump.
    Wdutil,
    /// `netsh wlan show interfaces`.
    Netsh,
}

impl Shape {
    fn source(self) -> &'static str {
        match self {
            Shape::Airport => "macOS:airport -I",
            Shape::NetworkSetup => "macOS:networksetup",
            Shape::Wdutil => "macOS:wdutil info",
            Shape::Netsh => "Windows:netsh wlan show interfaces",
        }
    }

    fn context(self) -> &'static str {
        match self {
            Shape::Netsh => "Windows Wi-Fi query",
            _ => "macOS Wi-Fi query",
        }
    }
}

pub fn collect_wireless(
    platform: Platform,
    runner: &dyn CommandRunner,
    cfg: &WirelessConfig,
) -> WirelessRecord {
    let shape = match platform {
        Platform::Darwin => match cfg.darwin_source {
            DarwinWirelessSource::Auto => return collect_darwin_auto(runner, cfg),
            DarwinWirelessSource::Airport => Shape::Airport,
            DarwinWirelessSource::Networksetup => Shape::NetworkSetup,
            DarwinWirelessSource::Wdutil => Shape::Wdutil,
        },
        Platform::Windows => Shape::Netsh,
        Platform::Unsupported => {
            return WirelessRecord::unavailable(
                "unknown",
                "Wi-Fi info not available on this platform.",
            )
        }
    };
    settle(shape, probe(shape, runner, cfg))
}

fn collect_darwin_auto(runner: &dyn CommandRunner, cfg: &WirelessConfig) -> WirelessRecord {
    match probe(Shape::Airport, runner, cfg) {
        Ok(record) => record.finish(),
        Err(err) => {
            info!(error = %err, "airport unusable, falling back to networksetup");
            settle(Shape::NetworkSetup, probe(Shape::NetworkSetup, runner, cfg))
        }
    }
}

fn settle(shape: Shape, result: Result<WirelessRecord, CollectError>) -> WirelessRecord {
    match result {
        Ok(record) => record.finish(),
        Err(err) => {
            warn!(error = %err, source = shape.source(), "wireless collection failed");
            WirelessRecord::unavailable(shape.source(), err.note(shape.context()))
        }
    }
}

fn probe(
    shape: Shape,
    runner: &dyn CommandRunner,
    cfg: &WirelessConfig,
) -> Result<WirelessRecord, CollectError> {
    match shape {
        Shape::Airport => {
            let output = runner.run(&cfg.airport_path, &["-I"])?;
            parse_airport(&output)
        }
        Shape::NetworkSetup => {
            let ports = runner.run("networksetup", &["-listallhardwareports"])?;
            let device = find_wifi_device(&ports).ok_or_else(|| {
                CollectError::Unavailable("No Wi-Fi hardware port found.".to_string())
            })?;
            let network = runner.run("networksetup", &["-getairportnetwork", &device])?;
            Ok(parse_airport_network(&device, &network))
        }
        Shape::Wdutil => {
            let output = runner.run("wdutil", &["info"])?;
            parse_wdutil(&output)
        }
        Shape::Netsh => {
            let output = runner.run("netsh", &["wlan", "show", "interfaces"])?;
            parse_netsh(&output)
        }
    }
}

fn parse_airport(text: &str) -> Result<WirelessRecord, CollectError> {
    let mut record = WirelessRecord::empty(Shape::Airport.source());
    record.ssid = value_for_key(text, "SSID").and_then(non_blank);

    if record.ssid.is_none() && text.to_lowercase().contains("deprecated") {
        return Err(CollectError::UnexpectedOutput(
            "airport reports it is deprecated".to_string(),
        ));
    }

    record.signal_dbm = value_for_key(text, "agrCtlRSSI").and_then(parse_i32_loose);
    record.noise_dbm = value_for_key(text, "agrCtlNoise").and_then(parse_i32_loose);
    record.tx_rate_mbps = value_for_key(text, "lastTxRate").and_then(parse_f64_loose);
    record.channel = value_for_key(text, "channel").and_then(non_blank);
    record.security = value_for_key(text, "link auth").and_then(non_blank);
    Ok(record)
}

/// Finds the BSD device behind the Wi-Fi (or legacy AirPort) hardware port.
fn find_wifi_device(text: &str) -> Option<String> {
    let lines: Vec<&str> = text.lines().map(str::trim).collect();

    for (idx, line) in lines.iter().enumerate() {
        let Some(port) = line.strip_prefix("Hardware Port:") else {
            continue;
        };
        let port = port.trim().to_ascii_lowercase();
        if !(port.contains("wi-fi") || port.contains("airport")) {
            continue;
        }

        for next in lines.iter().skip(idx + 1).take(HARDWARE_PORT_LOOKAHEAD) {
            if next.starts_with("Hardware Port:") {
                break;
            }
            if let Some(device) = next.strip_prefix("Device:") {
                return non_blank(device);
            }
        }
    }
    None
}

fn parse_airport_network(device: &str, text: &str) -> WirelessRecord {
    let mut record = WirelessRecord::empty(Shape::NetworkSetup.source());
    record.interface_name = non_blank(device);
    record.ssid = first_line_containing(text, "Current Wi-Fi Network")
        .or_else(|| first_line_containing(text, "Current AirPort Network"))
        .and_then(value_after_colon)
        .and_then(non_blank);
    record
}

fn is_privilege_prompt(text: &str) -> bool {
    let lowered = text.to_lowercase();
    lowered.contains("usage:") && lowered.contains("sudo")
}

fn parse_wdutil(text: &str) -> Result<WirelessRecord, CollectError> {
    if is_privilege_prompt(text) {
        return Err(CollectError::AccessDenied(
            "wdutil requires elevated privileges (run with sudo) to report Wi-Fi details."
                .to_string(),
        ));
    }

    let section = extract_section(text, "WIFI");
    let field = |key: &str| value_for_key(section, key).and_then(non_blank);

    let mut record = WirelessRecord::empty(Shape::Wdutil.source());
    record.interface_name = field("Interface Name");
    record.ssid = field("SSID");
    record.signal_dbm = field("RSSI").as_deref().and_then(parse_i32_loose);
    record.noise_dbm = field("Noise").as_deref().and_then(parse_i32_loose);
    record.tx_rate_mbps = field("Tx Rate").as_deref().and_then(parse_f64_loose);
    record.channel = field("Channel");
    record.phy_mode = field("PHY Mode");
    record.security = field("Security");
    Ok(record)
}

fn parse_netsh(text: &str) -> Result<WirelessRecord, CollectError> {
    let lowered = text.to_lowercase();
    if lowered.contains("no wireless interface") {
        return Err(CollectError::Unavailable(
            "No wireless interface found.".to_string(),
        ));
    }
    if lowered.contains("location permission") {
        return Err(CollectError::AccessDenied(
            "netsh needs location permission to report WLAN details.".to_string(),
        ));
    }

    let field = |key: &str| value_for_key(text, key).and_then(non_blank);

    let mut record = WirelessRecord::empty(Shape::Netsh.source());
    record.interface_name = field("Name");
    record.ssid = field("SSID");
    record.signal_percent = field("Signal")
        .and_then(|v| digits_only(&v).parse::<u8>().ok())
        .map(|pct| pct.min(100));
    record.signal_dbm = field("Rssi").as_deref().and_then(parse_i32_loose);
    record.tx_rate_mbps = field("Transmit rate (Mbps)")
        .as_deref()
        .and_then(parse_f64_loose);
    record.channel = field("Channel");
    record.phy_mode = field("Radio type");
    record.security = field("Authentication");
    Ok(record)
}
