use crate::collectors::command::{run_powershell, CommandRunner};
use crate::collectors::platform::Platform;
use crate::collectors::system::InterfaceCounters;
use crate::collectors::text::{non_blank, query_rows, value_for_key};
use crate::collectors::CollectError;
use serde::Serialize;
use std::collections::HashMap;
use std::net::IpAddr;
use tracing::{debug, warn};

const DARWIN_SOURCE: &str = "macOS:ifconfig+route+scutil";
const WINDOWS_SOURCE: &str = "Windows:CIM(Win32_NetworkAdapterConfiguration+Win32_NetworkAdapter)";
const COUNTERS_SOURCE: &str = "sysinfo";

const ADAPTER_CONFIG_QUERY: &str = "Get-CimInstance -ClassName Win32_NetworkAdapterConfiguration -Filter 'IPEnabled=TRUE' -ErrorAction SilentlyContinue | ForEach-Object { \"$($_.InterfaceIndex)|$($_.Description)|$($_.MACAddress)|$($_.IPAddress -join ';')|$($_.DefaultIPGateway -join ';')|$($_.DNSServerSearchOrder -join ';')\" }";
const ADAPTER_QUERY: &str = "Get-CimInstance -ClassName Win32_NetworkAdapter -Filter 'NetEnabled=TRUE' -ErrorAction SilentlyContinue | ForEach-Object { \"$($_.InterfaceIndex)|$($_.NetConnectionID)|$($_.AdapterType)|$($_.Speed)\" }";

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NetworkAdapter {
    pub name: String,
    pub description: Option<String>,
    /// Hardware port or adapter type label, e.g. "Wi-Fi" or "Ethernet 802.3".
    pub kind: Option<String>,
    pub mac: Option<String>,
    pub link_speed_mbps: Option<u64>,
    /// Routable addresses only; loopback and link-local are dropped.
    pub ipv4: Vec<String>,
    pub ipv6: Vec<String>,
    pub gateways: Vec<String>,
    pub dns_servers: Vec<String>,
    pub rx_bytes_total: Option<u64>,
    pub tx_bytes_total: Option<u64>,
}

/// Active adapters of the host, the primary one first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetworkRecord {
    pub is_available: bool,
    pub adapters: Vec<NetworkAdapter>,
    /// Name of the adapter carrying the default route, else the first one.
    pub primary_adapter: Option<String>,
    pub default_gateway: Option<String>,
    pub source: String,
    pub note: Option<String>,
}

impl NetworkRecord {
    pub fn unavailable(source: &str, note: impl Into<String>) -> Self {
        Self {
            is_available: false,
            adapters: Vec::new(),
            primary_adapter: None,
            default_gateway: None,
            source: source.to_string(),
            note: non_blank(&note.into()),
        }
    }

    fn from_adapters(source: &str, mut adapters: Vec<NetworkAdapter>, empty_note: &str) -> Self {
        if adapters.is_empty() {
            return Self::unavailable(source, empty_note);
        }
        // Stable sort keeps enumeration order among equals.
        adapters.sort_by_key(|adapter| adapter.gateways.is_empty());
        let primary = &adapters[0];
        Self {
            is_available: true,
            primary_adapter: Some(primary.name.clone()),
            default_gateway: primary.gateways.first().cloned(),
            adapters,
            source: source.to_string(),
            note: None,
        }
    }

    pub fn primary(&self) -> Option<&NetworkAdapter> {
        let name = self.primary_adapter.as_deref()?;
        self.adapters.iter().find(|adapter| adapter.name == name)
    }
}

pub fn collect_network(
    platform: Platform,
    runner: &dyn CommandRunner,
    counters: &[InterfaceCounters],
) -> NetworkRecord {
    let (source, result) = match platform {
        Platform::Darwin => (DARWIN_SOURCE, collect_darwin(runner)),
        Platform::Windows => (WINDOWS_SOURCE, collect_windows(runner)),
        Platform::Unsupported => return from_counters(counters),
    };

    let mut record = result.unwrap_or_else(|err| {
        warn!(error = %err, platform = platform.label(), "network collection failed");
        let context = format!("{} network query", platform.label());
        NetworkRecord::unavailable(source, err.note(&context))
    });
    apply_counters(&mut record.adapters, counters);
    record
}

/// Fills traffic totals, and the MAC where the utility gave none, by name.
fn apply_counters(adapters: &mut [NetworkAdapter], counters: &[InterfaceCounters]) {
    for adapter in adapters {
        let found = counters.iter().find(|c| {
            c.name.eq_ignore_ascii_case(&adapter.name)
                || adapter
                    .description
                    .as_deref()
                    .is_some_and(|d| c.name.eq_ignore_ascii_case(d))
        });
        if let Some(counter) = found {
            adapter.rx_bytes_total = Some(counter.rx_bytes_total);
            adapter.tx_bytes_total = Some(counter.tx_bytes_total);
            if adapter.mac.is_none() {
                adapter.mac = counter.mac.clone();
            }
        }
    }
}

fn from_counters(counters: &[InterfaceCounters]) -> NetworkRecord {
    let adapters = counters
        .iter()
        .filter(|c| c.name != "lo" && c.mac.is_some())
        .map(|c| NetworkAdapter {
            name: c.name.clone(),
            mac: c.mac.clone(),
            rx_bytes_total: Some(c.rx_bytes_total),
            tx_bytes_total: Some(c.tx_bytes_total),
            ..NetworkAdapter::default()
        })
        .collect();
    let mut record =
        NetworkRecord::from_adapters(COUNTERS_SOURCE, adapters, "No network interfaces found.");
    if record.is_available {
        record.note =
            Some("Addresses, gateways and DNS servers are not collected on this platform.".to_string());
    }
    record
}

/// Address as a routable IP with any `%zone` or `/prefix` removed, or `None`
/// for loopback, link-local, unspecified or unparsable input.
fn routable_ip(raw: &str) -> Option<IpAddr> {
    let bare = raw.trim().split(['%', '/']).next()?;
    let ip: IpAddr = bare.parse().ok()?;
    let excluded = ip.is_loopback()
        || ip.is_unspecified()
        || match ip {
            IpAddr::V4(v4) => v4.is_link_local(),
            IpAddr::V6(v6) => (v6.segments()[0] & 0xffc0) == 0xfe80,
        };
    (!excluded).then_some(ip)
}

fn push_unique(list: &mut Vec<String>, value: String) {
    if !list.contains(&value) {
        list.push(value);
    }
}

fn collect_darwin(runner: &dyn CommandRunner) -> Result<NetworkRecord, CollectError> {
    let ifconfig = runner.run("ifconfig", &[])?;
    let mut adapters = parse_ifconfig(&ifconfig);

    match runner.run("networksetup", &["-listallhardwareports"]) {
        Ok(text) => {
            let kinds = hardware_port_kinds(&text);
            for adapter in &mut adapters {
                adapter.kind = kinds.get(&adapter.name).cloned();
            }
        }
        Err(err) => debug!(error = %err, "hardware ports unavailable"),
    }

    let route = runner
        .run("route", &["-n", "get", "default"])
        .map_err(|err| debug!(error = %err, "default route unavailable"))
        .ok()
        .and_then(|text| parse_default_route(&text));
    let dns = runner
        .run("scutil", &["--dns"])
        .map(|text| parse_scutil_nameservers(&text))
        .unwrap_or_else(|err| {
            debug!(error = %err, "resolver configuration unavailable");
            Vec::new()
        });

    let route_index = route
        .as_ref()
        .and_then(|(_, iface)| adapters.iter().position(|a| &a.name == iface));
    if let (Some(idx), Some((gateway, _))) = (route_index, &route) {
        adapters[idx].gateways.push(gateway.clone());
    }
    // Resolvers are system-wide; they belong to the default-route adapter.
    if let Some(adapter) = adapters.get_mut(route_index.unwrap_or(0)) {
        adapter.dns_servers = dns;
    }

    Ok(NetworkRecord::from_adapters(
        DARWIN_SOURCE,
        adapters,
        "No active network adapters with routable addresses.",
    ))
}

struct IfconfigBlock {
    adapter: NetworkAdapter,
    running: bool,
    loopback: bool,
    inactive: bool,
}

impl IfconfigBlock {
    fn into_active(self) -> Option<NetworkAdapter> {
        let has_address = !self.adapter.ipv4.is_empty() || !self.adapter.ipv6.is_empty();
        (self.running && !self.loopback && !self.inactive && has_address).then_some(self.adapter)
    }
}

/// Adapters that are up, running, not loopback, not reported inactive and
/// hold at least one routable address.
fn parse_ifconfig(text: &str) -> Vec<NetworkAdapter> {
    let mut adapters = Vec::new();
    let mut current: Option<IfconfigBlock> = None;

    for line in text.lines() {
        if !line.starts_with(char::is_whitespace) {
            if let Some((name, rest)) = line.split_once(": flags=") {
                adapters.extend(current.take().and_then(IfconfigBlock::into_active));
                let flags = rest
                    .split_once('<')
                    .and_then(|(_, tail)| tail.split_once('>'))
                    .map(|(flags, _)| flags)
                    .unwrap_or_default();
                let has_flag = |flag: &str| flags.split(',').any(|f| f == flag);
                current = Some(IfconfigBlock {
                    adapter: NetworkAdapter {
                        name: name.trim().to_string(),
                        ..NetworkAdapter::default()
                    },
                    running: has_flag("UP") && has_flag("RUNNING"),
                    loopback: has_flag("LOOPBACK"),
                    inactive: false,
                });
                continue;
            }
        }

        let Some(block) = current.as_mut() else {
            continue;
        };
        let trimmed = line.trim();
        let mut words = trimmed.split_whitespace();
        match words.next() {
            Some("ether") => block.adapter.mac = words.next().and_then(non_blank),
            Some("inet") => {
                if let Some(ip) = words.next().and_then(routable_ip) {
                    push_unique(&mut block.adapter.ipv4, ip.to_string());
                }
            }
            Some("inet6") => {
                if let Some(ip) = words.next().and_then(routable_ip) {
                    push_unique(&mut block.adapter.ipv6, ip.to_string());
                }
            }
            Some("media:") => block.adapter.link_speed_mbps = media_speed_mbps(trimmed),
            Some("status:") => block.inactive = words.next() == Some("inactive"),
            _ => {}
        }
    }

    adapters.extend(current.and_then(IfconfigBlock::into_active));
    adapters
}

/// "media: autoselect (1000baseT <full-duplex>)" -> 1000; "10GbaseT" -> 10000.
fn media_speed_mbps(line: &str) -> Option<u64> {
    let (_, active) = line.split_once('(')?;
    let digits: String = active.chars().take_while(char::is_ascii_digit).collect();
    let value: u64 = digits.parse().ok()?;
    let unit = active[digits.len()..].chars().next();
    match unit {
        Some('G') => Some(value * 1000),
        Some('b') | Some('M') => Some(value),
        _ => None,
    }
}

/// Maps BSD device names to their hardware port label.
fn hardware_port_kinds(text: &str) -> HashMap<String, String> {
    let mut kinds = HashMap::new();
    let mut port: Option<String> = None;
    for line in text.lines().map(str::trim) {
        if let Some(name) = line.strip_prefix("Hardware Port:") {
            port = non_blank(name);
        } else if let Some(device) = line.strip_prefix("Device:") {
            if let (Some(port), Some(device)) = (port.take(), non_blank(device)) {
                kinds.insert(device, port);
            }
        }
    }
    kinds
}

/// (gateway, interface) of the default route; on-link routes without an
/// IP gateway are ignored.
fn parse_default_route(text: &str) -> Option<(String, String)> {
    let gateway = value_for_key(text, "gateway").and_then(routable_ip)?;
    let iface = value_for_key(text, "interface").and_then(non_blank)?;
    Some((gateway.to_string(), iface))
}

fn parse_scutil_nameservers(text: &str) -> Vec<String> {
    let mut servers = Vec::new();
    for line in text.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        if key.trim().starts_with("nameserver[") {
            if let Some(ip) = routable_ip(value) {
                push_unique(&mut servers, ip.to_string());
            }
        }
    }
    servers
}

fn collect_windows(runner: &dyn CommandRunner) -> Result<NetworkRecord, CollectError> {
    let configs = run_powershell(runner, ADAPTER_CONFIG_QUERY)?;
    let details = match run_powershell(runner, ADAPTER_QUERY) {
        Ok(text) => parse_adapter_details(&text),
        Err(err) => {
            debug!(error = %err, "Win32_NetworkAdapter query failed");
            HashMap::new()
        }
    };
    Ok(NetworkRecord::from_adapters(
        WINDOWS_SOURCE,
        parse_adapter_configs(&configs, &details),
        "No IP-enabled network adapters found via CIM.",
    ))
}

struct AdapterDetail {
    connection_name: Option<String>,
    kind: Option<String>,
    speed_bps: Option<u64>,
}

fn parse_adapter_details(text: &str) -> HashMap<String, AdapterDetail> {
    query_rows(text, 4)
        .map(|parts| {
            (
                parts[0].to_string(),
                AdapterDetail {
                    connection_name: non_blank(parts[1]),
                    kind: non_blank(parts[2]),
                    speed_bps: parts[3].parse().ok(),
                },
            )
        })
        .collect()
}

fn split_list(cell: &str) -> impl Iterator<Item = &str> {
    cell.split(';').map(str::trim).filter(|v| !v.is_empty())
}

fn parse_adapter_configs(
    text: &str,
    details: &HashMap<String, AdapterDetail>,
) -> Vec<NetworkAdapter> {
    query_rows(text, 6)
        .filter_map(|parts| {
            let detail = details.get(parts[0]);
            let description = non_blank(parts[1]);
            let mut adapter = NetworkAdapter {
                name: detail
                    .and_then(|d| d.connection_name.clone())
                    .or_else(|| description.clone())?,
                description,
                kind: detail.and_then(|d| d.kind.clone()),
                mac: non_blank(parts[2]),
                link_speed_mbps: detail
                    .and_then(|d| d.speed_bps)
                    .filter(|bps| *bps > 0)
                    .map(|bps| bps / 1_000_000),
                ..NetworkAdapter::default()
            };

            for ip in split_list(parts[3]).filter_map(routable_ip) {
                match ip {
                    IpAddr::V4(_) => push_unique(&mut adapter.ipv4, ip.to_string()),
                    IpAddr::V6(_) => push_unique(&mut adapter.ipv6, ip.to_string()),
                }
            }
            for gateway in split_list(parts[4]).filter_map(routable_ip) {
                push_unique(&mut adapter.gateways, gateway.to_string());
            }
            for server in split_list(parts[5]).filter_map(routable_ip) {
                push_unique(&mut adapter.dns_servers, server.to_string());
            }

            (!adapter.ipv4.is_empty() || !adapter.ipv6.is_empty()).then_some(adapter)
        })
        .collect()
}
