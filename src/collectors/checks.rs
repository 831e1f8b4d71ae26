use crate::config::{ProbeConfig, ProbeTarget};
use reqwest::Client;
use serde::Serialize;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::time;
use tracing::{debug, warn};

/// Outcome of the single reachability probe of a collection pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbeResult {
    pub target: String,
    pub up: bool,
    pub latency_ms: u64,
    pub note: Option<String>,
    /// Default gateway check; `None` when no gateway is known or the check
    /// is turned off.
    pub gateway: Option<GatewayCheck>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GatewayCheck {
    pub address: String,
    pub up: bool,
    pub latency_ms: u64,
    pub note: Option<String>,
}

pub async fn run_probe(client: &Client, cfg: &ProbeConfig, gateway: Option<&str>) -> ProbeResult {
    let timeout = Duration::from_millis(cfg.timeout_ms);
    let mut result = match &cfg.target {
        ProbeTarget::Tcp { host, port } => run_tcp_probe(host, *port, timeout).await,
        ProbeTarget::Http {
            url,
            expected_status,
        } => run_http_probe(client, url, *expected_status, timeout).await,
    };
    if cfg.check_gateway {
        if let Some(address) = gateway {
            result.gateway = Some(check_gateway(address, cfg.gateway_port, timeout).await);
        }
    }
    result
}

/// A gateway that answers with a refusal is reachable; only silence or a
/// routing error marks it down.
async fn check_gateway(address: &str, port: u16, timeout: Duration) -> GatewayCheck {
    let start = Instant::now();
    let note = match address.parse::<IpAddr>() {
        Err(_) => Some("not an IP address".to_string()),
        Ok(ip) => {
            let addr = SocketAddr::new(ip, port);
            match time::timeout(timeout, TcpStream::connect(addr)).await {
                Ok(Ok(_stream)) => None,
                Ok(Err(err)) if err.kind() == io::ErrorKind::ConnectionRefused => {
                    debug!(gateway = %addr, "gateway refused connection");
                    None
                }
                Ok(Err(err)) => {
                    warn!(gateway = %addr, error = %err, "gateway check failed");
                    Some(format!("connect failed: {:?}", err.kind()))
                }
                Err(_elapsed) => {
                    warn!(gateway = %addr, "gateway check timeout");
                    Some(format!("no answer within {} ms", timeout.as_millis()))
                }
            }
        }
    };

    GatewayCheck {
        address: address.to_string(),
        up: note.is_none(),
        latency_ms: start.elapsed().as_millis() as u64,
        note,
    }
}

async fn run_tcp_probe(host: &str, port: u16, timeout: Duration) -> ProbeResult {
    let start = Instant::now();
    let addr = format!("{host}:{port}");

    let note = match time::timeout(timeout, TcpStream::connect(&addr)).await {
        Ok(Ok(_stream)) => None,
        Ok(Err(err)) => {
            warn!(address = %addr, error = %err, "tcp probe failed");
            Some(format!("connect failed: {:?}", err.kind()))
        }
        Err(_elapsed) => {
            warn!(address = %addr, "tcp probe timeout");
            Some(format!("no answer within {} ms", timeout.as_millis()))
        }
    };

    ProbeResult {
        target: addr,
        up: note.is_none(),
        latency_ms: start.elapsed().as_millis() as u64,
        note,
        gateway: None,
    }
}

async fn run_http_probe(
    client: &Client,
    url: &str,
    expected_status: u16,
    timeout: Duration,
) -> ProbeResult {
    let start = Instant::now();
    let req = client.get(url).timeout(timeout);

    let note = match req.send().await {
        Ok(resp) => {
            let code = resp.status().as_u16();
            (code != expected_status).then(|| format!("unexpected status {code}"))
        }
        Err(err) => {
            warn!(url = %url, error = %err, "http probe failed");
            if err.is_timeout() {
                Some(format!("no answer within {} ms", timeout.as_millis()))
            } else {
                Some("request failed".to_string())
            }
        }
    };

    ProbeResult {
        target: url.to_string(),
        up: note.is_none(),
        latency_ms: start.elapsed().as_millis() as u64,
        note,
        gateway: None,
    }
}
