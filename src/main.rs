mod collectors;
mod config;
mod health;
mod metrics;
mod report;

use clap::{Parser, ValueEnum};
use collectors::checks::run_probe;
use collectors::command::SystemCommandRunner;
use collectors::platform::Platform;
use config::Config;
use metrics::Metrics;
use report::HostReport;
use reqwest::Client;
use std::io::Write;
use std::time::{Duration, SystemTime};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "hostprobe")]
#[command(version, about = "One-shot hardware and connectivity probe")]
struct Cli {
    /// YAML config file; built-in defaults are used when omitted.
    #[arg(long)]
    config: Option<String>,
    #[arg(long)]
    print_default_config: bool,
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
    Prometheus,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    init_tracing();

    let cli = Cli::parse();
    if cli.print_default_config {
        println!("{}", Config::example_yaml());
        return;
    }

    let cfg = match &cli.config {
        Some(path) => match Config::load_from_file(path) {
            Ok(cfg) => cfg,
            Err(err) => {
                error!(error = %err, "failed to load configuration");
                std::process::exit(1);
            }
        },
        None => Config::default(),
    };

    let platform = Platform::current();
    info!(platform = platform.label(), "starting hostprobe");

    let snapshot = {
        let cfg = cfg.clone();
        match tokio::task::spawn_blocking(move || {
            collectors::collect_host(platform, &SystemCommandRunner, &cfg)
        })
        .await
        {
            Ok(snapshot) => snapshot,
            Err(err) => {
                error!(error = %err, "host collection task failed");
                std::process::exit(1);
            }
        }
    };

    let client = Client::builder()
        .user_agent("hostprobe/0.1.0")
        .connect_timeout(Duration::from_millis(cfg.probe.timeout_ms))
        .build()
        .unwrap_or_else(|_| Client::new());
    info!(probe = %cfg.probe.target.label(), "running reachability probe");
    let gateway = snapshot.network.default_gateway.clone();
    let probe = run_probe(&client, &cfg.probe, gateway.as_deref()).await;

    let report = HostReport::build(snapshot, probe, &cfg.health, SystemTime::now());

    let output = match cli.format {
        OutputFormat::Text => report.to_string(),
        OutputFormat::Json => match serde_json::to_string_pretty(&report) {
            Ok(json) => json,
            Err(err) => {
                error!(error = %err, "failed to encode report as JSON");
                std::process::exit(1);
            }
        },
        OutputFormat::Prometheus => match encode_prometheus(&report) {
            Ok(text) => text,
            Err(err) => {
                error!(error = %err, "failed to encode metrics");
                std::process::exit(1);
            }
        },
    };

    let mut stdout = std::io::stdout().lock();
    if let Err(err) = writeln!(stdout, "{}", output.trim_end()) {
        error!(error = %err, "failed to write report");
        std::process::exit(1);
    }
}

fn encode_prometheus(report: &HostReport) -> Result<String, prometheus::Error> {
    let metrics = Metrics::new()?;
    metrics.update_from_report(report);
    let buf = metrics.encode_metrics()?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
