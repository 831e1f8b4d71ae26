pub mod battery;
pub mod checks;
pub mod command;
pub mod load;
pub mod network;
pub mod platform;
pub mod storage;
pub mod system;
pub mod text;
pub mod wireless;

use crate::config::Config;
use battery::BatteryRecord;
use command::{CommandError, CommandRunner};
use load::LoadSample;
use network::NetworkRecord;
use platform::Platform;
use storage::StorageRecord;
use system::{HostInfo, VolumeStat};
use thiserror::Error;
use tracing::info;
use wireless::WirelessRecord;

/// Failure inside a collector strategy. Never escapes the collector: each
/// one folds it into an unavailable record with a short note.
#[derive(Debug, Error)]
pub enum CollectError {
    #[error(transparent)]
    Command(#[from] CommandError),
    #[error("unexpected output: {0}")]
    UnexpectedOutput(String),
    #[error("{0}")]
    AccessDenied(String),
    #[error("{0}")]
    Unavailable(String),
}

impl CollectError {
    pub fn category(&self) -> &'static str {
        match self {
            CollectError::Command(err) => err.category(),
            CollectError::UnexpectedOutput(_) => "UnexpectedOutput",
            CollectError::AccessDenied(_) => "AccessDenied",
            CollectError::Unavailable(_) => "Unavailable",
        }
    }

    /// Diagnostic note for an unavailable record. Command failures carry only
    /// the category so OS messages with local paths stay out of reports.
    pub fn note(&self, context: &str) -> String {
        match self {
            CollectError::AccessDenied(msg) | CollectError::Unavailable(msg) => msg.clone(),
            other => format!("{context} error: {}", other.category()),
        }
    }
}

/// Everything gathered by the blocking part of a collection pass.
#[derive(Debug, Clone)]
pub struct HostSnapshot {
    pub platform: Platform,
    pub host: HostInfo,
    pub battery: BatteryRecord,
    pub storage: StorageRecord,
    pub wireless: WirelessRecord,
    pub network: NetworkRecord,
    pub load: LoadSample,
    pub system_volume: Option<VolumeStat>,
}

pub fn collect_host(platform: Platform, runner: &dyn CommandRunner, cfg: &Config) -> HostSnapshot {
    let host = system::collect_host_info();
    let battery = battery::collect_battery(platform, runner);
    let storage = storage::collect_storage(platform, runner);
    let wireless = wireless::collect_wireless(platform, runner, &cfg.wireless);
    let counters = system::collect_interface_counters();
    let network = network::collect_network(platform, runner, &counters);
    let load = load::collect_load(platform, runner, &cfg.load);
    let system_volume = system::collect_system_volume(platform);

    info!(
        platform = platform.label(),
        battery = battery.is_present,
        disks = storage.disks.len(),
        wireless = wireless.is_available,
        adapters = network.adapters.len(),
        "host collection finished"
    );

    HostSnapshot {
        platform,
        host,
        battery,
        storage,
        wireless,
        network,
        load,
        system_volume,
    }
}
