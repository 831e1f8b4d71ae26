use serde::Serialize;

/// Host family that decides which output formats a collector parses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// pmset, system_profiler, airport, networksetup, wdutil, top, vm_stat.
    Darwin,
    /// PowerShell CIM queries and netsh.
    Windows,
    Unsupported,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(target_os = "macos") {
            Platform::Darwin
        } else if cfg!(target_os = "windows") {
            Platform::Windows
        } else {
            Platform::Unsupported
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Platform::Darwin => "macOS",
            Platform::Windows => "Windows",
            Platform::Unsupported => "unsupported",
        }
    }
}
