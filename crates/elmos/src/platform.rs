use std::fs;

/// Host flavour, detected once at startup and passed down explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Platform {
    MacOs,
    #[default]
    Linux,
    Wsl2,
}

impl Platform {
    pub fn detect() -> Self {
        if cfg!(target_os = "macos") {
            return Platform::MacOs;
        }
        let version = fs::read_to_string("/proc/version").unwrap_or_default();
        if is_wsl_kernel(&version) {
            Platform::Wsl2
        } else {
            Platform::Linux
        }
    }

    pub fn is_macos(self) -> bool {
        matches!(self, Platform::MacOs)
    }

    pub fn name(self) -> &'static str {
        match self {
            Platform::MacOs => "macos",
            Platform::Linux => "linux",
            Platform::Wsl2 => "wsl2",
        }
    }
}

fn is_wsl_kernel(proc_version: &str) -> bool {
    let lower = proc_version.to_ascii_lowercase();
    lower.contains("microsoft") || lower.contains("wsl2")
}
