//! Host network signal for the liveness detector.

use std::path::{Path, PathBuf};

use siteops_core::liveness::PlatformNetwork;

const SYS_CLASS_NET: &str = "/sys/class/net";

/// Reports whether any non-loopback interface is up.
///
/// Hosts without `/sys/class/net` report connected and leave the decision to
/// the health probe.
#[derive(Debug, Clone)]
pub struct HostNetwork {
    interfaces_dir: PathBuf,
    forced_offline: bool,
}

impl Default for HostNetwork {
    fn default() -> Self {
        Self {
            interfaces_dir: PathBuf::from(SYS_CLASS_NET),
            forced_offline: false,
        }
    }
}

impl HostNetwork {
    /// A network that always reports disconnected.
    pub fn offline() -> Self {
        Self {
            forced_offline: true,
            ..Self::default()
        }
    }

    #[cfg(test)]
    pub fn with_interfaces_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            interfaces_dir: dir.into(),
            forced_offline: false,
        }
    }
}

impl PlatformNetwork for HostNetwork {
    fn reports_connected(&self) -> bool {
        if self.forced_offline {
            return false;
        }
        any_interface_up(&self.interfaces_dir).unwrap_or(true)
    }
}

fn any_interface_up(dir: &Path) -> Option<bool> {
    let entries = std::fs::read_dir(dir).ok()?;
    let mut up = false;
    for entry in entries.flatten() {
        if entry.file_name() == "lo" {
            continue;
        }
        let state = std::fs::read_to_string(entry.path().join("operstate")).unwrap_or_default();
        // Some virtual interfaces only ever report "unknown" while passing traffic.
        if matches!(state.trim(), "up" | "unknown") {
            up = true;
            break;
        }
    }
    Some(up)
}
