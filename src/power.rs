//! Point-in-time probes for power state and user idle time.
//!
//! Both are best-effort reads of the desktop session; callers decide what
//! an unknown answer means.

use std::path::Path;
use std::process::Command;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerState {
    Ac,
    Battery,
    /// No AC adapter entry found under sysfs (desktop box, VM, non-Linux).
    Unknown,
}

impl PowerState {
    pub fn is_battery(self) -> bool {
        matches!(self, PowerState::Battery)
    }
}

/// Read the AC adapter state from `/sys/class/power_supply/AC*/online`.
pub fn power_state() -> PowerState {
    power_state_from(Path::new("/sys/class/power_supply"))
}

fn power_state_from(supply_dir: &Path) -> PowerState {
    let Ok(entries) = std::fs::read_dir(supply_dir) else {
        return PowerState::Unknown;
    };
    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if !name.starts_with("AC") {
            continue;
        }
        let online = entry.path().join("online");
        match std::fs::read_to_string(&online) {
            Ok(v) if v.trim() == "1" => return PowerState::Ac,
            Ok(_) => return PowerState::Battery,
            Err(_) => continue,
        }
    }
    PowerState::Unknown
}

/// User idle time in whole minutes, or `None` when no probe works.
///
/// Tries KDE's screensaver D-Bus interface first (seconds), then
/// `xprintidle` (milliseconds).
pub fn idle_minutes() -> Option<u64> {
    if let Some(secs) = query_stdout(
        "qdbus",
        &["org.kde.screensaver", "/ScreenSaver", "GetSessionIdleTime"],
    ) {
        return Some(secs / 60);
    }
    if let Some(ms) = query_stdout("xprintidle", &[]) {
        return Some(ms / 60_000);
    }
    tracing::debug!("no idle-time probe available");
    None
}

fn query_stdout(cmd: &str, args: &[&str]) -> Option<u64> {
    let out = Command::new(cmd).args(args).output().ok()?;
    if !out.status.success() {
        return None;
    }
    String::from_utf8_lossy(&out.stdout).trim().parse().ok()
}
