//! Out-of-band force-check requests.
//!
//! The editor (or `watchdog check --queue`) drops a one-line request file
//! next to the config; the daemon consumes it on its next idle tick. A
//! force check bypasses both the eligibility gate and the due-set
//! calculation.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

pub const REQUEST_FILE: &str = "force-check";
const ALL_MARKER: &str = "all";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForceTarget {
    All,
    Topic(String),
}

impl ForceTarget {
    fn as_line(&self) -> &str {
        match self {
            ForceTarget::All => ALL_MARKER,
            ForceTarget::Topic(name) => name,
        }
    }

    fn from_line(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        if line == ALL_MARKER {
            Some(ForceTarget::All)
        } else {
            Some(ForceTarget::Topic(line.to_string()))
        }
    }
}

fn request_path(config_dir: &Path) -> PathBuf {
    config_dir.join(REQUEST_FILE)
}

/// Queue a force check. A later request overwrites an unconsumed earlier
/// one; the write is atomic so the daemon never reads a half-written name.
pub fn request(config_dir: &Path, target: &ForceTarget) -> std::io::Result<()> {
    fs::create_dir_all(config_dir)?;
    let path = request_path(config_dir);
    let tmp = path.with_extension("tmp");
    let mut f = fs::File::create(&tmp)?;
    writeln!(f, "{}", target.as_line())?;
    fs::rename(&tmp, &path)?;
    Ok(())
}

/// Consume a pending request, if any. Read-then-remove; a request that
/// appears mid-batch stays queued for the next call.
pub fn take(config_dir: &Path) -> Option<ForceTarget> {
    let path = request_path(config_dir);
    let line = fs::read_to_string(&path).ok()?;
    if let Err(e) = fs::remove_file(&path) {
        tracing::warn!(error = ?e, "could not remove force-check request");
    }
    ForceTarget::from_line(&line)
}
