//! ConfigStore: the one way on or off disk for the shared configuration.
//!
//! The daemon and the editor are separate processes writing the same file,
//! so every mutation goes through [`ConfigStore::with_lock`]: an OS-level
//! advisory lock around a short load-mutate-save cycle. Saves are atomic
//! (temp file + rename), so a lockless reader never sees a partial file.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

use crate::config::Configuration;

pub const ENV_CONFIG_PATH: &str = "WATCHDOG_CONFIG_PATH";
const DEFAULT_CONFIG_DIR: &str = ".config/watchdog-agent";
const LOCK_WAIT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("config file not found at {0} (run `watchdog init` to create one)")]
    Missing(PathBuf),
    #[error("config file at {path} is not valid TOML: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("could not acquire config lock at {0}: another process may be writing")]
    LockTimeout(PathBuf),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Resolve the config path: `$WATCHDOG_CONFIG_PATH` wins, otherwise
    /// `~/.config/watchdog-agent/config.toml`.
    pub fn default_path() -> PathBuf {
        if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            return PathBuf::from(p);
        }
        let home = std::env::var_os("HOME").map(PathBuf::from).unwrap_or_default();
        home.join(DEFAULT_CONFIG_DIR).join("config.toml")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory holding the config, lock, and force-request files.
    pub fn dir(&self) -> PathBuf {
        self.path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Load without the lock. Saves are rename-atomic, so a half-written
    /// file should be impossible; if a parse still fails we re-read once
    /// before calling the file corrupt.
    pub fn load(&self) -> Result<Configuration, StoreError> {
        match self.load_once() {
            Err(StoreError::Corrupt { .. }) => {
                std::thread::sleep(Duration::from_millis(50));
                self.load_once()
            }
            other => other,
        }
    }

    fn load_once(&self) -> Result<Configuration, StoreError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::Missing(self.path.clone()));
            }
            Err(e) => return Err(e.into()),
        };
        let mut cfg: Configuration = toml::from_str(&text).map_err(|e| StoreError::Corrupt {
            path: self.path.clone(),
            source: e,
        })?;
        cfg.sanitize();
        Ok(cfg)
    }

    /// Load plus the file's modification time, for staleness checks.
    pub fn load_tracked(&self) -> Result<(Configuration, Option<SystemTime>), StoreError> {
        let cfg = self.load()?;
        Ok((cfg, self.modified_at()))
    }

    pub fn modified_at(&self) -> Option<SystemTime> {
        fs::metadata(&self.path).and_then(|m| m.modified()).ok()
    }

    /// True when the file on disk changed after `since` (external rewrite).
    pub fn modified_since(&self, since: Option<SystemTime>) -> bool {
        match (self.modified_at(), since) {
            (Some(now), Some(then)) => now > then,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }

    /// Atomic save: write a sibling temp file, then rename into place.
    pub fn save(&self, cfg: &Configuration) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let text = toml::to_string_pretty(cfg)
            .expect("configuration serializes to TOML");
        let tmp = self.path.with_extension("toml.tmp");
        let mut f = File::create(&tmp)?;
        f.write_all(text.as_bytes())?;
        f.sync_all()?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Scoped load-mutate-save under the advisory lock. A missing file is
    /// initialized from the default configuration; a corrupt one is an
    /// error (never silently clobbered). The lock is released on every
    /// exit path via the guard's drop.
    pub fn with_lock<T>(
        &self,
        f: impl FnOnce(&mut Configuration) -> T,
    ) -> Result<T, StoreError> {
        let _guard = FileLock::acquire(&self.lock_path(), LOCK_WAIT)?;
        let mut cfg = match self.load() {
            Ok(cfg) => cfg,
            Err(StoreError::Missing(_)) => Configuration::default(),
            Err(e) => return Err(e),
        };
        let out = f(&mut cfg);
        self.save(&cfg)?;
        Ok(out)
    }

    fn lock_path(&self) -> PathBuf {
        self.path.with_extension("toml.lock")
    }
}

/// Advisory file lock serializing writes between the daemon and editor.
/// Unix flock; released when the guard drops.
pub struct FileLock {
    _file: File,
}

impl FileLock {
    pub fn acquire(lock_path: &Path, timeout: Duration) -> Result<Self, StoreError> {
        if let Some(parent) = lock_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(lock_path)?;

        let start = Instant::now();
        loop {
            match try_lock(&file) {
                Ok(()) => return Ok(FileLock { _file: file }),
                Err(_) if start.elapsed() < timeout => {
                    std::thread::sleep(Duration::from_millis(10));
                }
                Err(_) => return Err(StoreError::LockTimeout(lock_path.to_path_buf())),
            }
        }
    }
}

// The lock file is left in place after release; unlinking it would let a
// third process lock a fresh inode while an older holder still owns the
// original.

#[cfg(unix)]
fn try_lock(file: &File) -> Result<(), std::io::Error> {
    use std::os::unix::io::AsRawFd;
    let fd = file.as_raw_fd();
    let result = unsafe { libc::flock(fd, libc::LOCK_EX | libc::LOCK_NB) };
    if result == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

#[cfg(not(unix))]
fn try_lock(_file: &File) -> Result<(), std::io::Error> {
    Ok(())
}
