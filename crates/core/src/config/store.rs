//! Live configuration source.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use super::{ConfigError, MonitorConfig};

/// Serves the latest configuration so thresholds can be retuned without a
/// restart. Every [`current`](Self::current) call stats the backing file and
/// re-parses it only when its modification time or length changed. A file
/// that turns unreadable or invalid keeps the last good configuration in
/// effect.
#[derive(Debug)]
pub struct ConfigStore {
    path: Option<PathBuf>,
    last_good: RwLock<Arc<MonitorConfig>>,
    seen: Mutex<Option<FileStamp>>,
}

/// Identity of one version of the config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileStamp {
    modified: SystemTime,
    len: u64,
}

impl FileStamp {
    fn of(path: &Path) -> std::io::Result<Self> {
        let meta = std::fs::metadata(path)?;
        Ok(Self {
            modified: meta.modified()?,
            len: meta.len(),
        })
    }
}

impl ConfigStore {
    /// Load `path`; the first read must succeed.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let stamp = FileStamp::of(&path).ok();
        let config = read(&path)?;
        Ok(Self {
            path: Some(path),
            last_good: RwLock::new(Arc::new(config)),
            seen: Mutex::new(stamp),
        })
    }

    /// A store that always serves `config`.
    pub fn fixed(config: MonitorConfig) -> Self {
        Self {
            path: None,
            last_good: RwLock::new(Arc::new(config)),
            seen: Mutex::new(None),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// The freshest valid configuration.
    pub fn current(&self) -> Arc<MonitorConfig> {
        let Some(path) = &self.path else {
            return self.last_good.read().clone();
        };

        let stamp = match FileStamp::of(path) {
            Ok(stamp) => stamp,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Config file unavailable, keeping last good config");
                return self.last_good.read().clone();
            }
        };

        let mut seen = self.seen.lock();
        if *seen == Some(stamp) {
            return self.last_good.read().clone();
        }
        *seen = Some(stamp);

        match read(path) {
            Ok(config) => {
                debug!(path = %path.display(), "Config file reloaded");
                let mut last_good = self.last_good.write();
                if **last_good != config {
                    *last_good = Arc::new(config);
                }
                last_good.clone()
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Config reload failed, keeping last good config");
                self.last_good.read().clone()
            }
        }
    }
}

fn read(path: &Path) -> Result<MonitorConfig, ConfigError> {
    let path = path.to_string_lossy();
    Ok(MonitorConfig::from_file(&path)?.with_env_overrides())
}
