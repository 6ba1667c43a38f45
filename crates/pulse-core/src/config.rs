use crate::dirty::DirtyProbeKind;
use anyhow::Context;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DAY: Duration = Duration::from_secs(24 * 60 * 60);

pub const DEFAULT_MAX_DEPTH: usize = 3;
pub const DEFAULT_WORKERS: usize = 4;
pub const DEFAULT_REMOTE: &str = "origin";
pub const DEFAULT_GHOST_THRESHOLD: Duration = Duration::from_secs(6 * 30 * 24 * 60 * 60);
pub const DEFAULT_CHANGE_WINDOW: Duration = Duration::from_secs(7 * 24 * 60 * 60);
pub const RECENT_COMMIT_LIMIT: usize = 5;

/// Inputs of a single scan. Normalized once by [`ScanConfig::normalized`];
/// never mutated while a scan runs.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub root: PathBuf,
    pub max_depth: usize,
    pub detail: bool,
    pub fetch: bool,
    pub ghost_threshold: Duration,
    pub workers: usize,
    pub remote: String,
    pub dirty_probe: DirtyProbeKind,
    pub change_window: Duration,
    pub recent_limit: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            max_depth: DEFAULT_MAX_DEPTH,
            detail: false,
            fetch: false,
            ghost_threshold: DEFAULT_GHOST_THRESHOLD,
            workers: DEFAULT_WORKERS,
            remote: DEFAULT_REMOTE.to_string(),
            dirty_probe: DirtyProbeKind::default(),
            change_window: DEFAULT_CHANGE_WINDOW,
            recent_limit: RECENT_COMMIT_LIMIT,
        }
    }
}

impl ScanConfig {
    /// Replaces zero or empty values with defaults and clamps the recent
    /// history limit.
    pub fn normalized(mut self) -> Self {
        if self.workers == 0 {
            self.workers = DEFAULT_WORKERS;
        }
        if self.max_depth == 0 {
            self.max_depth = DEFAULT_MAX_DEPTH;
        }
        if self.ghost_threshold.is_zero() {
            self.ghost_threshold = DEFAULT_GHOST_THRESHOLD;
        }
        if self.change_window.is_zero() {
            self.change_window = DEFAULT_CHANGE_WINDOW;
        }
        if self.remote.trim().is_empty() {
            self.remote = DEFAULT_REMOTE.to_string();
        }
        self.recent_limit = self.recent_limit.min(RECENT_COMMIT_LIMIT);
        self
    }
}

/// Optional on-disk defaults, overridden by command-line flags.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub max_depth: Option<usize>,
    pub workers: Option<usize>,
    pub ghost_threshold_days: Option<u64>,
    pub change_window_days: Option<u64>,
    pub remote: Option<String>,
    pub dirty_probe: Option<DirtyProbeKind>,
    pub fetch: Option<bool>,
}

impl FileConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        let config = serde_json::from_str(&data)
            .with_context(|| format!("parse config {}", path.display()))?;
        Ok(config)
    }

    #[cfg(test)]
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("create config directory")?;
        }
        let data = serde_json::to_string_pretty(self).context("serialize config")?;
        fs::write(path, data).context("write config")?;
        Ok(())
    }

    pub fn apply(&self, config: &mut ScanConfig) {
        if let Some(depth) = self.max_depth {
            config.max_depth = depth;
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if let Some(days) = self.ghost_threshold_days {
            config.ghost_threshold = from_days(days);
        }
        if let Some(days) = self.change_window_days {
            config.change_window = from_days(days);
        }
        if let Some(remote) = &self.remote {
            config.remote = remote.clone();
        }
        if let Some(probe) = self.dirty_probe {
            config.dirty_probe = probe;
        }
        if let Some(fetch) = self.fetch {
            config.fetch = fetch;
        }
    }
}

pub fn default_config_path() -> anyhow::Result<PathBuf> {
    let project = ProjectDirs::from("dev", "pulse", "pulse").context("resolve project dirs")?;
    Ok(project.config_dir().join("pulse.json"))
}

pub fn from_days(count: u64) -> Duration {
    Duration::from_secs(count.saturating_mul(DAY.as_secs()))
}
