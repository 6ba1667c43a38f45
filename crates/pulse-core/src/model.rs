use crate::trace_report::TraceReport;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use time::OffsetDateTime;

/// Branch name reported when HEAD is detached or cannot be resolved.
pub const UNKNOWN_BRANCH: &str = "unknown";

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RepoStatus {
    pub name: String,
    pub path: PathBuf,
    pub branch: String,
    pub is_clean: bool,
    pub changed_files: usize,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_commit_time: Option<OffsetDateTime>,
    pub unpushed_commits: usize,
    pub unpulled_commits: usize,
    pub is_ghost: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub recent_commits: Vec<Commit>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lines_changed: Option<LinesChanged>,
}

impl RepoStatus {
    pub(crate) fn new(name: String, path: PathBuf) -> Self {
        Self {
            name,
            path,
            branch: UNKNOWN_BRANCH.to_string(),
            is_clean: false,
            changed_files: 0,
            last_commit_time: None,
            unpushed_commits: 0,
            unpulled_commits: 0,
            is_ghost: false,
            recent_commits: Vec::new(),
            lines_changed: None,
        }
    }

    pub fn is_in_sync(&self) -> bool {
        self.unpushed_commits == 0 && self.unpulled_commits == 0
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Commit {
    pub hash: String,
    pub author: String,
    pub message: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct LinesChanged {
    pub added: usize,
    pub removed: usize,
    #[serde(rename = "period_ms", serialize_with = "millis::serialize")]
    pub period: Duration,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ScanError {
    pub path: PathBuf,
    pub message: String,
}

#[derive(Debug, Default, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct ScanCounters {
    pub total_repos: usize,
    pub clean_repos: usize,
    pub dirty_repos: usize,
    pub ghost_repos: usize,
    pub out_of_sync_repos: usize,
    pub failed_repos: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScanResult {
    pub run_id: String,
    pub repos: Vec<RepoStatus>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ScanError>,
    pub counters: ScanCounters,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub daily_commits: Option<BTreeMap<String, usize>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub non_git_paths: Vec<String>,
    #[serde(rename = "scan_duration_ms", serialize_with = "millis::serialize")]
    pub scan_duration: Duration,
    pub cancelled: bool,
    pub skipped: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timings: Option<TraceReport>,
}

/// What a finished run amounts to, so callers never confuse an empty root
/// with a partially failed or interrupted scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanHealth {
    Empty,
    Complete,
    PartialFailure,
    Cancelled,
}

impl ScanHealth {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanHealth::Empty => "empty",
            ScanHealth::Complete => "complete",
            ScanHealth::PartialFailure => "partial_failure",
            ScanHealth::Cancelled => "cancelled",
        }
    }
}

impl ScanResult {
    pub fn health(&self) -> ScanHealth {
        if self.cancelled {
            ScanHealth::Cancelled
        } else if !self.errors.is_empty() {
            ScanHealth::PartialFailure
        } else if self.repos.is_empty() {
            ScanHealth::Empty
        } else {
            ScanHealth::Complete
        }
    }

    pub fn commits_today(&self, today: &str) -> Option<usize> {
        self.daily_commits
            .as_ref()
            .and_then(|tally| tally.get(today).copied())
    }
}

pub(crate) mod millis {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(as_millis(*value))
    }

    pub fn serialize_option<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(value) => serializer.serialize_some(&as_millis(*value)),
            None => serializer.serialize_none(),
        }
    }

    fn as_millis(value: Duration) -> u64 {
        u64::try_from(value.as_millis()).unwrap_or(u64::MAX)
    }
}
