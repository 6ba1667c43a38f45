use super::*;

#[derive(Parser, Debug)]
#[command(
    name = "pulse",
    author,
    version,
    about = "Report the state of every git repository under a directory"
)]
pub(super) struct Cli {
    #[arg(long, default_value = ".", help = "Root directory to scan for git repos")]
    pub(super) path: PathBuf,
    #[arg(long, help = "Maximum directory depth to scan [default: 3]")]
    pub(super) depth: Option<usize>,
    #[arg(long, help = "Show recent commits and lines changed per repo")]
    pub(super) detail: bool,
    #[arg(long, help = "Fetch from remotes before checking ahead/behind status")]
    pub(super) fetch: bool,
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    pub(super) format: OutputFormat,
    #[arg(long = "time", help = "Show performance timing breakdown")]
    pub(super) show_timings: bool,
    #[arg(long, help = "Concurrent repository workers [default: 4]")]
    pub(super) workers: Option<usize>,
    #[arg(
        long,
        value_name = "DAYS",
        help = "Days without commits before a repo counts as a ghost [default: 180]"
    )]
    pub(super) ghost_days: Option<u64>,
    #[arg(long, value_enum, help = "How to detect uncommitted changes")]
    pub(super) dirty_probe: Option<DirtyProbeValue>,
    #[arg(long, help = "Remote compared against for ahead/behind [default: origin]")]
    pub(super) remote: Option<String>,
    #[arg(long, value_name = "SECS", help = "Stop claiming new repos after this many seconds")]
    pub(super) timeout: Option<u64>,
    #[arg(long, value_name = "PATH", help = "Config file [default: platform config dir]")]
    pub(super) config: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub(super) enum OutputFormat {
    Table,
    Json,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub(super) enum DirtyProbeValue {
    Process,
    Embedded,
}

impl From<DirtyProbeValue> for DirtyProbeKind {
    fn from(value: DirtyProbeValue) -> Self {
        match value {
            DirtyProbeValue::Process => DirtyProbeKind::Process,
            DirtyProbeValue::Embedded => DirtyProbeKind::Embedded,
        }
    }
}

impl Cli {
    /// Defaults, then the config file, then flags.
    pub(super) fn scan_config(&self, file: &FileConfig) -> ScanConfig {
        let mut config = ScanConfig {
            root: self.path.clone(),
            detail: self.detail,
            ..ScanConfig::default()
        };
        file.apply(&mut config);
        if let Some(depth) = self.depth {
            config.max_depth = depth;
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if let Some(days) = self.ghost_days {
            config.ghost_threshold = from_days(days);
        }
        if let Some(probe) = self.dirty_probe {
            config.dirty_probe = probe.into();
        }
        if let Some(remote) = &self.remote {
            config.remote = remote.clone();
        }
        if self.fetch {
            config.fetch = true;
        }
        config.normalized()
    }

    pub(super) fn cancel_token(&self) -> CancelToken {
        match self.timeout {
            Some(secs) => CancelToken::with_timeout(Duration::from_secs(secs)),
            None => CancelToken::new(),
        }
    }
}

pub(super) fn exit_code(health: ScanHealth) -> ExitCode {
    match health {
        ScanHealth::Empty | ScanHealth::Complete => ExitCode::SUCCESS,
        ScanHealth::PartialFailure => ExitCode::from(2),
        ScanHealth::Cancelled => ExitCode::from(130),
    }
}
