use crate::aggregate::{counters, sort_statuses, tally_daily_commits};
use crate::analyzer::{Analyze, Analyzer};
use crate::cancel::CancelToken;
use crate::config::ScanConfig;
use crate::discovery::find_repos;
use crate::error::DiscoveryError;
use crate::model::ScanResult;
use crate::pool::{PoolOutput, PoolProgress, WorkerPool};
use crate::trace::{FIND_REPOS_SPAN, PROCESS_SPAN, SpanCollector};
use crate::trace_report::{TIMELINE_WIDTH, TraceReport, reconstruct};
use std::path::PathBuf;
use std::time::Instant;
use time::OffsetDateTime;
use tracing::{info, info_span};
use uuid::Uuid;

pub type ProgressFn<'a> = &'a mut dyn FnMut(PoolProgress<'_>);

/// Runs discovery, the worker pool and aggregation for one configuration.
///
/// Timing data is only produced when a [`SpanCollector`] is attached with
/// [`Scanner::with_collector`] and the same collector is installed as a
/// layer of the active subscriber.
pub struct Scanner {
    config: ScanConfig,
    analyzer: Box<dyn Analyze>,
    collector: Option<SpanCollector>,
}

impl Scanner {
    pub fn new(config: ScanConfig) -> Self {
        let config = config.normalized();
        let analyzer: Box<dyn Analyze> = Box::new(Analyzer::new(&config));
        Self {
            config,
            analyzer,
            collector: None,
        }
    }

    pub fn with_analyzer(mut self, analyzer: Box<dyn Analyze>) -> Self {
        self.analyzer = analyzer;
        self
    }

    pub fn with_collector(mut self, collector: SpanCollector) -> Self {
        self.collector = Some(collector);
        self
    }

    pub fn scan(&self, cancel: &CancelToken) -> Result<ScanResult, DiscoveryError> {
        self.scan_with_progress(cancel, None)
    }

    pub fn scan_with_progress(
        &self,
        cancel: &CancelToken,
        progress: Option<ProgressFn<'_>>,
    ) -> Result<ScanResult, DiscoveryError> {
        let run = RunState::start(self.collector.as_ref());
        info!(
            run_id = %run.id,
            root = %self.config.root.display(),
            depth = self.config.max_depth,
            "starting scan"
        );

        let discovered = info_span!(FIND_REPOS_SPAN)
            .in_scope(|| find_repos(&self.config.root, self.config.max_depth))?;
        info!(
            repos = discovered.repos.len(),
            non_git = discovered.non_git_paths.len(),
            "discovery finished"
        );

        let output = self.process(&discovered.repos, cancel, progress);
        let mut result = self.finish(run, output);
        result.non_git_paths = discovered.non_git_paths;
        Ok(result)
    }

    /// Analyzes an explicit list of repository roots, bypassing discovery.
    pub fn analyze_paths(
        &self,
        paths: &[PathBuf],
        cancel: &CancelToken,
        progress: Option<ProgressFn<'_>>,
    ) -> ScanResult {
        let run = RunState::start(self.collector.as_ref());
        info!(run_id = %run.id, repos = paths.len(), "starting analysis");
        let output = self.process(paths, cancel, progress);
        self.finish(run, output)
    }

    fn process(
        &self,
        paths: &[PathBuf],
        cancel: &CancelToken,
        progress: Option<ProgressFn<'_>>,
    ) -> PoolOutput {
        let pool = WorkerPool::new(self.config.workers);
        // Dropped right away so the span is closed before timings are read.
        info_span!(PROCESS_SPAN, repos = paths.len(), workers = pool.workers())
            .in_scope(|| pool.run(self.analyzer.as_ref(), paths, cancel, progress))
    }

    fn finish(&self, run: RunState, output: PoolOutput) -> ScanResult {
        let PoolOutput {
            mut statuses,
            mut errors,
            skipped,
            cancelled,
        } = output;
        sort_statuses(&mut statuses);
        errors.sort_by(|left, right| left.path.cmp(&right.path));

        let counters = counters(&statuses, &errors);
        let daily_commits = self
            .config
            .detail
            .then(|| tally_daily_commits(&statuses, OffsetDateTime::now_utc()));
        let timings = run.timings(self.collector.as_ref());
        let scan_duration = run.started.elapsed();

        info!(
            run_id = %run.id,
            total = counters.total_repos,
            failed = counters.failed_repos,
            skipped,
            cancelled,
            duration_ms = scan_duration.as_millis() as u64,
            "scan finished"
        );

        ScanResult {
            run_id: run.id,
            repos: statuses,
            errors,
            counters,
            daily_commits,
            non_git_paths: Vec::new(),
            scan_duration,
            cancelled,
            skipped,
            timings,
        }
    }
}

struct RunState {
    id: String,
    started: Instant,
    watermark: Option<u64>,
}

impl RunState {
    fn start(collector: Option<&SpanCollector>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            started: Instant::now(),
            watermark: collector.map(SpanCollector::watermark),
        }
    }

    fn timings(&self, collector: Option<&SpanCollector>) -> Option<TraceReport> {
        let spans = collector?.spans_since(self.watermark?);
        if spans.is_empty() {
            return None;
        }
        Some(reconstruct(&spans, TIMELINE_WIDTH))
    }
}
