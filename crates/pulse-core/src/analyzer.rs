use crate::cancel::CancelToken;
use crate::config::ScanConfig;
use crate::dirty::DirtyProbe;
use crate::error::AnalyzeError;
use crate::model::{Commit, LinesChanged, RepoStatus};
use crate::source::{Git2Backend, RepoBackend, RepoHandle};
use crate::trace::ANALYZE_SPAN;
use std::ops::ControlFlow;
use std::path::Path;
use std::time::Duration;
use time::OffsetDateTime;
use tracing::{debug, info_span};

/// One repository in, one outcome out. Implementations must be shareable
/// across the pool's workers.
pub trait Analyze: Sync {
    fn analyze(&self, path: &Path, cancel: &CancelToken) -> Result<RepoStatus, AnalyzeError>;
}

#[derive(Debug, Clone)]
pub struct AnalyzerOptions {
    pub detail: bool,
    pub fetch: bool,
    pub ghost_threshold: Duration,
    pub remote: String,
    pub change_window: Duration,
    pub recent_limit: usize,
}

impl From<&ScanConfig> for AnalyzerOptions {
    fn from(config: &ScanConfig) -> Self {
        Self {
            detail: config.detail,
            fetch: config.fetch,
            ghost_threshold: config.ghost_threshold,
            remote: config.remote.clone(),
            change_window: config.change_window,
            recent_limit: config.recent_limit,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncCounts {
    pub unpushed: usize,
    pub unpulled: usize,
}

pub struct Analyzer {
    backend: Box<dyn RepoBackend>,
    dirty_probe: Box<dyn DirtyProbe>,
    options: AnalyzerOptions,
}

impl Analyzer {
    pub fn new(config: &ScanConfig) -> Self {
        Self::with_backend(
            Box::new(Git2Backend),
            config.dirty_probe.build(),
            AnalyzerOptions::from(config),
        )
    }

    pub fn with_backend(
        backend: Box<dyn RepoBackend>,
        dirty_probe: Box<dyn DirtyProbe>,
        options: AnalyzerOptions,
    ) -> Self {
        Self {
            backend,
            dirty_probe,
            options,
        }
    }

    fn read_branch(&self, repo: &dyn RepoHandle, status: &mut RepoStatus) -> Option<String> {
        let branch = degrade("branch", &status.path, repo.current_branch()).flatten()?;
        status.branch = branch.clone();
        Some(branch)
    }

    fn read_worktree(&self, repo: &dyn RepoHandle, status: &mut RepoStatus, cancel: &CancelToken) {
        if let Some(dirty) = degrade(
            "worktree_status",
            &status.path,
            self.dirty_probe.probe(repo, cancel),
        ) {
            status.is_clean = dirty.is_clean;
            status.changed_files = dirty.changed_files;
        }
    }

    fn read_last_commit(&self, repo: &dyn RepoHandle, status: &mut RepoStatus) {
        status.last_commit_time =
            degrade("last_commit", &status.path, repo.head_info()).map(|head| head.time);
    }

    fn read_recent_commits(&self, repo: &dyn RepoHandle, status: &mut RepoStatus) {
        let limit = self.options.recent_limit;
        if limit == 0 {
            return;
        }
        let mut commits = Vec::with_capacity(limit);
        let walked = repo.commit_log(None, &mut |info| {
            commits.push(Commit {
                hash: info.short_id(),
                author: info.author,
                message: info.summary,
                timestamp: info.time,
            });
            if commits.len() >= limit {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        });
        degrade("recent_commits", &status.path, walked);
        status.recent_commits = commits;
    }

    fn read_lines_changed(&self, repo: &dyn RepoHandle, status: &mut RepoStatus, now: OffsetDateTime) {
        let window = self.options.change_window;
        let since = now - window;
        let mut ids = Vec::new();
        let walked = repo.commit_log(Some(since), &mut |info| {
            ids.push(info.id);
            ControlFlow::Continue(())
        });
        if degrade("lines_changed", &status.path, walked).is_none() {
            return;
        }
        let (mut added, mut removed) = (0, 0);
        for id in ids {
            // A commit whose diff cannot be computed is skipped, not fatal.
            if let Ok(stats) = repo.commit_stats(id) {
                added += stats.added;
                removed += stats.removed;
            }
        }
        if added > 0 || removed > 0 {
            status.lines_changed = Some(LinesChanged {
                added,
                removed,
                period: window,
            });
        }
    }
}

impl Analyze for Analyzer {
    fn analyze(&self, path: &Path, cancel: &CancelToken) -> Result<RepoStatus, AnalyzeError> {
        let name = repo_name(path);
        let span = info_span!(ANALYZE_SPAN, repo = %name);
        let _enter = span.enter();
        let now = OffsetDateTime::now_utc();

        let repo = info_span!("open")
            .in_scope(|| self.backend.open(path))
            .map_err(|err| AnalyzeError::Open {
                path: path.to_path_buf(),
                message: format!("{err:#}"),
            })?;
        let repo = repo.as_ref();
        let mut status = RepoStatus::new(name, path.to_path_buf());

        let branch = info_span!("branch").in_scope(|| self.read_branch(repo, &mut status));
        info_span!("worktree_status").in_scope(|| self.read_worktree(repo, &mut status, cancel));
        info_span!("last_commit").in_scope(|| self.read_last_commit(repo, &mut status));

        if self.options.fetch && !cancel.is_cancelled() {
            info_span!("fetch").in_scope(|| {
                degrade("fetch", path, repo.fetch(&self.options.remote, cancel));
            });
        }

        if let Some(branch) = branch {
            let counts = info_span!("remote_status")
                .in_scope(|| ahead_behind(repo, &self.options.remote, &branch));
            if let Some(counts) = degrade("remote_status", path, counts) {
                status.unpushed_commits = counts.unpushed;
                status.unpulled_commits = counts.unpulled;
            }
        }

        if self.options.detail {
            info_span!("recent_commits").in_scope(|| self.read_recent_commits(repo, &mut status));
            info_span!("lines_changed")
                .in_scope(|| self.read_lines_changed(repo, &mut status, now));
        }

        status.is_ghost = is_ghost(status.last_commit_time, now, self.options.ghost_threshold);
        Ok(status)
    }
}

/// Commits on each side of the merge base between HEAD and
/// `<remote>/<branch>`. Anything that cannot be compared counts as in sync.
pub fn ahead_behind(
    repo: &dyn RepoHandle,
    remote: &str,
    branch: &str,
) -> anyhow::Result<SyncCounts> {
    let local = repo.head_commit()?;
    let Ok(upstream) = repo.remote_tracking_commit(remote, branch) else {
        return Ok(SyncCounts::default());
    };
    if local == upstream {
        return Ok(SyncCounts::default());
    }
    let base = info_span!("merge_base").in_scope(|| repo.merge_base(local, upstream))?;
    let Some(base) = base else {
        return Ok(SyncCounts::default());
    };
    Ok(SyncCounts {
        unpushed: repo.count_exclusive(local, base)?,
        unpulled: repo.count_exclusive(upstream, base)?,
    })
}

/// True when strictly more than `threshold` has passed since the last
/// commit. A repository without any commit is always a ghost.
pub fn is_ghost(last_commit: Option<OffsetDateTime>, now: OffsetDateTime, threshold: Duration) -> bool {
    let Some(last_commit) = last_commit else {
        return true;
    };
    match time::Duration::try_from(threshold) {
        Ok(threshold) => now - last_commit > threshold,
        Err(_) => false,
    }
}

fn repo_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn degrade<T>(phase: &'static str, path: &Path, result: anyhow::Result<T>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(err) => {
            debug!(phase, path = %path.display(), error = %format!("{err:#}"), "phase degraded");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::from_days;
    use crate::dirty::EmbeddedDirtyProbe;
    use crate::model::UNKNOWN_BRANCH;
    use crate::test_support::{TestRepo, days_ago};

    fn analyzer(detail: bool) -> Analyzer {
        analyzer_with(detail, false)
    }

    fn analyzer_with(detail: bool, fetch: bool) -> Analyzer {
        Analyzer::with_backend(
            Box::new(Git2Backend),
            Box::new(EmbeddedDirtyProbe),
            AnalyzerOptions {
                detail,
                fetch,
                ghost_threshold: from_days(30),
                remote: "origin".into(),
                change_window: from_days(7),
                recent_limit: 5,
            },
        )
    }

    #[test]
    fn ghost_threshold_is_strict() {
        let now = OffsetDateTime::now_utc();
        let threshold = from_days(30);
        let exactly = now - time::Duration::days(30);
        assert!(!is_ghost(Some(exactly), now, threshold));
        assert!(is_ghost(Some(exactly - time::Duration::seconds(1)), now, threshold));
        assert!(is_ghost(Some(now - time::Duration::days(40)), now, threshold));
        assert!(!is_ghost(Some(now - time::Duration::days(29)), now, threshold));
        assert!(is_ghost(None, now, threshold));
    }

    #[test]
    fn repository_inactive_for_forty_days_is_ghost() {
        let stale = TestRepo::new("main");
        stale.commit("a.txt", "a\n", days_ago(40));
        let recent = TestRepo::new("main");
        recent.commit("a.txt", "a\n", days_ago(29));

        let cancel = CancelToken::new();
        let analyzer = analyzer(false);
        assert!(analyzer.analyze(stale.path(), &cancel).unwrap().is_ghost);
        assert!(!analyzer.analyze(recent.path(), &cancel).unwrap().is_ghost);
    }

    #[test]
    fn local_only_commits_count_as_unpushed() {
        let repo = TestRepo::new("main");
        let base = repo.commit("a.txt", "a\n", days_ago(3));
        repo.set_remote_ref("origin", "main", base);
        repo.commit("b.txt", "b\n", days_ago(2));
        repo.commit("c.txt", "c\n", days_ago(1));

        let status = analyzer(false).analyze(repo.path(), &CancelToken::new()).unwrap();
        assert_eq!(status.branch, "main");
        assert_eq!(status.unpushed_commits, 2);
        assert_eq!(status.unpulled_commits, 0);
        assert!(status.is_clean);
    }

    #[test]
    fn diverged_histories_count_both_sides() {
        let repo = TestRepo::new("main");
        let base = repo.commit("a.txt", "a\n", days_ago(5));
        repo.commit("local.txt", "l\n", days_ago(2));
        let remote_one = repo.commit_on(base, "r1.txt", "1\n", days_ago(4));
        let remote_two = repo.commit_on(remote_one, "r2.txt", "2\n", days_ago(3));
        let remote_three = repo.commit_on(remote_two, "r3.txt", "3\n", days_ago(1));
        repo.set_remote_ref("origin", "main", remote_three);

        let status = analyzer(false).analyze(repo.path(), &CancelToken::new()).unwrap();
        assert_eq!(status.unpushed_commits, 1);
        assert_eq!(status.unpulled_commits, 3);
    }

    #[test]
    fn equal_heads_are_in_sync() {
        let repo = TestRepo::new("main");
        let head = repo.commit("a.txt", "a\n", days_ago(1));
        repo.set_remote_ref("origin", "main", head);

        let status = analyzer(false).analyze(repo.path(), &CancelToken::new()).unwrap();
        assert!(status.is_in_sync());
    }

    #[test]
    fn unrelated_histories_count_zero_without_error() {
        let repo = TestRepo::new("main");
        repo.commit("a.txt", "a\n", days_ago(2));
        let orphan = repo.orphan_commit("b.txt", "b\n", days_ago(1));
        repo.set_remote_ref("origin", "main", orphan);

        let status = analyzer(false).analyze(repo.path(), &CancelToken::new()).unwrap();
        assert_eq!(status.unpushed_commits, 0);
        assert_eq!(status.unpulled_commits, 0);
    }

    #[test]
    fn missing_remote_tracking_ref_counts_zero() {
        let repo = TestRepo::new("main");
        repo.commit("a.txt", "a\n", days_ago(1));
        let status = analyzer(false).analyze(repo.path(), &CancelToken::new()).unwrap();
        assert!(status.is_in_sync());
    }

    #[test]
    fn detached_head_reports_unknown_branch() {
        let repo = TestRepo::new("main");
        let first = repo.commit("a.txt", "a\n", days_ago(2));
        repo.commit("b.txt", "b\n", days_ago(1));
        repo.detach_at(first);

        let status = analyzer(false).analyze(repo.path(), &CancelToken::new()).unwrap();
        assert_eq!(status.branch, UNKNOWN_BRANCH);
        assert!(status.is_in_sync());
        assert!(status.last_commit_time.is_some());
    }

    #[test]
    fn empty_repository_degrades_to_defaults() {
        let repo = TestRepo::new("main");
        let status = analyzer(true).analyze(repo.path(), &CancelToken::new()).unwrap();
        assert_eq!(status.branch, UNKNOWN_BRANCH);
        assert_eq!(status.last_commit_time, None);
        assert!(status.is_ghost);
        assert!(status.recent_commits.is_empty());
        assert_eq!(status.lines_changed, None);
    }

    #[test]
    fn missing_path_is_an_open_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("gone");
        let err = analyzer(false).analyze(&path, &CancelToken::new()).unwrap_err();
        assert_eq!(err.path(), &path);
    }

    #[test]
    fn detail_mode_collects_bounded_history_and_window() {
        let repo = TestRepo::new("main");
        for day in (0..7).rev() {
            let name = format!("f{day}.txt");
            repo.commit(&name, "x\ny\n", days_ago(day * 3));
        }

        let status = analyzer(true).analyze(repo.path(), &CancelToken::new()).unwrap();
        assert_eq!(status.recent_commits.len(), 5);
        assert_eq!(status.recent_commits[0].message, "add f0.txt");
        assert_eq!(status.recent_commits[0].hash.len(), 7);
        assert_eq!(status.recent_commits[0].author, "tester");
        // f0 (today), f1 (3 days) and f2 (6 days) fall inside the 7 day window.
        let lines = status.lines_changed.unwrap();
        assert_eq!(lines.added, 6);
        assert_eq!(lines.removed, 0);
        assert_eq!(lines.period, from_days(7));
    }

    #[test]
    fn detail_mode_omits_empty_window() {
        let repo = TestRepo::new("main");
        repo.commit("a.txt", "a\n", days_ago(20));
        let status = analyzer(true).analyze(repo.path(), &CancelToken::new()).unwrap();
        assert_eq!(status.recent_commits.len(), 1);
        assert_eq!(status.lines_changed, None);
    }

    #[test]
    fn rebased_commit_does_not_hide_older_window_commits() {
        let repo = TestRepo::new("main");
        repo.commit("c1.txt", "x\ny\n", days_ago(3));
        repo.commit_authored("c2.txt", "x\ny\n", days_ago(30), days_ago(2));
        repo.commit("c3.txt", "x\ny\n", days_ago(1));

        let status = analyzer(true).analyze(repo.path(), &CancelToken::new()).unwrap();
        // c2 was authored outside the window; c1 and c3 count.
        assert_eq!(status.lines_changed.unwrap().added, 4);
        assert_eq!(status.recent_commits.len(), 3);
    }

    #[test]
    fn fetch_refreshes_unpulled_count() {
        let upstream = TestRepo::new("main");
        upstream.commit("a.txt", "a\n", days_ago(3));
        let local = TestRepo::clone_of(&upstream);
        upstream.commit("b.txt", "b\n", days_ago(2));
        upstream.commit("c.txt", "c\n", days_ago(1));

        let cancel = CancelToken::new();
        let stale = analyzer(false).analyze(local.path(), &cancel).unwrap();
        assert_eq!(stale.unpulled_commits, 0);

        let fresh = analyzer_with(false, true).analyze(local.path(), &cancel).unwrap();
        assert_eq!(fresh.unpulled_commits, 2);
        assert_eq!(fresh.unpushed_commits, 0);
    }

    #[test]
    fn unreachable_remote_keeps_previous_counts() {
        let upstream = TestRepo::new("main");
        upstream.commit("a.txt", "a\n", days_ago(3));
        let local = TestRepo::clone_of(&upstream);
        local.commit("b.txt", "b\n", days_ago(1));
        std::fs::remove_dir_all(upstream.path()).unwrap();

        let status = analyzer_with(false, true)
            .analyze(local.path(), &CancelToken::new())
            .unwrap();
        assert_eq!(status.branch, "main");
        assert_eq!(status.unpushed_commits, 1);
        assert_eq!(status.unpulled_commits, 0);
    }

    #[test]
    fn missing_remote_does_not_fail_fetch_phase() {
        let repo = TestRepo::new("main");
        let base = repo.commit("a.txt", "a\n", days_ago(2));
        repo.set_remote_ref("origin", "main", base);
        repo.commit("b.txt", "b\n", days_ago(1));

        let status = analyzer_with(false, true)
            .analyze(repo.path(), &CancelToken::new())
            .unwrap();
        assert_eq!(status.unpushed_commits, 1);
    }

    #[test]
    fn cancelled_token_skips_fetch() {
        let upstream = TestRepo::new("main");
        upstream.commit("a.txt", "a\n", days_ago(2));
        let local = TestRepo::clone_of(&upstream);
        upstream.commit("b.txt", "b\n", days_ago(1));

        let cancel = CancelToken::new();
        cancel.cancel();
        let status = analyzer_with(false, true).analyze(local.path(), &cancel).unwrap();
        assert_eq!(status.unpulled_commits, 0);
    }
}
