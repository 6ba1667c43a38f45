//! Repository capabilities the analyzer needs, behind one interface.
//!
//! [`RepoBackend`] opens a path and hands back a [`RepoHandle`] that is used
//! by a single worker for the lifetime of one analysis. [`Git2Backend`] is the
//! embedded, read-only implementation on top of libgit2.

use crate::cancel::CancelToken;
use anyhow::Context;
use git2::{
    BranchType, Cred, CredentialType, DiffOptions, ErrorCode, FetchOptions, Oid, RemoteCallbacks,
    Repository, Sort, StatusOptions,
};
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use time::{OffsetDateTime, UtcOffset};
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub struct CommitInfo {
    pub id: Oid,
    pub author: String,
    pub summary: String,
    pub time: OffsetDateTime,
}

impl CommitInfo {
    pub fn short_id(&self) -> String {
        let full = self.id.to_string();
        full[..full.len().min(7)].to_string()
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DirtyStatus {
    pub is_clean: bool,
    pub changed_files: usize,
}

impl DirtyStatus {
    pub fn from_count(changed_files: usize) -> Self {
        Self {
            is_clean: changed_files == 0,
            changed_files,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LineStats {
    pub added: usize,
    pub removed: usize,
}

pub trait RepoBackend: Send + Sync {
    fn open(&self, path: &Path) -> anyhow::Result<Box<dyn RepoHandle>>;
}

pub trait RepoHandle {
    /// Working tree root, used by probes that shell out.
    fn workdir(&self) -> &Path;

    /// Short name of the checked-out branch; `None` when HEAD is detached.
    fn current_branch(&self) -> anyhow::Result<Option<String>>;

    fn head_commit(&self) -> anyhow::Result<Oid>;

    fn head_info(&self) -> anyhow::Result<CommitInfo>;

    fn remote_tracking_commit(&self, remote: &str, branch: &str) -> anyhow::Result<Oid>;

    fn dirty_status(&self) -> anyhow::Result<DirtyStatus>;

    /// Visits commits reachable from HEAD newest-first. With `since`, only
    /// commits authored at or after it are visited; the walk ends once
    /// committer time drops below it, or when `visit` breaks.
    fn commit_log(
        &self,
        since: Option<OffsetDateTime>,
        visit: &mut dyn FnMut(CommitInfo) -> ControlFlow<()>,
    ) -> anyhow::Result<()>;

    /// Nearest common ancestor, `None` for unrelated histories.
    fn merge_base(&self, a: Oid, b: Oid) -> anyhow::Result<Option<Oid>>;

    /// Number of commits reachable from `tip` that are not reachable from
    /// `base`. Cost is proportional to the divergence, not the history.
    fn count_exclusive(&self, tip: Oid, base: Oid) -> anyhow::Result<usize>;

    fn commit_stats(&self, id: Oid) -> anyhow::Result<LineStats>;

    /// Refreshes remote-tracking refs of `remote`. Read-only on the remote
    /// side; local branches and the working tree are left alone.
    fn fetch(&self, remote: &str, cancel: &CancelToken) -> anyhow::Result<()>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Git2Backend;

impl RepoBackend for Git2Backend {
    fn open(&self, path: &Path) -> anyhow::Result<Box<dyn RepoHandle>> {
        let repo = Repository::open(path)?;
        let workdir = repo
            .workdir()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| path.to_path_buf());
        Ok(Box::new(Git2Repo { repo, workdir }))
    }
}

pub struct Git2Repo {
    repo: Repository,
    workdir: PathBuf,
}

impl Git2Repo {
    fn commit_info(&self, commit: &git2::Commit<'_>) -> CommitInfo {
        let author = commit.author();
        CommitInfo {
            id: commit.id(),
            author: author.name().unwrap_or_default().to_string(),
            summary: first_line(&String::from_utf8_lossy(commit.message_bytes())),
            time: to_offset_datetime(author.when()),
        }
    }
}

impl RepoHandle for Git2Repo {
    fn workdir(&self) -> &Path {
        &self.workdir
    }

    fn current_branch(&self) -> anyhow::Result<Option<String>> {
        let head = self.repo.head().context("resolve HEAD")?;
        if !head.is_branch() {
            return Ok(None);
        }
        Ok(head.shorthand().map(|name| name.to_string()))
    }

    fn head_commit(&self) -> anyhow::Result<Oid> {
        let head = self.repo.head().context("resolve HEAD")?;
        let commit = head.peel_to_commit().context("peel HEAD to commit")?;
        Ok(commit.id())
    }

    fn head_info(&self) -> anyhow::Result<CommitInfo> {
        let head = self.repo.head().context("resolve HEAD")?;
        let commit = head.peel_to_commit().context("peel HEAD to commit")?;
        Ok(self.commit_info(&commit))
    }

    fn remote_tracking_commit(&self, remote: &str, branch: &str) -> anyhow::Result<Oid> {
        let name = format!("{remote}/{branch}");
        let reference = self
            .repo
            .find_branch(&name, BranchType::Remote)
            .with_context(|| format!("find remote-tracking branch {name}"))?;
        let commit = reference
            .get()
            .peel_to_commit()
            .with_context(|| format!("peel {name} to commit"))?;
        Ok(commit.id())
    }

    fn dirty_status(&self) -> anyhow::Result<DirtyStatus> {
        let mut options = StatusOptions::new();
        options
            .include_untracked(true)
            .recurse_untracked_dirs(false)
            .include_ignored(false)
            // `git status` folds a staged rename into one entry.
            .renames_head_to_index(true);
        let statuses = self
            .repo
            .statuses(Some(&mut options))
            .context("status repo")?;
        Ok(DirtyStatus::from_count(statuses.len()))
    }

    fn commit_log(
        &self,
        since: Option<OffsetDateTime>,
        visit: &mut dyn FnMut(CommitInfo) -> ControlFlow<()>,
    ) -> anyhow::Result<()> {
        let mut walk = self.repo.revwalk().context("create revwalk")?;
        walk.set_sorting(Sort::TIME).context("sort revwalk")?;
        walk.push_head().context("push HEAD")?;
        for oid in walk {
            let oid = oid.context("walk history")?;
            let commit = self.repo.find_commit(oid).context("find commit")?;
            if let Some(since) = since {
                // Sorted by committer time, so nothing older can follow.
                if to_offset_datetime(commit.time()) < since {
                    break;
                }
                if to_offset_datetime(commit.author().when()) < since {
                    continue;
                }
            }
            let info = self.commit_info(&commit);
            if visit(info).is_break() {
                break;
            }
        }
        Ok(())
    }

    fn merge_base(&self, a: Oid, b: Oid) -> anyhow::Result<Option<Oid>> {
        match self.repo.merge_base(a, b) {
            Ok(base) => Ok(Some(base)),
            Err(err) if err.code() == ErrorCode::NotFound => Ok(None),
            Err(err) => Err(err).context("compute merge base"),
        }
    }

    fn count_exclusive(&self, tip: Oid, base: Oid) -> anyhow::Result<usize> {
        if tip == base {
            return Ok(0);
        }
        let mut walk = self.repo.revwalk().context("create revwalk")?;
        walk.push(tip).context("push tip")?;
        walk.hide(base).context("hide merge base")?;
        let mut count = 0;
        for oid in walk {
            let oid = oid.context("walk history")?;
            if oid == base {
                break;
            }
            count += 1;
        }
        Ok(count)
    }

    fn commit_stats(&self, id: Oid) -> anyhow::Result<LineStats> {
        let commit = self.repo.find_commit(id).context("find commit")?;
        let tree = commit.tree().context("commit tree")?;
        let parent_tree = match commit.parent_count() {
            0 => None,
            _ => Some(
                commit
                    .parent(0)
                    .and_then(|parent| parent.tree())
                    .context("parent tree")?,
            ),
        };
        let mut options = DiffOptions::new();
        let diff = self
            .repo
            .diff_tree_to_tree(parent_tree.as_ref(), Some(&tree), Some(&mut options))
            .context("diff commit")?;
        let stats = diff.stats().context("diff stats")?;
        Ok(LineStats {
            added: stats.insertions(),
            removed: stats.deletions(),
        })
    }

    fn fetch(&self, remote: &str, cancel: &CancelToken) -> anyhow::Result<()> {
        anyhow::ensure!(!cancel.is_cancelled(), "fetch cancelled");
        let mut remote = self
            .repo
            .find_remote(remote)
            .with_context(|| format!("find remote {remote}"))?;
        let config = self.repo.config().context("open repo config")?;
        let mut fo = FetchOptions::new();
        fo.remote_callbacks(remote_callbacks(config, cancel.clone()));
        debug!(path = %self.workdir.display(), "fetching remote");
        remote
            .fetch(&[] as &[&str], Some(&mut fo), None)
            .context("fetch remote")?;
        Ok(())
    }
}

fn remote_callbacks(config: git2::Config, cancel: CancelToken) -> RemoteCallbacks<'static> {
    let mut callbacks = RemoteCallbacks::new();
    callbacks.credentials(move |url, username_from_url, allowed| {
        if allowed.contains(CredentialType::SSH_KEY)
            && let Some(username) = username_from_url
        {
            return Cred::ssh_key_from_agent(username);
        }
        if allowed.contains(CredentialType::USER_PASS_PLAINTEXT) {
            return Cred::credential_helper(&config, url, username_from_url);
        }
        Cred::default()
    });
    // Returning false from the progress callback aborts the transfer.
    let progress_cancel = cancel.clone();
    callbacks.transfer_progress(move |_| !progress_cancel.is_cancelled());
    callbacks.sideband_progress(move |_| !cancel.is_cancelled());
    callbacks
}

fn to_offset_datetime(time: git2::Time) -> OffsetDateTime {
    let utc = OffsetDateTime::from_unix_timestamp(time.seconds())
        .unwrap_or(OffsetDateTime::UNIX_EPOCH);
    match UtcOffset::from_whole_seconds(time.offset_minutes() * 60) {
        Ok(offset) => utc.to_offset(offset),
        Err(_) => utc,
    }
}

pub(crate) fn first_line(message: &str) -> String {
    message.lines().next().unwrap_or_default().to_string()
}
