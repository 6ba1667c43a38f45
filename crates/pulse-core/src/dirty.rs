use crate::cancel::CancelToken;
use crate::process::run_cancellable;
use crate::source::{DirtyStatus, RepoHandle};
use serde::{Deserialize, Serialize};
use std::process::Command;
use tracing::debug;

/// Clean/dirty probe over an opened repository.
///
/// Both implementations report the same counts; they differ only in cost.
pub trait DirtyProbe: Send + Sync {
    fn probe(&self, repo: &dyn RepoHandle, cancel: &CancelToken) -> anyhow::Result<DirtyStatus>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirtyProbeKind {
    /// `git status --porcelain` in a child process. Much cheaper than a
    /// libgit2 status walk on large working trees.
    #[default]
    Process,
    Embedded,
}

impl DirtyProbeKind {
    pub fn build(self) -> Box<dyn DirtyProbe> {
        match self {
            DirtyProbeKind::Process => Box::new(ProcessDirtyProbe::default()),
            DirtyProbeKind::Embedded => Box::new(EmbeddedDirtyProbe),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DirtyProbeKind::Process => "process",
            DirtyProbeKind::Embedded => "embedded",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProcessDirtyProbe {
    program: String,
}

impl Default for ProcessDirtyProbe {
    fn default() -> Self {
        Self {
            program: "git".to_string(),
        }
    }
}

impl ProcessDirtyProbe {
    #[cfg(test)]
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl DirtyProbe for ProcessDirtyProbe {
    fn probe(&self, repo: &dyn RepoHandle, cancel: &CancelToken) -> anyhow::Result<DirtyStatus> {
        let mut command = Command::new(&self.program);
        command
            .arg("-C")
            .arg(repo.workdir())
            .args(["status", "--porcelain"]);
        match run_cancellable(command, cancel) {
            Ok(output) => Ok(DirtyStatus::from_count(count_porcelain_lines(&output))),
            Err(err) if err.is_not_found() => {
                debug!(program = %self.program, "git executable missing; using embedded status");
                repo.dirty_status()
            }
            Err(err) => Err(err.into()),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct EmbeddedDirtyProbe;

impl DirtyProbe for EmbeddedDirtyProbe {
    fn probe(&self, repo: &dyn RepoHandle, _cancel: &CancelToken) -> anyhow::Result<DirtyStatus> {
        repo.dirty_status()
    }
}

fn count_porcelain_lines(output: &[u8]) -> usize {
    output
        .split(|byte| *byte == b'\n')
        .filter(|line| !line.is_empty())
        .count()
}
