use crate::analyzer::Analyze;
use crate::cancel::CancelToken;
use crate::model::{RepoStatus, ScanError};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use tracing::{Span, debug, warn};

/// Fixed-size set of worker threads claiming repository paths through one
/// shared cursor. Workers stop claiming jobs once the cancel token trips; jobs
/// already claimed run to completion.
#[derive(Debug, Clone, Copy)]
pub struct WorkerPool {
    workers: usize,
}

#[derive(Debug, Default)]
pub struct PoolOutput {
    /// In completion order.
    pub statuses: Vec<RepoStatus>,
    pub errors: Vec<ScanError>,
    /// Paths never claimed because the run was cancelled.
    pub skipped: usize,
    /// Set only when cancellation left paths unclaimed. A token that trips
    /// after the last job finished does not mark a complete run.
    pub cancelled: bool,
}

impl PoolOutput {
    pub fn processed(&self) -> usize {
        self.statuses.len() + self.errors.len()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PoolProgress<'a> {
    pub path: &'a Path,
    pub completed: usize,
    pub total: usize,
}

/// Result of one claimed path.
#[derive(Debug)]
pub enum PoolOutcome {
    Status(RepoStatus),
    Failed(ScanError),
}

enum PoolEvent {
    Started { index: usize },
    Finished { index: usize, outcome: PoolOutcome },
}

impl WorkerPool {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn run<A>(
        &self,
        analyzer: &A,
        paths: &[PathBuf],
        cancel: &CancelToken,
        mut progress: Option<&mut dyn FnMut(PoolProgress<'_>)>,
    ) -> PoolOutput
    where
        A: Analyze + ?Sized,
    {
        let mut output = PoolOutput::default();
        if paths.is_empty() {
            return output;
        }

        let cursor = AtomicUsize::new(0);
        let workers = self.workers.min(paths.len());
        let dispatch = tracing::dispatcher::get_default(|current| current.clone());
        let parent = Span::current();
        let (tx, rx) = mpsc::channel::<PoolEvent>();

        std::thread::scope(|scope| {
            for _ in 0..workers {
                let tx = tx.clone();
                let cursor = &cursor;
                let dispatch = dispatch.clone();
                let parent = parent.clone();
                scope.spawn(move || {
                    tracing::dispatcher::with_default(&dispatch, || {
                        parent.in_scope(|| work(analyzer, paths, cursor, cancel, &tx));
                    });
                });
            }
            drop(tx);

            while let Ok(event) = rx.recv() {
                match event {
                    PoolEvent::Started { index } => {
                        debug!(path = %paths[index].display(), "analysis started");
                    }
                    PoolEvent::Finished { index, outcome } => {
                        match outcome {
                            PoolOutcome::Status(status) => output.statuses.push(status),
                            PoolOutcome::Failed(err) => {
                                warn!(path = %err.path.display(), error = %err.message, "analysis failed");
                                output.errors.push(err);
                            }
                        }
                        if let Some(progress) = progress.as_mut() {
                            progress(PoolProgress {
                                path: &paths[index],
                                completed: output.processed(),
                                total: paths.len(),
                            });
                        }
                    }
                }
            }
        });

        output.skipped = paths.len() - output.processed();
        output.cancelled = output.skipped > 0;
        output
    }
}

fn work<A>(
    analyzer: &A,
    paths: &[PathBuf],
    cursor: &AtomicUsize,
    cancel: &CancelToken,
    tx: &mpsc::Sender<PoolEvent>,
) where
    A: Analyze + ?Sized,
{
    loop {
        if cancel.is_cancelled() {
            break;
        }
        let index = cursor.fetch_add(1, Ordering::Relaxed);
        let Some(path) = paths.get(index) else {
            break;
        };
        let _ = tx.send(PoolEvent::Started { index });
        let outcome = match catch_unwind(AssertUnwindSafe(|| analyzer.analyze(path, cancel))) {
            Ok(Ok(status)) => PoolOutcome::Status(status),
            Ok(Err(err)) => PoolOutcome::Failed(ScanError {
                path: err.path().clone(),
                message: err.to_string(),
            }),
            Err(panic) => PoolOutcome::Failed(ScanError {
                path: path.clone(),
                message: format!("analysis panicked: {}", panic_message(panic.as_ref())),
            }),
        };
        let _ = tx.send(PoolEvent::Finished { index, outcome });
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
