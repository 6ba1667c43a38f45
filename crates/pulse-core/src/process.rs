use crate::cancel::CancelToken;
use std::io::Read;
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;
use thiserror::Error;

const POLL_INTERVAL: Duration = Duration::from_millis(5);

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("spawn {program}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("wait for {program}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{program} exited with {status}")]
    Failed { program: String, status: ExitStatus },
    #[error("{program} killed after cancellation")]
    Cancelled { program: String },
}

impl ProcessError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ProcessError::Spawn { source, .. } if source.kind() == std::io::ErrorKind::NotFound
        )
    }
}

/// Runs `command` to completion and returns its stdout, killing the child as
/// soon as `cancel` fires.
pub fn run_cancellable(mut command: Command, cancel: &CancelToken) -> Result<Vec<u8>, ProcessError> {
    let program = command.get_program().to_string_lossy().into_owned();
    if cancel.is_cancelled() {
        return Err(ProcessError::Cancelled { program });
    }
    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|source| ProcessError::Spawn {
            program: program.clone(),
            source,
        })?;

    // Drained on a side thread so a chatty child never blocks on a full pipe
    // while we poll for exit.
    let stdout = child.stdout.take();
    let reader = thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut stdout) = stdout {
            let _ = stdout.read_to_end(&mut buf);
        }
        buf
    });

    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {}
            Err(source) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(ProcessError::Wait { program, source });
            }
        }
        if cancel.is_cancelled() {
            let _ = child.kill();
            let _ = child.wait();
            return Err(ProcessError::Cancelled { program });
        }
        thread::sleep(POLL_INTERVAL);
    };

    let output = reader.join().unwrap_or_default();
    if !status.success() {
        return Err(ProcessError::Failed { program, status });
    }
    Ok(output)
}
