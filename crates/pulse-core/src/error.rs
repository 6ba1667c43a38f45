use std::path::PathBuf;
use thiserror::Error;

/// Failure that stops a run before any repository is analyzed.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("scan root {} does not exist", path.display())]
    MissingRoot { path: PathBuf },
    #[error("scan root {} is not a directory", path.display())]
    NotADirectory { path: PathBuf },
    #[error("read scan root {}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failure that ends the analysis of a single repository.
///
/// Everything after a successful open degrades to default field values
/// instead, so this is the only per-repository error.
#[derive(Debug, Error)]
pub enum AnalyzeError {
    #[error("open repository: {message}")]
    Open { path: PathBuf, message: String },
}

impl AnalyzeError {
    pub fn path(&self) -> &PathBuf {
        match self {
            AnalyzeError::Open { path, .. } => path,
        }
    }
}
