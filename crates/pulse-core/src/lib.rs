pub mod aggregate;
pub mod analyzer;
pub mod cancel;
pub mod config;
pub mod dirty;
pub mod discovery;
pub mod error;
pub mod model;
pub mod pool;
pub mod process;
pub mod scanner;
pub mod source;
pub mod trace;
pub mod trace_report;

#[cfg(test)]
mod test_support;

pub use cancel::CancelToken;
pub use config::ScanConfig;
pub use error::{AnalyzeError, DiscoveryError};
pub use model::{RepoStatus, ScanHealth, ScanResult};
pub use scanner::Scanner;
pub use trace::SpanCollector;
