use crate::render::{render_detail, render_json, render_table};
use crate::timings::render_timings;
use anyhow::Context;
use clap::{Parser, ValueEnum};
use pulse_core::config::{FileConfig, ScanConfig, default_config_path, from_days};
use pulse_core::dirty::DirtyProbeKind;
use pulse_core::pool::PoolProgress;
use pulse_core::{CancelToken, ScanHealth, ScanResult, Scanner, SpanCollector};
use std::io::{self, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use time::OffsetDateTime;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

mod app;
mod args;
mod progress;
#[cfg(test)]
mod tests;

use args::*;

pub fn run() -> anyhow::Result<ExitCode> {
    app::run()
}
