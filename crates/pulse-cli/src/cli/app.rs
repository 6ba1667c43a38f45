use super::*;

pub(super) fn run() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let collector = cli.show_timings.then(SpanCollector::new);
    init_logging(collector.clone());

    let file = load_file_config(cli.config.as_deref())?;
    let config = cli.scan_config(&file);
    info!(
        root = %config.root.display(),
        depth = config.max_depth,
        workers = config.workers,
        detail = config.detail,
        fetch = config.fetch,
        dirty_probe = config.dirty_probe.as_str(),
        "configuration resolved"
    );

    let cancel = cli.cancel_token();
    let handler = cancel.clone();
    ctrlc::set_handler(move || handler.cancel()).context("install Ctrl-C handler")?;

    let mut scanner = Scanner::new(config);
    if let Some(collector) = &collector {
        scanner = scanner.with_collector(collector.clone());
    }

    let show_progress = cli.format == OutputFormat::Table && io::stderr().is_terminal();
    let mut line = progress::ProgressLine::default();
    let mut report = |progress: PoolProgress<'_>| line.update(&progress);
    let progress: Option<&mut dyn FnMut(PoolProgress<'_>)> = if show_progress {
        Some(&mut report as &mut dyn FnMut(PoolProgress<'_>))
    } else {
        None
    };
    let scanned = scanner.scan_with_progress(&cancel, progress);
    line.finish();

    let result = match scanned {
        Ok(result) => result,
        Err(err) => {
            error!(error = %err, "discovery failed");
            eprintln!("error: {err}");
            return Ok(ExitCode::from(1));
        }
    };

    render_result(cli.format, cli.detail, &result)?;
    Ok(exit_code(result.health()))
}

fn init_logging(collector: Option<SpanCollector>) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .with_filter(filter),
        )
        .with(collector)
        .init();
}

/// An explicit `--config` must exist; the default location is optional.
pub(super) fn load_file_config(explicit: Option<&Path>) -> anyhow::Result<FileConfig> {
    if let Some(path) = explicit {
        anyhow::ensure!(path.exists(), "config file {} not found", path.display());
        return FileConfig::load(path);
    }
    match default_config_path() {
        Ok(path) => FileConfig::load(&path),
        Err(err) => {
            info!(error = %err, "no config directory; using defaults");
            Ok(FileConfig::default())
        }
    }
}

fn render_result(format: OutputFormat, detail: bool, result: &ScanResult) -> anyhow::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let now = OffsetDateTime::now_utc();
    match format {
        OutputFormat::Json => render_json(&mut out, result)?,
        OutputFormat::Table => {
            render_table(&mut out, result, now)?;
            if detail {
                render_detail(&mut out, result, now)?;
            }
            if let Some(timings) = &result.timings {
                render_timings(&mut out, timings)?;
            }
        }
    }
    out.flush().context("flush output")?;
    Ok(())
}
