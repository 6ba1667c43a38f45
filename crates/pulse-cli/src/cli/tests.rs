use super::progress::{progress_text, render_progress_bar};
use super::*;
use pulse_core::config::{DEFAULT_MAX_DEPTH, DEFAULT_WORKERS};
use tempfile::TempDir;

#[test]
fn defaults_match_core_config() {
    let cli = Cli::try_parse_from(["pulse"]).unwrap();
    assert_eq!(cli.path, PathBuf::from("."));
    assert_eq!(cli.format, OutputFormat::Table);
    assert!(!cli.show_timings);

    let config = cli.scan_config(&FileConfig::default());
    assert_eq!(config.max_depth, DEFAULT_MAX_DEPTH);
    assert_eq!(config.workers, DEFAULT_WORKERS);
    assert_eq!(config.dirty_probe, DirtyProbeKind::Process);
    assert!(!config.fetch);
}

#[test]
fn flags_override_config_file() {
    let cli = Cli::try_parse_from([
        "pulse",
        "--path",
        "/src",
        "--depth",
        "5",
        "--workers",
        "8",
        "--ghost-days",
        "30",
        "--dirty-probe",
        "embedded",
        "--format",
        "json",
        "--time",
        "--detail",
    ])
    .unwrap();
    let file = FileConfig {
        max_depth: Some(2),
        workers: Some(2),
        remote: Some("upstream".into()),
        fetch: Some(true),
        ..FileConfig::default()
    };

    let config = cli.scan_config(&file);
    assert_eq!(config.root, PathBuf::from("/src"));
    assert_eq!(config.max_depth, 5);
    assert_eq!(config.workers, 8);
    assert_eq!(config.ghost_threshold, from_days(30));
    assert_eq!(config.dirty_probe, DirtyProbeKind::Embedded);
    assert_eq!(config.remote, "upstream");
    assert!(config.fetch);
    assert!(config.detail);
    assert_eq!(cli.format, OutputFormat::Json);
    assert!(cli.show_timings);
}

#[test]
fn zero_workers_fall_back_to_default() {
    let cli = Cli::try_parse_from(["pulse", "--workers", "0"]).unwrap();
    assert_eq!(cli.scan_config(&FileConfig::default()).workers, DEFAULT_WORKERS);
}

#[test]
fn unknown_format_is_rejected() {
    assert!(Cli::try_parse_from(["pulse", "--format", "yaml"]).is_err());
}

#[test]
fn timeout_sets_a_deadline() {
    let cli = Cli::try_parse_from(["pulse", "--timeout", "30"]).unwrap();
    assert!(cli.cancel_token().deadline().is_some());
    let cli = Cli::try_parse_from(["pulse"]).unwrap();
    assert!(cli.cancel_token().deadline().is_none());
}

#[test]
fn explicit_config_must_exist() {
    let tmp = TempDir::new().unwrap();
    let missing = tmp.path().join("pulse.json");
    assert!(app::load_file_config(Some(missing.as_path())).is_err());

    std::fs::write(&missing, r#"{"workers": 6}"#).unwrap();
    let file = app::load_file_config(Some(missing.as_path())).unwrap();
    assert_eq!(file.workers, Some(6));
}

#[test]
fn exit_codes_distinguish_outcomes() {
    assert_eq!(exit_code(ScanHealth::Empty), ExitCode::SUCCESS);
    assert_eq!(exit_code(ScanHealth::Complete), ExitCode::SUCCESS);
    assert_eq!(exit_code(ScanHealth::PartialFailure), ExitCode::from(2));
    assert_eq!(exit_code(ScanHealth::Cancelled), ExitCode::from(130));
}

#[test]
fn progress_bar_fills_proportionally() {
    assert_eq!(render_progress_bar(0, 0, 10), "[]");
    assert_eq!(render_progress_bar(0, 4, 4), "[----]");
    assert_eq!(render_progress_bar(2, 4, 4), "[##--]");
    assert_eq!(render_progress_bar(9, 4, 4), "[####]");

    let path = PathBuf::from("/src/alpha");
    let text = progress_text(&PoolProgress {
        path: &path,
        completed: 1,
        total: 2,
    });
    assert_eq!(text, "scanning 1/2 [##########----------] alpha");
}
