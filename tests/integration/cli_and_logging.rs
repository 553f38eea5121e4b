use clap::Parser;

use etldag::cli::{CliArgs, Command, LogLevel};
use etldag::logging::resolve_level;
use etldag::{apply_overrides, run_options};
use etldag_test_utils::ConfigFileBuilder;

#[test]
fn run_flags_are_parsed() {
    let args = CliArgs::try_parse_from([
        "etl",
        "run",
        "garden/energy",
        "meadow",
        "--exclude",
        "covid",
        "--downstream",
        "--private",
        "--dry-run",
        "--workers",
        "4",
        "--config",
        "custom.toml",
    ])
    .unwrap();

    assert_eq!(args.config.as_deref(), Some("custom.toml"));
    let Command::Run(run) = args.command else {
        panic!("expected run command");
    };
    assert_eq!(run.patterns, vec!["garden/energy", "meadow"]);
    assert_eq!(run.exclude, vec!["covid"]);
    assert!(run.downstream && run.private && run.dry_run);
    assert!(!run.only && !run.publish && !run.watch);

    let opts = run_options(&run);
    assert_eq!(opts.includes, run.patterns);
    assert!(opts.private);

    let mut cfg = ConfigFileBuilder::new().build();
    apply_overrides(&mut cfg, &run);
    assert_eq!(cfg.run.workers, 4);
    assert!(!cfg.run.prefer_download);
}

#[test]
fn run_step_subcommand_is_available() {
    let args =
        CliArgs::try_parse_from(["etl", "run-step", "data://garden/a/v/x", "/tmp/out"]).unwrap();
    match args.command {
        Command::RunStep { uri, dest_dir } => {
            assert_eq!(uri, "data://garden/a/v/x");
            assert_eq!(dest_dir, "/tmp/out");
        }
        other => panic!("expected run-step, got {other:?}"),
    }
}

#[test]
fn unknown_flag_is_rejected() {
    assert!(CliArgs::try_parse_from(["etl", "run", "--bogus"]).is_err());
}

#[test]
fn cli_level_beats_environment() {
    assert_eq!(
        resolve_level(Some(LogLevel::Debug), Some("error")),
        tracing::Level::DEBUG
    );
    assert_eq!(resolve_level(None, Some("WARNING")), tracing::Level::WARN);
    assert_eq!(resolve_level(None, Some("nonsense")), tracing::Level::INFO);
    assert_eq!(resolve_level(None, None), tracing::Level::INFO);
}
