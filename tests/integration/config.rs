use std::io::Write;

use tempfile::{NamedTempFile, tempdir};

use etldag::config::{ConfigFile, load_and_validate, load_from_path};
use etldag::errors::EtlError;
use etldag::watch::watch_roots;
use etldag_test_utils::ConfigFileBuilder;

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{contents}").unwrap();
    file
}

#[test]
fn defaults_apply_to_an_empty_file() {
    let file = write_config("");
    let cfg = load_and_validate(file.path()).unwrap();

    assert_eq!(cfg.run.workers, 1);
    assert_eq!(cfg.run.publish_workers, 10);
    assert_eq!(cfg.run.epoch, "1");
    assert!(!cfg.run.prefer_download);
    assert_eq!(cfg.exec.interpreters["py"], "python3");
    assert_eq!(cfg.dag.restricted_document, "fasttrack.yml");
    assert!(cfg.source.is_some());
}

#[test]
fn relative_paths_are_anchored_on_the_config_directory() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("etl.toml");
    std::fs::write(
        &path,
        r#"
[paths]
dag_file = "dags/root.yml"
data_dir = "/abs/data"

[run]
workers = 3
subset = "100"
"#,
    )
    .unwrap();

    let cfg = load_and_validate(&path).unwrap();
    assert_eq!(cfg.paths.dag_file, dir.path().join("dags/root.yml"));
    assert_eq!(cfg.paths.steps_dir, dir.path().join("etl/steps"));
    assert_eq!(cfg.paths.data_dir, std::path::PathBuf::from("/abs/data"));
    assert_eq!(cfg.dag_dir(), dir.path().join("dags"));
    assert_eq!(cfg.run.workers, 3);
    assert_eq!(cfg.run.subset.as_deref(), Some("100"));
}

#[test]
fn missing_file_yields_defaults_without_source() {
    let dir = tempdir().unwrap();
    let cfg = load_and_validate(dir.path().join("absent.toml")).unwrap();
    assert!(cfg.source.is_none());
    assert_eq!(cfg.paths.base_dir, dir.path().join("."));
}

#[test]
fn zero_workers_is_rejected() {
    let file = write_config("[run]\nworkers = 0\n");
    match load_and_validate(file.path()) {
        Err(EtlError::Config(msg)) => assert!(msg.contains("workers")),
        other => panic!("expected config error, got {other:?}"),
    }
}

#[test]
fn invalid_publish_filter_is_rejected() {
    let file = write_config("[run]\npublish_filter = \"(\"\n");
    assert!(matches!(load_and_validate(file.path()), Err(EtlError::Config(_))));
}

#[test]
fn empty_remote_url_is_rejected() {
    let file = write_config("[remote]\ncatalog_url = \"  \"\n");
    assert!(matches!(load_and_validate(file.path()), Err(EtlError::Config(_))));
}

#[test]
fn zero_memory_limit_is_rejected() {
    let raw = ConfigFileBuilder::new().raw();
    let mut raw = raw;
    raw.run.max_virtual_memory = Some(0);
    assert!(ConfigFile::try_from(raw).is_err());
}

#[test]
fn malformed_toml_is_a_toml_error() {
    let file = write_config("[run\nworkers = 2\n");
    assert!(matches!(load_from_path(file.path()), Err(EtlError::Toml(_))));
}

#[test]
fn watch_roots_cover_steps_and_dag() {
    let dir = tempdir().unwrap();
    let cfg = ConfigFileBuilder::new().base_dir(dir.path()).build();
    let roots = watch_roots(&cfg);
    assert_eq!(roots.len(), 2);
    assert!(roots.contains(&dir.path().join("etl/steps")));
    assert!(roots.contains(&dir.path().join("dag")));
}
