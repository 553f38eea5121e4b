use std::fs;
use std::sync::Arc;

use etldag::catalog::{DatasetIndex, RemoteCatalog, download_if_current};
use etldag::context::Context;
use etldag::publish::MemoryDatastore;
use etldag::steps::{Step, StepOps, parse_step};
use etldag_test_utils::{FakeCatalog, GraphBuilder, Project, ProjectBuilder, RecordingTransform};

use crate::common::{init_tracing, registry_for};

const PATH: &str = "garden/energy/2023-01-01/primary_energy";

fn setup() -> (Project, Step, Arc<RecordingTransform>) {
    let project = ProjectBuilder::new()
        .config(|c| c.prefer_download(true))
        .step_script(PATH, "print('building')\n")
        .build();
    let step = parse_step(&format!("data://{PATH}"), &GraphBuilder::new().build()).unwrap();
    (project, step, RecordingTransform::new().into_arc())
}

fn context(project: &Project, transform: &Arc<RecordingTransform>, catalog: Arc<FakeCatalog>) -> Context {
    project
        .context_with(registry_for(&[PATH], transform), Arc::new(MemoryDatastore::new()))
        .with_catalog(Some(catalog as Arc<dyn RemoteCatalog>))
}

#[test]
fn matching_remote_build_is_downloaded_instead_of_built() {
    init_tracing();
    let (project, step, transform) = setup();
    let expected = step.checksum_output(&project.context()).unwrap();
    let catalog = Arc::new(FakeCatalog::new().with_dataset(
        PATH,
        &expected,
        &[("t.table.json", "{\"short_name\":\"t\"}"), ("notes/readme.md", "hi")],
    ));
    let ctx = context(&project, &transform, Arc::clone(&catalog));

    step.run(&ctx).unwrap();

    assert_eq!(transform.runs(), 0);
    assert_eq!(catalog.downloads(), 2);
    let dest = project.path(&format!("data/{PATH}"));
    assert!(dest.join("notes/readme.md").is_file());
    let index = DatasetIndex::read(&dest).unwrap();
    assert_eq!(index.source_checksum.as_deref(), Some(expected.as_str()));

    // The downloaded dataset counts as up to date.
    assert!(!step.is_dirty(&ctx, &Default::default()).unwrap());
}

#[test]
fn stale_remote_build_is_ignored() {
    let (project, step, transform) = setup();
    let catalog = Arc::new(FakeCatalog::new().with_dataset(PATH, "stale", &[("a", "b")]));
    let ctx = context(&project, &transform, Arc::clone(&catalog));

    step.run(&ctx).unwrap();

    assert_eq!(catalog.fetches(), 1);
    assert_eq!(catalog.downloads(), 0);
    assert_eq!(transform.runs(), 1);
}

#[test]
fn missing_remote_build_falls_back_to_local() {
    let (project, step, transform) = setup();
    let catalog = Arc::new(FakeCatalog::new());
    let ctx = context(&project, &transform, Arc::clone(&catalog));

    step.run(&ctx).unwrap();
    assert_eq!(transform.runs(), 1);
}

#[test]
fn unreachable_catalog_falls_back_to_local() {
    init_tracing();
    let (project, step, transform) = setup();
    let catalog = Arc::new(FakeCatalog::unreachable());
    let ctx = context(&project, &transform, Arc::clone(&catalog));

    step.run(&ctx).unwrap();
    assert_eq!(catalog.fetches(), 1);
    assert_eq!(transform.runs(), 1);
}

#[test]
fn catalog_is_not_asked_unless_preferred() {
    let (project, step, transform) = setup();
    let mut cfg = project.config.clone();
    cfg.run.prefer_download = false;
    let catalog = Arc::new(FakeCatalog::new().with_dataset(PATH, "anything", &[]));
    let ctx = Context::new(cfg)
        .unwrap()
        .with_transforms(registry_for(&[PATH], &transform))
        .with_catalog(Some(Arc::clone(&catalog) as Arc<dyn RemoteCatalog>));

    step.run(&ctx).unwrap();
    assert_eq!(catalog.fetches(), 0);
    assert_eq!(transform.runs(), 1);
}

#[test]
fn download_if_current_outcomes() {
    let dir = tempfile::tempdir().unwrap();

    let empty = FakeCatalog::new();
    assert!(!download_if_current(&empty, "x/y/z/w", "ck", dir.path(), 2).unwrap());

    let catalog = FakeCatalog::new().with_dataset("x/y/z/w", "ck", &[("a.txt", "a")]);
    assert!(!download_if_current(&catalog, "x/y/z/w", "other", dir.path(), 2).unwrap());
    assert!(download_if_current(&catalog, "x/y/z/w", "ck", dir.path(), 2).unwrap());
    assert_eq!(fs::read_to_string(dir.path().join("a.txt")).unwrap(), "a");
    assert!(dir.path().join("index.json").is_file());

    let unreachable = FakeCatalog::unreachable();
    assert!(download_if_current(&unreachable, "x/y/z/w", "ck", dir.path(), 2).is_err());
}

#[test]
fn file_names_escaping_the_dataset_are_rejected() {
    let root = tempfile::tempdir().unwrap();
    let dest = root.path().join("data/garden/a/v/x");

    for bad in ["../../../../escaped.txt", "/tmp/escaped.txt", "a/../../b", ""] {
        let catalog = FakeCatalog::new().with_dataset("garden/a/v/x", "ck", &[(bad, "boom")]);
        let err = download_if_current(&catalog, "garden/a/v/x", "ck", &dest, 2).unwrap_err();
        assert!(err.to_string().contains("outside the dataset"), "{bad}: {err}");
        assert_eq!(catalog.downloads(), 0, "{bad}");
    }
    assert!(!root.path().join("escaped.txt").exists());
    assert!(!root.path().join("data/garden/b").exists());
}

#[test]
fn escaping_remote_build_falls_back_to_local() {
    let (project, step, transform) = setup();
    let expected = step.checksum_output(&project.context()).unwrap();
    let catalog = Arc::new(FakeCatalog::new().with_dataset(
        PATH,
        &expected,
        &[("../../../../../escaped.txt", "boom")],
    ));
    let ctx = context(&project, &transform, Arc::clone(&catalog));

    step.run(&ctx).unwrap();

    assert_eq!(catalog.downloads(), 0);
    assert_eq!(transform.runs(), 1);
    assert!(!project.path("escaped.txt").exists());
}
