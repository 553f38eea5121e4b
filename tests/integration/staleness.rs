use std::fs;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use etldag::cache::{DirtyCache, select_dirty_steps, select_dirty_steps_with};
use etldag::checksum::checksum_str;
use etldag::context::Context;
use etldag::engine::{Pipeline, RunOptions};
use etldag::publish::MemoryDatastore;
use etldag::steps::{Step, StepOps};
use etldag_test_utils::{Project, ProjectBuilder, RecordingTransform};

use crate::common::{all_steps, init_tracing, registry_for};

const A: &str = "garden/test/v1/a";
const B: &str = "garden/test/v1/b";
const C: &str = "garden/test/v1/c";

/// C depends on both A and B.
fn abc_project() -> Project {
    ProjectBuilder::new()
        .config(|c| c.workers(4))
        .dag(
            r#"
steps:
  data://garden/test/v1/a: []
  data://garden/test/v1/b: []
  data://garden/test/v1/c:
    - data://garden/test/v1/a
    - data://garden/test/v1/b
"#,
        )
        .build()
}

fn built(project: &Project) -> (Context, Arc<RecordingTransform>) {
    let transform = RecordingTransform::new().into_arc();
    let ctx = project.context_with(
        registry_for(&[A, B, C], &transform),
        Arc::new(MemoryDatastore::new()),
    );
    let pipeline = Pipeline::new(ctx.clone());
    pipeline
        .run(&project.graph(), &RunOptions::default(), &AtomicBool::new(false))
        .unwrap();
    (ctx, transform)
}

fn uris(steps: &[Step]) -> Vec<String> {
    steps.iter().map(|s| s.uri()).collect()
}

#[test]
fn everything_is_dirty_before_the_first_run() {
    init_tracing();
    let project = abc_project();
    let ctx = project.context();

    let dirty = select_dirty_steps(all_steps(&project.graph()), &ctx, 2).unwrap();
    assert_eq!(dirty.len(), 3);
}

#[test]
fn nothing_is_dirty_after_a_run() {
    init_tracing();
    let project = abc_project();
    let (ctx, transform) = built(&project);
    assert_eq!(transform.runs(), 3);

    let dirty = select_dirty_steps(all_steps(&project.graph()), &ctx, 4).unwrap();
    assert!(dirty.is_empty(), "unexpected dirty steps: {:?}", uris(&dirty));
}

#[test]
fn shared_dirty_dependency_is_evaluated_once() {
    init_tracing();
    let project = abc_project();
    let (ctx, _) = built(&project);

    fs::remove_dir_all(project.path(&format!("data/{A}"))).unwrap();

    let cache = DirtyCache::new();
    let dirty =
        select_dirty_steps_with(all_steps(&project.graph()), &ctx, 4, &cache).unwrap();

    assert_eq!(
        uris(&dirty),
        vec!["data://garden/test/v1/a", "data://garden/test/v1/c"]
    );
    // a, b and c: one evaluation each, whichever path reached a first.
    assert_eq!(cache.evaluations(), 3);
    assert!(cache.is_empty(), "cache is cleared after a batch");
}

#[test]
fn memoized_result_is_returned_without_recomputing() {
    let cache = DirtyCache::new();
    assert!(cache.get_or_try_insert_with("x", || Ok(true)).unwrap());
    assert!(cache.get_or_try_insert_with("x", || panic!("recomputed")).unwrap());
    assert_eq!(cache.get("x"), Some(true));
    assert_eq!(cache.evaluations(), 1);
    assert_eq!(cache.len(), 1);
}

#[test]
fn errors_are_not_memoized() {
    let cache = DirtyCache::new();
    let err = cache.get_or_try_insert_with("x", || {
        Err(etldag::errors::EtlError::NotImplemented("boom".into()))
    });
    assert!(err.is_err());
    assert_eq!(cache.get("x"), None);
    assert!(!cache.get_or_try_insert_with("x", || Ok(false)).unwrap());
}

#[test]
fn staleness_check_is_idempotent() {
    let project = abc_project();
    let (ctx, _) = built(&project);
    fs::remove_dir_all(project.path(&format!("data/{B}"))).unwrap();

    let first = select_dirty_steps(all_steps(&project.graph()), &ctx, 4).unwrap();
    let second = select_dirty_steps(all_steps(&project.graph()), &ctx, 1).unwrap();
    assert_eq!(uris(&first), uris(&second));
    assert_eq!(uris(&first), vec!["data://garden/test/v1/b", "data://garden/test/v1/c"]);
}

#[test]
fn fingerprint_is_pure() {
    let project = abc_project();
    let ctx = project.context();
    let steps = all_steps(&project.graph());
    for step in steps.iter() {
        assert_eq!(
            step.checksum_input(&ctx).unwrap(),
            step.checksum_input(&ctx).unwrap()
        );
    }
}

#[test]
fn fingerprint_depends_on_dependencies() {
    let project = abc_project();
    let ctx = project.context();
    let steps = all_steps(&project.graph());
    let a = steps.iter().find(|s| s.path() == A).unwrap();
    let c = steps.iter().find(|s| s.path() == C).unwrap();
    assert_ne!(a.checksum_input(&ctx).unwrap(), c.checksum_input(&ctx).unwrap());
}

#[test]
fn new_epoch_makes_everything_dirty() {
    let project = abc_project();
    let (ctx, _) = built(&project);

    let mut cfg = project.config.clone();
    cfg.run.epoch = "2".to_string();
    let bumped = Context::new(cfg)
        .unwrap()
        .with_catalog(None)
        .with_transforms(ctx.transforms.clone());

    let dirty = select_dirty_steps(all_steps(&project.graph()), &bumped, 2).unwrap();
    assert_eq!(dirty.len(), 3);
}

#[test]
fn subset_only_affects_files_that_mention_it() {
    let project = ProjectBuilder::new()
        .dag("steps:\n  data://garden/test/v1/s: []\n  data://garden/test/v1/t: []\n")
        .step_script("garden/test/v1/s", "rows = rows[:SUBSET]\n")
        .step_script("garden/test/v1/t", "rows = rows\n")
        .build();
    let steps = all_steps(&project.graph());
    let s = steps.iter().find(|s| s.path().ends_with("/s")).unwrap();
    let t = steps.iter().find(|s| s.path().ends_with("/t")).unwrap();

    let plain = project.context();
    let mut cfg = project.config.clone();
    cfg.run.subset = Some("10".to_string());
    let subset = Context::new(cfg).unwrap().with_catalog(None);

    assert_ne!(
        s.checksum_input(&plain).unwrap(),
        s.checksum_input(&subset).unwrap()
    );
    assert_eq!(
        t.checksum_input(&plain).unwrap(),
        t.checksum_input(&subset).unwrap()
    );
}

#[test]
fn step_files_include_shared_modules() {
    let project = ProjectBuilder::new()
        .dag("steps:\n  data://garden/test/v1/s: []\n")
        .step_script("garden/test/v1/s", "import shared\n")
        .file("etl/steps/data/garden/test/v1/shared.py", "X = 1\n")
        .file("etl/steps/data/garden/test/v1/other.py", "Y = 1\n")
        .build();

    let Step::Data(step) = all_steps(&project.graph()).remove(0) else {
        panic!("expected data step");
    };
    let files = step.step_files(&project.config).unwrap();
    let names: Vec<String> = files
        .iter()
        .map(|f| f.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["s.py", "shared.py"]);
}

#[test]
fn directory_steps_ignore_caches() {
    let project = ProjectBuilder::new()
        .dag("steps:\n  data://garden/test/v1/s: []\n")
        .file("etl/steps/data/garden/test/v1/s/__main__.py", "pass\n")
        .file("etl/steps/data/garden/test/v1/s/helpers.py", "pass\n")
        .file("etl/steps/data/garden/test/v1/s/__pycache__/helpers.pyc", "x")
        .build();

    let Step::Data(step) = all_steps(&project.graph()).remove(0) else {
        panic!("expected data step");
    };
    assert_eq!(step.step_files(&project.config).unwrap().len(), 2);
}

#[test]
fn snapshot_is_clean_when_local_copy_matches() {
    let body = "country,year,value\nFrance,2020,1\n";
    let project = ProjectBuilder::new()
        .dag("steps:\n  data://meadow/test/v1/m:\n    - snapshot://test/v1/raw.csv\n")
        .file(
            "snapshots/test/v1/raw.csv.dvc",
            &format!("meta:\n  is_public: true\nouts:\n  - checksum: '{}'\n    path: raw.csv\n", checksum_str(body)),
        )
        .file("data/snapshots/test/v1/raw.csv", body)
        .build();
    let ctx = project.context();

    let steps = all_steps(&project.graph());
    let snapshot = steps.iter().find(|s| s.uri().starts_with("snapshot://")).unwrap();
    assert!(!snapshot.is_dirty(&ctx, &DirtyCache::new()).unwrap());

    fs::remove_file(project.path("data/snapshots/test/v1/raw.csv")).unwrap();
    assert!(snapshot.is_dirty(&ctx, &DirtyCache::new()).unwrap());
}

#[test]
fn archive_latest_resolves_to_newest_version() {
    let body = "archived";
    let entry = |version: &str| {
        format!(
            r#"{{"namespace": "energy", "short_name": "raw", "version": "{version}", "checksum": "{}", "file_extension": "csv"}}"#,
            checksum_str(body)
        )
    };
    let project = ProjectBuilder::new()
        .file("walden/index/energy/2020/raw.json", &entry("2020"))
        .file("walden/index/energy/2021/raw.json", &entry("2021"))
        .file("walden/cache/energy/2021/raw.csv", body)
        .build();
    let ctx = project.context();
    let graph = etldag_test_utils::GraphBuilder::new().build();

    let Step::Archive(latest) = etldag::steps::parse_step("walden://energy/latest/raw", &graph).unwrap()
    else {
        panic!("expected archive step");
    };
    assert_eq!(
        latest.index_path(&project.config).unwrap(),
        project.path("walden/index/energy/2021/raw.json")
    );
    assert!(!latest.is_dirty(&ctx, &DirtyCache::new()).unwrap());

    let old = etldag::steps::parse_step("walden://energy/2020/raw", &graph).unwrap();
    assert!(old.is_dirty(&ctx, &DirtyCache::new()).unwrap());
    assert_ne!(
        old.checksum_input(&ctx).unwrap(),
        latest.checksum_input(&ctx).unwrap()
    );
}

#[test]
fn snapshot_with_malformed_checksum_fails_without_pulling() {
    // 'é' spans bytes 1..3, so the store prefix cannot be cut at byte 2.
    for checksum in ["aé0123", "ab", "a"] {
        let project = ProjectBuilder::new()
            .dag("steps:\n  snapshot://test/v1/raw.csv: []\n")
            .file(
                "snapshots/test/v1/raw.csv.dvc",
                &format!("outs:\n  - checksum: '{checksum}'\n"),
            )
            .build();
        let ctx = project.context();

        let steps = all_steps(&project.graph());
        let err = steps[0].run(&ctx).unwrap_err();
        assert!(err.to_string().contains("no usable checksum"), "{checksum}: {err}");
        assert!(!project.path("data/snapshots/test/v1/raw.csv").exists());
    }
}
