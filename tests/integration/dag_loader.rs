use std::collections::BTreeSet;

use etldag::dag::{DagLoader, RestrictedPolicy, load_dag};
use etldag::errors::EtlError;
use etldag_test_utils::ProjectBuilder;

#[test]
fn includes_are_merged_depth_first() {
    let project = ProjectBuilder::new()
        .dag(
            r#"
steps:
  data://garden/energy/2023-01-01/primary_energy:
    - data://meadow/energy/2023-01-01/primary_energy
include:
  - dag/meadow.yml
"#,
        )
        .file(
            "dag/meadow.yml",
            r#"
steps:
  data://meadow/energy/2023-01-01/primary_energy:
    - snapshot://energy/2023-01-01/primary_energy.csv
include:
  - dag/empty.yml
"#,
        )
        .file("dag/empty.yml", "")
        .build();

    let graph = project.graph();
    assert_eq!(graph.len(), 2);
    assert_eq!(
        graph["data://meadow/energy/2023-01-01/primary_energy"],
        BTreeSet::from(["snapshot://energy/2023-01-01/primary_energy.csv".to_string()])
    );
}

#[test]
fn null_dependencies_and_null_steps_mean_empty() {
    let project = ProjectBuilder::new()
        .dag(
            r#"
steps:
  data://garden/a/v/x:
include:
  - dag/other.yml
"#,
        )
        .file("dag/other.yml", "steps:\n")
        .build();

    let graph = project.graph();
    assert_eq!(graph.len(), 1);
    assert!(graph["data://garden/a/v/x"].is_empty());
}

#[test]
fn step_defined_twice_is_an_error() {
    let project = ProjectBuilder::new()
        .dag(
            r#"
steps:
  data://garden/a/v/x: []
include:
  - dag/dup.yml
"#,
        )
        .file(
            "dag/dup.yml",
            r#"
steps:
  data://garden/a/v/x:
    - data://meadow/a/v/x
"#,
        )
        .build();

    match load_dag(&project.config) {
        Err(EtlError::DuplicateStep { document, steps }) => {
            assert!(document.ends_with("dag/dup.yml"));
            assert_eq!(steps, vec!["data://garden/a/v/x".to_string()]);
        }
        other => panic!("expected duplicate step error, got {other:?}"),
    }
}

#[test]
fn restricted_steps_outside_their_document_are_rejected() {
    let project = ProjectBuilder::new()
        .dag(
            r#"
steps:
  data://grapher/fasttrack/latest/sheet: []
"#,
        )
        .build();

    let err = load_dag(&project.config).unwrap_err();
    assert!(matches!(err, EtlError::RestrictedStep { .. }));
    assert!(err.to_string().contains("data://grapher/fasttrack/latest/sheet"));
}

#[test]
fn restricted_steps_inside_their_document_are_accepted() {
    let project = ProjectBuilder::new()
        .dag("include:\n  - dag/fasttrack.yml\n")
        .file(
            "dag/fasttrack.yml",
            "steps:\n  data://grapher/fasttrack/latest/sheet: []\n",
        )
        .build();

    let graph = project.graph();
    assert!(graph.contains_key("data://grapher/fasttrack/latest/sheet"));
}

#[test]
fn loader_can_be_used_without_a_config() {
    let project = ProjectBuilder::new()
        .file("custom/root.yml", "steps:\n  data://garden/a/v/x: []\n")
        .build();

    let loader = DagLoader::new(
        project.root(),
        RestrictedPolicy {
            marker: "/restricted/".to_string(),
            document: "restricted.yml".to_string(),
        },
    );
    let graph = loader.load(project.path("custom/root.yml")).unwrap();
    assert_eq!(graph.len(), 1);
}

#[test]
fn missing_document_is_an_io_error() {
    let project = ProjectBuilder::new().build();
    assert!(matches!(load_dag(&project.config), Err(EtlError::Io { .. })));
}

#[test]
fn malformed_yaml_names_the_document() {
    let project = ProjectBuilder::new().dag("steps: [unclosed\n").build();
    match load_dag(&project.config) {
        Err(EtlError::Yaml { path, .. }) => assert!(path.ends_with("dag/main.yml")),
        other => panic!("expected yaml error, got {other:?}"),
    }
}
