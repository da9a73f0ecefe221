//! Integration Tests for the Application Shell
//!
//! These tests build small apps from parameters and producers and check the
//! files they write.

mod common;

use std::fs;

use common::{init_tracing, Relay};
use meshgraph_core::eval::{func, Derived};
use meshgraph_core::{App, GraphError, ParameterSet};
use serde_json::json;

fn demo_app() -> (App, Derived<func::Map2<usize, String, String>>) {
    let mut params = ParameterSet::new();
    let times = params.define("times", 2_usize).unwrap();
    let label = params
        .define_with_description("label", "cube".to_string(), "part name")
        .unwrap();

    let text = func::map2("text", times.port(), label.port(), |times, label| {
        vec![label; times].join("\n")
    });
    let summary = func::map2("summary", times.port(), label.port(), |times, label| {
        json!({ "label": label, "count": times })
    });
    let bytes = func::map("bytes", times.port(), |times| vec![0xAB_u8; times]);

    let mut app = App::new("repeat").with_version("0.1.0").with_parameters(params);
    app.add_producer("parts.txt", text.port())
        .unwrap()
        .add_producer("summary.json", summary.port())
        .unwrap()
        .add_producer("parts.bin", bytes.port())
        .unwrap();
    (app, text)
}

/// Test that every producer is written to the output directory.
#[test]
fn run_writes_every_producer() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let (app, _) = demo_app();

    let report = app.run(dir.path().join("out")).unwrap();
    assert!(report.is_clean());
    assert_eq!(report.written.len(), 3);
    assert_eq!(report.written[0], dir.path().join("out").join("parts.txt"));

    let out = dir.path().join("out");
    assert_eq!(fs::read_to_string(out.join("parts.txt")).unwrap(), "cube\ncube");
    assert_eq!(fs::read(out.join("parts.bin")).unwrap(), vec![0xAB, 0xAB]);

    let summary: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(out.join("summary.json")).unwrap()).unwrap();
    assert_eq!(summary, json!({ "label": "cube", "count": 2 }));
}

/// Test that parameter overrides between runs only recompute what changed.
#[test]
fn overrides_apply_between_runs() {
    let dir = tempfile::tempdir().unwrap();
    let (app, text) = demo_app();

    app.run(dir.path()).unwrap();
    assert_eq!(text.computations(), 1);

    assert_eq!(app.parameters().apply_str(r#"{ "label": "sphere" }"#).unwrap(), 1);
    app.run(dir.path()).unwrap();
    assert_eq!(text.computations(), 2);
    assert_eq!(
        fs::read_to_string(dir.path().join("parts.txt")).unwrap(),
        "sphere\nsphere"
    );

    // Re-applying the same value changes nothing
    assert_eq!(app.parameters().apply_str(r#"{ "label": "sphere" }"#).unwrap(), 0);
    app.run(dir.path()).unwrap();
    assert_eq!(text.computations(), 2);
}

/// Test that a failing producer is reported while the others still write.
#[test]
fn failing_producer_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let mut params = ParameterSet::new();
    let depth = params.define("depth", 3_i32).unwrap();

    let ok = func::map("ok", depth.port(), |d| format!("depth {d}"));
    let bad = func::try_map("bad", depth.port(), |d| -> anyhow::Result<String> {
        anyhow::bail!("cannot subdivide {d} times")
    });

    let mut app = App::new("subdivide").with_parameters(params);
    app.add_producer("bad.txt", bad.port()).unwrap();
    app.add_producer("ok.txt", ok.port()).unwrap();

    let report = app.run(dir.path()).unwrap();
    assert_eq!(report.written, vec![dir.path().join("ok.txt")]);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].producer, "bad.txt");
    assert!(!report.failures[0].error.is_fatal());
    assert!(!dir.path().join("bad.txt").exists());
}

/// Test that graph errors abort the run before anything is written.
#[test]
fn unset_input_aborts_run() {
    let dir = tempfile::tempdir().unwrap();
    let relay = Derived::new(Relay::unbound());
    let text = func::map("text", relay.port(), |n| n.to_string());

    let mut app = App::new("broken");
    app.add_producer("n.txt", text.port()).unwrap();

    let err = app.run(dir.path().join("out")).unwrap_err();
    assert!(matches!(err, GraphError::MissingInput { ref input, .. } if input == "input"));
    assert!(!dir.path().join("out").exists());
}

/// Test that an unwritable output directory is a write error.
#[test]
fn output_dir_must_be_a_directory() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("taken");
    fs::write(&blocker, "not a directory").unwrap();
    let (app, _) = demo_app();

    let err = app.run(&blocker).unwrap_err();
    assert!(matches!(err, GraphError::Write { ref path, .. } if path == &blocker));
}

/// Test the parameter schema export.
#[test]
fn parameter_schema_lists_names_types_and_values() {
    let (app, _) = demo_app();
    app.parameters().apply_assignment("times=4").unwrap();

    assert_eq!(
        app.parameter_schema(),
        json!({
            "app": "repeat",
            "version": "0.1.0",
            "parameters": [
                { "name": "times", "type": "usize", "value": 4 },
                {
                    "name": "label",
                    "type": std::any::type_name::<String>(),
                    "value": "cube",
                    "description": "part name"
                }
            ]
        })
    );
}
