use arbor::builder::LOAD_PATH;
use arbor::instance::{Field, VariantInstance};
use arbor::schema::RecordSchema;
use arbor::schema_file::SchemaDocument;
use arbor::value::Value;
use arbor::{build, Built, Error, Overrides, Warning};
use insta::assert_json_snapshot;
use pretty_assertions::assert_eq;
use std::path::{Path, PathBuf};
use std::sync::Arc;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_env("ARBOR_LOG"))
        .with_test_writer()
        .try_init();
}

fn scenario_dir(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/scenarios")
        .join(name)
}

fn schema(name: &str) -> Arc<RecordSchema> {
    SchemaDocument::load(&scenario_dir(name).join("schema.yaml"))
        .unwrap()
        .resolve()
        .unwrap()
}

fn overrides(values: &[(&str, &str)]) -> Overrides {
    values
        .iter()
        .map(|(path, value)| (*path, Some(value.to_string())))
        .collect()
}

fn run(name: &str, values: &[(&str, &str)]) -> arbor::Result<Built> {
    init_tracing();
    build(schema(name), &scenario_dir(name).join("config"), &overrides(values))
}

fn selected<'c>(built: &'c Built, path: &str) -> Option<&'c str> {
    built
        .config
        .get(path)
        .and_then(Field::as_variant)
        .map(VariantInstance::selected)
}

#[test]
fn minimal() {
    let built = run("minimal", &[]).unwrap();
    assert_json_snapshot!(built.config, @r###"
    {
      "some_field": "???"
    }
    "###);
    assert_eq!(built.build_order, vec![String::new()]);
    assert!(built.warnings.is_empty());

    let built = run("minimal", &[("some_field", "hello")]).unwrap();
    assert_json_snapshot!(built.config, @r###"
    {
      "some_field": "hello"
    }
    "###);
}

#[test]
fn multi_options() {
    let built = run("multi", &[("some_multi", "first")]).unwrap();
    assert_json_snapshot!(built.config, @r###"
    {
      "some_field": "???",
      "some_multi": {
        "_selected": "first",
        "field_a": "???"
      }
    }
    "###);

    let built = run("multi", &[("some_multi", "first"), ("some_field", "yes")]).unwrap();
    assert_json_snapshot!(built.config, @r###"
    {
      "some_field": "yes",
      "some_multi": {
        "_selected": "first",
        "field_a": "???"
      }
    }
    "###);

    let built = run("multi", &[("some_multi", "second")]).unwrap();
    assert_json_snapshot!(built.config, @r###"
    {
      "some_field": "???",
      "some_multi": {
        "_selected": "second",
        "field_a": "???"
      }
    }
    "###);

    let built = run("multi", &[("some_multi", "third")]).unwrap();
    assert_json_snapshot!(built.config, @r###"
    {
      "some_field": "???",
      "some_multi": {
        "_selected": "third",
        "field_b": "???"
      }
    }
    "###);
    assert!(built.warnings.is_empty());
}

#[test]
fn multi_without_selection() {
    let built = run("multi", &[]).unwrap();

    assert_eq!(selected(&built, "some_multi"), Some("first"));
    assert_eq!(
        built.warnings,
        vec![Warning::AutoSelectedOption {
            path: "some_multi".to_string(),
            option: "first".to_string(),
        }]
    );
}

#[test]
fn multi_default_selection() {
    let built = run("multi_default", &[]).unwrap();
    assert_json_snapshot!(built.config, @r###"
    {
      "some_field": "from defaults",
      "some_multi": {
        "_selected": "second",
        "field_a": 2
      }
    }
    "###);
    assert!(built.warnings.is_empty());

    let built = run("multi_default", &[("some_multi", "third")]).unwrap();
    assert_json_snapshot!(built.config, @r###"
    {
      "some_field": "from defaults",
      "some_multi": {
        "_selected": "third",
        "field_b": "from a folder"
      }
    }
    "###);

    // no defaults for the first option
    let built = run("multi_default", &[("some_multi", "first")]).unwrap();
    assert_eq!(
        built.config.lookup("some_multi").and_then(|option| option.get("field_a")),
        Some(&Field::Unset)
    );
}

#[test]
fn unset_on_the_command_line() {
    let built = run("multi_default", &[("some_field", "???")]).unwrap();
    assert_eq!(built.config.get("some_field"), Some(&Field::Unset));
}

#[test]
fn nested_defaults() {
    for name in ["nested_filedefault", "nested_folderdefault"] {
        let built = run(name, &[]).unwrap();
        assert_eq!(built.build_order, vec!["", "nested_config"], "{name}");
        assert_eq!(built.config.get("some_field"), Some(&Field::Value("top".into())), "{name}");
    }

    let built = run("nested_filedefault", &[]).unwrap();
    assert_json_snapshot!(built.config, @r###"
    {
      "some_field": "top",
      "nested_config": {
        "some_nested_field": 3
      }
    }
    "###);

    let built = run("nested_folderdefault", &[("nested_config.some_nested_field", "12")]).unwrap();
    assert_json_snapshot!(built.config, @r###"
    {
      "some_field": "top",
      "nested_config": {
        "some_nested_field": 12
      }
    }
    "###);
}

#[test]
fn folder_wins_over_file() {
    let built = run("merge_defaults_file_and_folder", &[]).unwrap();
    assert_json_snapshot!(built.config, @r###"
    {
      "field_a": 1,
      "field_b": 3
    }
    "###);
    assert_eq!(
        built.warnings,
        vec![Warning::IgnoredFile {
            path: scenario_dir("merge_defaults_file_and_folder").join("config/defaults/notes.txt"),
        }]
    );

    let built = run("merge_nested_defaults_folder_and_file", &[]).unwrap();
    assert_json_snapshot!(built.config, @r###"
    {
      "nested_conf": {
        "field_a": 5,
        "field_b": 2
      }
    }
    "###);
}

#[test]
fn parent_file_and_nested_file_are_siblings() {
    let built = run("merge_nested_defaults_files", &[]).unwrap();
    assert_json_snapshot!(built.config, @r###"
    {
      "nested_conf": {
        "field_a": 1,
        "field_b": 2
      }
    }
    "###);
}

#[test]
fn redundant_defaults() {
    let err = run("redundant", &[]).unwrap_err();
    assert!(
        matches!(err, Error::RedundantDefault { ref location, ref key } if location.is_empty() && key == "field_a"),
        "{err}"
    );
}

#[test]
fn override_marker_across_formats() {
    let built = run("override_marker", &[]).unwrap();
    assert_json_snapshot!(built.config, @r###"
    {
      "field_a": 1,
      "field_b": 2
    }
    "###);
}

#[test]
fn conditional_defaults() {
    let built = run("conditional", &[]).unwrap();
    assert_eq!(built.build_order, vec!["", "dataset", "model", "model.arch"]);
    assert!(built.warnings.is_empty());
    assert_json_snapshot!(built.config, @r###"
    {
      "dataset": {
        "_selected": "local",
        "img_size": 256,
        "ch": 3,
        "path": "/data"
      },
      "model": {
        "something": 4,
        "arch": {
          "_selected": "vanilla",
          "some_str": "small",
          "some_other_other": 7
        }
      },
      "something": 1
    }
    "###);
}

#[test]
fn conditions_follow_built_values() {
    // something >= 2 raises img_size, which in turn picks the other branch below model.arch
    let built = run("conditional", &[("something", "2")]).unwrap();
    let dataset = built.config.lookup("dataset").unwrap();
    assert_eq!(dataset.get("img_size"), Some(&Field::Value(Value::Integer(512))));
    let arch = built.config.lookup("model.arch").unwrap();
    assert_eq!(arch.get("some_str"), Some(&Field::Value("big".into())));

    // the command line beats the conditional default
    let built = run(
        "conditional",
        &[("something", "2"), ("dataset.img_size", "128")],
    )
    .unwrap();
    let arch = built.config.lookup("model.arch").unwrap();
    assert_eq!(arch.get("some_str"), Some(&Field::Value("small".into())));
}

#[test]
fn option_defaults_and_override_queries() {
    let built = run(
        "conditional",
        &[("dataset", "pytorch"), ("model.arch", "dcrn")],
    )
    .unwrap();
    assert_json_snapshot!(built.config, @r###"
    {
      "dataset": {
        "_selected": "pytorch",
        "img_size": 256,
        "ch": 1,
        "name": "mnist"
      },
      "model": {
        "something": 4,
        "arch": {
          "_selected": "dcrn",
          "some_str": "grayscale",
          "some_other": "dcrn"
        }
      },
      "something": 1
    }
    "###);
}

#[test]
fn written_config_loads_back() {
    init_tracing();
    let root = schema("conditional");
    let defaults = scenario_dir("conditional").join("config");
    let first = build(
        root.clone(),
        &defaults,
        &overrides(&[("something", "2"), ("dataset", "pytorch")]),
    )
    .unwrap();

    let dir = tempfile::tempdir().unwrap();
    for file in ["saved.yaml", "saved.json"] {
        let saved = dir.path().join(file);
        let contents = if file.ends_with(".json") {
            serde_json::to_string_pretty(&first.config).unwrap()
        } else {
            serde_yaml::to_string(&first.config).unwrap()
        };
        std::fs::write(&saved, contents).unwrap();

        let loaded = build(
            root.clone(),
            &defaults,
            &overrides(&[(LOAD_PATH, saved.to_str().unwrap())]),
        )
        .unwrap();
        assert_eq!(loaded.config, first.config, "{file}");
        assert!(loaded.warnings.is_empty());
    }
}

#[test]
fn command_line_beats_loaded_config_beats_defaults() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let saved = dir.path().join("saved.yaml");
    std::fs::write(
        &saved,
        "some_field: from file\nsome_multi:\n  _selected: second\n  field_a: 9\n",
    )
    .unwrap();
    let load_path = saved.to_str().unwrap();

    let built = run("multi_default", &[(LOAD_PATH, load_path)]).unwrap();
    assert_json_snapshot!(built.config, @r###"
    {
      "some_field": "from file",
      "some_multi": {
        "_selected": "second",
        "field_a": 9
      }
    }
    "###);

    let built = run(
        "multi_default",
        &[(LOAD_PATH, load_path), ("some_field", "from cli")],
    )
    .unwrap();
    assert_json_snapshot!(built.config, @r###"
    {
      "some_field": "from cli",
      "some_multi": {
        "_selected": "second",
        "field_a": 9
      }
    }
    "###);
}

const CROSSING_REFERENCE: &str = r#"
root: Conf
records:
  Conf:
    fields:
      multi: Multi
      other: Other
  Other:
    fields:
      value: integer
    dependencies:
      - { path: multi.inner, optional: OPTIONAL }
  WithInner:
    fields:
      inner: Inner
  Inner:
    fields:
      size: integer
  WithoutInner:
    fields:
      flag: boolean
variants:
  Multi:
    options:
      a: WithInner
      b: WithoutInner
"#;

#[test]
fn required_reference_missing_in_an_option() {
    init_tracing();
    let root = SchemaDocument::from_yaml(&CROSSING_REFERENCE.replace("OPTIONAL", "false"))
        .unwrap()
        .resolve()
        .unwrap();
    let dir = tempfile::tempdir().unwrap();

    let err = build(root, dir.path(), &Overrides::new()).unwrap_err();
    assert!(
        matches!(
            err,
            Error::RequiredReferenceInvalid { ref path, ref variant, ref option }
                if path == "multi.inner" && variant == "Multi" && option == "b"
        ),
        "{err}"
    );
}

#[test]
fn optional_reference_missing_in_the_selected_option() {
    init_tracing();
    let root = SchemaDocument::from_yaml(&CROSSING_REFERENCE.replace("OPTIONAL", "true"))
        .unwrap()
        .resolve()
        .unwrap();
    let dir = tempfile::tempdir().unwrap();

    let built = build(root, dir.path(), &overrides(&[("multi", "b")])).unwrap();
    assert_eq!(selected(&built, "multi"), Some("b"));
    assert!(built.build_order.contains(&"multi.inner".to_string()));
    assert!(built.config.lookup("multi.inner").is_none());
}

#[test]
fn cyclic_dependencies() {
    init_tracing();
    let root = SchemaDocument::from_yaml(
        r#"
root: Conf
records:
  Conf:
    fields:
      x: X
      y: Y
  X:
    fields:
      value: integer
    dependencies: [y]
  Y:
    fields:
      value: integer
    dependencies: [x]
"#,
    )
    .unwrap()
    .resolve()
    .unwrap();
    let dir = tempfile::tempdir().unwrap();

    let err = build(root, dir.path(), &Overrides::new()).unwrap_err();
    let cycle = match err {
        Error::CyclicDependency { cycle } => cycle,
        other => panic!("expected a cycle, got {other}"),
    };
    assert_eq!(cycle, vec!["x", "y", "x"]);
}
