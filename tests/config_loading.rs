use std::fs;

use tempfile::TempDir;

use kiln::config::{load_and_validate, load_from_path};
use kiln::errors::KilnError;
use kiln_test_utils::init_tracing;

fn write_config(dir: &TempDir, contents: &str) -> std::path::PathBuf {
    let path = dir.path().join("Kiln.toml");
    fs::write(&path, contents).expect("write config");
    path
}

#[test]
fn full_config_round_trips() {
    init_tracing();
    let dir = TempDir::new().expect("temp dir");
    let path = write_config(
        &dir,
        r#"
        [build]
        pipeline = "assets"
        cache_key = "v2"
        max_concurrent_batches = 8

        [entry.app]
        path = "pkgs/app"
        depends_on = ["lib"]

        [entry.lib]
        path = "pkgs/lib"
        pipeline = "compile"
        "#,
    );

    let cfg = load_and_validate(&path).expect("config is valid");
    assert_eq!(cfg.build.pipeline, "assets");
    assert_eq!(cfg.build.cache_key, "v2");
    assert_eq!(cfg.build.max_concurrent_batches, 8);

    let app = &cfg.entry["app"];
    assert_eq!(app.path, "pkgs/app");
    assert_eq!(app.depends_on, vec!["lib"]);
    assert_eq!(app.pipeline, None);

    let lib = &cfg.entry["lib"];
    assert_eq!(lib.pipeline.as_deref(), Some("compile"));
}

#[test]
fn missing_file_is_an_io_error() {
    init_tracing();
    let dir = TempDir::new().expect("temp dir");
    let err = load_and_validate(dir.path().join("Kiln.toml")).unwrap_err();
    assert!(matches!(err, KilnError::IoError(_)));
}

#[test]
fn malformed_toml_is_a_parse_error() {
    init_tracing();
    let dir = TempDir::new().expect("temp dir");
    let path = write_config(&dir, "[entry.app\npath = ");
    let err = load_from_path(&path).unwrap_err();
    assert!(matches!(err, KilnError::TomlError(_)));
}

#[test]
fn unknown_dependency_fails_validation() {
    init_tracing();
    let dir = TempDir::new().expect("temp dir");
    let path = write_config(
        &dir,
        r#"
        [entry.app]
        path = "pkgs/app"
        depends_on = ["ghost"]
        "#,
    );
    let err = load_and_validate(&path).unwrap_err();
    assert!(matches!(err, KilnError::ConfigError(_)));
}
