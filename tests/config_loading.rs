// tests/config_loading.rs

mod common;
use crate::common::init_tracing;

use std::fs;
use std::time::Duration;

use procdag::config::load_and_validate;
use procdag::dag::GraphModel;
use procdag::errors::ProcdagError;

const FULL_CONFIG: &str = r#"
deadline_seconds = 600

[runner]
process_dir = "units"
interpreter = "python3"
poll_interval_ms = 250

[resources]
cpu_percent = 85.0
disk_free_mb = 512

[lock]
path = "run/procdag.lock"

[logging]
dir = "logs"

[node."extract.py"]
in = []

[node."transform.py"]
in = ["extract.py"]
timeout_seconds = 30

[node."load"]
after = ["transform.py"]
cmd = "echo loading"
"#;

#[test]
fn full_config_loads_with_paths_anchored_at_its_directory() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Procdag.toml");
    fs::write(&path, FULL_CONFIG).unwrap();

    let cfg = load_and_validate(&path).unwrap();

    assert_eq!(cfg.deadline(), Some(Duration::from_secs(600)));
    assert_eq!(cfg.runner.process_dir, dir.path().join("units"));
    assert_eq!(cfg.runner.interpreter.as_deref(), Some("python3"));
    assert_eq!(cfg.runner.poll_interval(), Duration::from_millis(250));
    assert_eq!(cfg.runner.resource_poll_interval(), Duration::from_secs(5));
    assert_eq!(cfg.lock.path, dir.path().join("run/procdag.lock"));
    assert_eq!(cfg.logging.dir, Some(dir.path().join("logs")));

    let limits = cfg.effective_resources().unwrap();
    assert_eq!(limits.cpu_percent, Some(85.0));
    assert_eq!(limits.disk_free_mb, Some(512));
    assert_eq!(limits.memory_percent, None);

    assert_eq!(
        cfg.node["transform.py"].timeout(),
        Some(Duration::from_secs(30))
    );
    assert_eq!(cfg.node["load"].prereqs, vec!["transform.py"]);
    assert_eq!(cfg.node["load"].cmd.as_deref(), Some("echo loading"));

    let graph = GraphModel::from_config(&cfg);
    assert_eq!(
        graph.launch_order().unwrap(),
        vec!["extract.py", "transform.py", "load"]
    );
}

#[test]
fn absolute_paths_are_left_alone() {
    let dir = tempfile::tempdir().unwrap();
    let units = tempfile::tempdir().unwrap();
    let path = dir.path().join("Procdag.toml");
    fs::write(
        &path,
        format!(
            "[runner]\nprocess_dir = {:?}\n\n[node.a]\n",
            units.path().display().to_string()
        ),
    )
    .unwrap();

    let cfg = load_and_validate(&path).unwrap();
    assert_eq!(cfg.runner.process_dir, units.path());
    assert_eq!(cfg.lock.path, dir.path().join("procdag.lock"));
    assert!(cfg.deadline().is_none());
    assert!(cfg.effective_resources().is_none());
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = load_and_validate(dir.path().join("nope.toml")).unwrap_err();
    assert!(matches!(err, ProcdagError::IoError(_)));
    assert_eq!(err.exit_code(), 1);
}

#[test]
fn malformed_toml_is_a_parse_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Procdag.toml");
    fs::write(&path, "[node.a\nin = [").unwrap();

    let err = load_and_validate(&path).unwrap_err();
    assert!(matches!(err, ProcdagError::TomlError(_)));
    assert_eq!(err.exit_code(), 1);
}

#[test]
fn wrong_value_type_is_a_parse_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Procdag.toml");
    fs::write(&path, "deadline_seconds = \"soon\"\n[node.a]\n").unwrap();

    assert!(matches!(
        load_and_validate(&path).unwrap_err(),
        ProcdagError::TomlError(_)
    ));
}

#[test]
fn semantic_problems_are_config_errors() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Procdag.toml");
    fs::write(&path, "[resources]\ncpu_percent = 150.0\n[node.a]\n").unwrap();

    let err = load_and_validate(&path).unwrap_err();
    assert!(matches!(err, ProcdagError::ConfigError(_)));
    assert!(err.to_string().contains("cpu_percent"));
}
