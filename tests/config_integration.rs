//! Loading patcher.toml from disk and scanning packages with its settings.

use narrative_patcher::config::{load_from_path, load_from_str, ConfigError, ValidationIssue};
use narrative_patcher::{DirectoryRegistry, PackageRegistry};
use std::fs;
use tempfile::TempDir;

const FULL_CONFIG: &str = r#"
[paths]
base_dir = "data/scripts"
packages_dir = "mods"
output_dir = "build/patched"

[format]
event_marker = "*scene"
script_extension = "scr"
patch_extension = "mod"
output_prefix = ""
output_extension = "scr"

[packages]
default_enabled = false

[packages.enabled]
extras = true

[credits]
event = "opening"
key = "Title:"
key_index = 1
"#;

#[test]
fn test_full_config_round_trips_every_field() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("patcher.toml");
    fs::write(&file, FULL_CONFIG).unwrap();

    let config = load_from_path(&file).unwrap();
    assert_eq!(config.paths.base_dir, dir.path().join("data/scripts"));
    assert_eq!(config.paths.packages_dir, dir.path().join("mods"));
    assert_eq!(config.paths.output_dir, dir.path().join("build/patched"));
    assert_eq!(config.format.event_marker, "*scene");
    assert_eq!(config.format.output_name("x/act1.scr".as_ref()), "act1.scr");
    assert!(config.is_enabled("extras"));
    assert!(!config.is_enabled("other"));

    let credits = config.credits.unwrap();
    assert_eq!(credits.event, "opening");
    assert_eq!(credits.key_index, 1);
}

#[test]
fn test_enablement_settings_drive_directory_registry() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("patcher.toml"), FULL_CONFIG).unwrap();
    fs::create_dir_all(dir.path().join("mods/extras")).unwrap();
    fs::create_dir_all(dir.path().join("mods/other")).unwrap();

    let config = load_from_path(dir.path().join("patcher.toml")).unwrap();
    let registry = DirectoryRegistry::scan(&config.paths.packages_dir, &config.packages).unwrap();

    let enabled: Vec<&str> = registry
        .enabled_packages()
        .iter()
        .map(|p| p.id.as_str())
        .collect();
    assert_eq!(enabled, vec!["extras"]);
}

#[test]
fn test_missing_file_is_io_error() {
    let dir = TempDir::new().unwrap();
    let error = load_from_path(dir.path().join("nope.toml")).unwrap_err();
    assert!(matches!(error, ConfigError::Io { .. }));
    assert!(error.to_string().contains("nope.toml"));
}

#[test]
fn test_unknown_types_are_toml_errors() {
    let error = load_from_str("[packages]\ndefault_enabled = \"yes\"\n").unwrap_err();
    assert!(matches!(error, ConfigError::Toml { .. }));
}

#[test]
fn test_validation_reports_every_issue() {
    let error = load_from_str(
        "[format]\nscript_extension = \"txt\"\npatch_extension = \"txt\"\n\n[credits]\nevent = \"intro\"\nkey = \"\"\n",
    )
    .unwrap_err();

    let ConfigError::Validation { source, .. } = error else {
        panic!("expected validation error");
    };
    assert_eq!(source.issues.len(), 2);
    assert!(source
        .issues
        .iter()
        .any(|i| matches!(i, ValidationIssue::MissingField { field: "credits.key" })));
}
