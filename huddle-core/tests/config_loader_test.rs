use huddle_core::config::{ConfigManager, HuddleConfig};
use std::fs;
use tempfile::TempDir;

const PARTIAL_CONFIG: &str = r#"
[cache]
capacity = 64

[batch]
enabled = false

[router]
min_length = 4
context_budget_tokens = 500

[router.agents]
retrieval = "notes-search"

[router.short_commands]
ping = "pong"

[generator]
provider = "echo"
"#;

#[test]
fn partial_file_keeps_defaults_for_missing_keys() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("huddle.toml");
    fs::write(&path, PARTIAL_CONFIG).unwrap();

    let manager = ConfigManager::load_from_file(&path).unwrap();
    let config = manager.config();
    let defaults = HuddleConfig::default();

    assert_eq!(manager.config_path(), Some(path.as_path()));
    assert_eq!(config.cache.capacity, 64);
    assert!(config.cache.enabled);
    assert_eq!(config.cache.default_ttl_ms, defaults.cache.default_ttl_ms);
    assert!(!config.batch.enabled);
    assert_eq!(config.batch.window_ms, defaults.batch.window_ms);
    assert_eq!(config.router.min_length, 4);
    assert_eq!(config.router.max_length, defaults.router.max_length);
    assert_eq!(config.router.context_budget_tokens, 500);
    assert_eq!(config.router.agents.retrieval, "notes-search");
    assert_eq!(config.router.agents.ideation, "ideation");
    assert_eq!(config.router.short_commands["ping"], "pong");
    assert_eq!(config.bus.queue_capacity, defaults.bus.queue_capacity);
    assert!(!config.persistence.enabled);
}

#[test]
fn workspace_file_takes_precedence_over_dot_directory() {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join(".huddle")).unwrap();
    fs::write(
        dir.path().join(".huddle").join("huddle.toml"),
        "[cache]\ncapacity = 7\n",
    )
    .unwrap();

    let manager = ConfigManager::load_from_workspace(dir.path()).unwrap();
    assert_eq!(manager.config().cache.capacity, 7);
    assert_eq!(
        manager.config_path(),
        Some(dir.path().join(".huddle").join("huddle.toml").as_path())
    );

    fs::write(dir.path().join("huddle.toml"), "[cache]\ncapacity = 9\n").unwrap();
    let manager = ConfigManager::load_from_workspace(dir.path()).unwrap();
    assert_eq!(manager.config().cache.capacity, 9);
    assert_eq!(
        manager.config_path(),
        Some(dir.path().join("huddle.toml").as_path())
    );
}

#[test]
fn malformed_file_reports_its_path() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("huddle.toml");
    fs::write(&path, "[cache\ncapacity = ").unwrap();

    let err = ConfigManager::load_from_file(&path).unwrap_err();
    assert!(format!("{err:#}").contains("Failed to parse config file"));
    assert!(err.to_string().contains(&path.display().to_string()));
}

#[test]
fn missing_file_is_an_error() {
    let dir = TempDir::new().unwrap();
    let err = ConfigManager::load_from_file(dir.path().join("nope.toml")).unwrap_err();
    assert!(err.to_string().contains("Failed to read config file"));
}

#[test]
fn bootstrap_writes_a_loadable_sample_once() {
    let dir = TempDir::new().unwrap();

    let created = HuddleConfig::bootstrap_workspace(dir.path(), false).unwrap();
    assert_eq!(created, vec!["huddle.toml".to_string()]);

    let manager = ConfigManager::load_from_file(dir.path().join("huddle.toml")).unwrap();
    let defaults = HuddleConfig::default();
    assert_eq!(manager.config().cache.capacity, defaults.cache.capacity);
    assert_eq!(manager.config().generator.provider, defaults.generator.provider);

    // existing files are left alone unless forced
    assert!(HuddleConfig::bootstrap_workspace(dir.path(), false).unwrap().is_empty());
    assert_eq!(
        HuddleConfig::bootstrap_workspace(dir.path(), true).unwrap(),
        vec!["huddle.toml".to_string()]
    );
}
