use gradectl::{Config, Error, Overrides, Region};
use std::fs;
use std::path::PathBuf;

const SAMPLE: &str = r#"
[api]
base_url = "https://dashscope.example.com/compatible-mode/v1"
model = "qwen-vl-max"
api_key = "file-key"
max_retries = 2

[prompts]
missing_reference_notice = "\n\nNo reference answer."

[screenshot]
default_monitor = 0
default_region = { left = -1920, top = 0, width = 800, height = 600 }
default_interval = 10.0

[parsing]
score_max = 10.0

[output]
save_screenshots = true
results_path = "results.json"
"#;

#[test]
fn explicit_file_is_loaded() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, SAMPLE).unwrap();

    let config = Config::load(Some(&path), Overrides::default()).unwrap();
    assert_eq!(config.api.model, "qwen-vl-max");
    assert_eq!(config.api.max_retries, 2);
    assert_eq!(config.api.timeout_secs, 60);
    assert_eq!(config.prompts.missing_reference_notice, "\n\nNo reference answer.");
    assert!(config.prompts.user_message_template.contains("{reference_answer_section}"));
    assert_eq!(config.screenshot.default_monitor, 0);
    assert_eq!(
        config.screenshot.default_region,
        Some(Region::new(-1920, 0, 800, 600))
    );
    assert_eq!(config.screenshot.default_interval, 10.0);
    assert_eq!(config.screenshot.default_duration, 30.0);
    assert_eq!(config.parsing.score_max, 10.0);
    assert!(config.output.save_screenshots);
    assert_eq!(config.output.results_path, Some(PathBuf::from("results.json")));
}

#[test]
fn cli_overrides_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, SAMPLE).unwrap();

    let cli = Overrides {
        api_key: Some("cli-key".into()),
        model: Some("cli-model".into()),
        monitor: Some(2),
        interval: Some(3.0),
        results_path: Some(PathBuf::from("other.json")),
        ..Overrides::default()
    };
    let config = Config::load(Some(&path), cli).unwrap();
    assert_eq!(config.api.api_key.as_deref(), Some("cli-key"));
    assert_eq!(config.api.model, "cli-model");
    assert_eq!(
        config.api.base_url,
        "https://dashscope.example.com/compatible-mode/v1"
    );
    assert_eq!(config.screenshot.default_monitor, 2);
    assert_eq!(config.screenshot.default_interval, 3.0);
    assert_eq!(config.output.results_path, Some(PathBuf::from("other.json")));
}

#[test]
fn missing_explicit_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.toml");
    match Config::load(Some(&path), Overrides::default()) {
        Err(Error::FileNotFound(p)) => assert_eq!(p, path),
        other => panic!("expected FileNotFound, got {:?}", other),
    }
}

#[test]
fn malformed_file_is_a_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, "[api\nmodel = ").unwrap();
    assert!(matches!(
        Config::load(Some(&path), Overrides::default()),
        Err(Error::Config(_))
    ));
}

#[test]
fn file_key_beats_environment_key() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, SAMPLE).unwrap();

    let env = Overrides::from_env(|_| Some("env-key".into()))
        .into_layer("env")
        .unwrap();
    let config = Config::resolve([
        Config::defaults_layer().unwrap(),
        env,
        Config::file_layer(&path).unwrap(),
    ])
    .unwrap();
    assert_eq!(config.api.api_key.as_deref(), Some("file-key"));
}
