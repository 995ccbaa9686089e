//! Layered configuration.
//!
//! Settings come from four sources, lowest priority first: built-in defaults,
//! environment variables, the TOML config file and command line flags. Each
//! source is turned into a plain [`ConfigLayer`] and the layers are folded
//! together by [`Config::resolve`].

use crate::error::{Error, Result};
use gradectl_capture::Region;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable holding the API key.
pub const API_KEY_ENV: &str = "GRADECTL_API_KEY";

/// Main configuration for gradectl
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiSettings,
    #[serde(default)]
    pub prompts: PromptSettings,
    #[serde(default)]
    pub screenshot: ScreenshotSettings,
    #[serde(default)]
    pub parsing: ParsingSettings,
    #[serde(default)]
    pub output: OutputSettings,
}

/// Inference endpoint configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiSettings {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_top_p", skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(default = "default_seed", skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    /// Extra attempts after a transport failure, per grading cycle
    #[serde(default)]
    pub max_retries: u32,
}

fn default_base_url() -> String {
    "http://localhost:8000/v1".to_string()
}

fn default_model() -> String {
    "Qwen/Qwen2.5-VL-7B-Instruct".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_max_tokens() -> u32 {
    2000
}

fn default_top_p() -> Option<f32> {
    Some(1.0)
}

fn default_seed() -> Option<u64> {
    Some(42)
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            api_key: None,
            timeout_secs: default_timeout_secs(),
            temperature: 0.0,
            max_tokens: default_max_tokens(),
            top_p: default_top_p(),
            seed: default_seed(),
            max_retries: 0,
        }
    }
}

/// Prompt templates. `{reference_answer_section}`, `{reference_answer}` and
/// `{question_context}` are substituted at request time.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PromptSettings {
    #[serde(default = "default_system_message")]
    pub system_message: String,
    #[serde(default = "default_user_message_template")]
    pub user_message_template: String,
    #[serde(default = "default_reference_answer_format")]
    pub reference_answer_format: String,
    #[serde(default = "default_question_context_format")]
    pub question_context_format: String,
    #[serde(default = "default_missing_reference_notice")]
    pub missing_reference_notice: String,
}

fn default_system_message() -> String {
    r#"You are an exam paper grading assistant. Your task is to:
1. Read the student's answer in the image
2. Compare it with the reference answer (if provided)
3. Give a score from 0 to 100
4. Explain the score briefly

Format your response as:
Student Answer: [the answer as written]
Score: [0-100]
Reasoning: [brief explanation]"#
        .to_string()
}

fn default_user_message_template() -> String {
    concat!(
        "Please grade this student's answer.{reference_answer_section}\n\n",
        "Please provide: 1) Score (0-100), 2) Brief reasoning for your scoring."
    )
    .to_string()
}

fn default_reference_answer_format() -> String {
    "\n\nReference Answer:\n```markdown\n{reference_answer}\n```".to_string()
}

fn default_question_context_format() -> String {
    "\n\nQuestion Context: {question_context}".to_string()
}

fn default_missing_reference_notice() -> String {
    "\n\nNote: no reference answer was provided. Grade using general marking criteria.".to_string()
}

impl Default for PromptSettings {
    fn default() -> Self {
        Self {
            system_message: default_system_message(),
            user_message_template: default_user_message_template(),
            reference_answer_format: default_reference_answer_format(),
            question_context_format: default_question_context_format(),
            missing_reference_notice: default_missing_reference_notice(),
        }
    }
}

/// Capture target and periodic schedule
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScreenshotSettings {
    #[serde(default = "default_monitor")]
    pub default_monitor: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_region: Option<Region>,
    /// Seconds between periodic captures
    #[serde(default = "default_interval")]
    pub default_interval: f64,
    /// Total seconds of a periodic run
    #[serde(default = "default_duration")]
    pub default_duration: f64,
}

fn default_monitor() -> usize {
    1
}

fn default_interval() -> f64 {
    5.0
}

fn default_duration() -> f64 {
    30.0
}

impl Default for ScreenshotSettings {
    fn default() -> Self {
        Self {
            default_monitor: default_monitor(),
            default_region: None,
            default_interval: default_interval(),
            default_duration: default_duration(),
        }
    }
}

/// Reply markers (regular expressions) and the accepted score range
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ParsingSettings {
    #[serde(default = "default_score_marker")]
    pub score_marker: String,
    #[serde(default = "default_reasoning_marker")]
    pub reasoning_marker: String,
    #[serde(default = "default_student_answer_marker")]
    pub student_answer_marker: String,
    #[serde(default)]
    pub score_min: f64,
    #[serde(default = "default_score_max")]
    pub score_max: f64,
}

fn default_score_marker() -> String {
    r"(?im)^[ \t>#*_-]*(?:final[ \t]+)?(?:score|分数|得分)[ \t*_]*[:：][*_]*".to_string()
}

fn default_reasoning_marker() -> String {
    // The colon may only be left out when the marker is alone on its line.
    r"(?im)^[ \t>#*_-]*(?:reasoning|rationale|评分理由)(?:[ \t*_]*[:：][*_]*|[ \t*_]*$)"
        .to_string()
}

fn default_student_answer_marker() -> String {
    concat!(
        r"(?im)^[ \t>#*_-]*",
        r"(?:recognized[ \t]+student[ \t]+answer|student[ \t]+answer|识别的学生答案|学生答案)",
        r"[ \t*_]*[:：][*_]*"
    )
    .to_string()
}

fn default_score_max() -> f64 {
    100.0
}

impl Default for ParsingSettings {
    fn default() -> Self {
        Self {
            score_marker: default_score_marker(),
            reasoning_marker: default_reasoning_marker(),
            student_answer_marker: default_student_answer_marker(),
            score_min: 0.0,
            score_max: default_score_max(),
        }
    }
}

/// Where screenshots and results go
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutputSettings {
    #[serde(default = "default_screenshot_dir")]
    pub screenshot_dir: PathBuf,
    #[serde(default)]
    pub save_screenshots: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results_path: Option<PathBuf>,
}

fn default_screenshot_dir() -> PathBuf {
    PathBuf::from("./screenshots")
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            screenshot_dir: default_screenshot_dir(),
            save_screenshots: false,
            results_path: None,
        }
    }
}

/// One source of settings, as a partial TOML document.
#[derive(Debug, Clone)]
pub struct ConfigLayer {
    pub source: &'static str,
    pub table: toml::Table,
}

impl ConfigLayer {
    pub fn new(source: &'static str, table: toml::Table) -> Self {
        Self { source, table }
    }
}

/// Values supplied by a single source (command line flags or environment)
/// that override individual settings.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub api_base: Option<String>,
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub monitor: Option<usize>,
    pub region: Option<Region>,
    pub interval: Option<f64>,
    pub duration: Option<f64>,
    pub save_screenshots: Option<bool>,
    pub screenshot_dir: Option<PathBuf>,
    pub results_path: Option<PathBuf>,
}

impl Overrides {
    /// Overrides read from the environment through `lookup`.
    pub fn from_env(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            api_key: lookup(API_KEY_ENV).filter(|key| !key.is_empty()),
            ..Self::default()
        }
    }

    pub fn into_layer(self, source: &'static str) -> Result<ConfigLayer> {
        let mut table = toml::Table::new();

        if let Some(v) = self.api_base {
            set(&mut table, "api", "base_url", v);
        }
        if let Some(v) = self.api_key {
            set(&mut table, "api", "api_key", v);
        }
        if let Some(v) = self.model {
            set(&mut table, "api", "model", v);
        }
        if let Some(v) = self.monitor {
            let v = i64::try_from(v)
                .map_err(|_| Error::Config(format!("Monitor index {} is too large", v)))?;
            set(&mut table, "screenshot", "default_monitor", v);
        }
        if let Some(v) = self.region {
            let v = toml::Value::try_from(v)
                .map_err(|e| Error::Config(format!("Invalid region: {}", e)))?;
            set(&mut table, "screenshot", "default_region", v);
        }
        if let Some(v) = self.interval {
            set(&mut table, "screenshot", "default_interval", v);
        }
        if let Some(v) = self.duration {
            set(&mut table, "screenshot", "default_duration", v);
        }
        if let Some(v) = self.save_screenshots {
            set(&mut table, "output", "save_screenshots", v);
        }
        if let Some(v) = self.screenshot_dir {
            set(&mut table, "output", "screenshot_dir", v.to_string_lossy().into_owned());
        }
        if let Some(v) = self.results_path {
            set(&mut table, "output", "results_path", v.to_string_lossy().into_owned());
        }

        Ok(ConfigLayer::new(source, table))
    }
}

fn set(table: &mut toml::Table, section: &str, key: &str, value: impl Into<toml::Value>) {
    let entry = table
        .entry(section)
        .or_insert_with(|| toml::Value::Table(toml::Table::new()));
    if let toml::Value::Table(section) = entry {
        section.insert(key.to_string(), value.into());
    }
}

/// Merge `overlay` into `base`. Nested tables merge key by key, every other
/// value in `overlay` replaces the one in `base`.
pub fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

impl Config {
    /// Get the default config file path
    pub fn path() -> PathBuf {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home).join(".config/gradectl/config.toml")
    }

    /// Load configuration for this process.
    ///
    /// An explicitly requested file must exist; the default file is optional.
    pub fn load(explicit: Option<&Path>, cli: Overrides) -> Result<Self> {
        let mut layers = vec![
            Self::defaults_layer()?,
            Overrides::from_env(|key| std::env::var(key).ok()).into_layer("env")?,
        ];

        match explicit {
            Some(path) => layers.push(Self::file_layer(path)?),
            None => {
                let path = Self::path();
                if path.exists() {
                    layers.push(Self::file_layer(&path)?);
                } else {
                    debug!(path = %path.display(), "No config file, using defaults");
                }
            }
        }

        layers.push(cli.into_layer("cli")?);
        Self::resolve(layers)
    }

    pub fn defaults_layer() -> Result<ConfigLayer> {
        match toml::Value::try_from(Config::default()) {
            Ok(toml::Value::Table(table)) => Ok(ConfigLayer::new("defaults", table)),
            Ok(_) => Err(Error::Config("Defaults did not serialize to a table".into())),
            Err(e) => Err(Error::Config(format!("Failed to serialize defaults: {}", e))),
        }
    }

    pub fn file_layer(path: &Path) -> Result<ConfigLayer> {
        if !path.exists() {
            return Err(Error::FileNotFound(path.to_path_buf()));
        }
        let contents = fs::read_to_string(path)?;
        let table: toml::Table = toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))?;
        debug!(path = %path.display(), "Loaded config file");
        Ok(ConfigLayer::new("file", table))
    }

    /// Fold layers (lowest priority first) into a validated configuration.
    pub fn resolve(layers: impl IntoIterator<Item = ConfigLayer>) -> Result<Self> {
        let mut merged = toml::Table::new();
        for layer in layers {
            debug!(source = layer.source, keys = layer.table.len(), "Applying config layer");
            merge_tables(&mut merged, layer.table);
        }

        let config: Config = toml::Value::Table(merged)
            .try_into()
            .map_err(|e| Error::Config(format!("Invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let screenshot = &self.screenshot;
        if !(screenshot.default_interval.is_finite() && screenshot.default_interval > 0.0) {
            return Err(Error::Config(format!(
                "Interval must be a positive number of seconds, got {}",
                screenshot.default_interval
            )));
        }
        if !(screenshot.default_duration.is_finite() && screenshot.default_duration >= 0.0) {
            return Err(Error::Config(format!(
                "Duration must be zero or more seconds, got {}",
                screenshot.default_duration
            )));
        }
        if let Some(region) = screenshot.default_region {
            if region.is_empty() {
                return Err(Error::Config(format!(
                    "Region {} must have a non-zero width and height",
                    region
                )));
            }
        }
        if self.parsing.score_min > self.parsing.score_max {
            return Err(Error::Config(format!(
                "score_min ({}) is greater than score_max ({})",
                self.parsing.score_min, self.parsing.score_max
            )));
        }
        if self.api.base_url.trim().is_empty() {
            return Err(Error::Config("api.base_url is empty".into()));
        }
        Ok(())
    }
}
