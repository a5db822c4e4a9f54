//! Application configuration for ingestflow.
//!
//! User config lives at `~/.ingestflow/ingestflow.toml`.
//! CLI flags override config file values, which override defaults.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use url::Url;

use crate::error::{IngestflowError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "ingestflow.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".ingestflow";

// ---------------------------------------------------------------------------
// Config structs (matching ingestflow.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Remote source settings.
    #[serde(default)]
    pub source: SourceConfig,

    /// Audit/result store settings.
    #[serde(default)]
    pub store: StoreConfig,

    /// Declared pipeline.
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Ingestion schedule.
    #[serde(default)]
    pub schedule: ScheduleConfig,

    /// Per-tool overrides, keyed by tool name (`[tools.<name>]`).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tools: BTreeMap<String, ToolConfig>,
}

/// `[source]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// API root, without the `/v1` suffix.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Records requested per page.
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// HTTP timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_true")]
    pub include_markdown: bool,

    #[serde(default = "default_true")]
    pub include_headings: bool,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            page_size: default_page_size(),
            timeout_secs: default_timeout_secs(),
            include_markdown: true,
            include_headings: true,
        }
    }
}

impl SourceConfig {
    /// Parse `base_url`, rejecting malformed values early.
    pub fn base_url(&self) -> Result<Url> {
        Url::parse(&self.base_url).map_err(|e| {
            IngestflowError::config(format!("invalid source.base_url '{}': {e}", self.base_url))
        })
    }
}

fn default_base_url() -> String {
    "https://api.limitless.ai".into()
}
fn default_api_key_env() -> String {
    "LIMITLESS_API_KEY".into()
}
fn default_page_size() -> u32 {
    10
}
fn default_timeout_secs() -> u64 {
    120
}
fn default_true() -> bool {
    true
}

/// `[store]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Database file path. A leading `~/` expands to the home directory.
    #[serde(default = "default_store_path")]
    pub path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

impl StoreConfig {
    /// Resolve `path` to an absolute location.
    pub fn resolved_path(&self) -> Result<PathBuf> {
        expand_home(&self.path)
    }
}

fn default_store_path() -> String {
    format!("~/{CONFIG_DIR_NAME}/ingestflow.db")
}

/// What to do when a tool name is registered twice.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    /// Fail the second registration.
    #[default]
    Reject,
    /// Replace the earlier descriptor.
    Overwrite,
}

/// `[pipeline]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Ordered tool names every job runs through.
    #[serde(default = "default_stages")]
    pub stages: Vec<String>,

    /// Registration policy for duplicate tool names.
    #[serde(default)]
    pub duplicate_tools: DuplicatePolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            stages: default_stages(),
            duplicate_tools: DuplicatePolicy::default(),
        }
    }
}

fn default_stages() -> Vec<String> {
    vec!["summarize".into(), "extract_names".into()]
}

/// `[tools.<name>]` section, applied to the registry before it is shared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolConfig {
    /// A disabled tool cannot be looked up, invoked, or named as a stage.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Merged over the tool's built-in defaults, key by key.
    #[serde(default)]
    pub defaults: Map<String, Value>,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            defaults: Map::new(),
        }
    }
}

/// `[schedule]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Cron expression (seconds field first).
    #[serde(default = "default_cron")]
    pub cron: String,

    /// Timezone passed to the source for the date window.
    #[serde(default = "default_timezone")]
    pub timezone: String,

    /// Maximum records per batch.
    #[serde(default = "default_limit")]
    pub limit: u32,

    /// Concurrent pipeline runs per batch (1 = sequential).
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            cron: default_cron(),
            timezone: default_timezone(),
            limit: default_limit(),
            concurrency: default_concurrency(),
        }
    }
}

fn default_cron() -> String {
    "0 0 * * * *".into()
}
fn default_timezone() -> String {
    "UTC".into()
}
fn default_limit() -> u32 {
    10
}
fn default_concurrency() -> u32 {
    1
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.ingestflow/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| IngestflowError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.ingestflow/ingestflow.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| IngestflowError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        IngestflowError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| IngestflowError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| IngestflowError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| IngestflowError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read the source API key from the env var named in the config.
pub fn source_api_key(config: &AppConfig) -> Result<String> {
    let var_name = &config.source.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(IngestflowError::config(format!(
            "source API key not found. Set the {var_name} environment variable."
        ))),
    }
}

/// Expand a leading `~/` against the home directory.
fn expand_home(path: &str) -> Result<PathBuf> {
    match path.strip_prefix("~/") {
        Some(rest) => {
            let home = dirs::home_dir()
                .ok_or_else(|| IngestflowError::config("could not determine home directory"))?;
            Ok(home.join(rest))
        }
        None => Ok(PathBuf::from(path)),
    }
}
