//! Application configuration for CaseGraph.
//!
//! User config lives at `~/.casegraph/casegraph.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CaseGraphError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "casegraph.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".casegraph";

// ---------------------------------------------------------------------------
// Config structs (matching casegraph.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Canvas geometry and tier constants.
    #[serde(default)]
    pub layout: LayoutConfig,

    /// Persistence sync behaviour.
    #[serde(default)]
    pub sync: SyncConfig,

    /// Limits applied when findings are attached.
    #[serde(default)]
    pub findings: FindingsConfig,

    /// Tool registry overrides and additions.
    #[serde(default)]
    pub tools: Vec<ToolConfigEntry>,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Path of the local graph database.
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

fn default_db_path() -> String {
    "~/.casegraph/casegraph.db".into()
}

/// `[layout]` section. All values are canvas units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutConfig {
    /// Width assumed for nodes the view has not measured.
    #[serde(default = "default_node_width")]
    pub node_width: f64,
    /// Height assumed for nodes the view has not measured.
    #[serde(default = "default_node_height")]
    pub node_height: f64,
    /// Margin added to every bounding box before overlap tests.
    #[serde(default = "default_padding")]
    pub padding: f64,
    #[serde(default = "default_grid_size")]
    pub grid_size: f64,
    /// Exclusive upper bound of the ring search.
    #[serde(default = "default_search_radius")]
    pub search_radius: f64,
    #[serde(default = "default_center_x")]
    pub center_x: f64,
    #[serde(default = "default_entity_y")]
    pub entity_y: f64,
    #[serde(default = "default_agent_y")]
    pub agent_y: f64,
    #[serde(default = "default_agent_spacing")]
    pub agent_spacing: f64,
    #[serde(default = "default_summary_y")]
    pub summary_y: f64,
    /// Vertical distance between an agent and its finding row.
    #[serde(default = "default_finding_offset_y")]
    pub finding_offset_y: f64,
    /// Horizontal distance between siblings in a finding row.
    #[serde(default = "default_finding_spacing")]
    pub finding_spacing: f64,
    /// Row spacing used by the hierarchical reflow.
    #[serde(default = "default_tier_spacing")]
    pub tier_spacing: f64,
    /// Row heights of the entity, agent, summary and other tiers.
    #[serde(default = "default_tier_y")]
    pub tier_y: [f64; 4],
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            node_width: default_node_width(),
            node_height: default_node_height(),
            padding: default_padding(),
            grid_size: default_grid_size(),
            search_radius: default_search_radius(),
            center_x: default_center_x(),
            entity_y: default_entity_y(),
            agent_y: default_agent_y(),
            agent_spacing: default_agent_spacing(),
            summary_y: default_summary_y(),
            finding_offset_y: default_finding_offset_y(),
            finding_spacing: default_finding_spacing(),
            tier_spacing: default_tier_spacing(),
            tier_y: default_tier_y(),
        }
    }
}

fn default_node_width() -> f64 {
    280.0
}
fn default_node_height() -> f64 {
    120.0
}
fn default_padding() -> f64 {
    50.0
}
fn default_grid_size() -> f64 {
    20.0
}
fn default_search_radius() -> f64 {
    1200.0
}
fn default_center_x() -> f64 {
    500.0
}
fn default_entity_y() -> f64 {
    80.0
}
fn default_agent_y() -> f64 {
    260.0
}
fn default_agent_spacing() -> f64 {
    280.0
}
fn default_summary_y() -> f64 {
    480.0
}
fn default_finding_offset_y() -> f64 {
    200.0
}
fn default_finding_spacing() -> f64 {
    340.0
}
fn default_tier_spacing() -> f64 {
    340.0
}
fn default_tier_y() -> [f64; 4] {
    [80.0, 320.0, 580.0, 820.0]
}

/// `[sync]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Whether graph mutations are written to the database at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Quiet interval before a node's latest position is written.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            debounce_ms: default_debounce_ms(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_debounce_ms() -> u64 {
    300
}

/// `[findings]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FindingsConfig {
    /// Findings beyond this count in one completion are dropped.
    #[serde(default = "default_max_per_call")]
    pub max_per_call: usize,

    /// Upper bound on mentioned-entity nodes per media completion.
    #[serde(default = "default_max_mentions")]
    pub max_mentions: usize,

    /// Characters of tool output kept on an agent node.
    #[serde(default = "default_excerpt_chars")]
    pub excerpt_chars: usize,
}

impl Default for FindingsConfig {
    fn default() -> Self {
        Self {
            max_per_call: default_max_per_call(),
            max_mentions: default_max_mentions(),
            excerpt_chars: default_excerpt_chars(),
        }
    }
}

fn default_max_per_call() -> usize {
    5
}
fn default_max_mentions() -> usize {
    3
}
fn default_excerpt_chars() -> usize {
    200
}

/// `[[tools]]` entry: adds a tool to the registry or replaces a built-in
/// one with the same key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolConfigEntry {
    /// Registry key (e.g. `sanctions`).
    pub key: String,
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Category (compliance, hr, legal, digital, ...).
    #[serde(default)]
    pub category: Option<String>,
    /// Regex patterns matched against shell-command text.
    #[serde(default)]
    pub patterns: Vec<String>,
}

// ---------------------------------------------------------------------------
// Engine config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime engine configuration, merged from the config file and CLI flags.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub layout: LayoutConfig,
    pub findings: FindingsConfig,
    pub sync: SyncConfig,
    pub tools: Vec<ToolConfigEntry>,
}

impl From<&AppConfig> for EngineConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            layout: config.layout.clone(),
            findings: config.findings.clone(),
            sync: config.sync.clone(),
            tools: config.tools.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.casegraph/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| CaseGraphError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.casegraph/casegraph.toml`).
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
    let content = std::fs::read_to_string(path).map_err(|e| CaseGraphError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        CaseGraphError::config(format!("failed to parse {}: {e}", path.display()))
    })?;
    validate_config(&config)?;
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| CaseGraphError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| CaseGraphError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| CaseGraphError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Reject values the placement engine cannot work with.
pub fn validate_config(config: &AppConfig) -> Result<()> {
    let layout = &config.layout;
    if layout.grid_size <= 0.0 {
        return Err(CaseGraphError::config("layout.grid_size must be positive"));
    }
    if layout.node_width <= 0.0 || layout.node_height <= 0.0 {
        return Err(CaseGraphError::config(
            "layout.node_width and layout.node_height must be positive",
        ));
    }
    if layout.padding < 0.0 {
        return Err(CaseGraphError::config("layout.padding must not be negative"));
    }
    if config.findings.max_per_call == 0 {
        return Err(CaseGraphError::config("findings.max_per_call must be at least 1"));
    }
    if let Some(entry) = config.tools.iter().find(|t| t.key.trim().is_empty()) {
        return Err(CaseGraphError::config(format!(
            "tool entry with name {:?} has an empty key",
            entry.name
        )));
    }
    Ok(())
}

/// Expand a leading `~/` against the home directory.
pub fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(path)),
        None => PathBuf::from(path),
    }
}
