use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub collections: CollectionsConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub timeline: TimelineConfig,

    #[serde(default)]
    pub chart: ChartConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

fn default_db_path() -> PathBuf {
    data_dir().join("twyfels.db")
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionsConfig {
    #[serde(default = "default_timeline_collection")]
    pub timeline: String,

    #[serde(default = "default_tree_collection")]
    pub tree: String,
}

fn default_timeline_collection() -> String {
    "timeline".to_string()
}

fn default_tree_collection() -> String {
    "tree".to_string()
}

impl Default for CollectionsConfig {
    fn default() -> Self {
        Self {
            timeline: default_timeline_collection(),
            tree: default_tree_collection(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Local,
    Firebase,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,

    /// Object prefix for uploaded media, e.g. `images/portrait.jpg`.
    #[serde(default = "default_images_prefix")]
    pub images_prefix: String,

    /// Root directory of the local object store.
    #[serde(default = "default_local_root")]
    pub local_root: PathBuf,

    /// Base URL under which local objects are served.
    /// If not set, `file://` URLs into `local_root` are returned.
    #[serde(default)]
    pub public_base_url: Option<String>,

    /// Hosted bucket name (e.g. "my-project.appspot.com").
    #[serde(default)]
    pub bucket: Option<String>,

    #[serde(default = "default_storage_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_images_prefix() -> String {
    "images".to_string()
}

fn default_local_root() -> PathBuf {
    data_dir().join("storage")
}

fn default_storage_endpoint() -> String {
    "https://firebasestorage.googleapis.com/v0".to_string()
}

fn default_timeout_secs() -> u64 {
    120
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            images_prefix: default_images_prefix(),
            local_root: default_local_root(),
            public_base_url: None,
            bucket: None,
            endpoint: default_storage_endpoint(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Headline keyword that assigns a display group to an event without one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GroupRule {
    pub keyword: String,
    pub group: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineConfig {
    #[serde(default = "default_auto_group")]
    pub auto_group: bool,

    /// Checked in order; the first keyword found in the headline wins.
    #[serde(default = "default_group_rules")]
    pub group_rules: Vec<GroupRule>,
}

fn default_auto_group() -> bool {
    true
}

fn default_group_rules() -> Vec<GroupRule> {
    [(" born", "births"), (" weds", "weddings"), (" passes away", "wisals")]
        .into_iter()
        .map(|(keyword, group)| GroupRule {
            keyword: keyword.to_string(),
            group: group.to_string(),
        })
        .collect()
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            auto_group: default_auto_group(),
            group_rules: default_group_rules(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CardConfig {
    pub w: u32,
    pub h: u32,
    pub text_x: u32,
    pub text_y: u32,
    pub img_w: u32,
    pub img_h: u32,
    pub img_x: u32,
    pub img_y: u32,
}

impl Default for CardConfig {
    fn default() -> Self {
        Self {
            w: 220,
            h: 70,
            text_x: 75,
            text_y: 15,
            img_w: 60,
            img_h: 60,
            img_x: 5,
            img_y: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartConfig {
    #[serde(default = "default_node_separation")]
    pub node_separation: u32,

    #[serde(default = "default_level_separation")]
    pub level_separation: u32,

    #[serde(default)]
    pub card: CardConfig,

    /// Avatars are expected at `<avatar_dir>/<person id>.jpg`.
    #[serde(default = "default_avatar_dir")]
    pub avatar_dir: String,

    #[serde(default = "default_d3_url")]
    pub d3_url: String,

    #[serde(default = "default_script_url")]
    pub script_url: String,
}

fn default_node_separation() -> u32 {
    250
}

fn default_level_separation() -> u32 {
    150
}

fn default_avatar_dir() -> String {
    "./images".to_string()
}

fn default_d3_url() -> String {
    "https://unpkg.com/d3@6".to_string()
}

fn default_script_url() -> String {
    "https://unpkg.com/family-chart/dist/family-chart.js".to_string()
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self {
            node_separation: default_node_separation(),
            level_separation: default_level_separation(),
            card: CardConfig::default(),
            avatar_dir: default_avatar_dir(),
            d3_url: default_d3_url(),
            script_url: default_script_url(),
        }
    }
}

fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("twyfels")
}

impl Config {
    /// Load from `TWYFELS_CONFIG` or the default location, writing defaults
    /// there on first run.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            let config = Config::default();
            config.save_to(&config_path)?;
            Ok(config)
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        Ok(())
    }

    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("twyfels")
    }

    fn config_path() -> PathBuf {
        match std::env::var_os("TWYFELS_CONFIG") {
            Some(path) => PathBuf::from(path),
            None => Self::config_dir().join("config.toml"),
        }
    }

    pub fn log_dir() -> PathBuf {
        data_dir().join("logs")
    }
}
