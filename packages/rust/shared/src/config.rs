//! Application configuration for FoldScape.
//!
//! User config lives at `~/.foldscape/foldscape.toml`.
//! CLI flags override config file values, which override defaults.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{FoldscapeError, Result};
use crate::types::Category;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "foldscape.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".foldscape";

/// Search terms the collector uses; they seed the default `Core Methods` rule.
const DEFAULT_CORE_METHOD_KEYWORDS: &[&str] = &[
    "alphafold",
    "rosettafold",
    "rfdiffusion",
    "proteinmpnn",
    "esmfold",
    "protein structure prediction",
    "protein design",
    "inverse folding",
    "protein language model",
];

// ---------------------------------------------------------------------------
// Config structs (matching foldscape.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Where the record store and its history live.
    #[serde(default)]
    pub paths: PathsConfig,

    /// Velocity engine settings.
    #[serde(default)]
    pub velocity: VelocityConfig,

    /// Categorizer rules and manual overrides.
    #[serde(default)]
    pub categories: CategoryRules,
}

/// `[paths]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory holding `repos.json`, `metadata.json` and `historical/`.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

fn default_data_dir() -> String {
    "data".into()
}

/// `[velocity]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VelocityConfig {
    /// Age of the snapshot the short-horizon velocity compares against.
    #[serde(default = "default_days_back")]
    pub days_back: u32,

    /// Minimum star gain over `days_back` for a repo to be flagged trending.
    #[serde(default = "default_trending_threshold")]
    pub trending_threshold: i64,

    /// Age of the snapshot used for `star_velocity_30d`.
    #[serde(default = "default_long_horizon_days")]
    pub long_horizon_days: u32,

    /// Whether a run also computes `star_velocity_30d`.
    #[serde(default)]
    pub compute_long_horizon: bool,
}

impl Default for VelocityConfig {
    fn default() -> Self {
        Self {
            days_back: default_days_back(),
            trending_threshold: default_trending_threshold(),
            long_horizon_days: default_long_horizon_days(),
            compute_long_horizon: false,
        }
    }
}

fn default_days_back() -> u32 {
    7
}
fn default_trending_threshold() -> i64 {
    10
}
fn default_long_horizon_days() -> u32 {
    30
}

/// `[categories]` section: ordered keyword rules plus per-repo overrides.
///
/// Rule order is significant: the first keyword hit across the whole list
/// decides a record's category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryRules {
    #[serde(default)]
    pub rules: Vec<CategoryRule>,

    /// `repo_id` → forced category. Always beats keyword matching.
    #[serde(default)]
    pub overrides: BTreeMap<String, Category>,
}

impl Default for CategoryRules {
    fn default() -> Self {
        Self {
            rules: vec![CategoryRule {
                category: Category::CoreMethods,
                keywords: DEFAULT_CORE_METHOD_KEYWORDS
                    .iter()
                    .map(|k| (*k).to_string())
                    .collect(),
            }],
            overrides: BTreeMap::new(),
        }
    }
}

impl CategoryRules {
    /// A rule set with no rules and no overrides.
    pub fn empty() -> Self {
        Self {
            rules: Vec::new(),
            overrides: BTreeMap::new(),
        }
    }

    /// Append a rule, keeping insertion order.
    pub fn with_rule<I, S>(mut self, category: Category, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rules.push(CategoryRule {
            category,
            keywords: keywords.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Force `repo_id` into `category`.
    pub fn with_override(mut self, repo_id: impl Into<String>, category: Category) -> Self {
        self.overrides.insert(repo_id.into(), category);
        self
    }
}

/// `[[categories.rules]]` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryRule {
    pub category: Category,
    pub keywords: Vec<String>,
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.foldscape/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| FoldscapeError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.foldscape/foldscape.toml`).
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
    let content = std::fs::read_to_string(path).map_err(|e| FoldscapeError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        FoldscapeError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| FoldscapeError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| FoldscapeError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| FoldscapeError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}
