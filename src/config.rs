//! Site configuration module.
//!
//! Handles loading, validating, and merging the `config.toml` file at the
//! content root. Stock defaults are serialized to a TOML table and the user
//! file is deep-merged on top, so a config file only needs the keys it
//! wants to change.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! base_url = ""             # Scheme + host used for absolute links
//! base_path = "/"           # Mount point of the site under base_url
//!
//! [urls]
//! as_file = false           # Keep `post.md` → `/post.html` instead of `/post/`
//! readme_as_index = false   # Treat README.md like index.md
//! index_file = "index.html" # File written for URLs ending in `/`
//! default_page_ext = ".html"
//!
//! [content]
//! excludes = []             # Virtual path prefixes the loader skips
//!
//! [content.layout_weights]  # Processing order of layout-type groups
//! single = 0
//! list = 10
//!
//! [processing]
//! max_processes = 4         # Max parallel workers (omit for auto = CPU cores)
//! parallel_content = true   # Process entities of a group in parallel
//!
//! [cache]
//! persist = false           # Keep output fingerprints across runs
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Name of the configuration file at the content root.
pub const CONFIG_FILENAME: &str = "config.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Site configuration loaded from `config.toml`.
///
/// All fields have sensible defaults. Unknown keys are rejected.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SiteConfig {
    /// Scheme and host prepended to absolute links (e.g. `https://example.com`).
    pub base_url: String,
    /// Path the site is mounted at under `base_url`.
    pub base_path: String,
    /// URL derivation settings.
    pub urls: UrlsConfig,
    /// Content discovery and grouping settings.
    pub content: ContentConfig,
    /// Parallel processing settings.
    pub processing: ProcessingConfig,
    /// Output fingerprint cache settings.
    pub cache: CacheConfig,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            base_path: "/".to_string(),
            urls: UrlsConfig::default(),
            content: ContentConfig::default(),
            processing: ProcessingConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

impl SiteConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.base_path.starts_with('/') {
            return Err(ConfigError::Validation(
                "base_path must start with '/'".into(),
            ));
        }
        if !self.base_url.is_empty() && !self.base_url.contains("://") {
            return Err(ConfigError::Validation(
                "base_url must include a scheme (e.g. https://)".into(),
            ));
        }
        if self.urls.index_file.is_empty() || self.urls.index_file.contains('/') {
            return Err(ConfigError::Validation(
                "urls.index_file must be a plain file name".into(),
            ));
        }
        if !self.urls.default_page_ext.starts_with('.') {
            return Err(ConfigError::Validation(
                "urls.default_page_ext must start with '.'".into(),
            ));
        }
        if self.processing.max_processes == Some(0) {
            return Err(ConfigError::Validation(
                "processing.max_processes must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Processing weight of a layout-type group. Unlisted types weigh 0.
    pub fn layout_weight(&self, layout_type: &str) -> i32 {
        self.content
            .layout_weights
            .get(layout_type)
            .copied()
            .unwrap_or(0)
    }
}

/// URL derivation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UrlsConfig {
    /// File-as-URL mode: pages keep a file URL (`/post.html`) instead of
    /// being folded into a folder URL (`/post/`).
    pub as_file: bool,
    /// Treat `readme.*` like `index.*` when folding URLs.
    pub readme_as_index: bool,
    /// File name appended to URLs ending in `/`.
    pub index_file: String,
    /// Extension given to pages retyped to HTML.
    pub default_page_ext: String,
}

impl Default for UrlsConfig {
    fn default() -> Self {
        Self {
            as_file: false,
            readme_as_index: false,
            index_file: "index.html".to_string(),
            default_page_ext: ".html".to_string(),
        }
    }
}

/// Content discovery and grouping settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ContentConfig {
    /// Virtual path prefixes (e.g. `/drafts`) skipped by the loader.
    pub excludes: Vec<String>,
    /// Ascending processing order of layout-type groups.
    pub layout_weights: IndexMap<String, i32>,
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            excludes: Vec::new(),
            layout_weights: IndexMap::from([("single".to_string(), 0), ("list".to_string(), 10)]),
        }
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel workers.
    /// When absent or null, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
    /// Process the entities of a layout-type group in parallel.
    pub parallel_content: bool,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            max_processes: None,
            parallel_content: true,
        }
    }
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config
        .max_processes
        .map(|n| n.clamp(1, cores))
        .unwrap_or(cores)
}

/// Output fingerprint cache settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    /// Persist fingerprints to the output directory so a fresh process can
    /// skip unchanged writes too.
    pub persist: bool,
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    toml::Value::try_from(SiteConfig::default())
        .map_err(|e| ConfigError::Validation(format!("default config must serialize: {e}")))
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load `config.toml` from a directory as a raw TOML value.
///
/// Returns `Ok(None)` if no config file exists in the directory.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    let config_path = path.join(CONFIG_FILENAME);
    if !config_path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(&config_path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<SiteConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: SiteConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from `config.toml` in the content root.
///
/// Merges user values on top of stock defaults, rejects unknown keys,
/// and validates the result.
pub fn load_config(root: &Path) -> Result<SiteConfig, ConfigError> {
    let base = stock_defaults_value()?;
    let overlay = load_raw_config(root)?;
    resolve_config(base, overlay)
}

/// Returns a fully-commented stock `config.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# Siteforge Configuration
# =======================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults. Unknown keys will cause an error.

# Scheme and host used when composing absolute links (e.g. "https://example.com").
base_url = ""

# Path the site is mounted at under base_url.
base_path = "/"

# ---------------------------------------------------------------------------
# URLs
# ---------------------------------------------------------------------------
[urls]
# Keep file URLs for pages (/blog/post.html) instead of folder URLs (/blog/post/).
as_file = false

# Fold README.md into its directory URL, like index.md.
readme_as_index = false

# File written for URLs ending in '/'.
index_file = "index.html"

# Extension given to pages converted to HTML.
default_page_ext = ".html"

# ---------------------------------------------------------------------------
# Content
# ---------------------------------------------------------------------------
[content]
# Virtual path prefixes skipped during discovery, e.g. ["/drafts"].
excludes = []

# Layout-type groups are processed in ascending weight order.
[content.layout_weights]
single = 0
list = 10

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel workers for loading and processing.
# Omit or comment out to auto-detect (= number of CPU cores).
# max_processes = 4

# Process entities of the same layout type in parallel.
parallel_content = true

# ---------------------------------------------------------------------------
# Output cache
# ---------------------------------------------------------------------------
[cache]
# Persist output fingerprints to <output>/.siteforge-cache.json so a new
# process skips rewriting unchanged files.
persist = false
"##
}
