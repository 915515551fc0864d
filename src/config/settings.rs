use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, SyncError};
use crate::types::ModelId;

fn default_chunk_size() -> usize {
    500
}

fn default_page_size() -> usize {
    25
}

fn default_true() -> bool {
    true
}

fn default_mappings_dir() -> PathBuf {
    PathBuf::from("mappings")
}

fn default_response_snapshot_limit() -> usize {
    64 * 1024
}

/// How a record update with a known changed-field set becomes a document body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateStrategy {
    /// Re-send the whole document.
    #[default]
    Full,
    /// Send only the changed fields that the index mapping knows about.
    Partial,
}

/// Global sync settings, the `settings` block of [`SearchConfig`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Batch size for bulk index operations.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Default page size for search requests.
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Master switch for lifecycle-triggered sync.
    #[serde(default = "default_true")]
    pub auto_sync: bool,

    /// Models that are never synced automatically, even when bound to an index.
    #[serde(default)]
    pub never_auto_sync: Vec<ModelId>,

    /// Missing mapping files become fatal instead of a warning.
    #[serde(default)]
    pub strict_validation: bool,

    /// Persist a snapshot of the raw engine response with each query log entry.
    #[serde(default = "default_true")]
    pub include_source: bool,

    /// Directory holding one `{index}.json` mapping file per index.
    #[serde(default = "default_mappings_dir")]
    pub mappings_dir: PathBuf,

    #[serde(default)]
    pub update_strategy: UpdateStrategy,

    /// Response snapshots larger than this (serialized bytes) are not persisted.
    #[serde(default = "default_response_snapshot_limit")]
    pub response_snapshot_limit: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            chunk_size: default_chunk_size(),
            page_size: default_page_size(),
            auto_sync: true,
            never_auto_sync: Vec::new(),
            strict_validation: false,
            include_source: true,
            mappings_dir: default_mappings_dir(),
            update_strategy: UpdateStrategy::Full,
            response_snapshot_limit: default_response_snapshot_limit(),
        }
    }
}

impl Settings {
    /// Override settings from `SEARCHSYNC_*` environment variables.
    ///
    /// Unparseable values are ignored with a warning.
    pub fn apply_env(&mut self) {
        if let Some(v) = env_bool("SEARCHSYNC_AUTO_SYNC") {
            self.auto_sync = v;
        }
        if let Some(v) = env_bool("SEARCHSYNC_STRICT_VALIDATION") {
            self.strict_validation = v;
        }
        if let Some(v) = env_bool("SEARCHSYNC_INCLUDE_SOURCE") {
            self.include_source = v;
        }
        if let Some(v) = env_parse("SEARCHSYNC_CHUNK_SIZE") {
            self.chunk_size = v;
        }
        if let Some(v) = env_parse("SEARCHSYNC_PAGE_SIZE") {
            self.page_size = v;
        }
        if let Ok(dir) = std::env::var("SEARCHSYNC_MAPPINGS_DIR") {
            self.mappings_dir = PathBuf::from(dir);
        }
    }
}

fn env_bool(key: &str) -> Option<bool> {
    std::env::var(key).ok().map(|v| v != "false" && v != "0")
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!("[CONFIG] ignoring {}={:?}: not a valid value", key, raw);
            None
        }
    }
}

/// Per-index overrides of the global [`Settings`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexSettingsOverride {
    pub chunk_size: Option<usize>,
    pub page_size: Option<usize>,
    pub auto_sync: Option<bool>,
    pub strict_validation: Option<bool>,
    pub update_strategy: Option<UpdateStrategy>,
}

/// One entry of the `indexes` block.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexDeclaration {
    /// Models populating this index, in `app.Model` form.
    #[serde(default)]
    pub models: Vec<ModelId>,

    /// Name of the connection this index lives on.
    #[serde(default)]
    pub connection: Option<String>,

    #[serde(default)]
    pub settings: IndexSettingsOverride,
}

/// Raw configuration as written by the operator, before validation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default)]
    pub connections: IndexMap<String, String>,

    #[serde(default)]
    pub indexes: IndexMap<String, IndexDeclaration>,

    #[serde(default)]
    pub settings: Settings,
}

impl SearchConfig {
    pub fn from_json_str(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| SyncError::Config(format!("invalid config: {}", e)))
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            SyncError::Config(format!("cannot read config {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&raw)
    }

    /// Apply `SEARCHSYNC_*` overrides to the settings block.
    pub fn with_env_overrides(mut self) -> Self {
        self.settings.apply_env();
        self
    }
}
