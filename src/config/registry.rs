use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

use super::mapping::{MappingLookup, MappingSchema};
use super::settings::{SearchConfig, Settings, UpdateStrategy};
use crate::document::{ModelCatalog, ALL_INDEXES};
use crate::error::{Result, SyncError};
use crate::types::ModelId;

/// Connection used by indexes that do not name one.
pub const DEFAULT_CONNECTION: &str = "default";

// Lowercase, no leading `_`, `-` or `+`, none of the characters the engine
// forbids in index names.
static INDEX_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^[a-z0-9][^A-Z\\/*?"<>| ,#:]*$"#).expect("static regex"));

/// Settings resolved for a single index (global settings plus overrides).
#[derive(Debug, Clone, PartialEq)]
pub struct IndexSettings {
    pub chunk_size: usize,
    pub page_size: usize,
    pub auto_sync: bool,
    pub strict_validation: bool,
    pub update_strategy: UpdateStrategy,
}

/// A validated index declaration.
#[derive(Debug, Clone)]
pub struct IndexConfig {
    pub name: String,
    pub models: Vec<ModelId>,
    pub connection: String,
    /// `None` when no mapping file was found and validation was not strict.
    pub mapping: Option<MappingSchema>,
    pub settings: IndexSettings,
}

impl IndexConfig {
    /// True when the index runs without a mapping file and relies on the
    /// engine's dynamic mapping.
    pub fn is_degraded(&self) -> bool {
        self.mapping.is_none()
    }

    pub fn has_model(&self, model_id: &str) -> bool {
        self.models.iter().any(|m| m == model_id)
    }
}

/// Boot-time validated, read-only view of the sync configuration.
///
/// Built once with [`ConfigRegistry::load`] and shared behind an `Arc`.
/// There is no way to mutate it afterwards; reloading means restarting.
#[derive(Debug)]
pub struct ConfigRegistry {
    settings: Settings,
    connections: IndexMap<String, String>,
    indexes: IndexMap<String, IndexConfig>,
    never_auto_sync: HashSet<ModelId>,
}

impl ConfigRegistry {
    /// Validate `config` against the registered models and the mapping files.
    ///
    /// Fails fast with [`SyncError::Config`] on the first problem: an invalid
    /// index name, an unknown connection, an unregistered model, a malformed
    /// mapping, or (under strict validation) a missing mapping.
    pub fn load(config: SearchConfig, catalog: &ModelCatalog) -> Result<Self> {
        let SearchConfig {
            connections,
            indexes: declarations,
            settings,
        } = config;

        if settings.chunk_size == 0 {
            return Err(SyncError::Config("chunk_size must be at least 1".to_string()));
        }

        let mut indexes = IndexMap::with_capacity(declarations.len());
        for (name, decl) in declarations {
            validate_index_name(&name)?;

            let connection = decl
                .connection
                .clone()
                .unwrap_or_else(|| DEFAULT_CONNECTION.to_string());
            if !connections.contains_key(&connection) {
                return Err(SyncError::Config(format!(
                    "index '{}' references unknown connection '{}'",
                    name, connection
                )));
            }

            for model_id in &decl.models {
                if !catalog.contains(model_id) {
                    return Err(SyncError::Config(format!(
                        "model '{}' in index '{}' is not registered; it must implement \
                         Indexable and produce Documentable records",
                        model_id, name
                    )));
                }
            }

            let overrides = &decl.settings;
            let index_settings = IndexSettings {
                chunk_size: overrides.chunk_size.unwrap_or(settings.chunk_size).max(1),
                page_size: overrides.page_size.unwrap_or(settings.page_size),
                auto_sync: overrides.auto_sync.unwrap_or(true),
                strict_validation: overrides
                    .strict_validation
                    .unwrap_or(settings.strict_validation),
                update_strategy: overrides
                    .update_strategy
                    .unwrap_or(settings.update_strategy),
            };

            let mapping = match MappingSchema::lookup(&settings.mappings_dir, &name)? {
                MappingLookup::Found(m) => Some(m),
                MappingLookup::Missing(path) if index_settings.strict_validation => {
                    return Err(SyncError::Config(format!(
                        "index '{}' has no mapping file ({})",
                        name,
                        path.display()
                    )));
                }
                MappingLookup::Missing(path) => {
                    tracing::warn!(
                        "[CONFIG] index '{}' has no mapping file ({}), relying on engine defaults",
                        name,
                        path.display()
                    );
                    None
                }
            };

            tracing::debug!(
                "[CONFIG] index '{}' -> models={:?} connection={} strategy={:?}",
                name,
                decl.models,
                connection,
                index_settings.update_strategy
            );

            indexes.insert(
                name.clone(),
                IndexConfig {
                    name,
                    models: decl.models,
                    connection,
                    mapping,
                    settings: index_settings,
                },
            );
        }

        let never_auto_sync = settings.never_auto_sync.iter().cloned().collect();
        tracing::info!(
            "[CONFIG] loaded {} index(es), {} connection(s), auto_sync={}",
            indexes.len(),
            connections.len(),
            settings.auto_sync
        );

        Ok(ConfigRegistry {
            settings,
            connections,
            indexes,
            never_auto_sync,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn index(&self, name: &str) -> Option<&IndexConfig> {
        self.indexes.get(name)
    }

    /// Like [`ConfigRegistry::index`] but fails with [`SyncError::IndexNotFound`].
    pub fn require_index(&self, name: &str) -> Result<&IndexConfig> {
        self.index(name)
            .ok_or_else(|| SyncError::IndexNotFound(name.to_string()))
    }

    pub fn index_names(&self) -> impl Iterator<Item = &str> {
        self.indexes.keys().map(|k| k.as_str())
    }

    pub fn indexes(&self) -> impl Iterator<Item = &IndexConfig> {
        self.indexes.values()
    }

    /// Every index `model_id` is bound to, in declaration order.
    pub fn indexes_for(&self, model_id: &str) -> Vec<&IndexConfig> {
        self.indexes
            .values()
            .filter(|idx| idx.has_model(model_id))
            .collect()
    }

    pub fn settings_for(&self, index: &str) -> Option<&IndexSettings> {
        self.indexes.get(index).map(|i| &i.settings)
    }

    pub fn connection_url(&self, name: &str) -> Option<&str> {
        self.connections.get(name).map(|s| s.as_str())
    }

    pub fn connections(&self) -> impl Iterator<Item = (&str, &str)> {
        self.connections
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Indexes that loaded without a mapping file.
    pub fn degraded_indexes(&self) -> Vec<&str> {
        self.indexes
            .values()
            .filter(|i| i.is_degraded())
            .map(|i| i.name.as_str())
            .collect()
    }

    /// Global auto-sync switch combined with the never-sync exclusion list.
    pub fn auto_sync_enabled(&self, model_id: &str) -> bool {
        self.settings.auto_sync && !self.never_auto_sync.contains(model_id)
    }
}

fn validate_index_name(name: &str) -> Result<()> {
    if name == ALL_INDEXES {
        return Err(SyncError::Config(format!(
            "'{}' is a reserved index name",
            ALL_INDEXES
        )));
    }
    if name.len() > 255 || name == "." || name == ".." || !INDEX_NAME_RE.is_match(name) {
        return Err(SyncError::Config(format!("invalid index name '{}'", name)));
    }
    Ok(())
}
