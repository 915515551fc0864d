use std::path::{Path, PathBuf};

use crate::error::{Result, SyncError};

/// Engine-side description of an index: field names and types under
/// `mappings.properties`, plus optional index `settings`.
#[derive(Debug, Clone, PartialEq)]
pub struct MappingSchema {
    raw: serde_json::Value,
}

/// Outcome of looking for a mapping file.
pub(crate) enum MappingLookup {
    Found(MappingSchema),
    Missing(PathBuf),
}

impl MappingSchema {
    pub fn from_json(raw: serde_json::Value) -> Result<Self> {
        if !raw.is_object() {
            return Err(SyncError::Config(
                "mapping must be a JSON object".to_string(),
            ));
        }
        Ok(MappingSchema { raw })
    }

    /// Path of the mapping file for `index` inside `dir`.
    pub fn path_for(dir: &Path, index: &str) -> PathBuf {
        dir.join(format!("{}.json", index))
    }

    /// Read `{dir}/{index}.json`. A missing file is reported separately from a
    /// malformed one; only the former can be downgraded to a warning.
    pub(crate) fn lookup(dir: &Path, index: &str) -> Result<MappingLookup> {
        let path = Self::path_for(dir, index);
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(MappingLookup::Missing(path))
            }
            Err(e) => {
                return Err(SyncError::Config(format!(
                    "cannot read mapping {}: {}",
                    path.display(),
                    e
                )))
            }
        };
        let raw: serde_json::Value = serde_json::from_str(&content).map_err(|e| {
            SyncError::Config(format!("invalid mapping {}: {}", path.display(), e))
        })?;
        Ok(MappingLookup::Found(Self::from_json(raw)?))
    }

    /// The `mappings` block sent on index creation.
    pub fn mappings(&self) -> serde_json::Value {
        self.raw
            .get("mappings")
            .cloned()
            .unwrap_or_else(|| serde_json::json!({}))
    }

    /// The optional `settings` block sent on index creation.
    pub fn index_settings(&self) -> Option<&serde_json::Value> {
        self.raw.get("settings")
    }

    /// Top-level field names declared under `mappings.properties`.
    pub fn properties(&self) -> Vec<String> {
        self.raw
            .pointer("/mappings/properties")
            .and_then(|p| p.as_object())
            .map(|p| p.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.raw
            .pointer("/mappings/properties")
            .and_then(|p| p.as_object())
            .map(|p| p.contains_key(field))
            .unwrap_or(false)
    }

    /// Declared type of a top-level field, e.g. `"keyword"`.
    pub fn field_type(&self, field: &str) -> Option<&str> {
        self.raw
            .pointer("/mappings/properties")
            .and_then(|p| p.get(field))
            .and_then(|f| f.get("type"))
            .and_then(|t| t.as_str())
    }

    pub fn as_json(&self) -> &serde_json::Value {
        &self.raw
    }
}
