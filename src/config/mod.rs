//! Sync configuration: parsing, boot-time validation and lookups.

pub mod mapping;
pub mod registry;
pub mod settings;

pub use mapping::MappingSchema;
pub use registry::{ConfigRegistry, IndexConfig, IndexSettings, DEFAULT_CONNECTION};
pub use settings::{
    IndexDeclaration, IndexSettingsOverride, SearchConfig, Settings, UpdateStrategy,
};
