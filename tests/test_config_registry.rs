//! Tests for ConfigRegistry::load: mapping validation, model/connection checks, env overrides.

mod common;

use common::{blog_config, catalog, write_mapping, ArticleManager, ARTICLE};
use searchsync::{ConfigRegistry, ModelCatalog, SearchConfig, SyncError, UpdateStrategy};
use serde_json::json;
use serial_test::serial;
use tempfile::TempDir;

fn articles() -> ModelCatalog {
    catalog(ArticleManager::with(vec![]))
}

#[test]
fn strict_validation_requires_mapping_file() {
    let dir = TempDir::new().unwrap();
    let config = blog_config(dir.path(), json!({"strict_validation": true}));
    let err = ConfigRegistry::load(config, &articles()).unwrap_err();
    assert!(matches!(err, SyncError::Config(ref m) if m.contains("blog")));
    assert!(err.is_fatal());
}

#[test]
fn missing_mapping_without_strict_marks_index_degraded() {
    let dir = TempDir::new().unwrap();
    let config = blog_config(dir.path(), json!({}));
    let registry = ConfigRegistry::load(config, &articles()).unwrap();
    let blog = registry.index("blog").unwrap();
    assert!(blog.is_degraded());
    assert_eq!(registry.degraded_indexes(), vec!["blog"]);
}

#[test]
fn mapping_file_is_loaded() {
    let dir = TempDir::new().unwrap();
    write_mapping(dir.path(), "blog", &["title", "views"]);
    let config = blog_config(dir.path(), json!({"strict_validation": true}));
    let registry = ConfigRegistry::load(config, &articles()).unwrap();
    let blog = registry.index("blog").unwrap();
    assert!(!blog.is_degraded());
    let mapping = blog.mapping.as_ref().unwrap();
    assert!(mapping.has_field("title"));
    assert!(!mapping.has_field("author"));
}

#[test]
fn malformed_mapping_is_fatal_even_without_strict() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("blog.json"), "{ not json").unwrap();
    let config = blog_config(dir.path(), json!({}));
    let err = ConfigRegistry::load(config, &articles()).unwrap_err();
    assert!(matches!(err, SyncError::Config(_)));
}

#[test]
fn unregistered_model_is_rejected() {
    let dir = TempDir::new().unwrap();
    let config = blog_config(dir.path(), json!({}));
    let err = ConfigRegistry::load(config, &ModelCatalog::new()).unwrap_err();
    match err {
        SyncError::Config(msg) => assert!(msg.contains(ARTICLE), "{msg}"),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn unknown_connection_is_rejected() {
    let dir = TempDir::new().unwrap();
    let raw = json!({
        "connections": {"default": "http://localhost:9200"},
        "indexes": {"blog": {"models": [ARTICLE], "connection": "archive"}},
        "settings": {"mappings_dir": dir.path()},
    });
    let config = SearchConfig::from_json_str(&raw.to_string()).unwrap();
    let err = ConfigRegistry::load(config, &articles()).unwrap_err();
    assert!(matches!(err, SyncError::Config(ref m) if m.contains("archive")));
}

#[test]
fn reserved_index_name_is_rejected() {
    let dir = TempDir::new().unwrap();
    let raw = json!({
        "connections": {"default": "http://localhost:9200"},
        "indexes": {"_all": {"models": [ARTICLE]}},
        "settings": {"mappings_dir": dir.path()},
    });
    let config = SearchConfig::from_json_str(&raw.to_string()).unwrap();
    assert!(ConfigRegistry::load(config, &articles()).is_err());
}

#[test]
fn lookups_follow_declaration_order_and_overrides() {
    let dir = TempDir::new().unwrap();
    let raw = json!({
        "connections": {"default": "http://localhost:9200", "archive": "http://archive:9200"},
        "indexes": {
            "blog": {"models": [ARTICLE]},
            "archive": {
                "models": [ARTICLE],
                "connection": "archive",
                "settings": {"chunk_size": 50, "update_strategy": "partial", "auto_sync": false}
            }
        },
        "settings": {"mappings_dir": dir.path(), "never_auto_sync": ["blog.Draft"]},
    });
    let config = SearchConfig::from_json_str(&raw.to_string()).unwrap();
    let registry = ConfigRegistry::load(config, &articles()).unwrap();

    let names: Vec<&str> = registry
        .indexes_for(ARTICLE)
        .iter()
        .map(|i| i.name.as_str())
        .collect();
    assert_eq!(names, vec!["blog", "archive"]);
    assert!(registry.indexes_for("blog.Comment").is_empty());

    let archive = registry.settings_for("archive").unwrap();
    assert_eq!(archive.chunk_size, 50);
    assert_eq!(archive.update_strategy, UpdateStrategy::Partial);
    assert!(!archive.auto_sync);
    assert_eq!(registry.settings_for("blog").unwrap().chunk_size, 500);

    assert_eq!(registry.index("archive").unwrap().connection, "archive");
    assert_eq!(registry.connection_url("archive"), Some("http://archive:9200"));

    assert!(registry.auto_sync_enabled(ARTICLE));
    assert!(!registry.auto_sync_enabled("blog.Draft"));
    assert!(matches!(
        registry.require_index("missing"),
        Err(SyncError::IndexNotFound(_))
    ));
}

#[test]
#[serial]
fn env_overrides_apply_to_settings() {
    std::env::set_var("SEARCHSYNC_AUTO_SYNC", "false");
    std::env::set_var("SEARCHSYNC_CHUNK_SIZE", "42");
    std::env::set_var("SEARCHSYNC_PAGE_SIZE", "not-a-number");

    let dir = TempDir::new().unwrap();
    let config = blog_config(dir.path(), json!({})).with_env_overrides();

    std::env::remove_var("SEARCHSYNC_AUTO_SYNC");
    std::env::remove_var("SEARCHSYNC_CHUNK_SIZE");
    std::env::remove_var("SEARCHSYNC_PAGE_SIZE");

    assert!(!config.settings.auto_sync);
    assert_eq!(config.settings.chunk_size, 42);
    assert_eq!(config.settings.page_size, 25);

    let registry = ConfigRegistry::load(config, &articles()).unwrap();
    assert!(!registry.auto_sync_enabled(ARTICLE));
}

#[test]
fn zero_chunk_size_is_rejected() {
    let dir = TempDir::new().unwrap();
    let config = blog_config(dir.path(), json!({"chunk_size": 0}));
    assert!(matches!(
        ConfigRegistry::load(config, &articles()),
        Err(SyncError::Config(_))
    ));
}
