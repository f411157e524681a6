//! End-to-end composition scenarios across real files, environment
//! variables, schemas and profiles.

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::{json, Value};
use tempfile::TempDir;

use strata::{
    ConfigManager, ConfigSource, EnvironmentSource, IniSource, JsonSource, MemorySource,
    RangeValidator, Schema, SchemaField, YamlSource,
};

fn write_file(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, content).unwrap();
    path
}

#[tokio::test]
async fn layered_override_env_over_json() {
    let dir = TempDir::new().unwrap();
    let json = write_file(&dir, "app.json", r#"{"db": {"host": "h1", "port": 1}}"#);
    std::env::set_var("COMPOSE_E2E_DB_HOST", "h2");

    let manager = ConfigManager::builder()
        .add_source(Arc::new(JsonSource::new(json)))
        .add_source(Arc::new(EnvironmentSource::new("COMPOSE_E2E_")))
        .build()
        .await
        .unwrap();

    assert_eq!(manager.get("db.host").await, Some(json!("h2")));
    assert_eq!(manager.get_int("db.port", 0).await, 1);
}

#[tokio::test]
async fn deep_merge_preserves_siblings() {
    let dir = TempDir::new().unwrap();
    let first = write_file(&dir, "first.json", r#"{"a": {"x": 1}}"#);
    let second = write_file(&dir, "second.json", r#"{"a": {"y": 2}}"#);

    let manager = ConfigManager::builder()
        .add_source(Arc::new(JsonSource::new(first)))
        .add_source(Arc::new(JsonSource::new(second)))
        .build()
        .await
        .unwrap();

    assert_eq!(manager.get_int("a.x", 0).await, 1);
    assert_eq!(manager.get_int("a.y", 0).await, 2);
}

#[tokio::test]
async fn sequences_replace_instead_of_concatenating() {
    let dir = TempDir::new().unwrap();
    let yaml = write_file(&dir, "base.yaml", "features:\n  - a\n  - b\n");
    let json = write_file(&dir, "override.json", r#"{"features": ["c"]}"#);

    let manager = ConfigManager::builder()
        .add_source(Arc::new(YamlSource::new(yaml)))
        .add_source(Arc::new(JsonSource::new(json)))
        .build()
        .await
        .unwrap();

    assert_eq!(
        manager.get_list("features", vec![]).await,
        vec![json!("c")]
    );
}

#[tokio::test]
async fn ini_booleans_coerce_leniently() {
    let dir = TempDir::new().unwrap();
    let ini = write_file(&dir, "app.ini", "[app]\ndebug = YES\nworkers = 4\n");

    let manager = ConfigManager::builder()
        .add_source(Arc::new(IniSource::new(ini).section("app")))
        .build()
        .await
        .unwrap();

    assert!(manager.get_bool("debug", false).await);
    assert_eq!(manager.get_int("workers", 0).await, 4);
}

#[tokio::test]
async fn faulty_source_contributes_nothing_but_composition_continues() {
    let dir = TempDir::new().unwrap();
    let good = write_file(&dir, "good.json", r#"{"service": {"name": "demo"}}"#);
    let bad = write_file(&dir, "bad.json", r#"{"broken": "#);

    let manager = ConfigManager::builder()
        .add_source(Arc::new(JsonSource::new(good)))
        .add_source(Arc::new(JsonSource::new(bad)))
        .build()
        .await
        .unwrap();

    assert_eq!(manager.get("service.name").await, Some(json!("demo")));

    let stats = manager.stats().await;
    let bad_meta = stats
        .sources
        .iter()
        .find(|m| m.origin.ends_with("bad.json"))
        .unwrap();
    assert_eq!(bad_meta.error_count, 1);
}

#[tokio::test]
async fn sequence_root_source_composes_as_empty() {
    let dir = TempDir::new().unwrap();
    let list_root = write_file(&dir, "list.json", r#"[1, 2, 3]"#);
    let good = write_file(&dir, "good.json", r#"{"ok": true}"#);

    let manager = ConfigManager::builder()
        .add_source(Arc::new(JsonSource::new(list_root)))
        .add_source(Arc::new(JsonSource::new(good)))
        .build()
        .await
        .unwrap();

    assert!(manager.get_bool("ok", false).await);
}

#[tokio::test]
async fn ordering_of_unrelated_sources_does_not_matter() {
    let left: Arc<dyn ConfigSource> =
        Arc::new(MemorySource::labeled("left", json!({"left": {"v": 1}})));
    let right: Arc<dyn ConfigSource> =
        Arc::new(MemorySource::labeled("right", json!({"right": {"v": 2}})));

    let forward = ConfigManager::builder()
        .add_source(left.clone())
        .add_source(right.clone())
        .build()
        .await
        .unwrap();
    let backward = ConfigManager::builder()
        .add_source(right)
        .add_source(left)
        .build()
        .await
        .unwrap();

    for path in ["left.v", "right.v"] {
        assert_eq!(
            forward.get(path).await,
            backward.get(path).await,
            "{path} differs between orderings"
        );
    }
}

#[tokio::test]
async fn schema_reports_every_failing_field() {
    let schema = Schema::new()
        .field("name", SchemaField::string().required())
        .field(
            "port",
            SchemaField::integer()
                .required()
                .with(Arc::new(RangeValidator::new(Some(1024.0), Some(65535.0)))),
        );

    let manager = ConfigManager::builder()
        .add_source(Arc::new(MemorySource::new(json!({"port": 80}))))
        .with_schema(schema)
        .build()
        .await
        .unwrap();

    let errors = manager.errors().await;
    assert_eq!(errors.len(), 2);
    let paths: Vec<&str> = errors.iter().map(|d| d.path.as_str()).collect();
    assert!(paths.contains(&"name"));
    assert!(paths.contains(&"port"));
}

#[tokio::test]
async fn profiles_select_profile_specific_files() {
    let dir = TempDir::new().unwrap();
    write_file(&dir, "production.json", r#"{"pool": 20}"#);
    write_file(&dir, "development.json", r#"{"pool": 2}"#);

    let manager = ConfigManager::builder()
        .add_source(Arc::new(MemorySource::new(json!({"pool": 1}))))
        .build()
        .await
        .unwrap();
    manager.set_active_profile("prod").unwrap();
    let added = manager.add_profile_sources(dir.path()).await.unwrap();

    assert_eq!(added, 1);
    assert_eq!(manager.get_int("pool", 0).await, 20);
    assert_eq!(manager.profile_var("ssl_required"), Some(json!(true)));
}

#[tokio::test]
async fn masked_view_is_sound() {
    let manager = ConfigManager::builder()
        .add_source(Arc::new(MemorySource::new(json!({
            "database": {"password": "hunter2", "host": "db.internal"},
            "api_token": "tok",
            "plain": "visible",
        }))))
        .build()
        .await
        .unwrap();

    let masked = manager.masked_snapshot().await;
    assert_eq!(masked["database"]["password"], json!("[MASKED]"));
    assert_eq!(masked["api_token"], json!("[MASKED]"));
    assert_eq!(masked["database"]["host"], json!("db.internal"));
    assert_eq!(masked["plain"], json!("visible"));
}

#[tokio::test]
async fn empty_env_prefix_matches_everything() {
    std::env::set_var("UNPREFIXED_PROBE_VALUE", "42");
    let manager = ConfigManager::builder()
        .add_source(Arc::new(EnvironmentSource::new("")))
        .build()
        .await
        .unwrap();

    assert_eq!(manager.get_int("unprefixed.probe.value", 0).await, 42);
}

#[tokio::test]
async fn get_as_deserializes_typed_sections() {
    #[derive(serde::Deserialize, PartialEq, Debug)]
    struct Db {
        host: String,
        port: u16,
    }

    let manager = ConfigManager::builder()
        .add_source(Arc::new(MemorySource::new(
            json!({"db": {"host": "h", "port": 5432}}),
        )))
        .build()
        .await
        .unwrap();

    let db: Db = manager.get_as("db").await.unwrap();
    assert_eq!(
        db,
        Db {
            host: "h".to_string(),
            port: 5432
        }
    );
    let missing: Option<Db> = manager.get_as("nope").await;
    assert!(missing.is_none());
}

#[tokio::test]
async fn coercion_idempotence_through_accessors() {
    let manager = ConfigManager::builder()
        .add_source(Arc::new(MemorySource::new(json!({
            "flag": "on",
            "count": "12",
            "items": "x, y",
        }))))
        .build()
        .await
        .unwrap();

    let flag = manager.get_bool("flag", false).await;
    let count = manager.get_int("count", 0).await;
    let items = manager.get_list("items", vec![]).await;

    // Feed the outputs back through a second manager; the results are
    // fixed points.
    let second = ConfigManager::builder()
        .add_source(Arc::new(MemorySource::new(json!({
            "flag": flag,
            "count": count,
            "items": Value::Array(items.clone()),
        }))))
        .build()
        .await
        .unwrap();

    assert_eq!(second.get_bool("flag", false).await, flag);
    assert_eq!(second.get_int("count", 0).await, count);
    assert_eq!(second.get_list("items", vec![]).await, items);
}
