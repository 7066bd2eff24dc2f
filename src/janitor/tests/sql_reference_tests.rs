//! Runs against a real SQLite reference table and an in-memory object store.

use std::sync::Arc;
use std::time::Duration;

use common::ReferenceDatabase;
use common::config::Configuration;
use common::testing::TestConfigBuilder;
use janitor::{ObjectStoreBackend, Reconciler, RunStatus, SqlReferenceLoader, SweepConfig};
use object_store::PutPayload;
use object_store::path::Path as ObjectPath;

async fn seed(config: &Configuration, keys: &[&str], referenced: &[&str]) -> Reconciler {
    let backend = Arc::new(ObjectStoreBackend::from_config(&config.storage).unwrap());
    let prefix = config.storage.prefix.trim_matches('/');
    for key in keys {
        let location = if prefix.is_empty() {
            ObjectPath::parse(*key).unwrap()
        } else {
            ObjectPath::parse(format!("{prefix}/{key}")).unwrap()
        };
        backend
            .store()
            .put(&location, PutPayload::from(b"data".to_vec()))
            .await
            .unwrap();
    }

    let database = ReferenceDatabase::connect(&config.database).await.unwrap();
    let table = &config.references.table;
    let column = &config.references.column;
    database
        .execute(&format!(
            "CREATE TABLE {table} (id INTEGER PRIMARY KEY, {column} TEXT)"
        ))
        .await
        .unwrap();
    database
        .execute(&format!("INSERT INTO {table} ({column}) VALUES (NULL)"))
        .await
        .unwrap();
    for path in referenced {
        database
            .execute(&format!("INSERT INTO {table} ({column}) VALUES ('{path}')"))
            .await
            .unwrap();
    }

    let references = SqlReferenceLoader::new(database, config.references.clone()).unwrap();
    Reconciler::new(
        backend.clone(),
        Arc::new(references),
        backend,
        SweepConfig::from(&config.cleanup),
    )
}

#[tokio::test]
async fn test_sweep_with_sql_references() {
    let config = TestConfigBuilder::new().in_memory().build();
    let reconciler = seed(
        &config,
        &["kept.png", "u1/kept.png", "u1/fresh.png", "stray.png"],
        &["kept.png", "u1/kept.png", "kept.png"],
    )
    .await;

    let outcome = reconciler.run().await.unwrap();

    assert_eq!(outcome.status, RunStatus::Completed);
    assert_eq!(outcome.result.total_files, 4);
    assert_eq!(outcome.result.orphaned_files, 1);
    assert_eq!(outcome.result.deleted_paths, vec!["stray.png"]);
}

#[tokio::test]
async fn test_prefixed_namespace_and_custom_column() {
    let config = TestConfigBuilder::new()
        .in_memory()
        .with_storage_prefix("/uploads/")
        .with_reference_column("attachments", "object_key")
        .with_grace_period(Duration::from_secs(1))
        .build();
    let reconciler = seed(&config, &["a/1.png", "b/2.png"], &["a/1.png"]).await;

    tokio::time::sleep(Duration::from_millis(1100)).await;
    let outcome = reconciler.run().await.unwrap();

    // Paths are reported relative to the prefix
    assert_eq!(outcome.result.total_files, 2);
    assert_eq!(outcome.result.deleted_paths, vec!["b/2.png"]);
}

#[tokio::test]
async fn test_dry_run_without_revalidation() {
    let config = TestConfigBuilder::new()
        .in_memory()
        .with_dry_run()
        .without_revalidation()
        .build();
    let reconciler = seed(&config, &["stray.png", "other.png"], &[]).await;

    let outcome = reconciler.run().await.unwrap();
    assert_eq!(outcome.status, RunStatus::DryRun);
    assert_eq!(outcome.result.orphaned_files, 2);
    assert_eq!(outcome.result.deleted_files, 0);

    // Nothing was removed, so a second dry run sees the same objects
    let again = reconciler.run().await.unwrap();
    assert_eq!(again.result.total_files, 2);
}

#[tokio::test]
async fn test_encoded_keys_are_really_deleted() {
    let config = TestConfigBuilder::new()
        .in_memory()
        .with_storage_prefix("uploads")
        .build();
    let reconciler = Arc::new(
        seed(
            &config,
            &["My%20File.png", "kept%2Bplus.png"],
            &["kept%2Bplus.png"],
        )
        .await,
    );

    let first = {
        let reconciler = reconciler.clone();
        tokio::spawn(async move { reconciler.run().await })
            .await
            .unwrap()
            .unwrap()
    };
    assert_eq!(first.result.deleted_paths, vec!["My%20File.png"]);
    assert!(first.result.errors.is_empty());

    let second = reconciler.run().await.unwrap();
    assert_eq!(second.result.total_files, 1);
    assert_eq!(second.result.orphaned_files, 0);
    assert_eq!(second.result.deleted_files, 0);
}
