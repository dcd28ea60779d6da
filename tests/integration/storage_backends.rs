#![allow(missing_docs)]

//! Backend conformance: the file and sqlite stores must agree with the
//! in-memory reference on the storage contract.

use errante::{FileBackend, FindOptions, MemoryBackend, SqliteBackend, StorageBackend};
use serde_json::{json, Value};
use tempfile::tempdir;

fn sample(id: &str, name: &str, rank: i64) -> Value {
    json!({
        "id": id,
        "type_name": "Sample",
        "context": {"name": name, "rank": rank},
    })
}

async fn conformance(backend: &dyn StorageBackend) {
    // Upsert and round-trip.
    let record = sample("s1", "first", 1);
    let stored = backend.save("items", record.clone()).await.unwrap();
    assert_eq!(stored, record);
    assert_eq!(backend.get("items", "s1").await.unwrap(), Some(record));

    // Second save replaces in place.
    backend.save("items", sample("s1", "first", 2)).await.unwrap();
    assert_eq!(backend.count("items", &json!({})).await.unwrap(), 1);

    // Find with filters, options, and the id pushdown path.
    backend.save("items", sample("s2", "second", 5)).await.unwrap();
    backend.save("items", sample("s3", "third", 9)).await.unwrap();
    let found = backend
        .find(
            "items",
            &json!({"context.rank": {"$gte": 5}}),
            &FindOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(found.len(), 2);
    let by_id = backend
        .find(
            "items",
            &json!({"id": {"$in": ["s1", "s3"]}}),
            &FindOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(by_id.len(), 2);
    let one = backend
        .find_one("items", &json!({"id": "s2"}))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(one["context"]["name"], json!("second"));

    // Distinct and bulk save.
    let ranks = backend
        .distinct("items", "context.rank", &json!({}))
        .await
        .unwrap();
    assert_eq!(ranks.len(), 3);
    backend
        .bulk_save("items", vec![sample("s4", "fourth", 3), sample("s5", "fifth", 4)])
        .await
        .unwrap();
    assert_eq!(backend.count("items", &json!({})).await.unwrap(), 5);

    // Idempotent delete.
    backend.delete("items", "s4").await.unwrap();
    backend.delete("items", "s4").await.unwrap();
    assert!(backend.get("items", "s4").await.unwrap().is_none());

    assert!(backend
        .collections()
        .await
        .unwrap()
        .contains(&"items".to_string()));
}

#[tokio::test]
async fn memory_backend_conformance() {
    conformance(&MemoryBackend::new()).await;
}

#[tokio::test]
async fn file_backend_conformance() {
    let dir = tempdir().unwrap();
    conformance(&FileBackend::new(dir.path())).await;
}

#[tokio::test]
async fn sqlite_backend_conformance() {
    let dir = tempdir().unwrap();
    let backend = SqliteBackend::open(dir.path().join("graph.db")).await.unwrap();
    conformance(&backend).await;
    backend.close().await.unwrap();
}

#[tokio::test]
async fn file_backend_layout_is_one_json_array_per_collection() {
    let dir = tempdir().unwrap();
    let backend = FileBackend::new(dir.path());
    backend.save("node", sample("n1", "a", 1)).await.unwrap();
    backend.save("edge", sample("e1", "b", 2)).await.unwrap();

    let node_file = dir.path().join("node.json");
    assert!(node_file.exists());
    assert!(dir.path().join("edge.json").exists());
    assert!(!dir.path().join("node.json.tmp").exists(), "tmp file renamed away");

    let parsed: Vec<Value> =
        serde_json::from_slice(&std::fs::read(&node_file).unwrap()).unwrap();
    assert_eq!(parsed.len(), 1);
    assert_eq!(parsed[0]["id"], json!("n1"));
}

#[tokio::test]
async fn file_backend_reloads_from_disk() {
    let dir = tempdir().unwrap();
    {
        let backend = FileBackend::new(dir.path());
        backend.save("node", sample("n1", "kept", 1)).await.unwrap();
    }
    let reopened = FileBackend::new(dir.path());
    let record = reopened.get("node", "n1").await.unwrap().unwrap();
    assert_eq!(record["context"]["name"], json!("kept"));
}

#[tokio::test]
async fn sqlite_backend_persists_across_connections() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("graph.db");
    {
        let backend = SqliteBackend::open(&path).await.unwrap();
        backend.save("node", sample("n1", "kept", 1)).await.unwrap();
        backend.close().await.unwrap();
    }
    let reopened = SqliteBackend::open(&path).await.unwrap();
    let record = reopened.get("node", "n1").await.unwrap().unwrap();
    assert_eq!(record["context"]["name"], json!("kept"));
}

#[tokio::test]
async fn corrupt_collection_files_are_reported_not_swallowed() {
    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join("node.json"), b"not json").unwrap();
    let backend = FileBackend::new(dir.path());
    let err = backend.get("node", "n1").await.unwrap_err();
    assert_eq!(err.code(), "DatabaseError");
}

#[tokio::test]
async fn invalid_collection_names_are_rejected() {
    let backend = MemoryBackend::new();
    let dir = tempdir().unwrap();
    let file = FileBackend::new(dir.path());
    backend.save("ok_name-1", sample("x", "x", 1)).await.unwrap();
    assert!(file.save("../escape", sample("x", "x", 1)).await.is_err());
}
