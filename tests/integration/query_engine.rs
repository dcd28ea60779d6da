#![allow(missing_docs)]

//! End-to-end checks of the unified query engine through a storage
//! backend, so operator semantics are exercised the way applications
//! reach them.

use std::sync::Arc;

use errante::{Config, FindOptions, GraphContext, MemoryBackend, SortKey, StorageBackend};
use serde_json::json;

async fn seeded_backend() -> MemoryBackend {
    let backend = MemoryBackend::new();
    let users = [
        ("u1", 25, vec!["python"]),
        ("u2", 30, vec!["rust", "python"]),
        ("u3", 35, vec!["go"]),
        ("u4", 40, vec!["java"]),
        ("u5", 45, vec!["rust", "go"]),
    ];
    for (id, age, skills) in users {
        backend
            .save(
                "node",
                json!({
                    "id": id,
                    "type_name": "User",
                    "context": {"age": age, "skills": skills},
                }),
            )
            .await
            .unwrap();
    }
    backend
}

#[tokio::test]
async fn conjunction_of_range_and_membership() {
    let backend = seeded_backend().await;
    let found = backend
        .find(
            "node",
            &json!({"$and": [
                {"context.age": {"$gte": 30}},
                {"context.skills": {"$in": ["rust", "go"]}},
            ]}),
            &FindOptions::default(),
        )
        .await
        .unwrap();
    let mut ids: Vec<&str> = found.iter().filter_map(|r| r["id"].as_str()).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec!["u2", "u3", "u5"]);
}

#[tokio::test]
async fn ne_excludes_exactly_the_matching_record() {
    let backend = seeded_backend().await;
    let found = backend
        .find(
            "node",
            &json!({"context.age": {"$ne": 35}}),
            &FindOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(found.len(), 4);
    assert!(found.iter().all(|r| r["id"] != json!("u3")));
}

#[tokio::test]
async fn empty_filter_matches_every_record() {
    let backend = seeded_backend().await;
    assert_eq!(backend.count("node", &json!({})).await.unwrap(), 5);
}

#[tokio::test]
async fn regex_and_exists_compose_with_or() {
    let backend = seeded_backend().await;
    backend
        .save(
            "node",
            json!({"id": "u6", "type_name": "User", "context": {"name": "Walker"}}),
        )
        .await
        .unwrap();
    let found = backend
        .find(
            "node",
            &json!({"$or": [
                {"context.name": {"$regex": "^wal", "$options": "i"}},
                {"context.age": {"$exists": false}},
            ]}),
            &FindOptions::default(),
        )
        .await
        .unwrap();
    // Only u6 lacks an age, and only u6 matches the pattern.
    assert_eq!(found.len(), 1);
    assert_eq!(found[0]["id"], json!("u6"));
}

#[tokio::test]
async fn sort_orders_by_collation_and_respects_pagination() {
    let backend = seeded_backend().await;
    let options = FindOptions {
        sort: Some(vec![SortKey::desc("context.age")]),
        skip: Some(1),
        limit: Some(3),
    };
    let found = backend.find("node", &json!({}), &options).await.unwrap();
    let ages: Vec<i64> = found
        .iter()
        .filter_map(|r| r["context"]["age"].as_i64())
        .collect();
    assert_eq!(ages, vec![40, 35, 30]);
}

#[tokio::test]
async fn malformed_filters_surface_as_query_errors() {
    let backend = seeded_backend().await;
    let err = backend
        .find("node", &json!({"context.age": {"$near": 30}}), &FindOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.code(), "QueryError");
}

#[tokio::test]
async fn update_documents_modify_matching_records() {
    let backend = Arc::new(seeded_backend().await);
    let ctx = GraphContext::with_backend(backend, Config::memory())
        .await
        .unwrap();

    let modified = ctx
        .update_nodes(
            &json!({"context.age": {"$gte": 40}}),
            &json!({"$push": {"context.skills": "mentoring"}, "$inc": {"context.age": 1}}),
        )
        .await
        .unwrap();
    assert_eq!(modified, 2);

    let senior = ctx
        .find_one_node(&json!({"id": "u5"}))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(senior.get_field("age"), Some(&json!(46)));
    assert_eq!(
        senior.get_field("skills"),
        Some(&json!(["rust", "go", "mentoring"]))
    );
}

#[tokio::test]
async fn empty_update_documents_are_rejected() {
    let backend = Arc::new(MemoryBackend::new());
    let ctx = GraphContext::with_backend(backend, Config::memory())
        .await
        .unwrap();
    let err = ctx
        .update_nodes(&json!({}), &json!({}))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "QueryError");
}
