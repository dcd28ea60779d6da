#![allow(missing_docs)]

//! Context lifecycle: backend selection, root bootstrap, scoped ambient
//! contexts, and operation counters.

use errante::{
    open_backend, Config, ConnectOptions, GraphContext, Node, NodeQuery, Walker, WalkerState,
};
use serde_json::{json, Map};
use tempfile::tempdir;

#[tokio::test]
async fn factory_opens_every_configured_backend() {
    let dir = tempdir().unwrap();

    let memory = open_backend(&Config::memory()).await.unwrap();
    assert!(memory.get("node", "missing").await.unwrap().is_none());

    let file = open_backend(&Config::file(dir.path().join("files")))
        .await
        .unwrap();
    file.save("node", json!({"id": "n1"})).await.unwrap();

    let sqlite = open_backend(&Config::sqlite(dir.path().join("graph.db")))
        .await
        .unwrap();
    sqlite.save("node", json!({"id": "n1"})).await.unwrap();
}

#[tokio::test]
async fn root_exists_before_any_other_operation() {
    let ctx = GraphContext::initialize(Config::memory()).await.unwrap();
    let root = ctx.root().await.unwrap();
    assert_eq!(root.id(), Node::ROOT_ID);

    // Walkers can start at the root like any node.
    let mut walker = Walker::new("RootProbe");
    walker.spawn(&root).await.unwrap();
    assert_eq!(walker.state(), WalkerState::Finished);
    assert_eq!(walker.trail(), vec![Node::ROOT_ID.to_string()]);
}

#[tokio::test]
async fn file_contexts_persist_the_graph_between_openings() {
    let dir = tempdir().unwrap();
    let config = Config::file(dir.path());

    let (spot_id, edge_id);
    {
        let ctx = GraphContext::initialize(config.clone()).await.unwrap();
        let mut root = ctx.root().await.unwrap();
        let mut spot = ctx
            .create_node("Spot", Map::from_iter([("name".to_string(), json!("kept"))]))
            .await
            .unwrap();
        let edge = root.connect(&mut spot, ConnectOptions::default()).await.unwrap();
        spot_id = spot.id().to_string();
        edge_id = edge.id().to_string();
        ctx.close().await.unwrap();
    }

    let reopened = GraphContext::initialize(config).await.unwrap();
    let spot = reopened.get_node(&spot_id).await.unwrap().unwrap();
    assert_eq!(spot.get_field("name"), Some(&json!("kept")));
    assert!(spot.edge_ids().contains(&edge_id));

    let root = reopened.root().await.unwrap();
    let neighbors = root.nodes(&NodeQuery::new()).await.unwrap();
    assert_eq!(neighbors.len(), 1);
    assert_eq!(neighbors[0].id(), spot_id);
}

#[tokio::test]
async fn sqlite_contexts_support_the_full_graph_surface() {
    let dir = tempdir().unwrap();
    let ctx = GraphContext::initialize(Config::sqlite(dir.path().join("graph.db")))
        .await
        .unwrap();

    let mut a = ctx.create_node("Spot", Map::new()).await.unwrap();
    let mut b = ctx
        .create_node("Spot", Map::from_iter([("name".to_string(), json!("far"))]))
        .await
        .unwrap();
    a.connect(&mut b, ConnectOptions::default()).await.unwrap();

    let neighbors = a.nodes(&NodeQuery::new()).await.unwrap();
    assert_eq!(neighbors.len(), 1);
    assert_eq!(neighbors[0].get_field("name"), Some(&json!("far")));

    ctx.close().await.unwrap();
}

#[tokio::test]
async fn scoped_contexts_route_ambient_operations() {
    let scoped = GraphContext::initialize(Config::memory()).await.unwrap();

    let id = scoped
        .scope(async {
            let ambient = GraphContext::current().await.unwrap();
            let node = ambient.create_node("Spot", Map::new()).await.unwrap();
            node.id().to_string()
        })
        .await;

    // The node landed in the scoped context's backend.
    assert!(scoped.get_node(&id).await.unwrap().is_some());
}

#[tokio::test]
async fn generic_objects_live_in_their_own_collection() {
    let ctx = GraphContext::initialize(Config::memory()).await.unwrap();
    let mut settings = ctx
        .create_object(
            "Setting",
            Map::from_iter([("theme".to_string(), json!("dark"))]),
        )
        .await
        .unwrap();
    assert!(settings.id().starts_with("o:Setting:"));

    settings.set_field("theme", json!("light")).unwrap();
    settings.save().await.unwrap();

    let found = ctx.find_objects_by(&[("theme", json!("light"))]).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(ctx.count_objects(&json!({})).await.unwrap(), 1);

    found[0].delete().await.unwrap();
    assert!(ctx.get_object(settings.id()).await.unwrap().is_none());
}

#[tokio::test]
async fn counters_reflect_dispatched_operations() {
    let ctx = GraphContext::initialize(Config::memory()).await.unwrap();
    let before = ctx.stats();

    let mut node = ctx.create_node("Spot", Map::new()).await.unwrap();
    node.set_field("touched", json!(true)).unwrap();
    node.save().await.unwrap();
    ctx.all_nodes().await.unwrap();
    node.delete().await.unwrap();

    let after = ctx.stats();
    assert!(after.saves >= before.saves + 2);
    assert!(after.queries > before.queries);
    assert!(after.deletes >= before.deletes + 1);
}
