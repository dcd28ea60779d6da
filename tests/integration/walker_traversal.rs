#![allow(missing_docs)]

//! Walker engine scenarios: traversal order, hook dispatch, control
//! actions, and runaway protection.

use std::time::Duration;

use errante::{
    Config, ConnectOptions, GraphContext, GraphError, HookFuture, Node, NodeQuery, NodeType,
    ProtectionConfig, VisitScope, Walker, WalkerState, WalkerType,
};
use serde_json::{json, Map, Value};

async fn ctx() -> GraphContext {
    GraphContext::initialize(Config::memory()).await.unwrap()
}

fn fields(pairs: &[(&str, Value)]) -> Map<String, Value> {
    pairs
        .iter()
        .map(|(key, value)| (key.to_string(), value.clone()))
        .collect()
}

/// A -> B -> C, returning the three bound nodes.
async fn chain(ctx: &GraphContext) -> (Node, Node, Node) {
    let mut a = ctx
        .create_node("Spot", fields(&[("name", json!("A"))]))
        .await
        .unwrap();
    let mut b = ctx
        .create_node("Spot", fields(&[("name", json!("B"))]))
        .await
        .unwrap();
    let mut c = ctx
        .create_node("Spot", fields(&[("name", json!("C"))]))
        .await
        .unwrap();
    a.connect(&mut b, ConnectOptions::default()).await.unwrap();
    b.connect(&mut c, ConnectOptions::default()).await.unwrap();
    (a, b, c)
}

fn collect_and_expand<'s>(scope: &'s mut VisitScope<'_>) -> HookFuture<'s> {
    Box::pin(async move {
        let here_id = scope.here_id().unwrap_or_default().to_string();
        scope.walker.report_push("visited", json!(here_id));
        let neighbors = {
            let node = scope.here_node().expect("node hook");
            node.nodes(&NodeQuery::new()).await?
        };
        scope.walker.visit(neighbors.iter());
        Ok(())
    })
}

fn count_exit<'s>(scope: &'s mut VisitScope<'_>) -> HookFuture<'s> {
    Box::pin(async move {
        let count = scope
            .walker
            .response()
            .get("exits")
            .and_then(Value::as_i64)
            .unwrap_or(0);
        scope.walker.report("exits", json!(count + 1));
        Ok(())
    })
}

#[tokio::test]
async fn chain_traversal_visits_in_breadth_order() {
    WalkerType::define("ChainCollector")
        .on_visit(&["Node"], collect_and_expand)
        .register()
        .unwrap();

    let ctx = ctx().await;
    let (a, b, c) = chain(&ctx).await;

    let mut walker = Walker::new("ChainCollector");
    walker.spawn(&a).await.unwrap();

    let expected = json!([a.id(), b.id(), c.id()]);
    assert_eq!(walker.response()["visited"], expected);
    assert_eq!(walker.state(), WalkerState::Finished);
    assert_eq!(walker.step_count(), 3);
    assert_eq!(walker.trail(), vec![a.id(), b.id(), c.id()]);

    // The first hop crossed no edge; the next two did.
    let edges = walker.trail_edges();
    assert!(edges[0].is_none());
    assert!(edges[1].is_some());
    assert!(edges[2].is_some());
}

fn requeue_here<'s>(scope: &'s mut VisitScope<'_>) -> HookFuture<'s> {
    Box::pin(async move {
        let here = scope.here_node().map(|node| node.clone());
        if let Some(node) = here {
            scope.walker.visit([&node]);
        }
        Ok(())
    })
}

#[tokio::test]
async fn revisit_cap_disengages_with_exit_fired_once() {
    WalkerType::define("LoopForever")
        .on_visit(&["Node"], requeue_here)
        .on_exit(count_exit)
        .register()
        .unwrap();

    let ctx = ctx().await;
    let start = ctx.create_node("Spot", Map::new()).await.unwrap();

    let mut walker = Walker::new("LoopForever");
    walker.set_protection(ProtectionConfig {
        enabled: true,
        max_steps: 10_000,
        max_visits_per_node: 3,
        max_execution_time: Duration::from_secs(60),
        max_queue_size: 1_000,
    });
    walker.spawn(&start).await.unwrap();

    assert_eq!(walker.visit_count(start.id()), 3);
    assert_eq!(walker.state(), WalkerState::Disengaged);
    assert_eq!(walker.response()["exits"], json!(1));
    assert_eq!(
        walker.response()["_protection_halted"]["code"],
        json!("WalkerProtectionError")
    );
}

#[tokio::test]
async fn step_cap_halts_a_long_chain() {
    WalkerType::define("ShortLeash")
        .on_visit(&["Node"], collect_and_expand)
        .register()
        .unwrap();

    let ctx = ctx().await;
    let (a, ..) = chain(&ctx).await;

    let mut walker = Walker::new("ShortLeash");
    walker.set_protection(ProtectionConfig {
        enabled: true,
        max_steps: 2,
        max_visits_per_node: 100,
        max_execution_time: Duration::from_secs(60),
        max_queue_size: 1_000,
    });
    walker.spawn(&a).await.unwrap();

    assert_eq!(walker.state(), WalkerState::Disengaged);
    assert_eq!(walker.step_count(), 2);
}

fn expand_probe<'s>(scope: &'s mut VisitScope<'_>) -> HookFuture<'s> {
    Box::pin(async move {
        let id = scope.here_id().unwrap_or_default().to_string();
        scope.walker.report_push("sequence", json!(format!("node:{id}")));
        let neighbors = {
            let node = scope.here_node().expect("node hook");
            node.nodes(&NodeQuery::new()).await?
        };
        scope.walker.visit(neighbors.iter());
        Ok(())
    })
}

fn edge_probe<'s>(scope: &'s mut VisitScope<'_>) -> HookFuture<'s> {
    Box::pin(async move {
        let id = scope.here_id().unwrap_or_default().to_string();
        scope.walker.report_push("sequence", json!(format!("edge:{id}")));
        Ok(())
    })
}

#[tokio::test]
async fn crossed_edges_are_visited_before_their_nodes() {
    WalkerType::define("EdgeObserver")
        .on_visit(&["Node"], expand_probe)
        .on_visit(&["Edge"], edge_probe)
        .register()
        .unwrap();

    let ctx = ctx().await;
    let mut a = ctx.create_node("Spot", Map::new()).await.unwrap();
    let mut b = ctx.create_node("Spot", Map::new()).await.unwrap();
    let edge = a.connect(&mut b, ConnectOptions::default()).await.unwrap();

    let mut walker = Walker::new("EdgeObserver");
    walker.spawn(&a).await.unwrap();

    assert_eq!(
        walker.response()["sequence"],
        json!([
            format!("node:{}", a.id()),
            format!("edge:{}", edge.id()),
            format!("node:{}", b.id()),
        ])
    );
}

fn walker_marker<'s>(scope: &'s mut VisitScope<'_>) -> HookFuture<'s> {
    Box::pin(async move {
        scope.walker.report_push("order", json!("walker"));
        Ok(())
    })
}

fn entity_marker<'s>(scope: &'s mut VisitScope<'_>) -> HookFuture<'s> {
    Box::pin(async move {
        scope.walker.report_push("order", json!("entity"));
        // Smart entities may mutate and persist themselves mid-visit.
        let here = scope.here_node().map(|node| node.clone());
        if let Some(mut node) = here {
            node.set_field("inspected", json!(true))?;
            node.save().await?;
        }
        Ok(())
    })
}

#[tokio::test]
async fn walker_hooks_fire_before_entity_hooks() {
    WalkerType::define("Inspector")
        .on_visit(&[], walker_marker)
        .register()
        .unwrap();
    NodeType::define("SmartDoor")
        .on_visit(&["Inspector"], entity_marker)
        .register()
        .unwrap();

    let ctx = ctx().await;
    let door = ctx.create_node("SmartDoor", Map::new()).await.unwrap();

    let mut walker = Walker::new("Inspector");
    walker.spawn(&door).await.unwrap();

    assert_eq!(walker.response()["order"], json!(["walker", "entity"]));
    let stored = ctx.get_node(door.id()).await.unwrap().unwrap();
    assert_eq!(stored.get_field("inspected"), Some(&json!(true)));
}

fn expand_then_pause_at_mark<'s>(scope: &'s mut VisitScope<'_>) -> HookFuture<'s> {
    Box::pin(async move {
        let neighbors = {
            let node = scope.here_node().expect("node hook");
            node.nodes(&NodeQuery::new()).await?
        };
        scope.walker.visit(neighbors.iter());
        let marked = {
            let node = scope.here_node().expect("node hook");
            node.get_field("pause_here")
                .and_then(Value::as_bool)
                .unwrap_or(false)
        };
        if marked {
            scope.walker.pause(Some("checkpoint"));
        }
        Ok(())
    })
}

#[tokio::test]
async fn pause_exits_after_the_current_entity_and_resumes() {
    WalkerType::define("Checkpointer")
        .on_visit(&["Node"], expand_then_pause_at_mark)
        .on_exit(count_exit)
        .register()
        .unwrap();

    let ctx = ctx().await;
    let (a, mut b, c) = chain(&ctx).await;
    b.set_field("pause_here", json!(true)).unwrap();
    b.save().await.unwrap();

    let mut walker = Walker::new("Checkpointer");
    walker.spawn(&a).await.unwrap();

    assert_eq!(walker.state(), WalkerState::Paused);
    assert_eq!(walker.trail(), vec![a.id(), b.id()]);
    assert_eq!(walker.response()["_paused"]["reason"], json!("checkpoint"));
    // Pausing is a loop exit, so exit hooks have already fired once.
    assert_eq!(walker.response()["exits"], json!(1));

    walker.resume().await.unwrap();
    assert_eq!(walker.state(), WalkerState::Finished);
    assert_eq!(walker.trail(), vec![a.id(), b.id(), c.id()]);
    // And once more at the final finish.
    assert_eq!(walker.response()["exits"], json!(2));

    // A finished walker is not resumable.
    assert!(walker.resume().await.is_err());
}

fn disengage_immediately<'s>(scope: &'s mut VisitScope<'_>) -> HookFuture<'s> {
    Box::pin(async move {
        scope.walker.disengage();
        Ok(())
    })
}

#[tokio::test]
async fn disengage_is_irreversible() {
    WalkerType::define("OneLook")
        .on_visit(&["Node"], disengage_immediately)
        .on_exit(count_exit)
        .register()
        .unwrap();

    let ctx = ctx().await;
    let (a, ..) = chain(&ctx).await;

    let mut walker = Walker::new("OneLook");
    walker.spawn(&a).await.unwrap();

    assert_eq!(walker.state(), WalkerState::Disengaged);
    assert_eq!(walker.trail(), vec![a.id()]);
    assert_eq!(walker.response()["exits"], json!(1));

    let err = walker.resume().await.unwrap_err();
    assert_eq!(err.code(), "ValidationError");
}

fn fail_on_visit<'s>(_scope: &'s mut VisitScope<'_>) -> HookFuture<'s> {
    Box::pin(async move { Err(GraphError::Validation("boom".to_string())) })
}

#[tokio::test]
async fn hook_errors_propagate_after_exit_hooks_run() {
    WalkerType::define("Faulty")
        .on_visit(&["Node"], fail_on_visit)
        .on_exit(count_exit)
        .register()
        .unwrap();

    let ctx = ctx().await;
    let start = ctx.create_node("Spot", Map::new()).await.unwrap();

    let mut walker = Walker::new("Faulty");
    let err = walker.spawn(&start).await.unwrap_err();
    assert_eq!(err.code(), "ValidationError");
    assert_eq!(walker.state(), WalkerState::Disengaged);
    assert_eq!(walker.response()["exits"], json!(1));
}

fn expand_and_skip_marked<'s>(scope: &'s mut VisitScope<'_>) -> HookFuture<'s> {
    Box::pin(async move {
        let neighbors = {
            let node = scope.here_node().expect("node hook");
            node.nodes(&NodeQuery::new()).await?
        };
        scope.walker.visit(neighbors.iter());
        let marked = {
            let node = scope.here_node().expect("node hook");
            node.get_field("skip_rest")
                .and_then(Value::as_bool)
                .unwrap_or(false)
        };
        if marked {
            scope.walker.skip();
        }
        Ok(())
    })
}

fn record_second_pass<'s>(scope: &'s mut VisitScope<'_>) -> HookFuture<'s> {
    Box::pin(async move {
        let here_id = scope.here_id().unwrap_or_default().to_string();
        scope.walker.report_push("second", json!(here_id));
        Ok(())
    })
}

#[tokio::test]
async fn skip_abandons_remaining_hooks_for_the_current_entity() {
    WalkerType::define("Skipper")
        .on_visit(&["Node"], expand_and_skip_marked)
        .on_visit(&["Node"], record_second_pass)
        .register()
        .unwrap();

    let ctx = ctx().await;
    let (a, mut b, c) = chain(&ctx).await;
    b.set_field("skip_rest", json!(true)).unwrap();
    b.save().await.unwrap();

    let mut walker = Walker::new("Skipper");
    walker.spawn(&a).await.unwrap();

    // B's second hook was skipped; traversal itself continued to C.
    assert_eq!(walker.state(), WalkerState::Finished);
    assert_eq!(walker.trail(), vec![a.id(), b.id(), c.id()]);
    assert_eq!(walker.response()["second"], json!([a.id(), c.id()]));
}

#[tokio::test]
async fn trail_accessors_fetch_live_entities() {
    WalkerType::define("TrailReader")
        .on_visit(&["Node"], collect_and_expand)
        .register()
        .unwrap();

    let ctx = ctx().await;
    let (a, b, ..) = chain(&ctx).await;

    let mut walker = Walker::new("TrailReader");
    walker.spawn(&a).await.unwrap();

    let nodes = walker.trail_nodes().await.unwrap();
    assert_eq!(nodes.len(), 3);
    let path = walker.trail_path().await.unwrap();
    assert!(path[0].1.is_none());
    let crossed = path[1].1.as_ref().expect("edge into second node");
    assert!(crossed.touches(a.id()) && crossed.touches(b.id()));

    assert_eq!(walker.recent_trail(1), vec![path[2].0.id().to_string()]);
    let last_meta = walker.trail_metadata_at(-1).unwrap();
    assert_eq!(last_meta["step"], json!(3));
}

#[tokio::test]
async fn walker_without_hooks_finishes_after_the_start_node() {
    let ctx = ctx().await;
    let start = ctx.create_node("Spot", Map::new()).await.unwrap();

    let mut walker = Walker::new("UnregisteredRoamer");
    walker.spawn(&start).await.unwrap();

    assert_eq!(walker.state(), WalkerState::Finished);
    assert_eq!(walker.trail(), vec![start.id()]);
    assert_eq!(walker.step_count(), 1);
}

#[tokio::test]
async fn independent_walkers_share_a_backend_concurrently() {
    WalkerType::define("ParallelCollector")
        .on_visit(&["Node"], collect_and_expand)
        .register()
        .unwrap();

    let ctx = ctx().await;
    let (a, ..) = chain(&ctx).await;

    let first = a.clone();
    let second = a.clone();
    let task_one = tokio::spawn(async move {
        let mut walker = Walker::new("ParallelCollector");
        walker.spawn(&first).await.unwrap();
        walker.trail().len()
    });
    let task_two = tokio::spawn(async move {
        let mut walker = Walker::new("ParallelCollector");
        walker.spawn(&second).await.unwrap();
        walker.trail().len()
    });

    let (one, two) = tokio::join!(task_one, task_two);
    assert_eq!(one.unwrap(), 3);
    assert_eq!(two.unwrap(), 3);
}
