#![allow(clippy::expect_used)]

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use terrace_domain::{
    Diagnostic, Diagnostics, Expression, LocalConfig, ModuleInstance, VertexStatus,
};

use super::{CancelToken, WalkOptions, walk};
use crate::error::WalkError;
use crate::graph::Graph;
use crate::node::{LocalNode, NodeKey, Vertex};

fn key(name: &str) -> NodeKey {
    NodeKey::local(&ModuleInstance::root(), name)
}

fn graph_of(names: &[&str], edges: &[(&str, &str)]) -> Graph {
    let mut graph = Graph::new(ModuleInstance::root());
    for name in names {
        graph
            .add(Vertex::Local(LocalNode {
                module: ModuleInstance::root(),
                config: LocalConfig {
                    name: (*name).to_string(),
                    expr: Expression::default(),
                },
            }))
            .expect("add vertex");
    }
    for (from, to) in edges {
        graph.connect(&key(from), &key(to));
    }
    graph
}

fn ok(_: &NodeKey, _: &Vertex) -> Result<Diagnostics, WalkError> {
    Ok(Diagnostics::new())
}

#[test]
fn dependencies_finish_before_dependents_start() {
    let graph = graph_of(
        &["a", "b", "c", "d"],
        &[("a", "b"), ("a", "c"), ("b", "d"), ("c", "d")],
    );
    let order = Mutex::new(Vec::new());
    let visitor = |key: &NodeKey, _: &Vertex| -> Result<Diagnostics, WalkError> {
        order.lock().expect("order lock").push(key.clone());
        Ok(Diagnostics::new())
    };

    let summary = walk(&graph, &visitor, &WalkOptions::default()).expect("walk");

    let order = order.into_inner().expect("order");
    let position = |name: &str| {
        order
            .iter()
            .position(|visited| *visited == key(name))
            .expect("visited")
    };
    assert_eq!(order.len(), 4);
    assert!(position("d") < position("b"));
    assert!(position("d") < position("c"));
    assert!(position("b") < position("a"));
    assert!(position("c") < position("a"));
    assert_eq!(summary.count(VertexStatus::Done), 4);
    assert!(summary.diagnostics.is_empty());
    assert!(!summary.cancelled);
}

#[test]
fn failures_skip_dependents_but_not_siblings() {
    let graph = graph_of(
        &["leaf", "broken", "after_broken", "sibling"],
        &[("broken", "leaf"), ("after_broken", "broken"), ("sibling", "leaf")],
    );
    let visited = Mutex::new(Vec::new());
    let visitor = |key: &NodeKey, _: &Vertex| -> Result<Diagnostics, WalkError> {
        visited.lock().expect("visited lock").push(key.clone());
        if *key == self::key("broken") {
            return Ok(Diagnostic::error("Provider failed", "boom").at(key).into());
        }
        Ok(Diagnostics::new())
    };

    let summary = walk(&graph, &visitor, &WalkOptions::default()).expect("walk");

    assert_eq!(summary.status("local.leaf"), Some(VertexStatus::Done));
    assert_eq!(summary.status("local.broken"), Some(VertexStatus::Failed));
    assert_eq!(
        summary.status("local.after_broken"),
        Some(VertexStatus::Skipped)
    );
    assert_eq!(summary.status("local.sibling"), Some(VertexStatus::Done));
    assert!(
        !visited
            .into_inner()
            .expect("visited")
            .contains(&key("after_broken"))
    );
    assert_eq!(summary.diagnostics.errors().count(), 1);
    assert_eq!(
        summary.diagnostics.iter().next().map(|d| d.address.clone()),
        Some(Some("local.broken".to_string()))
    );
}

#[test]
fn skips_propagate_transitively() {
    let graph = graph_of(&["a", "b", "c"], &[("a", "b"), ("b", "c")]);
    let visitor = |key: &NodeKey, _: &Vertex| -> Result<Diagnostics, WalkError> {
        if *key == self::key("c") {
            return Ok(Diagnostic::error("failed", "").into());
        }
        Ok(Diagnostics::new())
    };

    let summary = walk(&graph, &visitor, &WalkOptions::default()).expect("walk");

    assert_eq!(summary.status("local.b"), Some(VertexStatus::Skipped));
    assert_eq!(summary.status("local.a"), Some(VertexStatus::Skipped));
}

#[test]
fn cancellation_lets_running_visitors_finish() {
    let graph = graph_of(&["a", "b", "c"], &[("a", "b"), ("b", "c")]);
    let options = WalkOptions {
        parallelism: Some(2),
        cancel: CancelToken::new(),
    };
    let visitor = |key: &NodeKey, _: &Vertex| -> Result<Diagnostics, WalkError> {
        if *key == self::key("c") {
            options.cancel.cancel();
        }
        Ok(Diagnostics::new())
    };

    let summary = walk(&graph, &visitor, &options).expect("walk");

    assert!(summary.cancelled);
    assert_eq!(summary.status("local.c"), Some(VertexStatus::Done));
    assert_eq!(summary.status("local.b"), Some(VertexStatus::Skipped));
    assert_eq!(summary.status("local.a"), Some(VertexStatus::Skipped));
}

#[test]
fn cancelled_before_start_visits_nothing() {
    let graph = graph_of(&["a", "b"], &[]);
    let options = WalkOptions::default();
    options.cancel.cancel();
    let visits = AtomicUsize::new(0);
    let visitor = |_: &NodeKey, _: &Vertex| -> Result<Diagnostics, WalkError> {
        visits.fetch_add(1, Ordering::SeqCst);
        Ok(Diagnostics::new())
    };

    let summary = walk(&graph, &visitor, &options).expect("walk");

    assert_eq!(visits.load(Ordering::SeqCst), 0);
    assert_eq!(summary.count(VertexStatus::Skipped), 2);
}

#[test]
fn invariant_violations_abort_the_walk() {
    let graph = graph_of(&["a", "b", "c"], &[("a", "b")]);
    let visitor = |key: &NodeKey, _: &Vertex| -> Result<Diagnostics, WalkError> {
        if *key == self::key("b") {
            return Err(WalkError::Invariant {
                vertex: key.to_string(),
                message: "provider handle missing".to_string(),
            });
        }
        Ok(Diagnostics::new())
    };

    let error = walk(&graph, &visitor, &WalkOptions::default()).expect_err("must abort");

    assert_eq!(
        error.to_string(),
        "internal walk error at local.b: provider handle missing"
    );
}

#[test]
fn independent_vertices_run_concurrently() {
    let graph = graph_of(&["a", "b"], &[]);
    let arrived = AtomicUsize::new(0);
    let overlapped = AtomicUsize::new(0);
    let visitor = |_: &NodeKey, _: &Vertex| -> Result<Diagnostics, WalkError> {
        arrived.fetch_add(1, Ordering::SeqCst);
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if arrived.load(Ordering::SeqCst) == 2 {
                overlapped.fetch_add(1, Ordering::SeqCst);
                break;
            }
            std::thread::yield_now();
        }
        Ok(Diagnostics::new())
    };

    let summary = walk(&graph, &visitor, &WalkOptions::default()).expect("walk");

    assert_eq!(summary.count(VertexStatus::Done), 2);
    assert_eq!(overlapped.load(Ordering::SeqCst), 2);
}

#[test]
fn single_worker_still_visits_everything() {
    let graph = graph_of(&["a", "b", "c", "d"], &[("a", "b")]);
    let options = WalkOptions {
        parallelism: Some(1),
        cancel: CancelToken::new(),
    };

    let summary = walk(&graph, &ok, &options).expect("walk");

    assert_eq!(summary.count(VertexStatus::Done), 4);
}

#[test]
fn empty_graphs_walk_trivially() {
    let graph = Graph::new(ModuleInstance::root());
    let summary = walk(&graph, &ok, &WalkOptions::default()).expect("walk");
    assert!(summary.statuses.is_empty());
}

#[test]
fn every_runnable_vertex_gets_a_worker() {
    // b, c and d are runnable together once a is done, although no depth
    // level holds more than two of them.
    let graph = graph_of(&["a", "b", "c", "d"], &[("c", "a"), ("d", "a")]);
    let waiting = AtomicUsize::new(0);
    let peak = AtomicUsize::new(0);
    let visitor = |key: &NodeKey, _: &Vertex| -> Result<Diagnostics, WalkError> {
        if *key == self::key("a") {
            return Ok(Diagnostics::new());
        }
        let arrived = waiting.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(arrived, Ordering::SeqCst);
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline && waiting.load(Ordering::SeqCst) < 3 {
            std::thread::yield_now();
        }
        peak.fetch_max(waiting.load(Ordering::SeqCst), Ordering::SeqCst);
        Ok(Diagnostics::new())
    };

    let started = Instant::now();
    let summary = walk(&graph, &visitor, &WalkOptions::default()).expect("walk");

    assert_eq!(summary.count(VertexStatus::Done), 4);
    assert_eq!(peak.load(Ordering::SeqCst), 3);
    assert!(started.elapsed() < Duration::from_secs(5));
}
