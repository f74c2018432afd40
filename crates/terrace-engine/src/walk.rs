use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use terrace_domain::{Diagnostics, VertexStatus, WalkSummary};

use crate::error::WalkError;
use crate::graph::Graph;
use crate::node::{NodeKey, Vertex};

/// Cooperative cancellation shared between a walk and its caller. Vertices
/// that have not started yet are skipped once it is set; running visitors
/// finish normally.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Default)]
pub struct WalkOptions {
    /// Upper bound on concurrently running visitors. Without it every
    /// runnable vertex gets a worker.
    pub parallelism: Option<usize>,
    pub cancel: CancelToken,
}

/// Work done for one vertex. Diagnostics with errors fail the vertex and
/// skip everything depending on it. An `Err` is an internal inconsistency:
/// it aborts the walk.
pub trait Visitor: Sync {
    /// # Errors
    ///
    /// Returns an error when the vertex cannot be evaluated because the walk
    /// itself is inconsistent.
    fn visit(&self, key: &NodeKey, vertex: &Vertex) -> Result<Diagnostics, WalkError>;
}

impl<F> Visitor for F
where
    F: Fn(&NodeKey, &Vertex) -> Result<Diagnostics, WalkError> + Sync,
{
    fn visit(&self, key: &NodeKey, vertex: &Vertex) -> Result<Diagnostics, WalkError> {
        self(key, vertex)
    }
}

#[derive(Default)]
struct Progress {
    remaining: BTreeMap<NodeKey, usize>,
    blocked: BTreeSet<NodeKey>,
    statuses: BTreeMap<NodeKey, VertexStatus>,
    diagnostics: Diagnostics,
    invariant: Option<WalkError>,
}

struct Walk<'a, V: ?Sized> {
    graph: &'a Graph,
    visitor: &'a V,
    cancel: CancelToken,
    aborted: AtomicBool,
    progress: Mutex<Progress>,
}

impl<'a, V> Walk<'a, V>
where
    V: Visitor + ?Sized,
{
    fn new(graph: &'a Graph, visitor: &'a V, cancel: CancelToken) -> Self {
        let mut progress = Progress::default();
        for key in graph.keys() {
            let count = graph.dependencies(&key).count();
            progress.remaining.insert(key.clone(), count);
            progress.statuses.insert(key, VertexStatus::Pending);
        }
        Self {
            graph,
            visitor,
            cancel,
            aborted: AtomicBool::new(false),
            progress: Mutex::new(progress),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Progress> {
        self.progress.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn stopping(&self) -> bool {
        self.cancel.is_cancelled() || self.aborted.load(Ordering::SeqCst)
    }

    fn initially_ready(&self) -> Vec<NodeKey> {
        let mut progress = self.lock();
        let ready: Vec<NodeKey> = progress
            .remaining
            .iter()
            .filter(|(_, remaining)| **remaining == 0)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &ready {
            progress.statuses.insert(key.clone(), VertexStatus::Runnable);
        }
        ready
    }

    fn spawn<'s>(&'s self, scope: &rayon::Scope<'s>, key: NodeKey) {
        scope.spawn(move |scope| self.run(scope, key));
    }

    fn run<'s>(&'s self, scope: &rayon::Scope<'s>, key: NodeKey) {
        let status = if self.stopping() {
            VertexStatus::Skipped
        } else if let Some(vertex) = self.graph.vertex(&key) {
            self.lock()
                .statuses
                .insert(key.clone(), VertexStatus::Running);
            self.visit(&key, vertex)
        } else {
            self.abort(WalkError::Invariant {
                vertex: key.to_string(),
                message: "vertex disappeared during the walk".to_string(),
            });
            VertexStatus::Failed
        };

        for next in self.complete(key, status) {
            self.spawn(scope, next);
        }
    }

    fn visit(&self, key: &NodeKey, vertex: &Vertex) -> VertexStatus {
        tracing::debug!(vertex = %key, "visiting");
        match self.visitor.visit(key, vertex) {
            Ok(diagnostics) => {
                let failed = diagnostics.has_errors();
                if failed {
                    tracing::debug!(vertex = %key, "vertex reported errors");
                }
                self.lock().diagnostics.extend(diagnostics);
                if failed {
                    VertexStatus::Failed
                } else {
                    VertexStatus::Done
                }
            }
            Err(error) => {
                self.abort(error);
                VertexStatus::Failed
            }
        }
    }

    fn abort(&self, error: WalkError) {
        tracing::error!(%error, "aborting graph walk");
        self.aborted.store(true, Ordering::SeqCst);
        self.lock().invariant.get_or_insert(error);
    }

    /// Record a finished vertex and return the dependents that became
    /// runnable. Dependents that can no longer run are finished as skipped
    /// right here.
    fn complete(&self, key: NodeKey, status: VertexStatus) -> Vec<NodeKey> {
        let stopping = self.stopping();
        let mut guard = self.lock();
        let progress = &mut *guard;
        let mut ready = Vec::new();
        let mut finished = vec![(key, status)];

        while let Some((key, status)) = finished.pop() {
            tracing::trace!(vertex = %key, ?status, "vertex finished");
            progress.statuses.insert(key.clone(), status);
            let failed = status != VertexStatus::Done;

            for dependent in self.graph.dependents(&key) {
                if failed {
                    progress.blocked.insert(dependent.clone());
                }
                let Some(remaining) = progress.remaining.get_mut(dependent) else {
                    continue;
                };
                *remaining = remaining.saturating_sub(1);
                if *remaining > 0 {
                    continue;
                }
                if stopping || progress.blocked.contains(dependent) {
                    finished.push((dependent.clone(), VertexStatus::Skipped));
                } else {
                    progress
                        .statuses
                        .insert(dependent.clone(), VertexStatus::Runnable);
                    ready.push(dependent.clone());
                }
            }
        }
        ready
    }

    fn finish(self) -> Result<WalkSummary, WalkError> {
        let cancelled = self.cancel.is_cancelled();
        let progress = self
            .progress
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(error) = progress.invariant {
            return Err(error);
        }

        let mut diagnostics = progress.diagnostics;
        diagnostics.sort();
        let summary = WalkSummary {
            statuses: progress
                .statuses
                .into_iter()
                .map(|(key, status)| (key.into(), status))
                .collect(),
            diagnostics,
            cancelled,
        };
        tracing::info!(
            done = summary.count(VertexStatus::Done),
            failed = summary.count(VertexStatus::Failed),
            skipped = summary.count(VertexStatus::Skipped),
            cancelled,
            "graph walk finished"
        );
        Ok(summary)
    }
}

/// Visit every vertex once its dependencies are done, running independent
/// vertices in parallel.
///
/// A vertex whose dependency failed or was skipped is skipped without being
/// visited. Diagnostics of all visited vertices are collected into the
/// summary.
///
/// # Errors
///
/// Returns an error when the worker pool cannot be started or when a visitor
/// reports an internal inconsistency. In the latter case the walk stops
/// scheduling new vertices and returns after running visitors finish.
pub fn walk<V>(graph: &Graph, visitor: &V, options: &WalkOptions) -> Result<WalkSummary, WalkError>
where
    V: Visitor + ?Sized,
{
    let workers = options
        .parallelism
        .unwrap_or_else(|| graph.len())
        .max(1);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|index| format!("terrace-walk-{index}"))
        .build()
        .map_err(|source| WalkError::ThreadPool { source })?;

    tracing::debug!(vertices = graph.len(), workers, "starting graph walk");
    let walk = Walk::new(graph, visitor, options.cancel.clone());
    let ready = walk.initially_ready();
    pool.scope(|scope| {
        for key in ready {
            walk.spawn(scope, key);
        }
    });
    walk.finish()
}

#[cfg(test)]
mod tests;
