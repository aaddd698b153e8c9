//! # Job System
//!
//! Small dependency-aware scheduler for the generation pipeline.
//!
//! ## Pieces
//!
//! - [`JobSystem`]: a fixed pool of worker threads plus a batched
//!   `parallel_for` over a slice.
//! - [`JobGraph`]: closures with explicit dependencies, run on the pool. A
//!   job starts only after every job it depends on has finished.
//!   [`JobGraph::combine`] joins several handles into one.
//! - [`JobOutput`]: write-once slot a job publishes its result into.
//!
//! Pool threads are started once and reused for every call. Work is scoped:
//! jobs may borrow anything that outlives the graph, and [`JobGraph::run`]
//! returns only after every job has completed. A `parallel_for` issued from
//! inside a graph job runs on the same workers, so nesting never adds
//! threads.
//!
//! ## Determinism
//!
//! Scheduling order is not deterministic, so jobs must only write disjoint
//! data or data guarded by the dependency chain. With one worker the graph
//! runs inline in scheduling order.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread;

use parking_lot::Mutex;
use rayon::prelude::*;
use rayon::{Scope, ThreadPool, ThreadPoolBuilder};

/// Prefix of every pool thread name.
pub const WORKER_THREAD_PREFIX: &str = "tessera-worker-";

/// Fixed-size worker pool.
///
/// Cloning is cheap and shares the same threads; they exit when the last
/// clone is dropped. Two job systems compare equal when they have the same
/// worker count, since results never depend on which pool ran them.
#[derive(Clone)]
pub struct JobSystem {
    workers: usize,
    pool: Option<Arc<ThreadPool>>,
}

impl JobSystem {
    /// Creates a job system with `workers` threads (at least one).
    ///
    /// One worker runs everything inline on the calling thread. If the pool
    /// cannot be started the system falls back to inline execution.
    #[must_use]
    pub fn new(workers: usize) -> Self {
        let workers = workers.max(1);
        if workers == 1 {
            return Self::inline();
        }

        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|index| format!("{WORKER_THREAD_PREFIX}{index}"))
            .build();
        match pool {
            Ok(pool) => Self {
                workers,
                pool: Some(Arc::new(pool)),
            },
            Err(err) => {
                tracing::error!("could not start {} workers, running inline: {}", workers, err);
                Self::inline()
            }
        }
    }

    const fn inline() -> Self {
        Self {
            workers: 1,
            pool: None,
        }
    }

    /// Runs everything inline on the calling thread.
    #[must_use]
    pub fn single_threaded() -> Self {
        Self::inline()
    }

    /// One worker per available hardware thread.
    #[must_use]
    pub fn available() -> Self {
        Self::new(thread::available_parallelism().map_or(1, NonZeroUsize::get))
    }

    /// Number of worker threads.
    #[inline]
    #[must_use]
    pub const fn workers(&self) -> usize {
        self.workers
    }

    /// Calls `f(index, &mut out[index])` for every element.
    ///
    /// The slice is cut into runs of `batch` elements which the pool's
    /// workers pick up. Each element is visited exactly once.
    pub fn parallel_for<T, F>(&self, out: &mut [T], batch: usize, f: F)
    where
        T: Send,
        F: Fn(usize, &mut T) + Sync,
    {
        let batch = batch.max(1);
        match &self.pool {
            Some(pool) if out.len() > batch => {
                let f = &f;
                pool.install(|| {
                    out.par_chunks_mut(batch)
                        .enumerate()
                        .for_each(|(batch_index, chunk)| {
                            let start = batch_index * batch;
                            for (offset, item) in chunk.iter_mut().enumerate() {
                                f(start + offset, item);
                            }
                        });
                });
            }
            _ => {
                for (index, item) in out.iter_mut().enumerate() {
                    f(index, item);
                }
            }
        }
    }
}

impl Default for JobSystem {
    fn default() -> Self {
        Self::available()
    }
}

impl PartialEq for JobSystem {
    fn eq(&self, other: &Self) -> bool {
        self.workers == other.workers
    }
}

impl Eq for JobSystem {}

impl std::fmt::Debug for JobSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobSystem")
            .field("workers", &self.workers)
            .finish_non_exhaustive()
    }
}

/// Handle to a scheduled job, used to express dependencies.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct JobHandle(usize);

impl JobHandle {
    /// Position of the job in scheduling order.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

type Work<'scope> = Box<dyn FnOnce() + Send + 'scope>;

struct JobNode<'scope> {
    name: &'static str,
    work: Work<'scope>,
    dependencies: usize,
    dependents: Vec<usize>,
}

/// A set of jobs with dependencies, executed by [`JobGraph::run`].
///
/// Dependencies can only point at handles returned earlier, so the graph is
/// acyclic by construction.
#[derive(Default)]
pub struct JobGraph<'scope> {
    nodes: Vec<JobNode<'scope>>,
}

impl std::fmt::Debug for JobGraph<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobGraph")
            .field("jobs", &self.nodes.iter().map(|node| node.name).collect::<Vec<_>>())
            .finish()
    }
}

impl<'scope> JobGraph<'scope> {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    /// Number of scheduled jobs.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if nothing has been scheduled.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Schedules `work` to run after every job in `dependencies`.
    ///
    /// # Panics
    ///
    /// Panics if a dependency handle belongs to another graph.
    pub fn schedule<F>(&mut self, name: &'static str, dependencies: &[JobHandle], work: F) -> JobHandle
    where
        F: FnOnce() + Send + 'scope,
    {
        let id = self.nodes.len();
        for dependency in dependencies {
            assert!(
                dependency.0 < id,
                "job `{name}` depends on unknown handle {}",
                dependency.0
            );
            self.nodes[dependency.0].dependents.push(id);
        }
        self.nodes.push(JobNode {
            name,
            work: Box::new(work),
            dependencies: dependencies.len(),
            dependents: Vec::new(),
        });
        JobHandle(id)
    }

    /// Returns a handle that completes once all `handles` have completed.
    pub fn combine(&mut self, handles: &[JobHandle]) -> JobHandle {
        self.schedule("combine", handles, || {})
    }

    /// Runs every job on the pool and blocks until all have finished.
    ///
    /// A panicking job is re-raised on the calling thread once the jobs
    /// already started have finished; its dependents never run.
    pub fn run(self, jobs: &JobSystem) {
        let total = self.nodes.len();
        if total == 0 {
            return;
        }

        tracing::debug!("running job graph: {} jobs on {} workers", total, jobs.workers());

        let Some(pool) = &jobs.pool else {
            // Handles only point backwards, so scheduling order is topological
            for node in self.nodes {
                tracing::trace!("job `{}`", node.name);
                (node.work)();
            }
            return;
        };

        let mut shared = SharedGraph {
            names: Vec::with_capacity(total),
            work: Vec::with_capacity(total),
            pending: Vec::with_capacity(total),
            dependents: Vec::with_capacity(total),
        };
        let mut ready = Vec::new();
        for (id, node) in self.nodes.into_iter().enumerate() {
            if node.dependencies == 0 {
                ready.push(id);
            }
            shared.names.push(node.name);
            shared.work.push(Mutex::new(Some(node.work)));
            shared.pending.push(AtomicUsize::new(node.dependencies));
            shared.dependents.push(node.dependents);
        }

        let shared = &shared;
        pool.scope(|scope| {
            for id in ready {
                scope.spawn(move |scope| shared.execute(scope, id));
            }
        });
    }
}

struct SharedGraph<'scope> {
    names: Vec<&'static str>,
    work: Vec<Mutex<Option<Work<'scope>>>>,
    pending: Vec<AtomicUsize>,
    dependents: Vec<Vec<usize>>,
}

impl SharedGraph<'_> {
    /// Runs job `id`, then spawns every dependent it was the last
    /// prerequisite of.
    fn execute<'s>(&'s self, scope: &Scope<'s>, id: usize) {
        let job = self.work[id].lock().take();
        if let Some(job) = job {
            tracing::trace!("job `{}`", self.names[id]);
            job();
        }

        for &next in &self.dependents[id] {
            if self.pending[next].fetch_sub(1, Ordering::AcqRel) == 1 {
                scope.spawn(move |scope| self.execute(scope, next));
            }
        }
    }
}

/// Write-once result slot shared between a producing job and its dependents.
#[derive(Debug)]
pub struct JobOutput<T> {
    name: &'static str,
    slot: OnceLock<T>,
}

impl<T> JobOutput<T> {
    /// Creates an empty slot.
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            slot: OnceLock::new(),
        }
    }

    /// Stores the result. A second publish is ignored.
    pub fn publish(&self, value: T) {
        if self.slot.set(value).is_err() {
            tracing::warn!("job output `{}` published twice; keeping first value", self.name);
        }
    }

    /// Result, if the producing job has run.
    #[inline]
    #[must_use]
    pub fn get(&self) -> Option<&T> {
        self.slot.get()
    }

    /// Name given at construction.
    #[inline]
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Consumes the slot, returning the result if one was published.
    #[must_use]
    pub fn into_inner(self) -> Option<T> {
        self.slot.into_inner()
    }
}
