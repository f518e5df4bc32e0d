mod context;
pub(crate) mod frontier;
pub mod partition;
mod worker;

pub use context::Context;

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Barrier};
use std::thread::{self, JoinHandle};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, info};

use crate::config::EngineConfig;
use crate::engine::partition::Partitioner;
use crate::engine::worker::Worker;
use crate::error::{EngineError, Result};
use crate::graph::index::VertexIndex;
use crate::io::pool::IoPool;
use crate::io::{FileIo, StdFileIo};
use crate::msg::inbox::Inbox;
use crate::pool::BufferPool;
use crate::program::{VertexProgram, VertexScheduler};
use crate::types::{Level, VertexId, PAGE_SIZE};

/// State shared between the engine handle and its workers.
pub(crate) struct Shared<V: VertexProgram> {
    pub(crate) config: EngineConfig,
    pub(crate) index: VertexIndex<V>,
    pub(crate) inboxes: Vec<Arc<Inbox>>,
    pub(crate) msg_pool: Arc<BufferPool>,
    pub(crate) io_buffers: Arc<BufferPool>,
    pub(crate) scheduler: Mutex<Option<Arc<dyn VertexScheduler>>>,
    pub(crate) seeds: Vec<Mutex<Vec<VertexId>>>,

    level: AtomicU32,
    next_total: AtomicU64,
    pub(crate) complete: AtomicBool,
    pub(crate) stop: AtomicBool,
    start_gate: Mutex<bool>,
    start_signal: Condvar,

    pub(crate) flush_barrier: Barrier,
    pub(crate) barrier1: Barrier,
    pub(crate) barrier2: Barrier,
    progress_lock: Mutex<()>,
    pub(crate) failure: Mutex<Option<EngineError>>,
}

impl<V: VertexProgram> Shared<V> {
    pub(crate) fn partitioner(&self) -> &Partitioner {
        self.index.partitioner()
    }

    pub(crate) fn level(&self) -> Level {
        self.level.load(Ordering::Acquire)
    }

    pub(crate) fn add_next(&self, count: u64) {
        self.next_total.fetch_add(count, Ordering::AcqRel);
    }

    /// Level transition, taken by the barrier leader between barrier 1 and
    /// barrier 2. The termination sum is exact at this point: every sender
    /// flushed before the flush barrier and every worker folded its
    /// activations into `next` before barrier 1.
    pub(crate) fn progress(&self, level: Level) {
        let _guard = self.progress_lock.lock();
        let total = self.next_total.swap(0, Ordering::AcqRel);
        if total == 0 {
            self.complete.store(true, Ordering::Release);
        }
        self.level.store(level + 1, Ordering::Release);
        debug!(level, next_total = total, "engine.level.advance");
    }

    /// Records the first fatal error and asks every worker to wind down.
    pub(crate) fn fail(&self, err: EngineError) {
        error!(%err, "engine.abort");
        let mut slot = self.failure.lock();
        if slot.is_none() {
            *slot = Some(err);
        }
        self.stop.store(true, Ordering::Release);
    }

    /// Blocks a worker until `start`/`start_all` seeds the frontier.
    /// Returns false when the engine is tearing down unstarted.
    pub(crate) fn wait_start(&self) -> bool {
        let mut started = self.start_gate.lock();
        while !*started && !self.stop.load(Ordering::Acquire) {
            self.start_signal.wait(&mut started);
        }
        !self.stop.load(Ordering::Acquire)
    }

    fn open_gate(&self) {
        *self.start_gate.lock() = true;
        self.start_signal.notify_all();
    }

    fn wake_gate(&self) {
        let _guard = self.start_gate.lock();
        self.start_signal.notify_all();
    }
}

/// The level orchestrator.
///
/// Owns the workers, the I/O pool and the shared core; drives a
/// bulk-synchronous computation from `start`/`start_all` until no vertex
/// remains active.
pub struct GraphEngine<V: VertexProgram> {
    shared: Arc<Shared<V>>,
    workers: Vec<JoinHandle<()>>,
    io: IoPool,
    started: AtomicBool,
}

impl<V: VertexProgram> GraphEngine<V> {
    /// Builds the engine over a loaded index and spawns its worker and I/O
    /// threads. The workers idle until `start`/`start_all`.
    pub fn create(
        graph_path: impl AsRef<Path>,
        index: VertexIndex<V>,
        config: EngineConfig,
    ) -> Result<Self> {
        config.validate()?;
        if index.partitioner().workers() != config.workers {
            return Err(EngineError::Config(format!(
                "index was partitioned for {} workers, engine configured for {}",
                index.partitioner().workers(),
                config.workers
            )));
        }
        let graph_path = graph_path.as_ref();
        let file = StdFileIo::open(graph_path).map_err(|err| {
            EngineError::Config(format!(
                "cannot open graph file {}: {err}",
                graph_path.display()
            ))
        })?;
        if file.len()? < index.max_extent() {
            return Err(EngineError::Config(
                "graph file shorter than the extent described by the index".into(),
            ));
        }

        let workers = config.workers;
        let msg_pool = Arc::new(BufferPool::new(
            config.msg_buf_pages * PAGE_SIZE,
            config.pooled_buffers,
        ));
        let io_buffers = Arc::new(BufferPool::new(4 * PAGE_SIZE, config.pooled_buffers));
        let inboxes: Vec<_> = (0..workers).map(|_| Arc::new(Inbox::new())).collect();
        let seeds = (0..workers).map(|_| Mutex::new(Vec::new())).collect();

        info!(
            workers,
            numa_nodes = config.numa_nodes,
            vertices = index.num_vertices(),
            directed = index.header().directed,
            "engine.create"
        );

        let shared = Arc::new(Shared {
            config: config.clone(),
            index,
            inboxes,
            msg_pool,
            io_buffers: io_buffers.clone(),
            scheduler: Mutex::new(None),
            seeds,
            level: AtomicU32::new(0),
            next_total: AtomicU64::new(0),
            complete: AtomicBool::new(false),
            stop: AtomicBool::new(false),
            start_gate: Mutex::new(false),
            start_signal: Condvar::new(),
            flush_barrier: Barrier::new(workers),
            barrier1: Barrier::new(workers),
            barrier2: Barrier::new(workers),
            progress_lock: Mutex::new(()),
            failure: Mutex::new(None),
        });

        let io = IoPool::spawn(
            Arc::new(file) as Arc<dyn FileIo>,
            io_buffers,
            config.io_threads,
        );
        let handles = (0..workers)
            .map(|idx| {
                let worker = Worker::new(idx, shared.clone(), io.submitter());
                thread::spawn(move || worker.run())
            })
            .collect();

        Ok(Self {
            shared,
            workers: handles,
            io,
            started: AtomicBool::new(false),
        })
    }

    /// Seeds the first level's frontier with `ids` and releases the
    /// workers.
    pub fn start(&self, ids: &[VertexId]) -> Result<()> {
        let num_vertices = self.shared.index.num_vertices();
        if let Some(bad) = ids.iter().find(|id| id.0 >= num_vertices) {
            return Err(EngineError::Config(format!(
                "seed vertex {bad} outside the id space 0..{num_vertices}"
            )));
        }
        self.begin(ids.iter().copied())
    }

    /// Seeds the first level's frontier with every vertex.
    pub fn start_all(&self) -> Result<()> {
        let all = (0..self.shared.index.num_vertices()).map(VertexId);
        self.begin(all)
    }

    fn begin(&self, ids: impl Iterator<Item = VertexId>) -> Result<()> {
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(EngineError::Config("engine already started".into()));
        }
        for id in ids {
            let worker = self.shared.partitioner().map(id);
            self.shared.seeds[worker].lock().push(id);
        }
        self.shared.open_gate();
        Ok(())
    }

    /// True once the fixed point is reached: every worker's `next` was
    /// empty at the prior barrier.
    pub fn progress_next_level(&self) -> bool {
        self.shared.complete.load(Ordering::Acquire)
    }

    pub fn level(&self) -> Level {
        self.shared.level()
    }

    /// Cooperative cancellation, observed by the workers at the level
    /// barriers. In-flight I/O is awaited, not cancelled.
    pub fn request_stop(&self) {
        self.shared.stop.store(true, Ordering::Release);
        self.shared.wake_gate();
    }

    /// Blocks until the computation reaches its fixed point (or aborts)
    /// and all workers have exited.
    pub fn wait4complete(&mut self) -> Result<()> {
        if !self.started.load(Ordering::Acquire) {
            return Err(EngineError::Config("engine was never started".into()));
        }
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                self.shared
                    .fail(EngineError::Protocol("worker thread panicked".into()));
            }
        }
        self.io.shutdown();
        if let Some(err) = self.shared.failure.lock().take() {
            return Err(err);
        }
        Ok(())
    }

    /// One vertex's user state. Race-free once `wait4complete` returned;
    /// while the engine is running, prefer `Context::get_vertex` from
    /// inside a program.
    pub fn vertex(&self, id: VertexId) -> &V {
        self.shared.index.state(id)
    }

    /// All vertex states in ascending id order.
    pub fn vertices(&self) -> impl Iterator<Item = &V> {
        self.shared.index.states()
    }

    pub fn num_workers(&self) -> usize {
        self.shared.partitioner().workers()
    }

    pub fn num_vertices(&self) -> u32 {
        self.shared.index.num_vertices()
    }

    pub fn is_directed(&self) -> bool {
        self.shared.index.header().directed
    }

    pub fn min_vertex_id(&self) -> VertexId {
        self.shared.index.min_id()
    }

    pub fn max_vertex_id(&self) -> VertexId {
        self.shared.index.max_id()
    }

    /// Installs a batch-reordering hook applied before each worker's
    /// dispatch. Must be set before `start`.
    pub fn set_vertex_scheduler(&self, scheduler: Arc<dyn VertexScheduler>) {
        *self.shared.scheduler.lock() = Some(scheduler);
    }
}

impl<V: VertexProgram> Drop for GraphEngine<V> {
    fn drop(&mut self) {
        self.request_stop();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}
