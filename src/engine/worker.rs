use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::{mpsc, Arc};

use tracing::{debug, warn};

use crate::engine::context::Context;
use crate::engine::frontier::Frontier;
use crate::engine::Shared;
use crate::graph::page::PageVertex;
use crate::io::pool::{Completion, CompletionKind, Job, Token};
use crate::io::requests::RequestQueue;
use crate::msg::sender::WorkerSenders;
use crate::msg::{FrameCursor, FrameKind, Message};
use crate::program::VertexProgram;
use crate::types::{Level, VertexId, PAGE_SIZE};

/// Where a vertex program stands inside the current level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProgState {
    AwaitSelf,
    PostSelf,
    AwaitNeigh,
}

struct RunState {
    state: ProgState,
    /// Reads in flight for this vertex.
    pending: usize,
    /// Whether the most recent dispatch returned true.
    complete: bool,
}

/// One partition-owning worker thread.
///
/// Per level: deliver last level's messages, run the activated vertices
/// through the program state machine while draining I/O completions, flush
/// the senders, then cross the barrier protocol with the other workers.
pub(crate) struct Worker<V: VertexProgram> {
    idx: usize,
    shared: Arc<Shared<V>>,
    frontier: Frontier,
    senders: WorkerSenders,
    requests: RequestQueue,
    running: HashMap<VertexId, RunState>,
}

impl<V: VertexProgram> Worker<V> {
    pub fn new(idx: usize, shared: Arc<Shared<V>>, submit: mpsc::Sender<Job>) -> Self {
        let part_len = shared
            .partitioner()
            .part_len(idx, shared.index.num_vertices());
        let senders = WorkerSenders::new(
            &shared.inboxes,
            &shared.msg_pool,
            shared.config.msg_buf_pages * PAGE_SIZE,
        );
        let requests = RequestQueue::new(submit, shared.config.io_depth);
        Self {
            idx,
            shared,
            frontier: Frontier::new(part_len),
            senders,
            requests,
            running: HashMap::new(),
        }
    }

    pub fn run(mut self) {
        let node = self
            .shared
            .partitioner()
            .numa_node(self.idx, self.shared.config.numa_nodes);
        debug!(worker = self.idx, numa_node = node, "worker.start");
        if !self.shared.wait_start() {
            debug!(worker = self.idx, "worker.exit");
            return;
        }
        self.seed();
        loop {
            let level = self.shared.level();
            self.run_level(level);

            // All sends for this level are now in their destination
            // inboxes once every worker passes the flush barrier; only
            // then is the activation drain complete and the termination
            // sum exact.
            self.senders.flush_all(((level + 1) & 1) as usize);
            self.shared.flush_barrier.wait();
            self.absorb_activations();
            let undelivered = self.shared.inboxes[self.idx].data_len(((level + 1) & 1) as usize);
            self.shared
                .add_next((self.frontier.next_count() + undelivered) as u64);

            let outcome = self.shared.barrier1.wait();
            if outcome.is_leader() {
                self.shared.progress(level);
            }
            self.frontier.swap();
            self.shared.barrier2.wait();

            if self.shared.complete.load(Ordering::Acquire)
                || self.shared.stop.load(Ordering::Acquire)
            {
                break;
            }
        }
        debug!(worker = self.idx, "worker.exit");
    }

    fn seed(&mut self) {
        let seeds = std::mem::take(&mut *self.shared.seeds[self.idx].lock());
        for id in seeds {
            let loc = self.shared.partitioner().loc(id);
            self.frontier.seed(loc);
        }
    }

    fn run_level(&mut self, level: Level) {
        self.deliver_messages((level & 1) as usize, level);

        let mut batch: Vec<VertexId> = self
            .frontier
            .take_batch()
            .into_iter()
            .map(|loc| self.shared.partitioner().vertex_at(self.idx, loc))
            .collect();
        let scheduler = self.shared.scheduler.lock().clone();
        if let Some(scheduler) = scheduler {
            scheduler.schedule(&mut batch);
        }

        for id in batch {
            self.absorb_activations();
            while let Some(completion) = self.requests.try_complete() {
                self.dispatch(completion, level);
            }
            self.begin_vertex(id, level);
        }
        while self.requests.outstanding() > 0 {
            match self.requests.wait_complete() {
                Some(completion) => self.dispatch(completion, level),
                None => break,
            }
            self.absorb_activations();
        }
        debug_assert!(self.running.is_empty());
    }

    /// Messages sent during the previous level, delivered before any
    /// vertex of this level runs.
    fn deliver_messages(&mut self, parity: usize, level: Level) {
        for buf in self.shared.inboxes[self.idx].take_data(parity) {
            let mut cursor = FrameCursor::new(&buf);
            loop {
                match cursor.next_frame() {
                    Ok(Some(frame)) => match frame.kind {
                        FrameKind::PointToPoint | FrameKind::Multicast => {
                            let msg = Message::new(frame.payload());
                            for dest in frame.dests() {
                                debug_assert_eq!(self.shared.partitioner().map(dest), self.idx);
                                // SAFETY: dest lives in this worker's
                                // partition and no other reference to its
                                // cell exists here.
                                let state = unsafe { self.shared.index.state_mut(dest) };
                                let mut ctx = Context {
                                    shared: &self.shared,
                                    senders: &mut self.senders,
                                    vertex: dest,
                                    level,
                                };
                                state.on_messages(&mut ctx, std::slice::from_ref(&msg));
                            }
                        }
                        FrameKind::Activation => {
                            for dest in frame.dests() {
                                self.frontier.set_next(self.shared.partitioner().loc(dest));
                            }
                        }
                    },
                    Ok(None) => break,
                    Err(err) => {
                        self.shared.fail(err);
                        break;
                    }
                }
            }
            self.shared.msg_pool.release(buf);
        }
    }

    /// Folds pending activation frames into the `next` frontier.
    fn absorb_activations(&mut self) {
        for buf in self.shared.inboxes[self.idx].take_activations() {
            let mut cursor = FrameCursor::new(&buf);
            loop {
                match cursor.next_frame() {
                    Ok(Some(frame)) => {
                        for dest in frame.dests() {
                            debug_assert_eq!(self.shared.partitioner().map(dest), self.idx);
                            self.frontier.set_next(self.shared.partitioner().loc(dest));
                        }
                    }
                    Ok(None) => break,
                    Err(err) => {
                        self.shared.fail(err);
                        break;
                    }
                }
            }
            self.shared.msg_pool.release(buf);
        }
    }

    /// Admits one activated vertex into the running set, waiting out the
    /// outstanding-read bound first.
    fn begin_vertex(&mut self, id: VertexId, level: Level) {
        while !self.requests.has_capacity() {
            match self.requests.wait_complete() {
                Some(completion) => self.dispatch(completion, level),
                None => return,
            }
        }
        debug_assert_eq!(self.shared.partitioner().map(id), self.idx);
        // SAFETY: this worker owns id's partition and holds no other
        // reference to the cell.
        let state = unsafe { self.shared.index.state_mut(id) };
        let fetch_self = {
            let mut ctx = Context {
                shared: &self.shared,
                senders: &mut self.senders,
                vertex: id,
                level,
            };
            state.pre_run(&mut ctx)
        };
        if fetch_self {
            self.running.insert(
                id,
                RunState {
                    state: ProgState::AwaitSelf,
                    pending: 1,
                    complete: false,
                },
            );
            let range = self.shared.index.locate(id);
            self.requests.submit(
                range,
                Token {
                    vertex: id,
                    kind: CompletionKind::OwnAdjacency,
                },
            );
        } else {
            self.running.insert(
                id,
                RunState {
                    state: ProgState::PostSelf,
                    pending: 0,
                    complete: true,
                },
            );
            self.pump(id, level);
        }
    }

    /// Issues the reads a program still requires this level. The
    /// outstanding-read bound only gates new vertices, so an in-flight
    /// program can always describe its remaining requirements.
    fn pump(&mut self, id: VertexId, level: Level) {
        // SAFETY: partition ownership, as in `begin_vertex`.
        let state = unsafe { self.shared.index.state_mut(id) };
        while state.has_required_vertices() {
            let request = {
                let mut ctx = Context {
                    shared: &self.shared,
                    senders: &mut self.senders,
                    vertex: id,
                    level,
                };
                state.next_request(&mut ctx)
            };
            match request {
                Some(range) => {
                    let entry = self.running.get_mut(&id).expect("vertex is running");
                    entry.state = ProgState::AwaitNeigh;
                    entry.pending += 1;
                    self.requests.submit(
                        range,
                        Token {
                            vertex: id,
                            kind: CompletionKind::Neighbors,
                        },
                    );
                }
                None => {
                    self.protocol_violation(id, "required vertices but no next request");
                    return;
                }
            }
        }
        self.maybe_done(id);
    }

    fn dispatch(&mut self, completion: Completion, level: Level) {
        let Completion { token, result } = completion;
        let id = token.vertex;
        let buf = match result {
            Ok(buf) => buf,
            Err(err) => {
                self.shared.fail(err);
                if let Some(entry) = self.running.get_mut(&id) {
                    entry.pending -= 1;
                    if entry.pending == 0 {
                        self.running.remove(&id);
                    }
                }
                return;
            }
        };

        let Some(entry) = self.running.get_mut(&id) else {
            warn!(vertex = id.0, "worker.orphan_completion");
            self.shared.io_buffers.release(buf);
            return;
        };
        debug_assert!(matches!(
            (token.kind, entry.state),
            (CompletionKind::OwnAdjacency, ProgState::AwaitSelf)
                | (CompletionKind::Neighbors, ProgState::AwaitNeigh)
        ));
        entry.pending -= 1;

        let directed = self.shared.index.header().directed;
        let complete = match PageVertex::parse(directed, &buf) {
            Ok(page) => {
                // SAFETY: partition ownership, as in `begin_vertex`.
                let state = unsafe { self.shared.index.state_mut(id) };
                let mut ctx = Context {
                    shared: &self.shared,
                    senders: &mut self.senders,
                    vertex: id,
                    level,
                };
                Some(match token.kind {
                    CompletionKind::OwnAdjacency => state.on_self(&mut ctx, &page),
                    CompletionKind::Neighbors => {
                        state.on_neighbors(&mut ctx, std::slice::from_ref(&page))
                    }
                })
            }
            Err(err) => {
                self.shared.fail(err);
                None
            }
        };
        self.shared.io_buffers.release(buf);
        let Some(complete) = complete else {
            self.running.remove(&id);
            return;
        };

        if let Some(entry) = self.running.get_mut(&id) {
            entry.complete = complete;
            entry.state = if entry.pending == 0 {
                ProgState::PostSelf
            } else {
                ProgState::AwaitNeigh
            };
        }
        self.pump(id, level);
    }

    /// Retires a vertex once no reads remain and the program declared the
    /// level complete.
    fn maybe_done(&mut self, id: VertexId) {
        let Some(entry) = self.running.get(&id) else {
            return;
        };
        if entry.pending > 0 {
            return;
        }
        if self.shared.index.state(id).has_required_vertices() {
            return;
        }
        if !entry.complete {
            self.protocol_violation(id, "dispatch returned false with nothing outstanding");
            return;
        }
        self.running.remove(&id);
    }

    /// Illegal program transition: aborts the run in debug builds, logs
    /// and retires the vertex in release builds.
    fn protocol_violation(&mut self, id: VertexId, what: &str) {
        warn!(vertex = id.0, what, "worker.protocol_violation");
        if cfg!(debug_assertions) {
            self.shared
                .fail(crate::error::EngineError::Protocol(format!(
                    "vertex {id}: {what}"
                )));
        }
        self.running.remove(&id);
    }
}
