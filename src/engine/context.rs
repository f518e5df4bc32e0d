use crate::engine::Shared;
use crate::msg::sender::WorkerSenders;
use crate::program::{RequestRange, VertexProgram};
use crate::types::{Level, VertexId};

/// Engine operations available to a vertex program during a dispatch or a
/// message delivery. Sends are buffered on the calling worker and become
/// visible to their destinations one level later.
pub struct Context<'a, V: VertexProgram> {
    pub(crate) shared: &'a Shared<V>,
    pub(crate) senders: &'a mut WorkerSenders,
    pub(crate) vertex: VertexId,
    pub(crate) level: Level,
}

impl<V: VertexProgram> Context<'_, V> {
    /// Id of the vertex this program instance runs for.
    pub fn id(&self) -> VertexId {
        self.vertex
    }

    pub fn level(&self) -> Level {
        self.level
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

    /// Adjacency location of `id`, for building neighbor requests.
    pub fn locate(&self, id: VertexId) -> RequestRange {
        self.shared.index.locate(id)
    }

    /// Reads another vertex's state.
    ///
    /// The reference is unsynchronized: callers must treat it as read-only
    /// and rely only on fields that are stable across the level boundary,
    /// such as the value the vertex published during the previous level.
    pub fn get_vertex(&self, id: VertexId) -> &V {
        self.shared.index.state(id)
    }

    /// Sends `payload` to a single destination vertex, delivered to its
    /// `on_messages` during the next level.
    pub fn send_msg(&mut self, dest: VertexId, payload: &[u8]) {
        let worker = self.shared.partitioner().map(dest);
        let parity = self.data_parity();
        self.senders.p2p(worker).send_cached(dest, payload, parity);
    }

    /// Sends one `payload` to many destinations, aggregated per
    /// destination worker.
    pub fn multicast_msg(&mut self, dests: &[VertexId], payload: &[u8]) {
        let parity = self.data_parity();
        for &dest in dests {
            let worker = self.shared.partitioner().map(dest);
            let sender = self.senders.multicast(worker);
            let mut added = sender.has_msg() && sender.add_dest(dest);
            if !added {
                // a fresh frame takes the destination on the first retry
                sender.init(payload, parity);
                added = sender.add_dest(dest);
                debug_assert!(added, "multicast send buffer misconfigured");
            }
        }
        for worker in 0..self.senders.num_workers() {
            let sender = self.senders.multicast(worker);
            if sender.has_msg() {
                sender.end_multicast();
            }
        }
    }

    /// Queues `id` for the next level's frontier.
    pub fn activate_vertex(&mut self, id: VertexId) {
        self.activate_vertices(&[id]);
    }

    /// Queues each id for the next level's frontier. Activating an id more
    /// than once per level is idempotent.
    pub fn activate_vertices(&mut self, ids: &[VertexId]) {
        let parity = self.data_parity();
        for &id in ids {
            let worker = self.shared.partitioner().map(id);
            let sender = self.senders.activation(worker);
            let mut added = sender.has_msg() && sender.add_dest(id);
            if !added {
                sender.init(&[], parity);
                added = sender.add_dest(id);
                debug_assert!(added, "activation send buffer misconfigured");
            }
        }
    }

    fn data_parity(&self) -> usize {
        ((self.level + 1) & 1) as usize
    }
}
