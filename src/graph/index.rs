use std::cell::UnsafeCell;
use std::convert::TryInto;
use std::path::Path;

use crate::engine::partition::Partitioner;
use crate::error::{EngineError, Result};
use crate::graph::header::{GraphHeader, HEADER_LEN};
use crate::io::{FileIo, StdFileIo};
use crate::program::RequestRange;
use crate::types::VertexId;

pub(crate) const ENTRY_LEN: usize = 12;

/// Location of one vertex's adjacency block in the graph file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexEntry {
    pub offset: u64,
    pub len: u32,
}

/// Random-access directory from vertex id to adjacency location, plus the
/// per-vertex user state, partitioned by worker.
///
/// State cells are grouped into per-partition arrays and initialized by one
/// thread per partition, so first-touch page placement follows the worker
/// that will own the partition.
pub struct VertexIndex<V> {
    header: GraphHeader,
    entries: Vec<VertexEntry>,
    partitioner: Partitioner,
    states: VertexArray<V>,
}

impl<V> std::fmt::Debug for VertexIndex<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VertexIndex")
            .field("header", &self.header)
            .field("entries", &self.entries)
            .field("partitioner", &self.partitioner)
            .finish_non_exhaustive()
    }
}

impl<V: Send + Sync> VertexIndex<V> {
    /// Loads the index file and constructs one state record per vertex.
    pub fn load<F>(path: impl AsRef<Path>, workers: usize, init: F) -> Result<Self>
    where
        F: Fn(VertexId) -> V + Sync,
    {
        let path = path.as_ref();
        let file = StdFileIo::open(path).map_err(|err| {
            EngineError::Config(format!("cannot open index file {}: {err}", path.display()))
        })?;

        let mut hdr = [0u8; HEADER_LEN];
        file.read_at(0, &mut hdr)?;
        let header = GraphHeader::decode(&hdr)?;
        if header.num_vertices == 0 {
            return Err(EngineError::Config("index contains no vertices".into()));
        }
        if workers == 0 {
            return Err(EngineError::Config("worker count must be non-zero".into()));
        }

        let n = header.num_vertices as usize;
        let mut raw = vec![0u8; n * ENTRY_LEN];
        file.read_at(HEADER_LEN as u64, &mut raw)?;

        let mut entries = Vec::with_capacity(n);
        let mut prev_offset = 0u64;
        for rec in raw.chunks_exact(ENTRY_LEN) {
            let offset = u64::from_le_bytes(rec[..8].try_into().expect("slice is 8 bytes"));
            let len = u32::from_le_bytes(rec[8..12].try_into().expect("slice is 4 bytes"));
            if offset < prev_offset {
                return Err(EngineError::Corruption("index offsets not monotonic"));
            }
            prev_offset = offset;
            entries.push(VertexEntry { offset, len });
        }

        let partitioner = Partitioner::new(workers);
        let states = VertexArray::build(&partitioner, header.num_vertices, &init);

        Ok(Self {
            header,
            entries,
            partitioner,
            states,
        })
    }

    pub fn header(&self) -> &GraphHeader {
        &self.header
    }

    pub fn partitioner(&self) -> &Partitioner {
        &self.partitioner
    }

    pub fn num_vertices(&self) -> u32 {
        self.header.num_vertices
    }

    pub fn min_id(&self) -> VertexId {
        VertexId(0)
    }

    pub fn max_id(&self) -> VertexId {
        VertexId(self.header.num_vertices - 1)
    }

    /// Adjacency location for `id`. Valid ids are guaranteed by graph
    /// construction; an out-of-range id is a caller bug.
    pub fn locate(&self, id: VertexId) -> RequestRange {
        let entry = &self.entries[id.as_usize()];
        RequestRange {
            offset: entry.offset,
            len: entry.len,
        }
    }

    /// End of the adjacency stream described by this index.
    pub(crate) fn max_extent(&self) -> u64 {
        self.entries
            .last()
            .map(|e| e.offset + u64::from(e.len))
            .unwrap_or(0)
    }

    /// Shared read of a vertex's user state.
    ///
    /// Cross-partition callers must treat the value as read-only and only
    /// rely on fields that are stable across the level boundary (typically
    /// the previous level's published value); the engine does not
    /// synchronize these reads.
    pub fn state(&self, id: VertexId) -> &V {
        let part = self.partitioner.map(id);
        let loc = self.partitioner.loc(id);
        // SAFETY: shared reads are allowed under the contract above; only
        // the owning worker ever forms a mutable reference.
        unsafe { &*self.states.parts[part][loc].get() }
    }

    /// Exclusive access to a vertex's user state.
    ///
    /// # Safety
    ///
    /// The caller must be the worker owning `id`'s partition, and must not
    /// hold another reference to the same cell. Partition ownership makes
    /// mutable access single-threaded by construction.
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn state_mut(&self, id: VertexId) -> &mut V {
        let part = self.partitioner.map(id);
        let loc = self.partitioner.loc(id);
        &mut *self.states.parts[part][loc].get()
    }

    /// All vertex states in ascending id order.
    pub fn states(&self) -> impl Iterator<Item = &V> + '_ {
        (0..self.header.num_vertices).map(move |raw| self.state(VertexId(raw)))
    }
}

struct VertexArray<V> {
    parts: Vec<Vec<UnsafeCell<V>>>,
}

// SAFETY: mutable access is partitioned by worker (see `state_mut`); shared
// reads require `V: Sync`, moving cells between threads requires `V: Send`.
unsafe impl<V: Send + Sync> Sync for VertexArray<V> {}

impl<V: Send> VertexArray<V> {
    fn build<F>(partitioner: &Partitioner, num_vertices: u32, init: &F) -> Self
    where
        F: Fn(VertexId) -> V + Sync,
    {
        let workers = partitioner.workers();
        let mut parts = Vec::with_capacity(workers);
        std::thread::scope(|s| {
            let handles: Vec<_> = (0..workers)
                .map(|w| {
                    s.spawn(move || {
                        let len = partitioner.part_len(w, num_vertices);
                        let mut cells = Vec::with_capacity(len);
                        for loc in 0..len {
                            cells.push(UnsafeCell::new(init(partitioner.vertex_at(w, loc))));
                        }
                        cells
                    })
                })
                .collect();
            for handle in handles {
                match handle.join() {
                    Ok(cells) => parts.push(cells),
                    Err(payload) => std::panic::resume_unwind(payload),
                }
            }
        });
        Self { parts }
    }
}
