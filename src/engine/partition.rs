use crate::types::VertexId;

/// Stripe partitioning of the dense vertex id space over workers.
///
/// Consecutive ids land in distinct partitions, which spreads locally
/// clustered adjacency reads over all workers. The mapping is pure and
/// fixed for a given worker count, so ownership never moves during a run.
#[derive(Debug, Clone)]
pub struct Partitioner {
    workers: usize,
}

impl Partitioner {
    pub fn new(workers: usize) -> Self {
        debug_assert!(workers > 0);
        Self { workers }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Worker index owning `id`.
    pub fn map(&self, id: VertexId) -> usize {
        id.as_usize() % self.workers
    }

    /// Dense slot of `id` inside its partition.
    pub fn loc(&self, id: VertexId) -> usize {
        id.as_usize() / self.workers
    }

    /// Inverse of `map`/`loc`.
    pub fn vertex_at(&self, worker: usize, loc: usize) -> VertexId {
        VertexId((loc * self.workers + worker) as u32)
    }

    /// Number of vertices in `worker`'s partition for a graph of
    /// `num_vertices` dense ids.
    pub fn part_len(&self, worker: usize, num_vertices: u32) -> usize {
        let n = num_vertices as usize;
        if worker >= n {
            return 0;
        }
        (n - worker - 1) / self.workers + 1
    }

    /// NUMA node hosting `worker`: workers are split into contiguous
    /// groups, one group per node, so a partition's state and its worker
    /// share a node.
    pub fn numa_node(&self, worker: usize, numa_nodes: usize) -> usize {
        worker * numa_nodes / self.workers
    }
}

#[cfg(test)]
mod tests {
    use super::Partitioner;
    use crate::types::VertexId;

    #[test]
    fn consecutive_ids_hit_distinct_workers() {
        let p = Partitioner::new(4);
        let owners: Vec<_> = (0..4).map(|i| p.map(VertexId(i))).collect();
        assert_eq!(owners, vec![0, 1, 2, 3]);
    }

    #[test]
    fn map_loc_roundtrip() {
        let p = Partitioner::new(3);
        for raw in 0..100u32 {
            let id = VertexId(raw);
            assert_eq!(p.vertex_at(p.map(id), p.loc(id)), id);
        }
    }

    #[test]
    fn partition_lengths_cover_the_id_space() {
        let p = Partitioner::new(4);
        for n in [0u32, 1, 4, 5, 17] {
            let total: usize = (0..4).map(|w| p.part_len(w, n)).sum();
            assert_eq!(total, n as usize);
        }
    }

    #[test]
    fn numa_groups_are_contiguous_and_balanced() {
        let p = Partitioner::new(8);
        let nodes: Vec<_> = (0..8).map(|w| p.numa_node(w, 2)).collect();
        assert_eq!(nodes, vec![0, 0, 0, 0, 1, 1, 1, 1]);
        let single: Vec<_> = (0..8).map(|w| p.numa_node(w, 1)).collect();
        assert!(single.iter().all(|&n| n == 0));
    }

    #[test]
    fn near_uniform_distribution() {
        let p = Partitioner::new(8);
        let n = 10_007u32;
        let lens: Vec<_> = (0..8).map(|w| p.part_len(w, n)).collect();
        let min = lens.iter().min().unwrap();
        let max = lens.iter().max().unwrap();
        assert!(max - min <= 1);
    }
}
