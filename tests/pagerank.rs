use brasa::{
    Context, EdgeDir, EngineConfig, GraphBuilder, GraphEngine, PageVertex, Result, VertexId,
    VertexIndex, VertexProgram,
};
use smallvec::SmallVec;
use tempfile::tempdir;

struct PageRankVertex {
    rank: f32,
    out_degree: f32,
    damping: f32,
    tolerance: f32,
}

impl PageRankVertex {
    fn new(out_degree: u32, damping: f32, tolerance: f32) -> Self {
        Self {
            rank: 1.0 - damping,
            out_degree: out_degree as f32,
            damping,
            tolerance,
        }
    }
}

impl VertexProgram for PageRankVertex {
    fn on_self(&mut self, ctx: &mut Context<'_, Self>, vertex: &PageVertex<'_>) -> bool {
        let accum: f32 = vertex
            .neigh_iter(EdgeDir::In)
            .map(|n| {
                let v = ctx.get_vertex(n);
                v.rank / v.out_degree
            })
            .sum();

        let new_rank = (1.0 - self.damping) + self.damping * accum;
        let change = (new_rank - self.rank).abs();
        self.rank = new_rank;

        if change > self.tolerance {
            let dests: SmallVec<[VertexId; 64]> = vertex.neigh_iter(EdgeDir::Out).collect();
            ctx.activate_vertices(&dests);
        }
        true
    }
}

fn run_pagerank(
    num_vertices: u32,
    edges: &[(u32, u32)],
    damping: f32,
    tolerance: f32,
    workers: usize,
) -> Result<(Vec<f32>, u32)> {
    let dir = tempdir()?;
    let graph_path = dir.path().join("pr.adj");
    let index_path = dir.path().join("pr.idx");
    let mut builder = GraphBuilder::new(true, num_vertices);
    let mut out_degrees = vec![0u32; num_vertices as usize];
    for &(from, to) in edges {
        builder.add_edge(VertexId(from), VertexId(to));
        out_degrees[from as usize] += 1;
    }
    builder.write(&graph_path, &index_path)?;

    let index = VertexIndex::load(&index_path, workers, |id| {
        PageRankVertex::new(out_degrees[id.as_usize()], damping, tolerance)
    })?;
    let config = EngineConfig {
        workers,
        ..EngineConfig::default()
    };
    let mut engine = GraphEngine::create(&graph_path, index, config)?;
    engine.start_all()?;
    engine.wait4complete()?;
    let ranks = engine.vertices().map(|v| v.rank).collect();
    Ok((ranks, engine.level()))
}

#[test]
fn two_cycle_converges_near_one() -> Result<()> {
    let (ranks, levels) = run_pagerank(2, &[(0, 1), (1, 0)], 0.85, 1.0e-2, 2)?;
    for rank in &ranks {
        assert!(*rank > 0.9 && *rank <= 1.0 + 1.0e-3, "rank {rank} out of range");
    }
    assert!((ranks[0] - ranks[1]).abs() < 0.05);
    assert!(levels < 64, "did not reach the fixed point in a bounded number of levels");
    Ok(())
}

#[test]
fn ring_converges_near_one() -> Result<()> {
    let edges = [(0, 1), (1, 2), (2, 3), (3, 0)];
    let (ranks, levels) = run_pagerank(4, &edges, 0.85, 1.0e-2, 2)?;
    for rank in &ranks {
        assert!(*rank > 0.9 && *rank <= 1.0 + 1.0e-3, "rank {rank} out of range");
    }
    assert!(levels < 64);
    Ok(())
}

#[test]
fn sequential_run_matches_the_same_fixed_point() -> Result<()> {
    let edges = [(0, 1), (1, 0)];
    let (parallel, _) = run_pagerank(2, &edges, 0.85, 1.0e-2, 2)?;
    let (sequential, _) = run_pagerank(2, &edges, 0.85, 1.0e-2, 1)?;
    for (a, b) in parallel.iter().zip(&sequential) {
        assert!((a - b).abs() < 0.05);
    }
    Ok(())
}
