use std::convert::TryInto;

use brasa::{
    Context, EngineConfig, GraphBuilder, GraphEngine, Message, Result, VertexId, VertexIndex,
    VertexProgram,
};
use tempfile::tempdir;

fn edge_free_engine<V, F>(
    num_vertices: u32,
    workers: usize,
    msg_buf_pages: usize,
    init: F,
) -> Result<(tempfile::TempDir, GraphEngine<V>)>
where
    V: VertexProgram,
    F: Fn(VertexId) -> V + Sync,
{
    let dir = tempdir()?;
    let graph_path = dir.path().join("m.adj");
    let index_path = dir.path().join("m.idx");
    GraphBuilder::new(false, num_vertices).write(&graph_path, &index_path)?;
    let index = VertexIndex::load(&index_path, workers, init)?;
    let config = EngineConfig {
        workers,
        msg_buf_pages,
        ..EngineConfig::default()
    };
    let engine = GraphEngine::create(&graph_path, index, config)?;
    Ok((dir, engine))
}

struct StormVertex {
    senders_seen: Vec<u32>,
}

impl VertexProgram for StormVertex {
    fn pre_run(&mut self, ctx: &mut Context<'_, Self>) -> bool {
        if ctx.level() == 0 {
            let me = ctx.id();
            let others: Vec<VertexId> = (0..ctx.num_vertices())
                .map(VertexId)
                .filter(|&v| v != me)
                .collect();
            ctx.multicast_msg(&others, &me.0.to_le_bytes());
        }
        false
    }

    fn on_self(&mut self, _ctx: &mut Context<'_, Self>, _vertex: &brasa::PageVertex<'_>) -> bool {
        true
    }

    fn on_messages(&mut self, _ctx: &mut Context<'_, Self>, msgs: &[Message<'_>]) {
        for msg in msgs {
            let sender = u32::from_le_bytes(msg.payload().try_into().unwrap());
            self.senders_seen.push(sender);
        }
    }
}

#[test]
fn storm_delivers_every_message_exactly_once() -> Result<()> {
    let n = 6u32;
    let (_dir, mut engine) = edge_free_engine(n, 3, 4, |_| StormVertex {
        senders_seen: Vec::new(),
    })?;
    engine.start_all()?;
    engine.wait4complete()?;

    let mut total = 0;
    for (raw, vertex) in engine.vertices().enumerate() {
        let mut seen = vertex.senders_seen.clone();
        seen.sort_unstable();
        let expected: Vec<u32> = (0..n).filter(|&s| s != raw as u32).collect();
        assert_eq!(seen, expected, "vertex {raw} saw wrong senders");
        total += vertex.senders_seen.len();
    }
    assert_eq!(total as u32, n * (n - 1));
    assert_eq!(engine.level(), 2);
    Ok(())
}

struct SeqVertex {
    seen: Vec<u32>,
}

impl VertexProgram for SeqVertex {
    fn pre_run(&mut self, ctx: &mut Context<'_, Self>) -> bool {
        if ctx.level() == 0 && ctx.id() == VertexId(0) {
            for i in 0..1000u32 {
                ctx.send_msg(VertexId(1), &i.to_le_bytes());
            }
        }
        false
    }

    fn on_self(&mut self, _ctx: &mut Context<'_, Self>, _vertex: &brasa::PageVertex<'_>) -> bool {
        true
    }

    fn on_messages(&mut self, _ctx: &mut Context<'_, Self>, msgs: &[Message<'_>]) {
        for msg in msgs {
            self.seen
                .push(u32::from_le_bytes(msg.payload().try_into().unwrap()));
        }
    }
}

#[test]
fn point_to_point_is_fifo_per_source() -> Result<()> {
    // one-page send buffers force several flushes inside the level
    let (_dir, mut engine) = edge_free_engine(2, 2, 1, |_| SeqVertex { seen: Vec::new() })?;
    engine.start(&[VertexId(0)])?;
    engine.wait4complete()?;

    let receiver = engine.vertex(VertexId(1));
    let expected: Vec<u32> = (0..1000).collect();
    assert_eq!(receiver.seen, expected);
    Ok(())
}

struct PokeVertex {
    pre_runs: u32,
}

impl VertexProgram for PokeVertex {
    fn pre_run(&mut self, ctx: &mut Context<'_, Self>) -> bool {
        self.pre_runs += 1;
        if ctx.level() == 0 && ctx.id() == VertexId(0) {
            ctx.activate_vertex(VertexId(5));
            ctx.activate_vertex(VertexId(5));
            ctx.activate_vertices(&[VertexId(5), VertexId(5)]);
        }
        false
    }

    fn on_self(&mut self, _ctx: &mut Context<'_, Self>, _vertex: &brasa::PageVertex<'_>) -> bool {
        true
    }
}

#[test]
fn repeated_activation_dispatches_once() -> Result<()> {
    let (_dir, mut engine) = edge_free_engine(10, 2, 4, |_| PokeVertex { pre_runs: 0 })?;
    engine.start(&[VertexId(0)])?;
    engine.wait4complete()?;

    for (raw, vertex) in engine.vertices().enumerate() {
        let expected = match raw {
            0 | 5 => 1,
            _ => 0,
        };
        assert_eq!(vertex.pre_runs, expected, "vertex {raw}");
    }
    assert_eq!(engine.level(), 2);
    Ok(())
}

struct PingVertex {
    got: u32,
}

impl VertexProgram for PingVertex {
    fn pre_run(&mut self, ctx: &mut Context<'_, Self>) -> bool {
        if ctx.level() == 0 && ctx.id() == VertexId(0) {
            ctx.send_msg(VertexId(3), b"ping");
        }
        false
    }

    fn on_self(&mut self, _ctx: &mut Context<'_, Self>, _vertex: &brasa::PageVertex<'_>) -> bool {
        true
    }

    fn on_messages(&mut self, _ctx: &mut Context<'_, Self>, msgs: &[Message<'_>]) {
        self.got += msgs.len() as u32;
    }
}

#[test]
fn message_alone_keeps_the_next_level_alive() -> Result<()> {
    let (_dir, mut engine) = edge_free_engine(4, 2, 4, |_| PingVertex { got: 0 })?;
    engine.start(&[VertexId(0)])?;
    engine.wait4complete()?;

    assert_eq!(engine.vertex(VertexId(3)).got, 1);
    assert_eq!(engine.level(), 2);
    Ok(())
}
