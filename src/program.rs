use crate::engine::Context;
use crate::graph::page::PageVertex;
use crate::msg::Message;
use crate::types::VertexId;

/// Byte range of the graph file to fetch for a vertex program.
///
/// Obtained from [`Context::locate`]; the engine binds the completion back
/// to the requesting program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestRange {
    pub offset: u64,
    pub len: u32,
}

/// Per-vertex behavior driven by the engine, one implementor type per
/// engine instance.
///
/// Within a level a program moves through: an optional `pre_run` (return
/// true to have the engine fetch this vertex's own adjacency and deliver it
/// to `on_self`), then a requirement pump where `has_required_vertices` and
/// `next_request` describe further reads delivered to `on_neighbors`. The
/// program is done for the level once its most recent dispatch returned
/// true and no reads remain outstanding. `on_messages` is invoked
/// independently of the I/O state.
pub trait VertexProgram: Send + Sync + Sized + 'static {
    /// Runs before any adjacency is available. Returning true asks the
    /// engine to fetch this vertex's own adjacency list.
    fn pre_run(&mut self, ctx: &mut Context<'_, Self>) -> bool {
        let _ = ctx;
        true
    }

    /// Runs when this vertex's own adjacency list has been read from disk.
    /// Returns true if the vertex has no further I/O this level.
    fn on_self(&mut self, ctx: &mut Context<'_, Self>, vertex: &PageVertex<'_>) -> bool;

    /// Runs when requested neighbor adjacency lists have been read from
    /// disk. Returns true if the vertex has no further I/O this level.
    fn on_neighbors(&mut self, ctx: &mut Context<'_, Self>, pages: &[PageVertex<'_>]) -> bool {
        let _ = (ctx, pages);
        true
    }

    /// Runs when messages addressed to this vertex arrive. Messages sent at
    /// level L are delivered here during level L+1.
    fn on_messages(&mut self, ctx: &mut Context<'_, Self>, msgs: &[Message<'_>]) {
        let _ = (ctx, msgs);
    }

    /// Whether this vertex still needs auxiliary vertices this level.
    fn has_required_vertices(&self) -> bool {
        false
    }

    /// Next auxiliary read, typically `Some(ctx.locate(neighbor))`.
    /// Returning `None` while `has_required_vertices` is true is a protocol
    /// violation.
    fn next_request(&mut self, ctx: &mut Context<'_, Self>) -> Option<RequestRange> {
        let _ = ctx;
        None
    }
}

/// Optional reordering hook applied to each worker's batch of activated
/// vertices before dispatch. Without one, workers process ascending ids.
pub trait VertexScheduler: Send + Sync {
    fn schedule(&self, batch: &mut Vec<VertexId>);
}
