pub mod config;
pub mod engine;
pub mod error;
pub mod graph;
pub mod io;
pub mod msg;
mod pool;
pub mod program;
pub mod types;

pub use crate::config::EngineConfig;
pub use crate::engine::partition::Partitioner;
pub use crate::engine::{Context, GraphEngine};
pub use crate::error::{EngineError, Result};
pub use crate::graph::build::GraphBuilder;
pub use crate::graph::header::GraphHeader;
pub use crate::graph::index::VertexIndex;
pub use crate::graph::page::{EdgeDir, NeighborIter, PageVertex};
pub use crate::msg::Message;
pub use crate::program::{RequestRange, VertexProgram, VertexScheduler};
pub use crate::types::{Level, VertexId};
