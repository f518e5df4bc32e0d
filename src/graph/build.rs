use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::Result;
use crate::graph::header::{GraphHeader, ENCODING_V1, HEADER_LEN};
use crate::types::VertexId;

/// Composes a graph file and its index from an edge list.
///
/// The adjacency stream is written in id order, so index offsets come out
/// non-decreasing by construction. Neighbor lists are sorted ascending to
/// keep runs reproducible.
pub struct GraphBuilder {
    directed: bool,
    num_vertices: u32,
    edges: Vec<(VertexId, VertexId)>,
}

impl GraphBuilder {
    pub fn new(directed: bool, num_vertices: u32) -> Self {
        Self {
            directed,
            num_vertices,
            edges: Vec::new(),
        }
    }

    pub fn add_edge(&mut self, from: VertexId, to: VertexId) -> &mut Self {
        debug_assert!(from.0 < self.num_vertices && to.0 < self.num_vertices);
        self.edges.push((from, to));
        self
    }

    pub fn write(&self, graph_path: &Path, index_path: &Path) -> Result<()> {
        let n = self.num_vertices as usize;
        let mut out_lists: Vec<Vec<u32>> = vec![Vec::new(); n];
        let mut in_lists: Vec<Vec<u32>> = vec![Vec::new(); n];
        for &(from, to) in &self.edges {
            if self.directed {
                out_lists[from.as_usize()].push(to.0);
                in_lists[to.as_usize()].push(from.0);
            } else {
                out_lists[from.as_usize()].push(to.0);
                out_lists[to.as_usize()].push(from.0);
            }
        }
        for list in out_lists.iter_mut().chain(in_lists.iter_mut()) {
            list.sort_unstable();
        }

        let mut graph = BufWriter::new(File::create(graph_path)?);
        let mut entries = Vec::with_capacity(n);
        let mut offset = 0u64;
        for id in 0..n {
            let block = if self.directed {
                encode_directed(&in_lists[id], &out_lists[id])
            } else {
                encode_undirected(&out_lists[id])
            };
            graph.write_all(&block)?;
            entries.push((offset, block.len() as u32));
            offset += block.len() as u64;
        }
        graph.flush()?;

        let header = GraphHeader {
            directed: self.directed,
            num_vertices: self.num_vertices,
            num_edges: self.edges.len() as u64,
            encoding_version: ENCODING_V1,
        };
        let mut hdr = [0u8; HEADER_LEN];
        header.encode(&mut hdr)?;

        let mut index = BufWriter::new(File::create(index_path)?);
        index.write_all(&hdr)?;
        for (off, len) in entries {
            index.write_all(&off.to_le_bytes())?;
            index.write_all(&len.to_le_bytes())?;
        }
        index.flush()?;
        Ok(())
    }
}

fn encode_directed(in_ids: &[u32], out_ids: &[u32]) -> Vec<u8> {
    let mut block = Vec::with_capacity(8 + (in_ids.len() + out_ids.len()) * 4);
    block.extend_from_slice(&(in_ids.len() as u32).to_le_bytes());
    block.extend_from_slice(&(out_ids.len() as u32).to_le_bytes());
    for id in in_ids.iter().chain(out_ids) {
        block.extend_from_slice(&id.to_le_bytes());
    }
    block
}

fn encode_undirected(ids: &[u32]) -> Vec<u8> {
    let mut block = Vec::with_capacity(4 + ids.len() * 4);
    block.extend_from_slice(&(ids.len() as u32).to_le_bytes());
    for id in ids {
        block.extend_from_slice(&id.to_le_bytes());
    }
    block
}

#[cfg(test)]
mod tests {
    use super::GraphBuilder;
    use crate::graph::index::VertexIndex;
    use crate::graph::page::{EdgeDir, PageVertex};
    use crate::io::{FileIo, StdFileIo};
    use crate::types::VertexId;
    use tempfile::tempdir;

    #[test]
    fn written_blocks_decode_back() {
        let dir = tempdir().unwrap();
        let graph_path = dir.path().join("g.adj");
        let index_path = dir.path().join("g.idx");

        let mut builder = GraphBuilder::new(true, 4);
        builder.add_edge(VertexId(0), VertexId(1));
        builder.add_edge(VertexId(0), VertexId(2));
        builder.add_edge(VertexId(3), VertexId(0));
        builder.write(&graph_path, &index_path).unwrap();

        let index: VertexIndex<()> = VertexIndex::load(&index_path, 1, |_| ()).unwrap();
        let file = StdFileIo::open(&graph_path).unwrap();

        let range = index.locate(VertexId(0));
        let mut buf = vec![0u8; range.len as usize];
        file.read_at(range.offset, &mut buf).unwrap();
        let page = PageVertex::parse(true, &buf).unwrap();
        let out: Vec<_> = page.neigh_iter(EdgeDir::Out).map(|v| v.0).collect();
        assert_eq!(out, vec![1, 2]);
        let inc: Vec<_> = page.neigh_iter(EdgeDir::In).map(|v| v.0).collect();
        assert_eq!(inc, vec![3]);
    }

    #[test]
    fn undirected_edge_lands_on_both_endpoints() {
        let dir = tempdir().unwrap();
        let graph_path = dir.path().join("u.adj");
        let index_path = dir.path().join("u.idx");

        let mut builder = GraphBuilder::new(false, 2);
        builder.add_edge(VertexId(0), VertexId(1));
        builder.write(&graph_path, &index_path).unwrap();

        let index: VertexIndex<()> = VertexIndex::load(&index_path, 1, |_| ()).unwrap();
        let file = StdFileIo::open(&graph_path).unwrap();
        for (id, expected) in [(0u32, 1u32), (1, 0)] {
            let range = index.locate(VertexId(id));
            let mut buf = vec![0u8; range.len as usize];
            file.read_at(range.offset, &mut buf).unwrap();
            let page = PageVertex::parse(false, &buf).unwrap();
            let neigh: Vec<_> = page.neigh_iter(EdgeDir::Both).map(|v| v.0).collect();
            assert_eq!(neigh, vec![expected]);
        }
    }
}
