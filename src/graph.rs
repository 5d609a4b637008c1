//! Worker-local graph store with sorted adjacency indexes.
//!
//! Build order is add, sort, index. Queries issued before [`Graph::make_index`] see empty
//! ranges rather than errors.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Range;

use tracing::debug;

use crate::types::{Direction, Edge, VertexId};

/// Local vertices and edges owned by one worker.
#[derive(Clone, Debug)]
pub struct Graph<V> {
    directed: bool,
    vertices: BTreeSet<V>,
    edges: Vec<Edge<V>>,
    inverted: Vec<Edge<V>>,
    index: BTreeMap<V, Range<usize>>,
    inverted_index: BTreeMap<V, Range<usize>>,
}

impl<V: VertexId> Graph<V> {
    /// Creates an empty graph.
    pub fn new(directed: bool) -> Self {
        Self {
            directed,
            vertices: BTreeSet::new(),
            edges: Vec::new(),
            inverted: Vec::new(),
            index: BTreeMap::new(),
            inverted_index: BTreeMap::new(),
        }
    }

    /// Whether edge direction is significant.
    pub fn is_directed(&self) -> bool {
        self.directed
    }

    /// Inserts a vertex; returns false if it was already present.
    pub fn add_vertex(&mut self, v: V) -> bool {
        self.vertices.insert(v)
    }

    /// Appends an edge without touching the vertex set.
    pub fn add_edge(&mut self, edge: Edge<V>) {
        self.edges.push(edge);
    }

    /// Appends an edge under a new id, creating missing endpoints.
    pub fn add_edge_with_vertices(&mut self, id: i64, edge: &Edge<V>) {
        self.vertices.insert(edge.src);
        self.vertices.insert(edge.dst);
        self.edges.push(edge.with_id(id));
    }

    /// Whether the vertex is present locally.
    pub fn contains_vertex(&self, v: V) -> bool {
        self.vertices.contains(&v)
    }

    /// Finds an edge between `src` and `dst`. Requires a sorted, indexed graph.
    ///
    /// With `any_direction` the reverse orientation also matches.
    pub fn find_edge(&self, any_direction: bool, src: V, dst: V) -> Option<&Edge<V>> {
        let forward = self.find_sorted(src, dst);
        if forward.is_some() || !any_direction {
            return forward;
        }
        self.find_sorted(dst, src)
    }

    fn find_sorted(&self, src: V, dst: V) -> Option<&Edge<V>> {
        let range = self.index.get(&src)?.clone();
        let slice = &self.edges[range];
        let pos = slice.partition_point(|e| e.dst < dst);
        slice.get(pos).filter(|e| e.dst == dst)
    }

    /// Degree in the requested direction. Undirected graphs ignore the direction.
    pub fn degree(&self, v: V, direction: Direction) -> usize {
        let out = self.index.get(&v).map_or(0, |r| r.len());
        if !self.directed {
            return out;
        }
        let inbound = self.inverted_index.get(&v).map_or(0, |r| r.len());
        match direction {
            Direction::Out => out,
            Direction::In => inbound,
            Direction::Both => out + inbound,
        }
    }

    /// Neighbour ids in edge order. Duplicates are kept for parallel edges.
    pub fn neighbors(&self, v: V, direction: Direction) -> Vec<V> {
        let mut out = Vec::new();
        if !self.vertices.contains(&v) {
            return out;
        }
        if !self.directed {
            out.extend(self.out_slice(v).iter().map(|e| e.dst));
            return out;
        }
        if matches!(direction, Direction::In | Direction::Both) {
            out.extend(self.in_slice(v).iter().map(|e| e.dst));
        }
        if matches!(direction, Direction::Out | Direction::Both) {
            out.extend(self.out_slice(v).iter().map(|e| e.dst));
        }
        out
    }

    fn out_slice(&self, v: V) -> &[Edge<V>] {
        self.index
            .get(&v)
            .map_or(&[][..], |r| &self.edges[r.clone()])
    }

    fn in_slice(&self, v: V) -> &[Edge<V>] {
        self.inverted_index
            .get(&v)
            .map_or(&[][..], |r| &self.inverted[r.clone()])
    }

    /// Number of local vertices.
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Number of local edges, mirrored copies included.
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Largest local vertex id, if any vertex exists.
    pub fn max_vertex_id(&self) -> Option<V> {
        self.vertices.last().copied()
    }

    /// Local vertex ids in ascending order.
    pub fn vertices(&self) -> &BTreeSet<V> {
        &self.vertices
    }

    /// Local edges in their current order.
    pub fn edges(&self) -> &[Edge<V>] {
        &self.edges
    }

    /// Consumes the graph, returning its edges.
    pub fn into_edges(self) -> Vec<Edge<V>> {
        self.edges
    }

    /// Sorts the edge vector by `(src, dst, id)`.
    pub fn sort(&mut self) {
        self.edges.sort_unstable();
    }

    /// Sorts the inverted edge vector.
    pub fn sort_inverted(&mut self) {
        self.inverted.sort_unstable();
    }

    /// Builds the source-major index. Expects a sorted edge vector.
    pub fn make_index(&mut self) {
        self.index = contiguous_ranges(&self.edges);
    }

    /// Builds the destination-major index. Expects a sorted inverted vector.
    pub fn make_inverted_index(&mut self) {
        self.inverted_index = contiguous_ranges(&self.inverted);
    }

    /// Populates the inverted vector with reversed copies of every edge.
    pub fn make_inverted(&mut self) {
        self.inverted = self.edges.iter().map(Edge::reversed).collect();
    }

    /// Adds the reverse of every edge so undirected adjacency is symmetric.
    ///
    /// Mirror ids are `(n + i) * size + rank`, disjoint from loader-assigned ids.
    pub fn mirror_undirected(&mut self, rank: usize, size: usize) {
        debug_assert!(!self.directed, "mirroring a directed graph");
        let n = self.edges.len();
        self.edges.reserve(n);
        for i in 0..n {
            let id = ((n + i) * size + rank) as i64;
            let mirrored = self.edges[i].reversed().with_id(id);
            self.edges.push(mirrored);
        }
    }

    /// Runs the post-load build order for the graph's directedness.
    pub fn finalize(&mut self, rank: usize, size: usize) {
        if self.directed {
            self.make_inverted();
            self.sort();
            self.sort_inverted();
            self.make_index();
            self.make_inverted_index();
        } else {
            self.mirror_undirected(rank, size);
            self.sort();
            self.make_index();
        }
        debug!(
            rank,
            vertices = self.vertices.len(),
            edges = self.edges.len(),
            directed = self.directed,
            "graph.finalize.done"
        );
    }
}

fn contiguous_ranges<V: VertexId>(edges: &[Edge<V>]) -> BTreeMap<V, Range<usize>> {
    let mut index = BTreeMap::new();
    let mut start = 0;
    while start < edges.len() {
        let src = edges[start].src;
        let end = start + edges[start..].partition_point(|e| e.src == src);
        index.insert(src, start..end);
        start = end;
    }
    index
}
