use crate::declare_vertex;
use crate::lock::{LockRow, RawLockRow};
use anyhow::Result;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use std::collections::{HashMap, HashSet};
use tracing::debug;

declare_vertex!(ProcessVertex; "PID"; pid: i32, query);
declare_vertex!(RelationVertex; "REL"; oid: u32, name);

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum VertexKind {
    Process,
    Relation,
}

#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum Vertex {
    Process(ProcessVertex),
    Relation(RelationVertex),
}

impl Vertex {
    pub fn kind(&self) -> VertexKind {
        match self {
            Vertex::Process(_) => VertexKind::Process,
            Vertex::Relation(_) => VertexKind::Relation,
        }
    }

    pub fn key(&self) -> String {
        match self {
            Vertex::Process(process) => process.key(),
            Vertex::Relation(relation) => relation.key(),
        }
    }
}

/// Lock of one process on one relation. `granted == false` is a wait.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct LockEdge {
    pub mode: String,
    pub granted: bool,
}

impl LockEdge {
    pub fn new(mode: &str, granted: bool) -> Self {
        Self {
            mode: mode.to_string(),
            granted,
        }
    }

    pub fn is_waiting(&self) -> bool {
        !self.granted
    }
}

/// Borrowed view of an edge together with its endpoints.
#[derive(Debug, Copy, Clone)]
pub struct EdgeView<'a> {
    pub source: &'a Vertex,
    pub target: &'a Vertex,
    pub lock: &'a LockEdge,
}

impl<'a> EdgeView<'a> {
    pub fn source_key(&self) -> String {
        self.source.key()
    }

    pub fn target_key(&self) -> String {
        self.target.key()
    }

    pub fn mode(&self) -> &'a str {
        &self.lock.mode
    }

    pub fn granted(&self) -> bool {
        self.lock.granted
    }
}

/// Directed multigraph of processes and the relations they lock.
///
/// Edges always run from a process to a relation. Vertices and edges
/// iterate in insertion order, and every derived graph keeps the relative
/// order of the surviving elements.
#[derive(Debug, Clone, Default)]
pub struct LockGraph {
    database: String,
    graph: DiGraph<Vertex, LockEdge>,
    key_to_node: HashMap<String, NodeIndex>,
}

impl LockGraph {
    pub fn new(database: &str) -> Self {
        Self {
            database: database.to_string(),
            graph: DiGraph::new(),
            key_to_node: HashMap::new(),
        }
    }

    /// Database the locks were read from. Only used to name the output.
    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn vertex_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn vertices(&self) -> impl Iterator<Item = &Vertex> + '_ {
        self.graph.node_weights()
    }

    pub fn edges(&self) -> impl Iterator<Item = EdgeView<'_>> + '_ {
        self.graph.edge_references().map(move |edge| EdgeView {
            source: &self.graph[edge.source()],
            target: &self.graph[edge.target()],
            lock: edge.weight(),
        })
    }

    pub fn vertex(&self, key: &str) -> Option<&Vertex> {
        self.node_index(key).map(|idx| &self.graph[idx])
    }

    pub fn node_index(&self, key: &str) -> Option<NodeIndex> {
        self.key_to_node.get(key).copied()
    }

    /// Underlying petgraph structure, for filters that need traversal.
    pub fn graph(&self) -> &DiGraph<Vertex, LockEdge> {
        &self.graph
    }

    /// Graph containing exactly the `keep` vertices and every edge whose
    /// endpoints are both kept.
    pub fn induced_subgraph(&self, keep: &HashSet<NodeIndex>) -> LockGraph {
        let graph = self.graph.filter_map(
            |idx, vertex| keep.contains(&idx).then(|| vertex.clone()),
            |_, edge| Some(edge.clone()),
        );
        let key_to_node = graph
            .node_indices()
            .map(|idx| (graph[idx].key(), idx))
            .collect();
        LockGraph {
            database: self.database.clone(),
            graph,
            key_to_node,
        }
    }

    /// Insert the vertex unless one with the same key exists. Returns the
    /// index of the vertex stored under that key.
    fn add_vertex(&mut self, vertex: Vertex) -> NodeIndex {
        *self
            .key_to_node
            .entry(vertex.key())
            .or_insert_with(|| self.graph.add_node(vertex))
    }

    fn add_lock(&mut self, row: LockRow) {
        let process = self.add_vertex(Vertex::Process(ProcessVertex::new(row.pid, &row.query)));
        let relation = self.add_vertex(Vertex::Relation(RelationVertex::new(
            row.relation_oid,
            &row.relation_name,
        )));
        self.graph
            .add_edge(process, relation, LockEdge::new(&row.mode, row.granted));
    }
}

impl PartialEq for LockGraph {
    fn eq(&self, other: &Self) -> bool {
        self.database == other.database
            && self.vertices().eq(other.vertices())
            && self
                .edges()
                .map(|e| (e.source, e.target, e.lock))
                .eq(other.edges().map(|e| (e.source, e.target, e.lock)))
    }
}

impl Eq for LockGraph {}

#[derive(Debug, Clone, Default)]
pub struct LockGraphBuilder {
    database: String,
}

impl LockGraphBuilder {
    pub fn new(database: &str) -> Self {
        Self {
            database: database.to_string(),
        }
    }

    /// Build the full lock graph. Empty input gives an empty graph.
    pub fn build<I>(&self, rows: I) -> LockGraph
    where
        I: IntoIterator<Item = LockRow>,
    {
        let mut lock_graph = LockGraph::new(&self.database);
        for row in rows {
            lock_graph.add_lock(row);
        }
        debug!(
            database = %self.database,
            vertices = lock_graph.vertex_count(),
            edges = lock_graph.edge_count(),
            "Built lock graph"
        );
        lock_graph
    }

    /// Validate and build. Stops at the first row with a missing column.
    pub fn try_build<I>(&self, rows: I) -> Result<LockGraph>
    where
        I: IntoIterator<Item = RawLockRow>,
    {
        let rows = rows
            .into_iter()
            .enumerate()
            .map(|(idx, raw)| LockRow::try_from_raw(idx, raw))
            .collect::<Result<Vec<_>>>()?;
        Ok(self.build(rows))
    }
}
