//! Narrow a lock graph to, or away from, specific processes and relations.
//!
//! A designator names vertices:
//!
//! * `pid:<pid>` the process with PID `<pid>`
//! * `pid:/<regexp>/` every process running a query matching `<regexp>`
//! * `rel:<oid>` the relation with OID `<oid>`
//! * `rel:<name>` the relation called `<name>`

use crate::error::LockGraphError::InvalidDesignator;
use crate::lock_graph::{LockGraph, Vertex};
use anyhow::{anyhow, Result};
use once_cell::sync::Lazy;
use petgraph::graph::NodeIndex;
use regex::Regex;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

static DESIGNATOR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<kind>pid|rel):(?P<value>.+)$").expect("designator pattern is valid")
});

#[derive(Debug, Clone)]
pub enum Designator {
    Pid(i32),
    Query(Regex),
    RelationOid(u32),
    RelationName(String),
}

impl Designator {
    pub fn matches(&self, vertex: &Vertex) -> bool {
        match (self, vertex) {
            (Designator::Pid(pid), Vertex::Process(process)) => process.pid == *pid,
            (Designator::Query(pattern), Vertex::Process(process)) => {
                pattern.is_match(&process.query)
            }
            (Designator::RelationOid(oid), Vertex::Relation(relation)) => relation.oid == *oid,
            (Designator::RelationName(name), Vertex::Relation(relation)) => {
                relation.name == *name
            }
            _ => false,
        }
    }
}

impl FromStr for Designator {
    type Err = anyhow::Error;

    fn from_str(text: &str) -> Result<Self> {
        let invalid = |reason: &str| anyhow!(InvalidDesignator(text.to_string(), reason.to_string()));
        let captures = DESIGNATOR
            .captures(text)
            .ok_or_else(|| invalid("expected pid:<pid>, pid:/<regexp>/, rel:<oid> or rel:<name>"))?;
        let value = &captures["value"];
        match &captures["kind"] {
            "pid" => {
                if let Some(pattern) = value
                    .strip_prefix('/')
                    .and_then(|rest| rest.strip_suffix('/'))
                {
                    Regex::new(pattern)
                        .map(Designator::Query)
                        .map_err(|e| invalid(&e.to_string()))
                } else {
                    value
                        .parse()
                        .map(Designator::Pid)
                        .map_err(|_| invalid("PID is not an integer"))
                }
            }
            _ => Ok(value
                .parse()
                .map(Designator::RelationOid)
                .unwrap_or_else(|_| Designator::RelationName(value.to_string()))),
        }
    }
}

impl fmt::Display for Designator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Designator::Pid(pid) => write!(f, "pid:{}", pid),
            Designator::Query(pattern) => write!(f, "pid:/{}/", pattern),
            Designator::RelationOid(oid) => write!(f, "rel:{}", oid),
            Designator::RelationName(name) => write!(f, "rel:{}", name),
        }
    }
}

fn designated(lock_graph: &LockGraph, designators: &[Designator]) -> Vec<NodeIndex> {
    let graph = lock_graph.graph();
    graph
        .node_indices()
        .filter(|idx| designators.iter().any(|d| d.matches(&graph[*idx])))
        .collect()
}

/// Keep every vertex connected, through any number of edges in either
/// direction, to a designated vertex. No designators keeps everything.
pub fn include(lock_graph: &LockGraph, designators: &[Designator]) -> LockGraph {
    if designators.is_empty() {
        return lock_graph.clone();
    }
    let graph = lock_graph.graph();
    let mut connected = HashSet::new();
    let mut stack = designated(lock_graph, designators);
    while let Some(idx) = stack.pop() {
        if connected.insert(idx) {
            stack.extend(
                graph
                    .neighbors_undirected(idx)
                    .filter(|next| !connected.contains(next)),
            );
        }
    }
    lock_graph.induced_subgraph(&connected)
}

/// Drop every designated vertex together with its edges.
pub fn exclude(lock_graph: &LockGraph, designators: &[Designator]) -> LockGraph {
    let dropped: HashSet<NodeIndex> = designated(lock_graph, designators).into_iter().collect();
    let keep = lock_graph
        .graph()
        .node_indices()
        .filter(|idx| !dropped.contains(idx))
        .collect();
    lock_graph.induced_subgraph(&keep)
}
