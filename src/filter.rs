use crate::error::LockGraphError::UnknownFilter;
use crate::lock_graph::LockGraph;
use anyhow::{anyhow, Result};
use petgraph::graph::NodeIndex;
use petgraph::visit::EdgeRef;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

pub type FilterFn = Arc<dyn Fn(&LockGraph) -> LockGraph + Send + Sync>;

/// Named graph filters available to a [`FilterPipeline`].
#[derive(Clone, Default)]
pub struct FilterRegistry {
    filters: HashMap<String, FilterFn>,
}

impl fmt::Debug for FilterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterRegistry")
            .field("filters", &self.names())
            .finish()
    }
}

impl FilterRegistry {
    pub fn new() -> Self {
        Self {
            filters: HashMap::new(),
        }
    }

    /// Registry with the `deadlock` and `conflicts` filters.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry
            .register("deadlock", deadlock_filter)
            .register("conflicts", conflicts_filter);
        registry
    }

    /// Add a filter, replacing any filter already registered under `name`.
    pub fn register<F>(&mut self, name: &str, filter: F) -> &mut Self
    where
        F: Fn(&LockGraph) -> LockGraph + Send + Sync + 'static,
    {
        self.filters.insert(name.to_string(), Arc::new(filter));
        self
    }

    pub fn get(&self, name: &str) -> Option<&FilterFn> {
        self.filters.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.filters.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.filters.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[derive(Debug, Clone)]
pub struct FilterPipeline {
    registry: FilterRegistry,
}

impl Default for FilterPipeline {
    fn default() -> Self {
        Self::new(FilterRegistry::with_defaults())
    }
}

impl FilterPipeline {
    pub fn new(registry: FilterRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &FilterRegistry {
        &self.registry
    }

    /// Apply the named filters left to right. Every name is resolved
    /// before any filter runs, so an unknown name leaves nothing applied.
    pub fn apply_filters<S: AsRef<str>>(&self, graph: &LockGraph, names: &[S]) -> Result<LockGraph> {
        let filters = names
            .iter()
            .map(|name| {
                let name = name.as_ref();
                self.registry
                    .get(name)
                    .map(|filter| (name, filter))
                    .ok_or_else(|| anyhow!(UnknownFilter(name.to_string())))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut current = graph.clone();
        for (name, filter) in filters {
            current = filter(&current);
            debug!(
                filter = name,
                vertices = current.vertex_count(),
                edges = current.edge_count(),
                "Applied lock graph filter"
            );
        }
        Ok(current)
    }
}

/// Vertices attached to at least one waiting edge.
///
/// Any cycle of waits consists of ungranted edges only, so this keeps every
/// possible deadlock participant. It does not check that a cycle exists:
/// all lock contention is shown, deadlocked or not.
pub fn deadlock_filter(lock_graph: &LockGraph) -> LockGraph {
    let vertices = lock_graph
        .graph()
        .edge_references()
        .filter(|edge| edge.weight().is_waiting())
        .flat_map(|edge| [edge.source(), edge.target()])
        .collect::<HashSet<NodeIndex>>();
    lock_graph.induced_subgraph(&vertices)
}

/// Relations with a pending waiter together with every process holding or
/// awaiting a lock on them.
pub fn conflicts_filter(lock_graph: &LockGraph) -> LockGraph {
    let graph = lock_graph.graph();
    let contended = graph
        .edge_references()
        .filter(|edge| edge.weight().is_waiting())
        .map(|edge| edge.target())
        .collect::<HashSet<NodeIndex>>();
    let mut vertices = HashSet::new();
    for relation in contended {
        vertices.insert(relation);
        vertices.extend(graph.neighbors_undirected(relation));
    }
    lock_graph.induced_subgraph(&vertices)
}

#[cfg(test)]
mod tests {
    use crate::error::LockGraphError;
    use crate::filter::*;
    use crate::lock::LockRow;
    use crate::lock_graph::tests::{arb_rows, edge_triples, keys};
    use crate::lock_graph::{LockGraph, LockGraphBuilder};
    use proptest::prelude::*;
    use std::collections::HashSet;

    fn build(rows: Vec<LockRow>) -> LockGraph {
        LockGraphBuilder::new("db").build(rows)
    }

    /// P1 holds R1 and R2, P2 waits for R1, P3 holds R3.
    fn contended_graph() -> LockGraph {
        build(vec![
            LockRow::new(1, 1, "r1", "RowExclusiveLock", true, "q1"),
            LockRow::new(2, 1, "r1", "AccessExclusiveLock", false, "q2"),
            LockRow::new(1, 2, "r2", "RowExclusiveLock", true, "q1"),
            LockRow::new(3, 3, "r3", "AccessShareLock", true, "q3"),
        ])
    }

    fn triple(source: &str, target: &str, granted: bool) -> (String, String, bool) {
        (source.to_string(), target.to_string(), granted)
    }

    #[test]
    pub fn test_deadlock_keeps_waiters_only() {
        let graph = build(vec![
            LockRow::new(1, 1, "r1", "ShareLock", true, "q1"),
            LockRow::new(2, 1, "r1", "ExclusiveLock", false, "q2"),
        ]);
        let filtered = deadlock_filter(&graph);
        assert_eq!(vec!["REL1", "PID2"], keys(&filtered));
        assert_eq!(vec![triple("PID2", "REL1", false)], edge_triples(&filtered));
    }

    #[test]
    pub fn test_conflicts_keeps_holders_of_contended_relations() {
        let filtered = conflicts_filter(&contended_graph());
        assert_eq!(vec!["PID1", "REL1", "PID2"], keys(&filtered));
        assert_eq!(
            vec![triple("PID1", "REL1", true), triple("PID2", "REL1", false)],
            edge_triples(&filtered)
        );
    }

    #[test]
    pub fn test_filters_on_uncontended_graph() {
        let graph = build(vec![LockRow::new(1, 1, "r1", "ShareLock", true, "q1")]);
        assert!(deadlock_filter(&graph).is_empty());
        assert!(conflicts_filter(&graph).is_empty());
    }

    #[test]
    pub fn test_empty_filter_list_is_identity() {
        let graph = contended_graph();
        let filtered = FilterPipeline::default()
            .apply_filters::<&str>(&graph, &[])
            .unwrap();
        assert_eq!(graph, filtered);
    }

    #[test]
    pub fn test_filters_apply_in_order() {
        let graph = contended_graph();
        let pipeline = FilterPipeline::default();
        let both = pipeline
            .apply_filters(&graph, &["conflicts", "deadlock"])
            .unwrap();
        assert_eq!(deadlock_filter(&conflicts_filter(&graph)), both);
        assert_eq!(vec!["REL1", "PID2"], keys(&both));
    }

    #[test]
    pub fn test_unknown_filter_fails() {
        let err = FilterPipeline::default()
            .apply_filters(&contended_graph(), &["deadlock", "cycles"])
            .unwrap_err();
        assert_eq!(
            Some(&LockGraphError::UnknownFilter("cycles".to_string())),
            err.downcast_ref::<LockGraphError>()
        );
    }

    #[test]
    pub fn test_registered_filter_is_used() {
        let mut registry = FilterRegistry::with_defaults();
        registry.register("granted", |graph: &LockGraph| {
            let keep = graph
                .graph()
                .edge_references()
                .filter(|edge| edge.weight().granted)
                .flat_map(|edge| [edge.source(), edge.target()])
                .collect();
            graph.induced_subgraph(&keep)
        });
        assert_eq!(vec!["conflicts", "deadlock", "granted"], registry.names());

        let filtered = FilterPipeline::new(registry)
            .apply_filters(&contended_graph(), &["granted"])
            .unwrap();
        assert_eq!(vec!["PID1", "REL1", "REL2", "PID3", "REL3"], keys(&filtered));
        assert_eq!(3, filtered.edge_count());
    }

    #[test]
    pub fn test_end_to_end_accounts() {
        let graph = build(vec![
            LockRow::new(100, 5000, "accounts", "RowExclusiveLock", true, "UPDATE accounts ..."),
            LockRow::new(101, 5000, "accounts", "RowExclusiveLock", false, "UPDATE accounts ..."),
        ]);
        let filtered = FilterPipeline::default()
            .apply_filters(&graph, &["deadlock"])
            .unwrap();
        assert_eq!(vec!["REL5000", "PID101"], keys(&filtered));
        assert_eq!(vec![triple("PID101", "REL5000", false)], edge_triples(&filtered));
    }

    proptest! {
        #[test]
        fn prop_filtered_edges_have_endpoints(rows in arb_rows()) {
            let graph = build(rows);
            for filtered in [deadlock_filter(&graph), conflicts_filter(&graph)] {
                let vertices: HashSet<String> = keys(&filtered).into_iter().collect();
                for edge in filtered.edges() {
                    prop_assert!(vertices.contains(&edge.source_key()));
                    prop_assert!(vertices.contains(&edge.target_key()));
                }
            }
        }

        #[test]
        fn prop_filtered_edges_are_all_induced(rows in arb_rows()) {
            let graph = build(rows);
            let filtered = conflicts_filter(&graph);
            let vertices: HashSet<String> = keys(&filtered).into_iter().collect();
            let expected = graph
                .edges()
                .filter(|e| vertices.contains(&e.source_key()) && vertices.contains(&e.target_key()))
                .count();
            prop_assert_eq!(expected, filtered.edge_count());
        }

        #[test]
        fn prop_conflicts_contains_deadlock(rows in arb_rows()) {
            let graph = build(rows);
            let conflicts: HashSet<String> = keys(&conflicts_filter(&graph)).into_iter().collect();
            for key in keys(&deadlock_filter(&graph)) {
                prop_assert!(conflicts.contains(&key));
            }
        }

        #[test]
        fn prop_pipeline_is_deterministic(rows in arb_rows()) {
            let pipeline = FilterPipeline::default();
            let first = pipeline.apply_filters(&build(rows.clone()), &["conflicts", "deadlock"]).unwrap();
            let second = pipeline.apply_filters(&build(rows), &["conflicts", "deadlock"]).unwrap();
            prop_assert_eq!(keys(&first), keys(&second));
            prop_assert_eq!(edge_triples(&first), edge_triples(&second));
            prop_assert_eq!(first, second);
        }
    }
}
