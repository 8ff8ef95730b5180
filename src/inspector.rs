use crate::config::Cli;
use crate::error::LockGraphError::EmptyResult;
use crate::filter::FilterPipeline;
use crate::focus::{self, Designator};
use crate::lock_graph::{LockGraph, LockGraphBuilder};
use crate::snapshot::LockSnapshot;
use anyhow::{anyhow, Result};
use tracing::info;

/// Turns one lock table snapshot into the graph to render.
#[derive(Debug, Clone, Default)]
pub struct LockInspector {
    pipeline: FilterPipeline,
    filters: Vec<String>,
    include: Vec<Designator>,
    exclude: Vec<Designator>,
    allow_empty: bool,
}

impl LockInspector {
    pub fn new(pipeline: FilterPipeline) -> Self {
        Self {
            pipeline,
            ..Default::default()
        }
    }

    pub fn from_cli(cli: &Cli) -> Self {
        Self::new(FilterPipeline::default())
            .with_filters(&cli.filters)
            .with_focus(cli.include.clone(), cli.exclude.clone())
            .allow_empty(cli.allow_empty)
    }

    pub fn with_filters<S: AsRef<str>>(mut self, filters: &[S]) -> Self {
        self.filters = filters.iter().map(|f| f.as_ref().to_string()).collect();
        self
    }

    pub fn with_focus(mut self, include: Vec<Designator>, exclude: Vec<Designator>) -> Self {
        self.include = include;
        self.exclude = exclude;
        self
    }

    pub fn allow_empty(mut self, allow_empty: bool) -> Self {
        self.allow_empty = allow_empty;
        self
    }

    /// Build the lock graph, apply the filters, then include and exclude.
    /// A snapshot without locks is an error unless empty output is allowed.
    pub fn inspect(&self, snapshot: LockSnapshot) -> Result<LockGraph> {
        if snapshot.rows.is_empty() && !self.allow_empty {
            return Err(anyhow!(EmptyResult(snapshot.database)));
        }
        let full = LockGraphBuilder::new(&snapshot.database).try_build(snapshot.rows)?;
        let filtered = self.pipeline.apply_filters(&full, &self.filters)?;
        let focused = focus::exclude(&focus::include(&filtered, &self.include), &self.exclude);
        info!(
            database = full.database(),
            locks = full.edge_count(),
            shown = focused.edge_count(),
            "Lock graph ready"
        );
        Ok(focused)
    }
}

#[cfg(test)]
mod tests {
    use crate::error::LockGraphError;
    use crate::filter::FilterPipeline;
    use crate::inspector::LockInspector;
    use crate::lock::{LockRow, RawLockRow};
    use crate::lock_graph::tests::keys;
    use crate::snapshot::LockSnapshot;

    fn snapshot(rows: Vec<LockRow>) -> LockSnapshot {
        LockSnapshot {
            database: "bank".to_string(),
            rows: rows.into_iter().map(RawLockRow::from).collect(),
        }
    }

    fn busy() -> LockSnapshot {
        snapshot(vec![
            LockRow::new(100, 5000, "accounts", "RowExclusiveLock", true, "UPDATE accounts"),
            LockRow::new(101, 5000, "accounts", "RowExclusiveLock", false, "UPDATE accounts"),
            LockRow::new(102, 6000, "audit", "RowExclusiveLock", true, "INSERT INTO audit"),
            LockRow::new(100, 6000, "audit", "RowExclusiveLock", true, "UPDATE accounts"),
        ])
    }

    #[test]
    pub fn test_empty_snapshot_is_error() {
        let err = LockInspector::default().inspect(snapshot(vec![])).unwrap_err();
        assert_eq!(
            Some(&LockGraphError::EmptyResult("bank".to_string())),
            err.downcast_ref::<LockGraphError>()
        );
    }

    #[test]
    pub fn test_empty_snapshot_allowed() {
        let graph = LockInspector::default()
            .allow_empty(true)
            .inspect(snapshot(vec![]))
            .unwrap();
        assert!(graph.is_empty());
        assert_eq!("bank", graph.database());
    }

    #[test]
    pub fn test_unfiltered_keeps_everything() {
        let graph = LockInspector::default().inspect(busy()).unwrap();
        assert_eq!(vec!["PID100", "REL5000", "PID101", "PID102", "REL6000"], keys(&graph));
        assert_eq!(4, graph.edge_count());
    }

    #[test]
    pub fn test_filters_then_focus() {
        let inspector = LockInspector::new(FilterPipeline::default())
            .with_filters(&["conflicts"])
            .with_focus(vec![], vec!["pid:100".parse().unwrap()]);
        let graph = inspector.inspect(busy()).unwrap();
        assert_eq!(vec!["REL5000", "PID101"], keys(&graph));
        assert_eq!(1, graph.edge_count());
    }

    #[test]
    pub fn test_include_after_filters() {
        let graph = LockInspector::default()
            .with_focus(vec!["rel:audit".parse().unwrap()], vec![])
            .inspect(busy())
            .unwrap();
        assert_eq!(5, graph.vertex_count());

        let graph = LockInspector::default()
            .with_filters(&["deadlock"])
            .with_focus(vec!["rel:audit".parse().unwrap()], vec![])
            .inspect(busy())
            .unwrap();
        assert!(graph.is_empty());
    }

    #[test]
    pub fn test_unknown_filter_propagates() {
        let err = LockInspector::default()
            .with_filters(&["nope"])
            .inspect(busy())
            .unwrap_err();
        assert_eq!(
            Some(&LockGraphError::UnknownFilter("nope".to_string())),
            err.downcast_ref::<LockGraphError>()
        );
    }

    #[test]
    pub fn test_malformed_row_propagates() {
        let mut snapshot = busy();
        snapshot.rows[2].granted = None;
        let err = LockInspector::default().inspect(snapshot).unwrap_err();
        assert_eq!(
            Some(&LockGraphError::MalformedRow {
                row: 2,
                field: "granted"
            }),
            err.downcast_ref::<LockGraphError>()
        );
    }
}
