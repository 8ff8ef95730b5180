use crate::error::LockGraphError::MalformedRow;
use anyhow::{anyhow, Result};

/// One relation lock held or awaited by one backend, under one mode.
#[derive(Debug, Clone, Default, Eq, PartialEq, Hash)]
pub struct LockRow {
    pub pid: i32,
    pub relation_oid: u32,
    pub relation_name: String,
    pub mode: String,
    pub granted: bool,
    pub query: String,
}

/// A lock row as read from the server. Any column may be NULL.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct RawLockRow {
    pub pid: Option<i32>,
    pub relation_oid: Option<u32>,
    pub relation_name: Option<String>,
    pub mode: Option<String>,
    pub granted: Option<bool>,
    pub query: Option<String>,
}

macro_rules! required {
    ($raw:expr, $field:ident, $row:expr) => {
        $raw.$field.ok_or_else(|| {
            anyhow!(MalformedRow {
                row: $row,
                field: stringify!($field),
            })
        })?
    };
}

impl LockRow {
    pub fn new(
        pid: i32,
        relation_oid: u32,
        relation_name: &str,
        mode: &str,
        granted: bool,
        query: &str,
    ) -> Self {
        Self {
            pid,
            relation_oid,
            relation_name: relation_name.to_string(),
            mode: mode.to_string(),
            granted,
            query: query.to_string(),
        }
    }

    /// Validate a raw row. `row` is its position in the input and only
    /// used for error reporting.
    pub fn try_from_raw(row: usize, raw: RawLockRow) -> Result<Self> {
        Ok(Self {
            pid: required!(raw, pid, row),
            relation_oid: required!(raw, relation_oid, row),
            relation_name: required!(raw, relation_name, row),
            mode: required!(raw, mode, row),
            granted: required!(raw, granted, row),
            query: required!(raw, query, row),
        })
    }
}

impl From<LockRow> for RawLockRow {
    fn from(row: LockRow) -> Self {
        Self {
            pid: Some(row.pid),
            relation_oid: Some(row.relation_oid),
            relation_name: Some(row.relation_name),
            mode: Some(row.mode),
            granted: Some(row.granted),
            query: Some(row.query),
        }
    }
}
